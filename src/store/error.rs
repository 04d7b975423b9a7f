//! State store errors.

use thiserror::Error;

use crate::breaker::types::CircuitState;
use crate::routing::matcher::CircuitId;

/// Errors that can occur talking to the circuit state store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store failed or is unreachable.
    #[error("State store error: {0}")]
    Backend(String),

    /// The requested transition is not allowed from the current state.
    #[error("Circuit {circuit} cannot be re-opened from state {state}")]
    IllegalTransition {
        circuit: CircuitId,
        state: CircuitState,
    },
}

/// Result type for state store operations.
pub type StoreResult<T> = Result<T, StoreError>;
