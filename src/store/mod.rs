//! Shared circuit state store.
//!
//! # Data Flow
//! ```text
//! engine.update_statistics
//!     → store.update_statistics (append, evict, recompute, maybe open)
//!
//! engine.handle_queued_request (state OPEN)
//!     → store.lock_queue
//!
//! scheduler ticks
//!     → store.set_open_circuits_to_half_open
//!     → store.unlock_sample_queues → unlock FIFO
//!     → store.pop_queue_to_unlock   ← FIFO
//! ```
//!
//! # Design Decisions
//! - Every method is one atomic unit; no caller ever observes a partial
//!   state transition or set membership that disagrees with the state
//! - Open and half-open indices let the sweeps run without enumerating
//!   every circuit
//! - Backends are pluggable; the in-memory store is a single-writer
//!   implementation for single-node deployments and tests

pub mod error;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::breaker::types::{
    CircuitInfo, CircuitState, QueueResponseType, UpdateStatisticsResult, WindowSettings,
};
use crate::routing::matcher::{CircuitId, RulePattern};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryCircuitStore;

/// Atomic primitives over per-circuit state, statistics and global indices.
#[async_trait]
pub trait CircuitStateStore: Send + Sync {
    /// State of a circuit; unknown circuits are CLOSED.
    async fn get_state(&self, circuit: &CircuitId) -> StoreResult<CircuitState>;

    /// Stored info of a circuit, `None` if it is not indexed.
    async fn get_info(&self, circuit: &CircuitId) -> StoreResult<Option<CircuitInfo>>;

    /// Every indexed circuit.
    async fn get_all_circuits(&self) -> StoreResult<BTreeMap<CircuitId, CircuitInfo>>;

    /// Queues locked for a circuit, oldest lock first.
    async fn locked_queues(&self, circuit: &CircuitId) -> StoreResult<Vec<String>>;

    /// Record an outcome and open the circuit if the window crosses the threshold.
    ///
    /// Creates the circuit on first use. Reporting an already recorded
    /// request id replaces its entry instead of adding a second one.
    async fn update_statistics(
        &self,
        circuit: &RulePattern,
        request_id: &str,
        timestamp: u64,
        settings: &WindowSettings,
        outcome: QueueResponseType,
    ) -> StoreResult<UpdateStatisticsResult>;

    /// Add a queue to the circuit's locked queues, or refresh its timestamp.
    ///
    /// Only OPEN and HALF_OPEN circuits record locks. For any other state the
    /// queue goes straight to the unlock FIFO and `false` is returned.
    async fn lock_queue(&self, queue: &str, circuit: &CircuitId, timestamp: u64)
        -> StoreResult<bool>;

    /// Reset a circuit to CLOSED and hand its locked queues to the unlock FIFO.
    async fn close_circuit(&self, circuit: &CircuitId) -> StoreResult<()>;

    /// Like [`close_circuit`](Self::close_circuit) and drop the circuit from the index.
    async fn close_and_remove_circuit(&self, circuit: &CircuitId) -> StoreResult<()>;

    /// Close every indexed circuit and every circuit holding locked queues.
    async fn close_all_circuits(&self) -> StoreResult<()>;

    /// HALF_OPEN → OPEN. OPEN stays OPEN; any other state is rejected.
    async fn re_open_circuit(&self, circuit: &CircuitId) -> StoreResult<()>;

    /// Move every OPEN circuit to HALF_OPEN, returning how many moved.
    async fn set_open_circuits_to_half_open(&self) -> StoreResult<u64>;

    /// Pick one locked queue per HALF_OPEN circuit and push it to the unlock FIFO.
    async fn unlock_sample_queues(&self, timestamp: u64) -> StoreResult<Vec<String>>;

    /// Pop one queue off the unlock FIFO.
    async fn pop_queue_to_unlock(&self) -> StoreResult<Option<String>>;

    /// Append a queue to the unlock FIFO unless it is already waiting.
    async fn push_queue_to_unlock(&self, queue: &str) -> StoreResult<()>;
}
