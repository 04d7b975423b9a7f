//! Queue processor side of the breaker contract.
//!
//! Before a queued item runs, [`QueueCircuitBreaker::admit`] decides whether
//! it may; afterwards [`QueueCircuitBreaker::complete`] reports the outcome.
//! Failures on this path degrade to unprotected execution, except that a
//! circuit observed OPEN always blocks.

use crate::breaker::engine::QueueCircuitBreaker;
use crate::breaker::error::BreakerError;
use crate::breaker::types::{CircuitState, QueueResponseType, QueuedRequest};

/// Admission decision for one queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Run the request; the circuit was observed in this state.
    Proceed(CircuitState),
    /// Do not run the request; its queue is locked.
    Blocked,
    /// Run the request without breaker protection.
    Unprotected,
}

impl Admission {
    pub fn may_execute(&self) -> bool {
        !matches!(self, Admission::Blocked)
    }

    fn observed_state(&self) -> Option<CircuitState> {
        match self {
            Admission::Proceed(state) => Some(*state),
            Admission::Blocked => Some(CircuitState::Open),
            Admission::Unprotected => None,
        }
    }
}

impl QueueCircuitBreaker {
    /// Decide whether a queued request may be executed.
    pub async fn admit(&self, queue: &str, request: &QueuedRequest) -> Admission {
        if !self.is_circuit_check_enabled() {
            return Admission::Unprotected;
        }
        match self.handle_queued_request(queue, request).await {
            Ok(CircuitState::Open) => {
                tracing::debug!(queue = %queue, uri = %request.uri, "Circuit open, request blocked");
                Admission::Blocked
            }
            Ok(state) => Admission::Proceed(state),
            Err(BreakerError::QueueLock { .. }) => Admission::Blocked,
            Err(BreakerError::NoMapping { .. }) => Admission::Unprotected,
            Err(e) => {
                tracing::error!(
                    queue = %queue,
                    uri = %request.uri,
                    error = %e,
                    "Circuit check failed, executing request unprotected"
                );
                Admission::Unprotected
            }
        }
    }

    /// Report the outcome of an executed request.
    ///
    /// A HALF_OPEN probe closes the circuit on success and re-opens it on failure.
    pub async fn complete(
        &self,
        queue: &str,
        request: &QueuedRequest,
        outcome: QueueResponseType,
        admission: Admission,
    ) {
        let observed = admission.observed_state();
        if observed == Some(CircuitState::Open) {
            return;
        }

        if self.is_statistics_update_enabled() {
            match self.update_statistics(queue, request, outcome).await {
                Ok(_) | Err(BreakerError::NoMapping { .. }) => {}
                Err(e) => tracing::error!(
                    queue = %queue,
                    uri = %request.uri,
                    error = %e,
                    "Failed to report request outcome"
                ),
            }
        }

        if observed == Some(CircuitState::HalfOpen) {
            let result = match outcome {
                QueueResponseType::Success => self.close_circuit(request).await,
                QueueResponseType::Failure => self.re_open_circuit(request).await,
            };
            if let Err(e) = result {
                tracing::error!(
                    queue = %queue,
                    uri = %request.uri,
                    outcome = ?outcome,
                    error = %e,
                    "Failed to settle half-open probe"
                );
            }
        }
    }
}
