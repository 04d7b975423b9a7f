//! Breaker errors.

use thiserror::Error;

use crate::queue_lock::QueueLockError;
use crate::store::StoreError;

/// Errors returned by breaker operations.
#[derive(Debug, Error)]
pub enum BreakerError {
    /// The request URI matches no circuit; the request is unprotected.
    #[error("No circuit mapping for uri '{uri}'")]
    NoMapping { uri: String },

    /// The shared state store failed.
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// The queueing engine did not accept a lock or unlock request.
    #[error("Queue lock operation on '{queue}' failed: {source}")]
    QueueLock {
        queue: String,
        #[source]
        source: QueueLockError,
    },

    /// Some sample queues could not be released.
    #[error("Failed to unlock sample queues: {}", .0.join(", "))]
    UnlockFailed(Vec<String>),
}

/// Result type for breaker operations.
pub type BreakerResult<T> = Result<T, BreakerError>;
