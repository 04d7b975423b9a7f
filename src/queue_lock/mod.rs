//! Queue lock gateway: pausing and resuming dequeuing of named queues.
//!
//! # Data Flow
//! ```text
//! circuit OPEN on request path
//!     → engine.lock_queue → gateway.acquire_lock(queue, owner)
//!
//! scheduler unlock ticks
//!     → engine.unlock_queue → gateway.release_lock(queue)
//! ```
//!
//! # Design Decisions
//! - Both operations are idempotent; callers may repeat them freely
//! - The queueing engine owns the locks; this crate only requests them

pub mod http;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use self::http::HttpQueueLockGateway;
pub use memory::MemoryQueueLockGateway;

/// Errors that can occur talking to the queueing engine's lock API.
#[derive(Debug, Error)]
pub enum QueueLockError {
    /// Transport failure.
    #[error("Queue lock request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The queueing engine answered with an error status.
    #[error("Queue lock request for '{queue}' rejected with status {status}")]
    Rejected { queue: String, status: u16 },

    /// The request URL could not be built.
    #[error("Invalid queue lock url: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type for queue lock operations.
pub type QueueLockResult<T> = Result<T, QueueLockError>;

/// Lock primitive of the queueing engine.
#[async_trait]
pub trait QueueLockGateway: Send + Sync {
    /// Stop dequeuing from `queue`.
    async fn acquire_lock(&self, queue: &str, owner: &str) -> QueueLockResult<()>;

    /// Resume dequeuing from `queue`.
    async fn release_lock(&self, queue: &str) -> QueueLockResult<()>;
}
