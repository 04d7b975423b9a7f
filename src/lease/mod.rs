//! Named leases for cross-instance maintenance coordination.
//!
//! # Design Decisions
//! - Best effort: a missed acquisition only skips one tick, and two holders
//!   only repeat idempotent work, so no consensus protocol is needed
//! - Leases expire on their own; a crashed holder blocks others for at most
//!   one TTL
//! - Release only succeeds for the token that acquired the lease

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryLeaseManager;

/// Errors that can occur talking to the lease backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeaseError {
    #[error("Lease backend error: {0}")]
    Backend(String),
}

/// Result type for lease operations.
pub type LeaseResult<T> = Result<T, LeaseError>;

/// Try-acquire leases with a time to live.
#[async_trait]
pub trait LeaseManager: Send + Sync {
    /// Take the lease `name` for `ttl` unless someone else holds it.
    ///
    /// Returns `Ok(false)` when the lease is held by another token.
    async fn try_acquire(&self, name: &str, token: &str, ttl: Duration) -> LeaseResult<bool>;

    /// Give the lease back early. Returns `Ok(false)` if `token` does not hold it.
    async fn release(&self, name: &str, token: &str) -> LeaseResult<bool>;
}

/// Token identifying one acquisition: `{instance}_{millis}_{task}`.
pub fn lease_token(instance_id: &str, now_millis: u64, task: &str) -> String {
    format!("{}_{}_{}", instance_id, now_millis, task)
}

/// TTL of a lease guarding a task with the given interval: half the
/// interval, at least one millisecond.
pub fn lease_ttl(interval: Duration) -> Duration {
    (interval / 2).max(Duration::from_millis(1))
}
