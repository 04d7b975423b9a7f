//! In-process lease manager.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::lease::{LeaseManager, LeaseResult};

#[derive(Debug, Clone)]
struct Lease {
    token: String,
    expires_at: Instant,
}

/// Leases held in a concurrent map. Expired leases are replaced lazily on
/// the next acquisition attempt.
#[derive(Debug, Clone, Default)]
pub struct MemoryLeaseManager {
    leases: Arc<DashMap<String, Lease>>,
}

impl MemoryLeaseManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token currently holding `name`, if the lease is live.
    pub fn holder(&self, name: &str) -> Option<String> {
        self.leases
            .get(name)
            .filter(|l| l.expires_at > Instant::now())
            .map(|l| l.token.clone())
    }
}

#[async_trait]
impl LeaseManager for MemoryLeaseManager {
    async fn try_acquire(&self, name: &str, token: &str, ttl: Duration) -> LeaseResult<bool> {
        let now = Instant::now();
        let lease = Lease {
            token: token.to_string(),
            expires_at: now + ttl,
        };
        match self.leases.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return Ok(false);
                }
                occupied.insert(lease);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(lease);
                Ok(true)
            }
        }
    }

    async fn release(&self, name: &str, token: &str) -> LeaseResult<bool> {
        Ok(self
            .leases
            .remove_if(name, |_, lease| lease.token == token)
            .is_some())
    }
}
