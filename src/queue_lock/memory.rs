//! In-process queue lock gateway.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::queue_lock::{QueueLockGateway, QueueLockResult};

/// Keeps queue locks in a concurrent map of queue → owner.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueLockGateway {
    locks: Arc<DashMap<String, String>>,
}

impl MemoryQueueLockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, queue: &str) -> bool {
        self.locks.contains_key(queue)
    }

    pub fn owner(&self, queue: &str) -> Option<String> {
        self.locks.get(queue).map(|o| o.value().clone())
    }

    /// Names of all locked queues, sorted.
    pub fn locked_queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.locks.iter().map(|e| e.key().clone()).collect();
        queues.sort();
        queues
    }
}

#[async_trait]
impl QueueLockGateway for MemoryQueueLockGateway {
    async fn acquire_lock(&self, queue: &str, owner: &str) -> QueueLockResult<()> {
        self.locks.insert(queue.to_string(), owner.to_string());
        tracing::debug!(queue = %queue, owner = %owner, "Queue locked");
        Ok(())
    }

    async fn release_lock(&self, queue: &str) -> QueueLockResult<()> {
        self.locks.remove(queue);
        tracing::debug!(queue = %queue, "Queue unlocked");
        Ok(())
    }
}
