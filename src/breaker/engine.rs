//! The queue circuit breaker engine.
//!
//! # Responsibilities
//! - Per-request decisions (`handle_queued_request`)
//! - Outcome ingestion (`update_statistics`)
//! - Administrative overrides (close, close all, re-open)
//! - Queue lock lifecycle (lock, unlock, unlock next, unlock samples)
//! - Cleanup of circuits whose rule disappeared

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::future::join_all;

use crate::breaker::error::{BreakerError, BreakerResult};
use crate::breaker::types::{
    now_millis, CircuitInfo, CircuitState, QueueResponseType, QueuedRequest,
    UpdateStatisticsResult,
};
use crate::config::schema::{CircuitBreakerConfig, RuleConfig};
use crate::observability::metrics;
use crate::queue_lock::QueueLockGateway;
use crate::routing::matcher::{CircuitId, RulePattern};
use crate::routing::router::RulePatternMapper;
use crate::store::CircuitStateStore;

/// Distributed circuit breaker in front of queued requests.
///
/// Cheap to share behind an `Arc`; all state lives in the injected store,
/// so any number of engines (one per gateway instance) may share one store.
pub struct QueueCircuitBreaker {
    store: Arc<dyn CircuitStateStore>,
    gateway: Arc<dyn QueueLockGateway>,
    mapper: RulePatternMapper,
    config: ArcSwap<CircuitBreakerConfig>,
    /// Owner reported to the queueing engine when locking queues.
    lock_owner: String,
}

impl QueueCircuitBreaker {
    pub fn new(
        store: Arc<dyn CircuitStateStore>,
        gateway: Arc<dyn QueueLockGateway>,
        rules: &[RuleConfig],
        config: CircuitBreakerConfig,
        lock_owner: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            mapper: RulePatternMapper::new(rules),
            config: ArcSwap::from_pointee(config),
            lock_owner: lock_owner.into(),
        }
    }

    pub fn config(&self) -> Arc<CircuitBreakerConfig> {
        self.config.load_full()
    }

    pub fn update_config(&self, config: CircuitBreakerConfig) {
        self.config.store(Arc::new(config));
    }

    pub fn is_circuit_check_enabled(&self) -> bool {
        self.config.load().circuit_check_enabled
    }

    pub fn is_statistics_update_enabled(&self) -> bool {
        self.config.load().statistics_update_enabled
    }

    pub fn mapper(&self) -> &RulePatternMapper {
        &self.mapper
    }

    fn resolve(&self, uri: &str) -> BreakerResult<Arc<RulePattern>> {
        self.mapper.resolve(uri).ok_or_else(|| BreakerError::NoMapping {
            uri: uri.to_string(),
        })
    }

    /// Decide whether a queued request may run.
    ///
    /// An OPEN circuit also (re)locks the queue; CLOSED and HALF_OPEN have no
    /// side effect.
    pub async fn handle_queued_request(
        &self,
        queue: &str,
        request: &QueuedRequest,
    ) -> BreakerResult<CircuitState> {
        let circuit = self.resolve(&request.uri)?;
        let state = self.store.get_state(circuit.circuit_id()).await?;
        if state == CircuitState::Open {
            self.lock_queue_for(queue, circuit.circuit_id()).await?;
        }
        Ok(state)
    }

    /// Record the outcome of a request; locks the queue if the circuit opened.
    pub async fn update_statistics(
        &self,
        queue: &str,
        request: &QueuedRequest,
        outcome: QueueResponseType,
    ) -> BreakerResult<UpdateStatisticsResult> {
        let circuit = self.resolve(&request.uri)?;
        let settings = self.config.load().window_settings();

        let result = self
            .store
            .update_statistics(
                &circuit,
                request.request_id(),
                now_millis(),
                &settings,
                outcome,
            )
            .await
            .inspect_err(|e| {
                tracing::error!(circuit = %circuit.circuit_id(), error = %e, "Failed to update circuit statistics");
            })?;

        if result == UpdateStatisticsResult::Opened {
            tracing::warn!(
                circuit = %circuit.circuit_id(),
                pattern = %circuit.pattern(),
                queue = %queue,
                "Circuit opened"
            );
            metrics::record_circuit_opened(circuit.metric_name());
            self.lock_queue_for(queue, circuit.circuit_id()).await?;
        }
        Ok(result)
    }

    /// Lock `queue` under the circuit matching the request.
    pub async fn lock_queue(&self, queue: &str, request: &QueuedRequest) -> BreakerResult<()> {
        let circuit = self.resolve(&request.uri)?;
        self.lock_queue_for(queue, circuit.circuit_id()).await
    }

    /// Lock `queue` in the queueing engine, then record the lock in the store.
    ///
    /// The store only records locks of OPEN and HALF_OPEN circuits. If the
    /// circuit was closed in the meantime the queue is handed to the unlock
    /// FIFO instead, so every acquired lock is eventually released.
    pub async fn lock_queue_for(&self, queue: &str, circuit: &CircuitId) -> BreakerResult<()> {
        self.gateway
            .acquire_lock(queue, &self.lock_owner)
            .await
            .map_err(|source| {
                tracing::error!(queue = %queue, circuit = %circuit, error = %source, "Failed to lock queue");
                BreakerError::QueueLock {
                    queue: queue.to_string(),
                    source,
                }
            })?;
        metrics::record_queue_lock();

        let recorded = match self.store.lock_queue(queue, circuit, now_millis()).await {
            Ok(recorded) => recorded,
            Err(e) => {
                // unrecorded locks would never be released
                if let Err(release) = self.gateway.release_lock(queue).await {
                    tracing::error!(
                        queue = %queue,
                        error = %release,
                        "Failed to release unrecorded queue lock, it must be unlocked manually"
                    );
                }
                return Err(e.into());
            }
        };
        if recorded {
            tracing::debug!(queue = %queue, circuit = %circuit, "Queue locked");
        } else {
            tracing::info!(
                queue = %queue,
                circuit = %circuit,
                "Circuit no longer open, queue scheduled for unlock"
            );
        }
        Ok(())
    }

    /// Release the queueing engine lock of `queue`.
    pub async fn unlock_queue(&self, queue: &str) -> BreakerResult<()> {
        match self.gateway.release_lock(queue).await {
            Ok(()) => {
                metrics::record_queue_unlock(true);
                tracing::info!(queue = %queue, "Queue unlocked");
                Ok(())
            }
            Err(source) => {
                metrics::record_queue_unlock(false);
                tracing::error!(
                    queue = %queue,
                    error = %source,
                    "Failed to unlock queue, it must be unlocked manually"
                );
                Err(BreakerError::QueueLock {
                    queue: queue.to_string(),
                    source,
                })
            }
        }
    }

    /// Pop one queue off the unlock FIFO and release it.
    ///
    /// A queue whose release fails goes back to the end of the FIFO.
    pub async fn unlock_next_queue(&self) -> BreakerResult<Option<String>> {
        let Some(queue) = self.store.pop_queue_to_unlock().await? else {
            return Ok(None);
        };
        if let Err(e) = self.unlock_queue(&queue).await {
            self.store.push_queue_to_unlock(&queue).await?;
            return Err(e);
        }
        Ok(Some(queue))
    }

    /// Release one locked queue of every HALF_OPEN circuit so it sees probe traffic.
    pub async fn unlock_sample_queues(&self) -> BreakerResult<Vec<String>> {
        let queues = self.store.unlock_sample_queues(now_millis()).await?;
        let results = join_all(queues.iter().map(|q| self.unlock_queue(q))).await;

        let failed: Vec<String> = queues
            .iter()
            .zip(results)
            .filter(|(_, r)| r.is_err())
            .map(|(q, _)| q.clone())
            .collect();
        if !failed.is_empty() {
            return Err(BreakerError::UnlockFailed(failed));
        }
        Ok(queues)
    }

    /// Move every OPEN circuit to HALF_OPEN.
    pub async fn set_open_circuits_to_half_open(&self) -> BreakerResult<u64> {
        Ok(self.store.set_open_circuits_to_half_open().await?)
    }

    /// Close the circuit matching the request.
    pub async fn close_circuit(&self, request: &QueuedRequest) -> BreakerResult<()> {
        let circuit = self.resolve(&request.uri)?;
        self.close_circuit_by_id(circuit.circuit_id()).await
    }

    pub async fn close_circuit_by_id(&self, circuit: &CircuitId) -> BreakerResult<()> {
        self.store.close_circuit(circuit).await?;
        tracing::info!(circuit = %circuit, "Circuit closed");
        Ok(())
    }

    pub async fn close_all_circuits(&self) -> BreakerResult<()> {
        self.store.close_all_circuits().await?;
        tracing::info!("All circuits closed");
        Ok(())
    }

    /// Re-open the HALF_OPEN circuit matching the request.
    pub async fn re_open_circuit(&self, request: &QueuedRequest) -> BreakerResult<()> {
        let circuit = self.resolve(&request.uri)?;
        self.re_open_circuit_by_id(circuit.circuit_id()).await
    }

    pub async fn re_open_circuit_by_id(&self, circuit: &CircuitId) -> BreakerResult<()> {
        self.store.re_open_circuit(circuit).await?;
        tracing::info!(circuit = %circuit, "Circuit re-opened");
        Ok(())
    }

    /// Publish a new rule set and purge circuits whose rule disappeared.
    ///
    /// Returns the ids of the removed circuits.
    pub async fn rules_changed(&self, rules: &[RuleConfig]) -> Vec<CircuitId> {
        let removed = self.mapper.rules_changed(rules);
        let mut ids = Vec::with_capacity(removed.len());
        for pattern in removed {
            let id = pattern.circuit_id().clone();
            match self.store.close_and_remove_circuit(&id).await {
                Ok(()) => tracing::info!(
                    circuit = %id,
                    pattern = %pattern.pattern(),
                    "Removed circuit of deleted rule"
                ),
                Err(e) => tracing::error!(
                    circuit = %id,
                    pattern = %pattern.pattern(),
                    error = %e,
                    "Failed to remove circuit of deleted rule"
                ),
            }
            ids.push(id);
        }
        ids
    }

    pub async fn get_all_circuits(&self) -> BreakerResult<BTreeMap<CircuitId, CircuitInfo>> {
        Ok(self.store.get_all_circuits().await?)
    }

    pub async fn get_circuit_info(&self, circuit: &CircuitId) -> BreakerResult<Option<CircuitInfo>> {
        Ok(self.store.get_info(circuit).await?)
    }

    pub async fn get_circuit_state(&self, circuit: &CircuitId) -> BreakerResult<CircuitState> {
        Ok(self.store.get_state(circuit).await?)
    }

    pub async fn locked_queues(&self, circuit: &CircuitId) -> BreakerResult<Vec<String>> {
        Ok(self.store.locked_queues(circuit).await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::queue_lock::MemoryQueueLockGateway;
    use crate::store::{MemoryCircuitStore, StoreError, StoreResult};

    pub(crate) fn breaker_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            circuit_check_enabled: true,
            statistics_update_enabled: true,
            error_threshold_percentage: 50,
            min_queue_sample_count: 2,
            ..CircuitBreakerConfig::default()
        }
    }

    pub(crate) fn setup(
        rules: &[RuleConfig],
    ) -> (QueueCircuitBreaker, MemoryCircuitStore, MemoryQueueLockGateway) {
        let store = MemoryCircuitStore::new();
        let gateway = MemoryQueueLockGateway::new();
        let breaker = QueueCircuitBreaker::new(
            Arc::new(store.clone()),
            Arc::new(gateway.clone()),
            rules,
            breaker_config(),
            "test-owner",
        );
        (breaker, store, gateway)
    }

    fn req(uri: &str, id: &str) -> QueuedRequest {
        QueuedRequest::new(uri).with_unique_id(id)
    }

    async fn open(breaker: &QueueCircuitBreaker, queue: &str, uri: &str) {
        for id in ["f1", "f2"] {
            breaker
                .update_statistics(queue, &req(uri, id), QueueResponseType::Failure)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_no_mapping() {
        let (breaker, _, _) = setup(&[RuleConfig::new("/svc/.*")]);
        let err = breaker
            .handle_queued_request("q", &QueuedRequest::new("/other"))
            .await
            .unwrap_err();
        assert!(matches!(err, BreakerError::NoMapping { ref uri } if uri == "/other"));

        let err = breaker
            .update_statistics("q", &QueuedRequest::new("/other"), QueueResponseType::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, BreakerError::NoMapping { .. }));
    }

    #[tokio::test]
    async fn test_closed_has_no_side_effect() {
        let (breaker, store, gateway) = setup(&[RuleConfig::new("/svc/.*")]);
        let state = breaker
            .handle_queued_request("q1", &req("/svc/a", "1"))
            .await
            .unwrap();
        assert_eq!(state, CircuitState::Closed);
        assert!(!gateway.is_locked("q1"));
        assert!(store.get_all_circuits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_opening_locks_queue() {
        let rules = [RuleConfig::new("/svc/.*")];
        let (breaker, _, gateway) = setup(&rules);
        let first = breaker
            .update_statistics("q1", &req("/svc/a", "f1"), QueueResponseType::Failure)
            .await
            .unwrap();
        assert_eq!(first, UpdateStatisticsResult::NoChange);
        let second = breaker
            .update_statistics("q1", &req("/svc/a", "f2"), QueueResponseType::Failure)
            .await
            .unwrap();
        assert_eq!(second, UpdateStatisticsResult::Opened);
        assert!(gateway.is_locked("q1"));
        assert_eq!(gateway.owner("q1").as_deref(), Some("test-owner"));

        let state = breaker
            .handle_queued_request("q2", &req("/svc/b", "x"))
            .await
            .unwrap();
        assert_eq!(state, CircuitState::Open);
        assert!(gateway.is_locked("q2"));

        let id = CircuitId::from_pattern("/svc/.*", None);
        assert_eq!(
            breaker.locked_queues(&id).await.unwrap(),
            vec!["q1".to_string(), "q2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_recovery_cycle() {
        let (breaker, _, gateway) = setup(&[RuleConfig::new("/svc/.*")]);
        open(&breaker, "q1", "/svc/a").await;
        breaker
            .handle_queued_request("q2", &req("/svc/b", "x"))
            .await
            .unwrap();

        assert_eq!(breaker.set_open_circuits_to_half_open().await.unwrap(), 1);
        let sampled = breaker.unlock_sample_queues().await.unwrap();
        assert_eq!(sampled.len(), 1);
        assert!(!gateway.is_locked(&sampled[0]));

        // FIFO holds the sample; draining it is harmless
        assert_eq!(breaker.unlock_next_queue().await.unwrap(), Some(sampled[0].clone()));
        assert_eq!(breaker.unlock_next_queue().await.unwrap(), None);

        breaker.close_circuit(&req("/svc/a", "probe")).await.unwrap();
        let mut drained = Vec::new();
        while let Some(queue) = breaker.unlock_next_queue().await.unwrap() {
            drained.push(queue);
        }
        drained.sort();
        assert_eq!(drained, vec!["q1".to_string(), "q2".to_string()]);
        assert!(gateway.locked_queues().is_empty());
    }

    #[tokio::test]
    async fn test_lock_after_concurrent_close_is_released() {
        let (breaker, store, gateway) = setup(&[RuleConfig::new("/svc/.*")]);
        open(&breaker, "q1", "/svc/a").await;
        breaker.close_circuit(&req("/svc/a", "admin")).await.unwrap();
        assert_eq!(breaker.unlock_next_queue().await.unwrap().as_deref(), Some("q1"));

        // a request that observed OPEN before the close locks late
        breaker
            .lock_queue("q2", &req("/svc/b", "late"))
            .await
            .unwrap();
        assert!(gateway.is_locked("q2"));
        let id = CircuitId::from_pattern("/svc/.*", None);
        assert!(breaker.locked_queues(&id).await.unwrap().is_empty());
        assert_eq!(store.pending_unlocks().await, 1);

        assert_eq!(breaker.unlock_next_queue().await.unwrap().as_deref(), Some("q2"));
        assert!(gateway.locked_queues().is_empty());
    }

    #[tokio::test]
    async fn test_re_open_from_closed_is_rejected() {
        let (breaker, _, _) = setup(&[RuleConfig::new("/svc/.*")]);
        let err = breaker
            .re_open_circuit(&req("/svc/a", "1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BreakerError::Storage(StoreError::IllegalTransition { state: CircuitState::Closed, .. })
        ));
    }

    #[tokio::test]
    async fn test_rules_changed_purges_removed_circuit() {
        let rules = [RuleConfig::new("/keep/.*"), RuleConfig::new("/drop/.*")];
        let (breaker, _, gateway) = setup(&rules);
        open(&breaker, "q1", "/drop/a").await;
        breaker
            .handle_queued_request("q2", &req("/drop/b", "x"))
            .await
            .unwrap();
        breaker
            .update_statistics("k", &req("/keep/a", "s"), QueueResponseType::Success)
            .await
            .unwrap();

        let removed = breaker.rules_changed(&[RuleConfig::new("/keep/.*")]).await;
        assert_eq!(removed, vec![CircuitId::from_pattern("/drop/.*", None)]);

        let circuits = breaker.get_all_circuits().await.unwrap();
        assert_eq!(circuits.len(), 1);
        assert!(circuits.contains_key(&CircuitId::from_pattern("/keep/.*", None)));

        let mut unlocked = vec![
            breaker.unlock_next_queue().await.unwrap().unwrap(),
            breaker.unlock_next_queue().await.unwrap().unwrap(),
        ];
        unlocked.sort();
        assert_eq!(unlocked, vec!["q1".to_string(), "q2".to_string()]);
        assert_eq!(breaker.unlock_next_queue().await.unwrap(), None);
        assert!(gateway.locked_queues().is_empty());
    }

    #[tokio::test]
    async fn test_config_switches() {
        let (breaker, _, _) = setup(&[]);
        assert!(breaker.is_circuit_check_enabled());
        breaker.update_config(CircuitBreakerConfig::default());
        assert!(!breaker.is_circuit_check_enabled());
        assert!(!breaker.is_statistics_update_enabled());
        assert_eq!(breaker.config().min_queue_sample_count, 100);
    }

    /// Store whose every call fails, for fail-open behaviour.
    pub(crate) struct BrokenStore;

    #[async_trait::async_trait]
    impl CircuitStateStore for BrokenStore {
        async fn get_state(&self, _: &CircuitId) -> StoreResult<CircuitState> {
            Err(StoreError::Backend("down".into()))
        }
        async fn get_info(&self, _: &CircuitId) -> StoreResult<Option<CircuitInfo>> {
            Err(StoreError::Backend("down".into()))
        }
        async fn get_all_circuits(&self) -> StoreResult<BTreeMap<CircuitId, CircuitInfo>> {
            Err(StoreError::Backend("down".into()))
        }
        async fn locked_queues(&self, _: &CircuitId) -> StoreResult<Vec<String>> {
            Err(StoreError::Backend("down".into()))
        }
        async fn update_statistics(
            &self,
            _: &RulePattern,
            _: &str,
            _: u64,
            _: &crate::breaker::types::WindowSettings,
            _: QueueResponseType,
        ) -> StoreResult<UpdateStatisticsResult> {
            Err(StoreError::Backend("down".into()))
        }
        async fn lock_queue(&self, _: &str, _: &CircuitId, _: u64) -> StoreResult<bool> {
            Err(StoreError::Backend("down".into()))
        }
        async fn close_circuit(&self, _: &CircuitId) -> StoreResult<()> {
            Err(StoreError::Backend("down".into()))
        }
        async fn close_and_remove_circuit(&self, _: &CircuitId) -> StoreResult<()> {
            Err(StoreError::Backend("down".into()))
        }
        async fn close_all_circuits(&self) -> StoreResult<()> {
            Err(StoreError::Backend("down".into()))
        }
        async fn re_open_circuit(&self, _: &CircuitId) -> StoreResult<()> {
            Err(StoreError::Backend("down".into()))
        }
        async fn set_open_circuits_to_half_open(&self) -> StoreResult<u64> {
            Err(StoreError::Backend("down".into()))
        }
        async fn unlock_sample_queues(&self, _: u64) -> StoreResult<Vec<String>> {
            Err(StoreError::Backend("down".into()))
        }
        async fn pop_queue_to_unlock(&self) -> StoreResult<Option<String>> {
            Err(StoreError::Backend("down".into()))
        }
        async fn push_queue_to_unlock(&self, _: &str) -> StoreResult<()> {
            Err(StoreError::Backend("down".into()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_surfaced() {
        let breaker = QueueCircuitBreaker::new(
            Arc::new(BrokenStore),
            Arc::new(MemoryQueueLockGateway::new()),
            &[RuleConfig::new("/svc/.*")],
            breaker_config(),
            "owner",
        );
        let err = breaker
            .handle_queued_request("q", &req("/svc/a", "1"))
            .await
            .unwrap_err();
        assert!(matches!(err, BreakerError::Storage(StoreError::Backend(_))));

        // rule removal never fails even if the store does
        let removed = breaker.rules_changed(&[]).await;
        assert_eq!(removed.len(), 1);
    }
}
