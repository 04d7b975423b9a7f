//! Lease-guarded periodic maintenance.
//!
//! # Responsibilities
//! - Run the three sweeps on their configured intervals
//! - Guard every tick with a named lease so one instance acts per interval
//! - Cancel and respawn the sweeps when the breaker configuration changes

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::breaker::error::BreakerResult;
use crate::breaker::types::now_millis;
use crate::breaker::QueueCircuitBreaker;
use crate::config::schema::{CircuitBreakerConfig, TaskConfig};
use crate::lease::{lease_token, lease_ttl, LeaseManager};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;

/// One of the periodic maintenance sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceTask {
    /// OPEN → HALF_OPEN promotion.
    OpenToHalfOpen,
    /// Release one queue from the unlock FIFO.
    UnlockQueues,
    /// Release one sample queue per HALF_OPEN circuit.
    UnlockSampleQueues,
}

impl MaintenanceTask {
    pub const ALL: [MaintenanceTask; 3] = [
        MaintenanceTask::OpenToHalfOpen,
        MaintenanceTask::UnlockQueues,
        MaintenanceTask::UnlockSampleQueues,
    ];

    /// Name of the lease guarding this task; also used as metric label.
    pub fn lease_name(&self) -> &'static str {
        match self {
            MaintenanceTask::OpenToHalfOpen => "open_to_half_open",
            MaintenanceTask::UnlockQueues => "unlock_queues",
            MaintenanceTask::UnlockSampleQueues => "unlock_sample_queues",
        }
    }

    pub fn settings<'a>(&self, config: &'a CircuitBreakerConfig) -> &'a TaskConfig {
        match self {
            MaintenanceTask::OpenToHalfOpen => &config.open_to_half_open,
            MaintenanceTask::UnlockQueues => &config.unlock_queues,
            MaintenanceTask::UnlockSampleQueues => &config.unlock_sample_queues,
        }
    }
}

/// What happened on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another holder owns the lease.
    Skipped,
    Completed,
    /// The task failed; its lease was released.
    Failed,
}

impl TickOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            TickOutcome::Skipped => "skipped",
            TickOutcome::Completed => "completed",
            TickOutcome::Failed => "failed",
        }
    }
}

pub struct PeriodicTaskScheduler {
    breaker: Arc<QueueCircuitBreaker>,
    leases: Arc<dyn LeaseManager>,
    instance_id: String,
    shutdown: Shutdown,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PeriodicTaskScheduler {
    pub fn new(
        breaker: Arc<QueueCircuitBreaker>,
        leases: Arc<dyn LeaseManager>,
        instance_id: impl Into<String>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            breaker,
            leases,
            instance_id: instance_id.into(),
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Cancel the running sweeps and start the enabled ones of `config`.
    pub async fn reconfigure(self: &Arc<Self>, config: &CircuitBreakerConfig) {
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }

        for task in MaintenanceTask::ALL {
            let settings = task.settings(config);
            if !settings.enabled {
                tracing::info!(task = task.lease_name(), "Periodic task disabled");
                continue;
            }
            let interval = settings.interval();
            tracing::info!(
                task = task.lease_name(),
                interval_ms = settings.interval_ms,
                "Periodic task starting"
            );
            let this = Arc::clone(self);
            let shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                this.run_loop(task, interval, shutdown).await
            }));
        }
    }

    /// Cancel all sweeps.
    pub async fn stop(&self) {
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
    }

    /// Number of sweeps currently scheduled.
    pub async fn active_tasks(&self) -> usize {
        self.handles
            .lock()
            .await
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    async fn run_loop(
        &self,
        task: MaintenanceTask,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once(task, interval).await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!(task = task.lease_name(), "Periodic task received shutdown signal");
                    break;
                }
            }
        }
    }

    /// Run a single lease-guarded tick of `task`.
    pub async fn run_once(&self, task: MaintenanceTask, interval: Duration) -> TickOutcome {
        let name = task.lease_name();
        let token = lease_token(&self.instance_id, now_millis(), name);

        let outcome = match self.leases.try_acquire(name, &token, lease_ttl(interval)).await {
            Ok(true) => match self.run_task(task).await {
                Ok(()) => TickOutcome::Completed,
                Err(e) => {
                    tracing::error!(task = name, error = %e, "Periodic task failed");
                    if let Err(e) = self.leases.release(name, &token).await {
                        tracing::warn!(task = name, error = %e, "Failed to release lease");
                    }
                    TickOutcome::Failed
                }
            },
            Ok(false) => TickOutcome::Skipped,
            Err(e) => {
                tracing::warn!(task = name, error = %e, "Failed to acquire lease");
                TickOutcome::Skipped
            }
        };
        metrics::record_task_run(name, outcome.as_str());
        outcome
    }

    async fn run_task(&self, task: MaintenanceTask) -> BreakerResult<()> {
        match task {
            MaintenanceTask::OpenToHalfOpen => {
                let count = self.breaker.set_open_circuits_to_half_open().await?;
                if count > 0 {
                    tracing::info!(count, "Circuits changed from open to half-open");
                } else {
                    tracing::debug!("No open circuits to change to half-open");
                }
            }
            MaintenanceTask::UnlockQueues => {
                if let Some(queue) = self.breaker.unlock_next_queue().await? {
                    tracing::debug!(queue = %queue, "Unlocked queue from unlock list");
                }
            }
            MaintenanceTask::UnlockSampleQueues => {
                let queues = self.breaker.unlock_sample_queues().await?;
                if queues.is_empty() {
                    tracing::debug!("No sample queues to unlock");
                } else {
                    tracing::info!(count = queues.len(), queues = ?queues, "Unlocked sample queues");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::breaker::types::{CircuitState, QueueResponseType, QueuedRequest};
    use crate::config::schema::RuleConfig;
    use crate::lease::MemoryLeaseManager;
    use crate::queue_lock::{
        MemoryQueueLockGateway, QueueLockError, QueueLockGateway, QueueLockResult,
    };
    use crate::routing::matcher::CircuitId;
    use crate::store::MemoryCircuitStore;

    struct RejectingGateway;

    #[async_trait]
    impl QueueLockGateway for RejectingGateway {
        async fn acquire_lock(&self, _: &str, _: &str) -> QueueLockResult<()> {
            Ok(())
        }
        async fn release_lock(&self, queue: &str) -> QueueLockResult<()> {
            Err(QueueLockError::Rejected {
                queue: queue.to_string(),
                status: 503,
            })
        }
    }

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            error_threshold_percentage: 50,
            min_queue_sample_count: 2,
            ..CircuitBreakerConfig::default()
        }
    }

    fn breaker_with(gateway: Arc<dyn QueueLockGateway>, store: &MemoryCircuitStore) -> Arc<QueueCircuitBreaker> {
        Arc::new(QueueCircuitBreaker::new(
            Arc::new(store.clone()),
            gateway,
            &[RuleConfig::new("/svc/.*")],
            config(),
            "owner",
        ))
    }

    async fn open_circuit(breaker: &QueueCircuitBreaker, queues: &[&str]) {
        for (i, queue) in queues.iter().enumerate() {
            for n in 0..2 {
                breaker
                    .update_statistics(
                        queue,
                        &QueuedRequest::new("/svc/a").with_unique_id(format!("{}-{}", i, n)),
                        QueueResponseType::Failure,
                    )
                    .await
                    .unwrap();
            }
            breaker
                .lock_queue(queue, &QueuedRequest::new("/svc/a"))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_second_instance_skips_tick() {
        let store = MemoryCircuitStore::new();
        let leases = Arc::new(MemoryLeaseManager::new());
        let shutdown = Shutdown::new();
        let gateway = Arc::new(MemoryQueueLockGateway::new());

        let a = PeriodicTaskScheduler::new(breaker_with(gateway.clone(), &store), leases.clone(), "gw-a", shutdown.clone());
        let b = PeriodicTaskScheduler::new(breaker_with(gateway, &store), leases.clone(), "gw-b", shutdown);

        let interval = Duration::from_secs(60);
        assert_eq!(
            a.run_once(MaintenanceTask::OpenToHalfOpen, interval).await,
            TickOutcome::Completed
        );
        assert_eq!(
            b.run_once(MaintenanceTask::OpenToHalfOpen, interval).await,
            TickOutcome::Skipped
        );
        // successful runs keep the lease until it expires
        let holder = leases.holder("open_to_half_open").unwrap();
        assert!(holder.starts_with("gw-a_"));
        assert!(holder.ends_with("_open_to_half_open"));

        // other tasks have their own lease
        assert_eq!(
            b.run_once(MaintenanceTask::UnlockQueues, interval).await,
            TickOutcome::Completed
        );
    }

    #[tokio::test]
    async fn test_failed_task_releases_lease() {
        let store = MemoryCircuitStore::new();
        let leases = Arc::new(MemoryLeaseManager::new());
        let breaker = breaker_with(Arc::new(RejectingGateway), &store);
        open_circuit(&breaker, &["q1"]).await;
        breaker.close_circuit_by_id(&CircuitId::from_pattern("/svc/.*", None)).await.unwrap();

        let scheduler = PeriodicTaskScheduler::new(breaker, leases.clone(), "gw-a", Shutdown::new());
        assert_eq!(
            scheduler
                .run_once(MaintenanceTask::UnlockQueues, Duration::from_secs(60))
                .await,
            TickOutcome::Failed
        );
        assert_eq!(leases.holder("unlock_queues"), None);
        // the queue stays scheduled for the next tick
        assert_eq!(store.pending_unlocks().await, 1);
    }

    #[tokio::test]
    async fn test_half_open_sampling_tick() {
        let store = MemoryCircuitStore::new();
        let gateway = Arc::new(MemoryQueueLockGateway::new());
        let breaker = breaker_with(gateway.clone(), &store);
        open_circuit(&breaker, &["q1", "q2"]).await;
        assert_eq!(gateway.locked_queues().len(), 2);

        let scheduler = PeriodicTaskScheduler::new(
            Arc::clone(&breaker),
            Arc::new(MemoryLeaseManager::new()),
            "gw-a",
            Shutdown::new(),
        );
        let interval = Duration::from_secs(60);
        scheduler.run_once(MaintenanceTask::OpenToHalfOpen, interval).await;
        let id = CircuitId::from_pattern("/svc/.*", None);
        assert_eq!(breaker.get_circuit_state(&id).await.unwrap(), CircuitState::HalfOpen);

        scheduler.run_once(MaintenanceTask::UnlockSampleQueues, interval).await;
        assert_eq!(gateway.locked_queues().len(), 1);
    }

    #[tokio::test]
    async fn test_reconfigure_runs_enabled_tasks() {
        let store = MemoryCircuitStore::new();
        let gateway = Arc::new(MemoryQueueLockGateway::new());
        let breaker = breaker_with(gateway.clone(), &store);
        open_circuit(&breaker, &["q1", "q2"]).await;
        breaker.close_all_circuits().await.unwrap();
        assert_eq!(gateway.locked_queues().len(), 2);

        let shutdown = Shutdown::new();
        let scheduler = Arc::new(PeriodicTaskScheduler::new(
            breaker,
            Arc::new(MemoryLeaseManager::new()),
            "gw-a",
            shutdown.clone(),
        ));

        let mut cfg = config();
        cfg.unlock_queues = TaskConfig::new(true, 10);
        scheduler.reconfigure(&cfg).await;
        assert_eq!(scheduler.active_tasks().await, 1);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !gateway.locked_queues().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("queues were not unlocked");

        cfg.unlock_queues.enabled = false;
        scheduler.reconfigure(&cfg).await;
        assert_eq!(scheduler.active_tasks().await, 0);

        cfg.open_to_half_open.enabled = true;
        scheduler.reconfigure(&cfg).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), async {
            while scheduler.active_tasks().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("tasks did not stop on shutdown");
    }
}
