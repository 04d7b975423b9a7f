//! Startup orchestration.
//!
//! # Responsibilities
//! - Build store, lease manager and queue lock gateway from configuration
//! - Create the breaker engine and start its periodic tasks
//! - Start the metrics collector and admin API when enabled
//! - Apply hot-reloaded configuration
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Rule changes purge removed circuits; breaker setting changes
//!   restart the periodic tasks
//! - Listener and backend settings only take effect on restart

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::admin::{setup_admin_router, AdminState};
use crate::breaker::QueueCircuitBreaker;
use crate::config::schema::{AdminConfig, GatewayConfig, QueueLockBackend};
use crate::lease::{LeaseManager, MemoryLeaseManager};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::CircuitMetricsCollector;
use crate::queue_lock::{
    HttpQueueLockGateway, MemoryQueueLockGateway, QueueLockError, QueueLockGateway,
};
use crate::routing::matcher::CircuitId;
use crate::scheduler::PeriodicTaskScheduler;
use crate::store::{CircuitStateStore, MemoryCircuitStore};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid queue lock configuration: {0}")]
    QueueLock(#[from] QueueLockError),

    #[error("Failed to bind admin API on {address}: {source}")]
    AdminBind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// A running breaker with its periodic tasks.
pub struct CircuitBreakerService {
    breaker: Arc<QueueCircuitBreaker>,
    scheduler: Arc<PeriodicTaskScheduler>,
    instance_id: String,
    shutdown: Shutdown,
    config: Mutex<GatewayConfig>,
}

impl CircuitBreakerService {
    /// Start with the backends named in the configuration.
    pub async fn start(config: GatewayConfig, shutdown: Shutdown) -> Result<Self, StartupError> {
        let gateway: Arc<dyn QueueLockGateway> = match config.queue_lock.backend {
            QueueLockBackend::Memory => Arc::new(MemoryQueueLockGateway::new()),
            QueueLockBackend::Http => Arc::new(HttpQueueLockGateway::from_config(&config.queue_lock)?),
        };
        Ok(Self::with_components(
            config,
            Arc::new(MemoryCircuitStore::new()),
            gateway,
            Arc::new(MemoryLeaseManager::new()),
            shutdown,
        )
        .await)
    }

    /// Start with explicit backends.
    pub async fn with_components(
        config: GatewayConfig,
        store: Arc<dyn CircuitStateStore>,
        gateway: Arc<dyn QueueLockGateway>,
        leases: Arc<dyn LeaseManager>,
        shutdown: Shutdown,
    ) -> Self {
        let instance_id = config
            .instance_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let breaker = Arc::new(QueueCircuitBreaker::new(
            store,
            gateway,
            &config.rules,
            config.circuit_breaker.clone(),
            config.queue_lock.owner.clone(),
        ));

        let scheduler = Arc::new(PeriodicTaskScheduler::new(
            Arc::clone(&breaker),
            Arc::clone(&leases),
            instance_id.clone(),
            shutdown.clone(),
        ));
        scheduler.reconfigure(&config.circuit_breaker).await;

        if config.observability.metrics_enabled {
            let collector = CircuitMetricsCollector::new(
                Arc::clone(&breaker),
                leases,
                instance_id.clone(),
                Duration::from_secs(config.observability.metrics_collection_interval_secs),
            );
            tokio::spawn(collector.run(shutdown.subscribe()));
        }

        tracing::info!(
            instance_id = %instance_id,
            rules = config.rules.len(),
            circuit_check_enabled = config.circuit_breaker.circuit_check_enabled,
            statistics_update_enabled = config.circuit_breaker.statistics_update_enabled,
            "Queue circuit breaker started"
        );

        Self {
            breaker,
            scheduler,
            instance_id,
            shutdown,
            config: Mutex::new(config),
        }
    }

    pub fn breaker(&self) -> &Arc<QueueCircuitBreaker> {
        &self.breaker
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Apply a validated configuration. Returns the ids of circuits removed
    /// because their rule disappeared.
    pub async fn apply_config(&self, new: GatewayConfig) -> Vec<CircuitId> {
        let mut current = self.config.lock().await;

        let removed = if current.rules != new.rules {
            let removed = self.breaker.rules_changed(&new.rules).await;
            tracing::info!(
                rules = new.rules.len(),
                removed = removed.len(),
                "Routing rules updated"
            );
            removed
        } else {
            Vec::new()
        };

        if current.circuit_breaker != new.circuit_breaker {
            self.breaker.update_config(new.circuit_breaker.clone());
            self.scheduler.reconfigure(&new.circuit_breaker).await;
            tracing::info!("Circuit breaker configuration updated, periodic tasks restarted");
        }

        if current.queue_lock != new.queue_lock
            || current.admin != new.admin
            || current.observability != new.observability
            || current.instance_id != new.instance_id
        {
            tracing::warn!("Changes outside rules and circuit_breaker take effect after restart");
        }

        *current = new;
        removed
    }

    /// Bind the admin API and serve it until shutdown.
    pub async fn start_admin_server(&self, admin: &AdminConfig) -> Result<SocketAddr, StartupError> {
        let listener = TcpListener::bind(&admin.bind_address)
            .await
            .map_err(|source| StartupError::AdminBind {
                address: admin.bind_address.clone(),
                source,
            })?;
        let address = listener.local_addr().map_err(|source| StartupError::AdminBind {
            address: admin.bind_address.clone(),
            source,
        })?;

        let router = setup_admin_router(
            AdminState::new(Arc::clone(&self.breaker), &admin.api_key),
            &admin.path_prefix,
        );
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.wait().await })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin API server failed");
            }
        });

        tracing::info!(address = %address, prefix = %admin.path_prefix, "Admin API listening");
        Ok(address)
    }

    /// Stop the periodic tasks.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
        tracing::info!("Queue circuit breaker stopped");
    }
}
