//! Periodic circuit gauge collection.
//!
//! One instance per interval publishes the status and fail ratio of every
//! circuit with a metric name. The collection lease is released after every
//! run, successful or not.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::breaker::error::BreakerResult;
use crate::breaker::types::now_millis;
use crate::breaker::QueueCircuitBreaker;
use crate::lease::{lease_token, LeaseManager};
use crate::observability::metrics;

pub const COLLECT_METRICS_LEASE: &str = "collect_circuit_breaker_metrics";

pub struct CircuitMetricsCollector {
    breaker: Arc<QueueCircuitBreaker>,
    leases: Arc<dyn LeaseManager>,
    instance_id: String,
    interval: Duration,
}

impl CircuitMetricsCollector {
    pub fn new(
        breaker: Arc<QueueCircuitBreaker>,
        leases: Arc<dyn LeaseManager>,
        instance_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            breaker,
            leases,
            instance_id: instance_id.into(),
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Circuit metrics collector starting");
        let mut ticker = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.collect_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Circuit metrics collector received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Collect once if the lease is free. Returns the number of circuits published,
    /// `None` if another instance holds the lease.
    pub async fn collect_once(&self) -> Option<usize> {
        let token = lease_token(&self.instance_id, now_millis(), COLLECT_METRICS_LEASE);
        match self
            .leases
            .try_acquire(COLLECT_METRICS_LEASE, &token, self.interval)
            .await
        {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to acquire metrics collection lease");
                return None;
            }
        }

        let published = match self.publish().await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "Failed to collect circuit metrics");
                0
            }
        };

        if let Err(e) = self.leases.release(COLLECT_METRICS_LEASE, &token).await {
            tracing::warn!(error = %e, "Failed to release metrics collection lease");
        }
        Some(published)
    }

    async fn publish(&self) -> BreakerResult<usize> {
        let circuits = self.breaker.get_all_circuits().await?;
        let mut published = 0;
        for info in circuits.values() {
            if let Some(metric_name) = info.metric_name.as_deref() {
                metrics::record_circuit_gauges(metric_name, info.state, info.fail_ratio);
                published += 1;
            }
        }
        tracing::debug!(published, "Circuit metrics collected");
        Ok(published)
    }
}
