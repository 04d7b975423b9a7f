//! Metrics collection and exposition.
//!
//! # Metrics
//! - `queue_circuit_breaker_opened_total` (counter): circuits opened, by metric name
//! - `queue_circuit_breaker_queue_locks_total` (counter): queue lock requests
//! - `queue_circuit_breaker_queue_unlocks_total` (counter): unlocks by result
//! - `queue_circuit_breaker_task_runs_total` (counter): periodic ticks by task, outcome
//! - `queue_circuit_breaker_status` (gauge): 0=closed, 1=half_open, 2=open
//! - `queue_circuit_breaker_fail_ratio` (gauge): fail ratio in percent
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Gauges are only published for circuits that carry a metric name

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::breaker::types::CircuitState;

/// Install the Prometheus recorder and its HTTP listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_circuit_opened(metric_name: Option<&str>) {
    let label = metric_name.unwrap_or("unnamed").to_string();
    metrics::counter!("queue_circuit_breaker_opened_total", "metric_name" => label).increment(1);
}

pub fn record_queue_lock() {
    metrics::counter!("queue_circuit_breaker_queue_locks_total").increment(1);
}

pub fn record_queue_unlock(success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("queue_circuit_breaker_queue_unlocks_total", "result" => result)
        .increment(1);
}

pub fn record_task_run(task: &'static str, outcome: &'static str) {
    metrics::counter!(
        "queue_circuit_breaker_task_runs_total",
        "task" => task,
        "outcome" => outcome
    )
    .increment(1);
}

/// Publish the status and fail ratio gauges of one circuit.
pub fn record_circuit_gauges(metric_name: &str, state: CircuitState, fail_ratio: u32) {
    let label = metric_name.to_string();
    metrics::gauge!("queue_circuit_breaker_status", "metric_name" => label.clone())
        .set(state.gauge_value());
    metrics::gauge!("queue_circuit_breaker_fail_ratio", "metric_name" => label)
        .set(f64::from(fail_ratio));
}
