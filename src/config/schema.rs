//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the breaker
//! daemon. All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the queue circuit breaker.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Identity of this gateway instance, used in lease tokens.
    /// A random id is generated at startup when absent.
    pub instance_id: Option<String>,

    /// Breaker thresholds and periodic task settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Routing rules; each rule pattern defines one circuit.
    pub rules: Vec<RuleConfig>,

    /// Queue lock gateway settings.
    pub queue_lock: QueueLockConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Breaker thresholds and periodic task settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Whether the queue processor must consult the breaker before execution.
    pub circuit_check_enabled: bool,

    /// Whether the queue processor reports outcomes to the breaker.
    pub statistics_update_enabled: bool,

    /// Fail ratio (percent) at which a circuit opens.
    pub error_threshold_percentage: u32,

    /// Outcome entries older than this are evicted from the window.
    pub entries_max_age_ms: u64,

    /// Minimum number of outcomes before a circuit may open.
    pub min_queue_sample_count: u64,

    /// Maximum number of outcomes kept in the window.
    pub max_queue_sample_count: u64,

    /// Open → Half-Open promotion task.
    pub open_to_half_open: TaskConfig,

    /// Unlock FIFO draining task.
    pub unlock_queues: TaskConfig,

    /// Half-open sample unlocking task.
    pub unlock_sample_queues: TaskConfig,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            circuit_check_enabled: false,
            statistics_update_enabled: false,
            error_threshold_percentage: 90,
            entries_max_age_ms: 86_400_000,
            min_queue_sample_count: 100,
            max_queue_sample_count: 5000,
            open_to_half_open: TaskConfig::new(false, 120_000),
            unlock_queues: TaskConfig::new(false, 10_000),
            unlock_sample_queues: TaskConfig::new(false, 120_000),
        }
    }
}

impl CircuitBreakerConfig {
    /// Window parameters handed to the state store on every statistics update.
    pub fn window_settings(&self) -> WindowSettings {
        WindowSettings {
            error_threshold_percentage: self.error_threshold_percentage,
            entries_max_age_ms: self.entries_max_age_ms,
            min_queue_sample_count: self.min_queue_sample_count,
            max_queue_sample_count: self.max_queue_sample_count,
        }
    }
}

/// Sliding window parameters for one statistics update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSettings {
    pub error_threshold_percentage: u32,
    pub entries_max_age_ms: u64,
    pub min_queue_sample_count: u64,
    pub max_queue_sample_count: u64,
}

/// Periodic task toggle and interval.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskConfig {
    /// Enable the task on this instance.
    pub enabled: bool,

    /// Tick interval in milliseconds.
    pub interval_ms: u64,
}

impl TaskConfig {
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        Self {
            enabled,
            interval_ms,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self::new(false, 10_000)
    }
}

/// Routing rule as far as the breaker is concerned.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RuleConfig {
    /// Regular expression matched against the whole request URI.
    pub url_pattern: String,

    /// Optional metric name; part of the circuit identity and used as gauge label.
    #[serde(default)]
    pub metric_name: Option<String>,

    /// Rule priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

impl RuleConfig {
    pub fn new(url_pattern: impl Into<String>) -> Self {
        Self {
            url_pattern: url_pattern.into(),
            metric_name: None,
            priority: 0,
        }
    }

    pub fn with_metric_name(mut self, metric_name: impl Into<String>) -> Self {
        self.metric_name = Some(metric_name.into());
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

/// Queue lock gateway backend.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueLockBackend {
    /// Locks kept in process (single node, tests).
    #[default]
    Memory,
    /// Locks managed by the queueing engine's HTTP API.
    Http,
}

/// Queue lock gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct QueueLockConfig {
    pub backend: QueueLockBackend,

    /// Base URL of the queueing engine (http backend only).
    pub base_url: String,

    /// Lock owner reported to the queueing engine.
    pub owner: String,

    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for QueueLockConfig {
    fn default() -> Self {
        Self {
            backend: QueueLockBackend::Memory,
            base_url: "http://localhost:7070/queuing".to_string(),
            owner: "queue_circuit_breaker".to_string(),
            timeout_ms: 5000,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: String,

    /// API key for authentication (Bearer token). Empty disables auth.
    pub api_key: String,

    /// Path under which the circuit resources are served.
    pub path_prefix: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:7013".to_string(),
            api_key: String::new(),
            path_prefix: "/queuecircuitbreaker/circuit".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Interval of the circuit gauge collection task in seconds.
    pub metrics_collection_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            metrics_collection_interval_secs: 60,
        }
    }
}
