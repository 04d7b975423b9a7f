//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (threshold in percent, intervals > 0)
//! - Check that every rule pattern compiles
//! - Check the queue lock backend has a usable base URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{GatewayConfig, QueueLockBackend, TaskConfig};
use crate::routing::matcher::RulePattern;

/// A single semantic problem found in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("error_threshold_percentage must be within 0..=100, got {0}")]
    ThresholdOutOfRange(u32),

    #[error("max_queue_sample_count must be greater than 0")]
    ZeroMaxSamples,

    #[error("min_queue_sample_count ({min}) exceeds max_queue_sample_count ({max})")]
    MinExceedsMax { min: u64, max: u64 },

    #[error("entries_max_age_ms must be greater than 0")]
    ZeroMaxAge,

    #[error("interval_ms of task '{0}' must be greater than 0")]
    ZeroInterval(&'static str),

    #[error("rule pattern '{pattern}' is invalid: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("queue_lock.base_url '{0}' is not a valid URL")]
    InvalidLockUrl(String),

    #[error("observability.metrics_collection_interval_secs must be greater than 0")]
    ZeroMetricsInterval,
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let breaker = &config.circuit_breaker;

    if breaker.error_threshold_percentage > 100 {
        errors.push(ValidationError::ThresholdOutOfRange(
            breaker.error_threshold_percentage,
        ));
    }
    if breaker.max_queue_sample_count == 0 {
        errors.push(ValidationError::ZeroMaxSamples);
    } else if breaker.min_queue_sample_count > breaker.max_queue_sample_count {
        errors.push(ValidationError::MinExceedsMax {
            min: breaker.min_queue_sample_count,
            max: breaker.max_queue_sample_count,
        });
    }
    if breaker.entries_max_age_ms == 0 {
        errors.push(ValidationError::ZeroMaxAge);
    }

    let tasks: [(&'static str, &TaskConfig); 3] = [
        ("open_to_half_open", &breaker.open_to_half_open),
        ("unlock_queues", &breaker.unlock_queues),
        ("unlock_sample_queues", &breaker.unlock_sample_queues),
    ];
    for (name, task) in tasks {
        if task.interval_ms == 0 {
            errors.push(ValidationError::ZeroInterval(name));
        }
    }

    for rule in &config.rules {
        if let Err(e) = RulePattern::compile(rule) {
            errors.push(ValidationError::InvalidPattern {
                pattern: rule.url_pattern.clone(),
                reason: e.to_string(),
            });
        }
    }

    if config.queue_lock.backend == QueueLockBackend::Http
        && url::Url::parse(&config.queue_lock.base_url).is_err()
    {
        errors.push(ValidationError::InvalidLockUrl(
            config.queue_lock.base_url.clone(),
        ));
    }

    if config.observability.metrics_collection_interval_secs == 0 {
        errors.push(ValidationError::ZeroMetricsInterval);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RuleConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker.error_threshold_percentage = 101;
        config.circuit_breaker.min_queue_sample_count = 10;
        config.circuit_breaker.max_queue_sample_count = 5;
        config.circuit_breaker.unlock_queues.interval_ms = 0;
        config.rules.push(RuleConfig::new("/broken/(unclosed"));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ThresholdOutOfRange(101)));
        assert!(errors.contains(&ValidationError::MinExceedsMax { min: 10, max: 5 }));
        assert!(errors.contains(&ValidationError::ZeroInterval("unlock_queues")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidPattern { .. })));
    }

    #[test]
    fn test_http_backend_requires_url() {
        let mut config = GatewayConfig::default();
        config.queue_lock.backend = QueueLockBackend::Http;
        config.queue_lock.base_url = "not a url".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidLockUrl("not a url".to_string())]
        );
    }

    #[test]
    fn test_zero_max_samples() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker.max_queue_sample_count = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::ZeroMaxSamples]);
    }
}
