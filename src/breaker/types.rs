//! Breaker domain types.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

pub use crate::config::schema::WindowSettings;

/// Header carrying the caller-supplied idempotency key of a queued request.
pub const UNIQUE_ID_HEADER: &str = "x-rp-unique_id";

/// Breaker state of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Traffic flows.
    #[default]
    Closed,
    /// Probe traffic only.
    HalfOpen,
    /// Traffic blocked, queues locked.
    Open,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::HalfOpen => "half_open",
            CircuitState::Open => "open",
        }
    }

    /// Value published on the status gauge.
    pub fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no circuit state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown circuit state '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for CircuitState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "closed" => Ok(CircuitState::Closed),
            "half_open" => Ok(CircuitState::HalfOpen),
            "open" => Ok(CircuitState::Open),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Outcome of executing a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueResponseType {
    Success,
    Failure,
}

/// Result of one statistics update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatisticsResult {
    NoChange,
    /// The update moved the circuit to OPEN.
    Opened,
}

/// Snapshot of a circuit as stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CircuitInfo {
    pub state: CircuitState,
    /// Failure percentage of the live window, rounded down.
    pub fail_ratio: u32,
    pub pattern: Option<String>,
    pub metric_name: Option<String>,
}

/// The parts of a queued request the breaker looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRequest {
    pub uri: String,
    pub unique_id: Option<String>,
}

impl QueuedRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            unique_id: None,
        }
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    /// Build from the URI and headers of a queued request.
    pub fn from_headers(uri: impl Into<String>, headers: &HeaderMap) -> Self {
        let unique_id = headers
            .get(UNIQUE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Self {
            uri: uri.into(),
            unique_id,
        }
    }

    /// Key under which the outcome of this request is recorded.
    ///
    /// Requests without a unique id fall back to their URI, so distinct
    /// requests to the same URI count as one sample.
    pub fn request_id(&self) -> &str {
        match &self.unique_id {
            Some(id) => id,
            None => {
                tracing::info!(
                    uri = %self.uri,
                    header = UNIQUE_ID_HEADER,
                    "No unique id on queued request, using uri instead"
                );
                &self.uri
            }
        }
    }
}

/// Milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_state_strings() {
        for state in [CircuitState::Closed, CircuitState::HalfOpen, CircuitState::Open] {
            assert_eq!(state.as_str().parse::<CircuitState>().unwrap(), state);
        }
        assert_eq!("OPEN".parse::<CircuitState>().unwrap(), CircuitState::Open);
        assert!("ajar".parse::<CircuitState>().is_err());
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"half_open\""
        );
    }

    #[test]
    fn test_gauge_values() {
        assert_eq!(CircuitState::Closed.gauge_value(), 0.0);
        assert_eq!(CircuitState::HalfOpen.gauge_value(), 1.0);
        assert_eq!(CircuitState::Open.gauge_value(), 2.0);
    }

    #[test]
    fn test_request_id_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(UNIQUE_ID_HEADER, HeaderValue::from_static("abc-123"));
        let req = QueuedRequest::from_headers("/a/b", &headers);
        assert_eq!(req.request_id(), "abc-123");
    }

    #[test]
    fn test_request_id_falls_back_to_uri() {
        let req = QueuedRequest::from_headers("/a/b", &HeaderMap::new());
        assert_eq!(req.unique_id, None);
        assert_eq!(req.request_id(), "/a/b");

        let mut headers = HeaderMap::new();
        headers.insert(UNIQUE_ID_HEADER, HeaderValue::from_static("  "));
        let req = QueuedRequest::from_headers("/a/c", &headers);
        assert_eq!(req.request_id(), "/a/c");
    }
}
