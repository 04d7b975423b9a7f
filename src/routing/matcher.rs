//! Rule pattern matching and circuit identity.
//!
//! # Responsibilities
//! - Compile a rule's URL pattern into an anchored regex
//! - Derive the stable circuit id from pattern and metric name
//! - Match request URIs against the compiled pattern
//!
//! # Design Decisions
//! - Patterns match the whole URI, not a substring
//! - The circuit id is a SHA-256 hex digest so it is stable across
//!   instances and restarts and safe to use in URLs and store keys
//! - Pattern and metric name are length-prefixed in the digest input, so
//!   no two distinct rules share an id

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::schema::RuleConfig;

/// Stable identifier of a circuit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircuitId(String);

impl CircuitId {
    /// Derive the id of the circuit defined by a rule pattern and optional metric name.
    pub fn from_pattern(pattern: &str, metric_name: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((pattern.len() as u64).to_be_bytes());
        hasher.update(pattern.as_bytes());
        match metric_name {
            None => hasher.update([0u8]),
            Some(metric) => {
                hasher.update([1u8]);
                hasher.update((metric.len() as u64).to_be_bytes());
                hasher.update(metric.as_bytes());
            }
        }
        let digest = hasher.finalize();
        let hex = digest
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CircuitId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CircuitId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A compiled rule pattern together with the circuit it defines.
#[derive(Debug, Clone)]
pub struct RulePattern {
    regex: Regex,
    pattern: String,
    metric_name: Option<String>,
    circuit_id: CircuitId,
}

impl RulePattern {
    /// Compile a routing rule.
    pub fn compile(rule: &RuleConfig) -> Result<Self, regex::Error> {
        let pattern = rule.url_pattern.as_str();
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            regex,
            pattern: pattern.to_string(),
            metric_name: rule.metric_name.clone(),
            circuit_id: CircuitId::from_pattern(pattern, rule.metric_name.as_deref()),
        })
    }

    /// Returns true if the whole URI matches this pattern.
    pub fn matches(&self, uri: &str) -> bool {
        self.regex.is_match(uri)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn metric_name(&self) -> Option<&str> {
        self.metric_name.as_deref()
    }

    pub fn circuit_id(&self) -> &CircuitId {
        &self.circuit_id
    }
}

impl PartialEq for RulePattern {
    fn eq(&self, other: &Self) -> bool {
        self.circuit_id == other.circuit_id
    }
}

impl Eq for RulePattern {}
