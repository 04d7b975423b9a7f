//! Rule-to-circuit mapping with atomic snapshot replacement.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::RuleConfig;
use crate::routing::matcher::{CircuitId, RulePattern};

/// Immutable, priority-ordered list of compiled rule patterns.
pub type MappingSnapshot = Vec<Arc<RulePattern>>;

/// Maps request URIs to circuits.
///
/// A new mapping is always built completely before it is published, so
/// concurrent lookups see either the old or the new snapshot.
#[derive(Debug)]
pub struct RulePatternMapper {
    snapshot: ArcSwap<MappingSnapshot>,
}

impl RulePatternMapper {
    pub fn new(rules: &[RuleConfig]) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(build_snapshot(rules)),
        }
    }

    /// Replace the mapping and return the patterns whose circuits no longer exist.
    pub fn rules_changed(&self, rules: &[RuleConfig]) -> Vec<Arc<RulePattern>> {
        let next = Arc::new(build_snapshot(rules));
        let previous = self.snapshot.swap(Arc::clone(&next));

        let remaining: HashSet<&CircuitId> = next.iter().map(|p| p.circuit_id()).collect();
        let mut seen = HashSet::new();
        previous
            .iter()
            .filter(|p| !remaining.contains(p.circuit_id()))
            .filter(|p| seen.insert(p.circuit_id().clone()))
            .cloned()
            .collect()
    }

    /// Resolve the first rule pattern (in priority order) matching the URI.
    pub fn resolve(&self, uri: &str) -> Option<Arc<RulePattern>> {
        self.snapshot
            .load()
            .iter()
            .find(|p| p.matches(uri))
            .cloned()
    }

    /// The currently published mapping.
    pub fn snapshot(&self) -> Arc<MappingSnapshot> {
        self.snapshot.load_full()
    }
}

/// Compile rules sorted by priority (highest first, ties keep file order).
/// Rules whose pattern does not compile are skipped.
fn build_snapshot(rules: &[RuleConfig]) -> MappingSnapshot {
    let mut ordered: Vec<&RuleConfig> = rules.iter().collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

    ordered
        .into_iter()
        .filter_map(|rule| match RulePattern::compile(rule) {
            Ok(pattern) => Some(Arc::new(pattern)),
            Err(e) => {
                tracing::error!(
                    pattern = %rule.url_pattern,
                    error = %e,
                    "Skipping rule with invalid url pattern"
                );
                None
            }
        })
        .collect()
}
