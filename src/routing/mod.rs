//! Routing subsystem: which circuit protects a request.
//!
//! # Data Flow
//! ```text
//! Queued request URI
//!     → router.rs (snapshot lookup)
//!     → matcher.rs (anchored regex per rule)
//!     → Return: matched RulePattern (with CircuitId) or None
//!
//! Mapping compilation (startup and every rule change):
//!     RuleConfig[]
//!     → Sort by priority
//!     → Compile patterns, derive circuit ids
//!     → Swap in as new immutable snapshot
//!     → Diff against previous snapshot → removed circuits
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; replacement is a single atomic pointer swap
//! - Deterministic: same input always matches same rule
//! - First match wins (ordered by priority)

pub mod matcher;
pub mod router;

pub use matcher::{CircuitId, RulePattern};
pub use router::RulePatternMapper;
