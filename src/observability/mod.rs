//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters on transitions, locks, unlocks, ticks)
//!
//! collector.rs (lease-guarded, one instance per interval):
//!     → get_all_circuits
//!     → status / fail ratio gauges per named circuit
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments behind the facade)
//! - Circuit gauges come from the shared store, so any instance may publish

pub mod collector;
pub mod logging;
pub mod metrics;

pub use collector::CircuitMetricsCollector;
