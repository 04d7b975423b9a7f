//! Queue circuit breaker subsystem.
//!
//! # Data Flow
//! ```text
//! Queued request (queue name, uri, unique id)
//!     → processor.rs admit()
//!     → engine.rs handle_queued_request()
//!         → RulePatternMapper::resolve (uri → circuit)
//!         → CircuitStateStore::get_state
//!         → OPEN: lock queue (store + QueueLockGateway), block
//!     → request executes
//!     → processor.rs complete()
//!         → engine.rs update_statistics() → store (may open circuit)
//!         → HALF_OPEN probe: close on success, re-open on failure
//! ```
//!
//! # Design Decisions
//! - State lives only in the shared store; engines are stateless apart
//!   from the rule snapshot and their configuration
//! - Request path failures degrade to unprotected execution (fail-open)
//! - Only the periodic tasks release queues; the request path never retries

pub mod engine;
pub mod error;
pub mod processor;
pub mod types;

pub use engine::QueueCircuitBreaker;
pub use error::{BreakerError, BreakerResult};
pub use processor::Admission;
pub use types::{
    CircuitInfo, CircuitState, QueueResponseType, QueuedRequest, UpdateStatisticsResult,
    WindowSettings, UNIQUE_ID_HEADER,
};
