//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build backends → Breaker engine
//!     → Periodic tasks → Metrics collector → Admin API
//!
//! Reload (startup.rs):
//!     Validated config → diff rules (purge removed circuits)
//!     → diff breaker settings (restart periodic tasks)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → tasks and admin server exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - An invalid reload never reaches the service

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{CircuitBreakerService, StartupError};
