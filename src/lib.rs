//! Distributed queue circuit breaker for a queueing gateway.

pub mod admin;
pub mod breaker;
pub mod config;
pub mod lease;
pub mod lifecycle;
pub mod observability;
pub mod queue_lock;
pub mod routing;
pub mod scheduler;
pub mod store;

pub use breaker::{Admission, CircuitState, QueueCircuitBreaker, QueueResponseType, QueuedRequest};
pub use config::schema::GatewayConfig;
pub use lifecycle::{CircuitBreakerService, Shutdown};
