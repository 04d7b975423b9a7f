//! Periodic maintenance subsystem.
//!
//! # Data Flow
//! ```text
//! interval tick (per task, per instance)
//!     → LeaseManager::try_acquire(task lease, TTL = interval / 2)
//!         → held elsewhere: skip tick
//!         → acquired: run task body
//!             → OpenToHalfOpen:     set_open_circuits_to_half_open
//!             → UnlockQueues:       unlock_next_queue (one per tick)
//!             → UnlockSampleQueues: unlock_sample_queues (one per circuit)
//!         → body failed: release lease so another instance retries
//!         → body succeeded: lease expires on its own
//! ```
//!
//! # Design Decisions
//! - No leader election; leases alone keep instances from repeating work
//! - One unlock per tick throttles recovery of a struggling backend
//! - Configuration changes abort and respawn every task

pub mod tasks;

pub use tasks::{MaintenanceTask, PeriodicTaskScheduler, TickOutcome};
