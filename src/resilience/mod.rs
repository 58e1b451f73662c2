//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Trigger activation fails:
//!     → reactivation.rs (on_failure: arm state, compute fire_at)
//!     → backoff.rs (next delay = clamp(2 × current, initial, max))
//!     → caller sleeps until fire_at, re-checks is_current, retries
//!
//! Trigger activation succeeds:
//!     → reactivation.rs (on_success: state cleared, next failure starts over)
//! ```
//!
//! # Design Decisions
//! - Backoff is deterministic (no jitter): one retry per workflow, not a herd
//! - Per-workflow state, sharded locking; unrelated workflows never contend
//! - The scheduler computes; callers decide where retries execute

pub mod backoff;
pub mod reactivation;

pub use backoff::BackoffPolicy;
pub use reactivation::{ReactivationScheduler, ReactivationState, ReactivationTicket};
