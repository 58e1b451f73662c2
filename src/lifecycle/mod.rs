//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Components → registry.rs (register teardown handler at a priority)
//!
//! Shutdown (shutdown.rs):
//!     Signal received (signals.rs) or explicit call
//!     → ShutdownCoordinator::initiate(deadline)
//!     → registry frozen and drained
//!     → bands run highest priority first, handlers of one band concurrently
//!     → ShutdownReport { Completed | TimedOut(unfinished) }
//! ```
//!
//! # Design Decisions
//! - Bands are named (RunsFirst / Default / RunsLast) with a numeric escape hatch
//! - Per-handler and total deadlines; a hanging handler is abandoned, never awaited
//! - Handler failures are recorded, never propagated; shutdown always makes progress
//! - No lock is held while a handler runs

pub mod priority;
pub mod registry;
pub mod shutdown;
pub mod signals;

pub use priority::ShutdownPriority;
pub use registry::{GroupSummary, HandlerHandle, ShutdownRegistry};
pub use shutdown::{
    GroupReport, HandlerOutcome, HandlerReport, ShutdownCoordinator, ShutdownOutcome,
    ShutdownPhase, ShutdownReport, ShutdownState, UnfinishedGroup,
};
