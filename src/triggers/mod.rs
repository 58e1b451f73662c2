//! Trigger activation subsystem.
//!
//! # Data Flow
//! ```text
//! activate(workflow)
//!     → entitlements.rs (active trigger quota)
//!     → TriggerSource::activate
//!         ok   → scheduler.on_success, workflow marked active
//!         fail → scheduler.on_failure → retry task sleeps until fire_at
//!                → is_current? → TriggerSource::activate again
//!
//! deactivate(workflow) → scheduler.cancel + retry task aborted
//! ```
//!
//! # Design Decisions
//! - At most one retry task per workflow; a newer one aborts the older
//! - A retry always re-checks the scheduler before acting

pub mod activator;
pub mod entitlements;

pub use activator::{ActivationStatus, TriggerActivator, TriggerSource};
pub use entitlements::{Entitlements, StaticEntitlements, TRIGGER_LIMIT};
