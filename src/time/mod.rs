//! Time primitives shared by every timer in the crate.
//!
//! # Data Flow
//! ```text
//! config values (ms / secs)
//!     → units.rs (validated conversion into Duration)
//!     → backoff, test sessions, shutdown deadlines
//!
//! clock.rs:
//!     Clock::now() → deadline arithmetic (fire_at, expires_at)
//! ```
//!
//! # Design Decisions
//! - Conversions go through fixed millisecond multipliers, never floats of floats
//! - The clock is injected, so tests can step time by hand

pub mod clock;
pub mod units;

pub use clock::{Clock, ManualClock, SystemClock};
pub use units::{convert, to_duration, TimeUnit};
