//! Test webhook subsystem.
//!
//! # Data Flow
//! ```text
//! "test workflow" request
//!     → sessions.rs create (deadline = now + timeout + buffer,
//!       previous pending session for the workflow superseded)
//!     → caller awaits SessionNotice
//!
//! webhook call → sessions.rs complete(id) → Found | NotFound | Expired
//! sweeper.rs tick → sessions.rs sweep(now) → Expired notices
//! ```
//!
//! # Design Decisions
//! - Session ids are 256-bit random tokens, matched exactly
//! - One pending session per workflow
//! - Superseded and swept ids answer `Expired` for a while instead of `NotFound`

pub mod sessions;
pub mod sweeper;

pub use sessions::{
    CompletionOutcome, PendingSession, SessionNotice, TestSession, TestSessionManager,
    TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER,
};
pub use sweeper::SessionSweeper;
