//! Error taxonomy shared by the lifecycle subsystems.

use std::time::Duration;

/// Boxed error returned by teardown handlers and trigger sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by registration, backoff, session and shutdown calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// Another shutdown group already owns this priority.
    #[error("shutdown priority {priority} is already claimed by group '{existing}'")]
    DuplicatePriority { priority: u32, existing: String },

    /// Registration changes are rejected once shutdown has begun.
    #[error("shutdown already in progress")]
    AlreadyShuttingDown,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A shutdown band, the whole shutdown or a single handler ran past its deadline.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// A test session was swept or superseded before it completed.
    #[error("test session {0} expired")]
    Expired(String),

    /// A licensed quota has been reached.
    #[error("quota '{quota}' exhausted (limit {limit})")]
    QuotaExceeded { quota: &'static str, limit: u64 },
}

impl LifecycleError {
    pub(crate) fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        LifecycleError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
