//! Bounded exponential backoff.

use std::time::Duration;

use crate::error::LifecycleError;
use crate::time::{to_duration, TimeUnit};

/// First delay after a trigger fails to activate.
pub const WORKFLOW_REACTIVATE_INITIAL_TIMEOUT: Duration = Duration::from_secs(1);
/// Ceiling for the reactivation delay (one day).
pub const WORKFLOW_REACTIVATE_MAX_TIMEOUT: Duration =
    Duration::from_millis(TimeUnit::Days.as_millis());

/// Doubling backoff between a floor and a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
}

impl BackoffPolicy {
    /// Create a policy; `initial` must be non-zero and not above `max`.
    pub fn new(initial: Duration, max: Duration) -> Result<Self, LifecycleError> {
        if initial.is_zero() {
            return Err(LifecycleError::InvalidArgument(
                "initial backoff delay must be non-zero".into(),
            ));
        }
        if initial > max {
            return Err(LifecycleError::InvalidArgument(format!(
                "initial backoff delay {initial:?} exceeds maximum {max:?}"
            )));
        }
        Ok(Self { initial, max })
    }

    /// Create a policy from millisecond magnitudes.
    pub fn from_millis(initial_ms: f64, max_ms: f64) -> Result<Self, LifecycleError> {
        Self::new(
            to_duration(initial_ms, TimeUnit::Milliseconds)?,
            to_duration(max_ms, TimeUnit::Milliseconds)?,
        )
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay following `current`; the first failure (`None`) gets `initial`.
    pub fn next_delay(&self, current: Option<Duration>) -> Duration {
        match current {
            None => self.initial,
            Some(current) => self.clamp(current.saturating_mul(2)),
        }
    }

    /// Force a delay into `[initial, max]`.
    pub fn clamp(&self, delay: Duration) -> Duration {
        delay.clamp(self.initial, self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: WORKFLOW_REACTIVATE_INITIAL_TIMEOUT,
            max: WORKFLOW_REACTIVATE_MAX_TIMEOUT,
        }
    }
}
