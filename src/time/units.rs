//! Conversion between millisecond, second, minute, hour and day magnitudes.

use std::time::Duration;

use crate::error::LifecycleError;

/// A unit of wall-clock magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Number of milliseconds in one of this unit.
    pub const fn as_millis(self) -> u64 {
        match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60 * 1_000,
            TimeUnit::Hours => 60 * 60 * 1_000,
            TimeUnit::Days => 24 * 60 * 60 * 1_000,
        }
    }
}

/// Convert `value` expressed in `from` into the equivalent magnitude in `to`.
///
/// Negative and non-finite magnitudes are rejected with
/// [`LifecycleError::InvalidArgument`].
pub fn convert(value: f64, from: TimeUnit, to: TimeUnit) -> Result<f64, LifecycleError> {
    if !value.is_finite() || value < 0.0 {
        return Err(LifecycleError::InvalidArgument(format!(
            "time magnitude must be finite and non-negative, got {value}"
        )));
    }

    if from == to {
        return Ok(value);
    }

    Ok(value * from.as_millis() as f64 / to.as_millis() as f64)
}

/// Convert a magnitude into a [`Duration`].
pub fn to_duration(value: f64, unit: TimeUnit) -> Result<Duration, LifecycleError> {
    let secs = convert(value, unit, TimeUnit::Seconds)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| LifecycleError::InvalidArgument(format!("{value} {unit:?}: {e}")))
}
