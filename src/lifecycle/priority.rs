//! Named shutdown bands.

use std::fmt;

/// Numeric value of [`ShutdownPriority::RunsLast`].
pub const LOWEST_SHUTDOWN_PRIORITY: u32 = 0;
/// Numeric value of [`ShutdownPriority::Default`].
pub const DEFAULT_SHUTDOWN_PRIORITY: u32 = 100;
/// Numeric value of [`ShutdownPriority::RunsFirst`].
pub const HIGHEST_SHUTDOWN_PRIORITY: u32 = 200;

/// When a shutdown group runs relative to the others.
///
/// Higher numeric values are torn down earlier. The named bands cover the
/// common cases; `Custom` places a group anywhere between (or beyond) them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownPriority {
    /// Torn down after every other band (log sinks, config watchers).
    RunsLast,
    /// The band most components belong to.
    Default,
    /// Torn down before every other band (stop accepting new work).
    RunsFirst,
    /// Explicit numeric band for fine-grained ordering.
    Custom(u32),
}

impl ShutdownPriority {
    /// Numeric band; higher runs earlier.
    pub const fn value(self) -> u32 {
        match self {
            ShutdownPriority::RunsLast => LOWEST_SHUTDOWN_PRIORITY,
            ShutdownPriority::Default => DEFAULT_SHUTDOWN_PRIORITY,
            ShutdownPriority::RunsFirst => HIGHEST_SHUTDOWN_PRIORITY,
            ShutdownPriority::Custom(value) => value,
        }
    }
}

impl From<u32> for ShutdownPriority {
    fn from(value: u32) -> Self {
        match value {
            LOWEST_SHUTDOWN_PRIORITY => ShutdownPriority::RunsLast,
            DEFAULT_SHUTDOWN_PRIORITY => ShutdownPriority::Default,
            HIGHEST_SHUTDOWN_PRIORITY => ShutdownPriority::RunsFirst,
            other => ShutdownPriority::Custom(other),
        }
    }
}

impl fmt::Display for ShutdownPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownPriority::RunsLast => write!(f, "runs-last({})", self.value()),
            ShutdownPriority::Default => write!(f, "default({})", self.value()),
            ShutdownPriority::RunsFirst => write!(f, "runs-first({})", self.value()),
            ShutdownPriority::Custom(v) => write!(f, "custom({v})"),
        }
    }
}
