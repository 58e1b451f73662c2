//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! lifecycle, resilience, webhooks, net:
//!     → tracing events with key/value fields → logging.rs subscriber
//!     → metrics.rs record_* helpers → Prometheus exporter (optional)
//! ```
//!
//! # Design Decisions
//! - Metric names live in one place so dashboards have a single source
//! - Recording without an installed exporter is a no-op

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
