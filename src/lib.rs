//! Workflow lifecycle core.
//!
//! Prioritized graceful shutdown, exponential trigger reactivation, test
//! webhook sessions with timeouts, and close-code mapping for push
//! connections, served behind a small Axum front.

pub mod app;
pub mod config;
pub mod error;
pub mod http;
pub mod ids;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod time;
pub mod triggers;
pub mod webhooks;

pub use app::Application;
pub use config::LifecycleConfig;
pub use error::{BoxError, LifecycleError};
pub use lifecycle::{ShutdownCoordinator, ShutdownPriority, ShutdownRegistry};
