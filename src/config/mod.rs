//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → LifecycleConfig (validated)
//!     → published through ArcSwap by the application
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → mpsc channel → application swaps the config and the backoff policy
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A reload only affects sessions and backoff steps created after it

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    LicenseConfig, LifecycleConfig, ObservabilityConfig, ReactivationConfig, ServerConfig,
    ShutdownConfig, TestWebhookConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
