//! Configuration schema definitions.
//!
//! Every section defaults, so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;
use crate::observability::LogFormat;
use crate::resilience::backoff::{
    BackoffPolicy, WORKFLOW_REACTIVATE_INITIAL_TIMEOUT, WORKFLOW_REACTIVATE_MAX_TIMEOUT,
};
use crate::triggers::{StaticEntitlements, TRIGGER_LIMIT};
use crate::webhooks::sessions::{DEFAULT_RETIRED_TTL, TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER};

/// Root configuration for the lifecycle server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub server: ServerConfig,
    pub shutdown: ShutdownConfig,
    pub reactivation: ReactivationConfig,
    pub test_webhooks: TestWebhookConfig,
    pub license: LicenseConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5678").
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5678".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Budget for the whole shutdown sequence.
    pub total_deadline_secs: u64,

    /// Per-handler budget for the built-in bands.
    pub handler_timeout_secs: u64,
}

impl ShutdownConfig {
    pub fn total_deadline(&self) -> Duration {
        Duration::from_secs(self.total_deadline_secs)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            total_deadline_secs: 30,
            handler_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReactivationConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl ReactivationConfig {
    pub fn policy(&self) -> Result<BackoffPolicy, LifecycleError> {
        BackoffPolicy::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

impl Default for ReactivationConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: WORKFLOW_REACTIVATE_INITIAL_TIMEOUT.as_millis() as u64,
            max_delay_ms: WORKFLOW_REACTIVATE_MAX_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TestWebhookConfig {
    /// How long a test webhook waits for its call.
    pub timeout_ms: u64,

    /// Grace added on top of `timeout_ms` before the session is swept.
    pub buffer_ms: u64,

    pub sweep_interval_secs: u64,

    /// How long swept or superseded session ids still answer "expired".
    pub retired_ttl_secs: u64,
}

impl TestWebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn buffer(&self) -> Duration {
        Duration::from_millis(self.buffer_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn retired_ttl(&self) -> Duration {
        Duration::from_secs(self.retired_ttl_secs)
    }
}

impl Default for TestWebhookConfig {
    fn default() -> Self {
        Self {
            timeout_ms: TEST_WEBHOOK_TIMEOUT.as_millis() as u64,
            buffer_ms: TEST_WEBHOOK_TIMEOUT_BUFFER.as_millis() as u64,
            sweep_interval_secs: 5,
            retired_ttl_secs: DEFAULT_RETIRED_TTL.as_secs(),
        }
    }
}

/// Licensed features and quotas.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Maximum workflows with an active trigger; unlimited when absent.
    pub trigger_limit: Option<u64>,

    pub features: Vec<String>,
}

impl LicenseConfig {
    pub fn entitlements(&self) -> StaticEntitlements {
        let mut license = StaticEntitlements::unlimited();
        for feature in &self.features {
            license = license.with_feature(feature.clone());
        }
        if let Some(limit) = self.trigger_limit {
            license = license.with_quota(TRIGGER_LIMIT, limit);
        }
        license
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub log_level: String,

    pub log_format: LogFormat,

    pub metrics_enabled: bool,

    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9464".to_string(),
        }
    }
}
