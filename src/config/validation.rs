//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (deadlines > 0, initial delay <= max delay)
//! - Check that addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: LifecycleConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use crate::config::schema::LifecycleConfig;

/// One semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &LifecycleConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }

    if config.shutdown.total_deadline_secs == 0 {
        errors.push(ValidationError::new("shutdown.total_deadline_secs", "must be greater than 0"));
    }
    if config.shutdown.handler_timeout_secs == 0 {
        errors.push(ValidationError::new("shutdown.handler_timeout_secs", "must be greater than 0"));
    }

    let reactivation = &config.reactivation;
    if reactivation.initial_delay_ms == 0 {
        errors.push(ValidationError::new("reactivation.initial_delay_ms", "must be greater than 0"));
    }
    if reactivation.initial_delay_ms > reactivation.max_delay_ms {
        errors.push(ValidationError::new(
            "reactivation.max_delay_ms",
            format!(
                "{} is below initial_delay_ms ({})",
                reactivation.max_delay_ms, reactivation.initial_delay_ms
            ),
        ));
    }

    let webhooks = &config.test_webhooks;
    if webhooks.timeout_ms == 0 {
        errors.push(ValidationError::new("test_webhooks.timeout_ms", "must be greater than 0"));
    }
    if webhooks.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("test_webhooks.sweep_interval_secs", "must be greater than 0"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }
    if tracing_subscriber::EnvFilter::try_new(&observability.log_level).is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("'{}' is not a valid filter", observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&LifecycleConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = LifecycleConfig::default();
        config.server.bind_address = "not-an-address".into();
        config.shutdown.total_deadline_secs = 0;
        config.reactivation.initial_delay_ms = 5_000;
        config.reactivation.max_delay_ms = 1_000;
        config.test_webhooks.timeout_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "server.bind_address",
                "shutdown.total_deadline_secs",
                "reactivation.max_delay_ms",
                "test_webhooks.timeout_ms",
            ]
        );
    }

    #[test]
    fn metrics_address_only_checked_when_enabled() {
        let mut config = LifecycleConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observability.metrics_address");
    }
}
