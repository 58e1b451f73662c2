//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lifecycle_shutdown_handler_total` (counter): handler outcomes by group, outcome
//! - `lifecycle_shutdown_duration_seconds` (histogram): total shutdown time by result
//! - `lifecycle_reactivation_scheduled_total` (counter): retries armed
//! - `lifecycle_reactivation_delay_seconds` (histogram): delay of each armed retry
//! - `lifecycle_test_sessions_total` (counter): test session events by kind
//! - `lifecycle_push_connections` (gauge): connected push clients

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_shutdown_handler(group: &str, outcome: &'static str) {
    metrics::counter!(
        "lifecycle_shutdown_handler_total",
        "group" => group.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_shutdown_duration(elapsed: Duration, completed: bool) {
    let result = if completed { "completed" } else { "timed_out" };
    metrics::histogram!("lifecycle_shutdown_duration_seconds", "result" => result)
        .record(elapsed.as_secs_f64());
}

pub fn record_reactivation_scheduled(delay: Duration) {
    metrics::counter!("lifecycle_reactivation_scheduled_total").increment(1);
    metrics::histogram!("lifecycle_reactivation_delay_seconds").record(delay.as_secs_f64());
}

pub fn record_test_session(event: &'static str) {
    metrics::counter!("lifecycle_test_sessions_total", "event" => event).increment(1);
}

pub fn record_push_connections(count: usize) {
    metrics::gauge!("lifecycle_push_connections").set(count as f64);
}
