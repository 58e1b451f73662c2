//! Workflow lifecycle server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Browser ── POST /rest/workflows/{id}/test ──▶ ┌──────────────┐
//!     Browser ◀─ push (websocket) ───────────────── │    http      │
//!     Caller ─── POST /webhook-test/{session} ────▶ └──────┬───────┘
//!                                                          │
//!                    ┌──────────────┐  ┌───────────────────▼───┐
//!                    │   triggers   │  │ webhooks (sessions,   │
//!                    │ + resilience │  │ sweeper)              │
//!                    └──────┬───────┘  └───────────┬───────────┘
//!                           │                      │
//!                    ┌──────▼──────────────────────▼──────┐
//!                    │ lifecycle: registry → coordinator   │
//!                    │ bands 200 → 150 → 100 → 0           │
//!                    └─────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::net::TcpListener;

use workflow_lifecycle::config::{load_config, LifecycleConfig};
use workflow_lifecycle::ids::WorkflowId;
use workflow_lifecycle::lifecycle::signals::shutdown_signal;
use workflow_lifecycle::observability::{init_logging, metrics};
use workflow_lifecycle::triggers::TriggerSource;
use workflow_lifecycle::{Application, BoxError};

#[derive(Parser)]
#[command(name = "lifecycle-server")]
#[command(about = "Workflow lifecycle server", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

/// Trigger source for a standalone server with no execution engine attached.
struct LoggingTriggerSource;

impl TriggerSource for LoggingTriggerSource {
    fn activate(&self, workflow_id: &WorkflowId) -> BoxFuture<'static, Result<(), BoxError>> {
        tracing::info!(workflow_id = %workflow_id, "Trigger subscribed");
        async { Ok(()) }.boxed()
    }

    fn deactivate(&self, workflow_id: &WorkflowId) -> BoxFuture<'static, Result<(), BoxError>> {
        tracing::info!(workflow_id = %workflow_id, "Trigger unsubscribed");
        async { Ok(()) }.boxed()
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, BoxError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => LifecycleConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    init_logging(&config.observability.log_level, config.observability.log_format);
    tracing::info!("lifecycle-server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.server.bind_address,
        total_deadline_secs = config.shutdown.total_deadline_secs,
        handler_timeout_secs = config.shutdown.handler_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let entitlements = Arc::new(config.license.entitlements());
    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let app = Application::build(config, Arc::new(LoggingTriggerSource), entitlements)?;

    let addr = app.start(listener).await?;
    tracing::info!(address = %addr, "Listening for connections");

    if let Some(path) = &cli.config {
        if let Err(e) = app.watch_config(path) {
            tracing::warn!(error = %e, "Config hot reload disabled");
        }
    }

    shutdown_signal().await;

    let report = tokio::select! {
        report = app.shutdown() => report,
        () = shutdown_signal() => {
            tracing::warn!("Second signal received, forcing exit");
            return Ok(ExitCode::from(130));
        }
    };

    for (group, handler) in report.failed_handlers() {
        tracing::warn!(
            group = %group.label,
            handler = %handler.handle,
            outcome = ?handler.outcome,
            "Shutdown handler did not finish cleanly"
        );
    }

    match report.ensure_completed() {
        Ok(()) => {
            tracing::info!(elapsed = ?report.elapsed, "Shutdown complete");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = %e, "Shutdown did not finish in time");
            Ok(ExitCode::FAILURE)
        }
    }
}
