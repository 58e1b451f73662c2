//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID)
//! - Serve until told to stop, then drain in-flight requests

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::LifecycleConfig;
use crate::http::handlers::{complete_test_session, create_test_session, healthz};
use crate::http::push::push_ws;
use crate::http::request::{UuidRequestId, X_REQUEST_ID};
use crate::lifecycle::ShutdownCoordinator;
use crate::net::push::PushHub;
use crate::webhooks::TestSessionManager;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: ShutdownCoordinator,
    pub sessions: Arc<TestSessionManager>,
    pub push: PushHub,
    pub config: Arc<ArcSwap<LifecycleConfig>>,
}

/// HTTP front of the lifecycle server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .route("/rest/workflows/{workflow_id}/test", post(create_test_session))
            .route("/webhook-test/{session_id}", post(complete_test_session))
            .route("/rest/push", get(push_ws))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
            )
    }

    /// Serve on `listener` until `stop` flips to `true` (or its sender is
    /// dropped), then finish in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = stop.wait_for(|stopped| *stopped).await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
