//! REST handlers for health and test webhooks.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::LifecycleError;
use crate::http::server::AppState;
use crate::ids::{SessionId, WorkflowId};
use crate::net::push::{PushHub, PushMessage, TestWebhookData};
use crate::webhooks::PendingSession;

/// `GET /healthz`
pub async fn healthz(State(state): State<AppState>) -> Response {
    if state.coordinator.is_shutting_down() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "shutting-down" })),
        )
            .into_response()
    } else {
        (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct TestQuery {
    pub push_ref: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestSessionCreated {
    pub session_id: String,
    pub workflow_id: String,
    pub expires_in_ms: u64,
}

/// `POST /rest/workflows/{workflow_id}/test`
pub async fn create_test_session(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<TestQuery>,
) -> Result<(StatusCode, Json<TestSessionCreated>), LifecycleError> {
    if state.coordinator.is_shutting_down() {
        return Err(LifecycleError::AlreadyShuttingDown);
    }

    let settings = state.config.load().test_webhooks.clone();
    let workflow_id = WorkflowId::from(workflow_id);
    let pending = state
        .sessions
        .create(&workflow_id, settings.timeout(), settings.buffer())?;

    let session = pending.session.clone();
    let expires_in = session.expires_at.saturating_duration_since(session.created_at);
    tracing::info!(
        workflow_id = %workflow_id,
        session_id = %session.id,
        expires_in = ?expires_in,
        "Test webhook session created"
    );

    if let Some(push_ref) = query.push_ref {
        tokio::spawn(forward_notice(state.push.clone(), push_ref, pending));
    }

    Ok((
        StatusCode::CREATED,
        Json(TestSessionCreated {
            session_id: session.id.to_string(),
            workflow_id: workflow_id.to_string(),
            expires_in_ms: millis(expires_in),
        }),
    ))
}

/// `POST /webhook-test/{session_id}`
pub async fn complete_test_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, LifecycleError> {
    let Some(id) = SessionId::parse(&session_id) else {
        return Err(LifecycleError::not_found("test session", session_id));
    };

    let session = state.sessions.complete(&id).into_result(&id)?;
    tracing::info!(
        workflow_id = %session.workflow_id,
        session_id = %session.id,
        "Test webhook received"
    );
    Ok(Json(json!({
        "status": "received",
        "session_id": session.id.to_string(),
        "workflow_id": session.workflow_id.to_string(),
    })))
}

/// Relay the session's single notice to the creator's push connection.
async fn forward_notice(push: PushHub, push_ref: String, pending: PendingSession) {
    let Ok(notice) = pending.notice.await else {
        return;
    };
    let data = TestWebhookData {
        workflow_id: pending.session.workflow_id,
        session_id: pending.session.id,
    };
    if !push.send(&push_ref, PushMessage::from_notice(notice, data)) {
        tracing::debug!(push_ref, notice = notice.as_str(), "No push connection for session notice");
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
