//! Push channel websocket endpoint.
//!
//! # Data Flow
//! ```text
//! GET /rest/push?push_ref=..  → upgrade → PushHub::connect
//!
//! PushCommand::Send(msg)      → JSON text frame
//! PushCommand::Close(reason)  → close frame with the mapped code
//! client binary frame         → close 1003
//! client text, not JSON       → close 1007
//! ```

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::LifecycleError;
use crate::http::server::AppState;
use crate::net::close_code::{map_close_reason, CloseReason};
use crate::net::push::{PushCommand, PushConnection};

#[derive(Debug, Deserialize)]
pub struct PushQuery {
    pub push_ref: String,
}

/// `GET /rest/push`
pub async fn push_ws(
    State(state): State<AppState>,
    Query(query): Query<PushQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.coordinator.is_shutting_down() {
        return LifecycleError::AlreadyShuttingDown.into_response();
    }

    let hub = state.push.clone();
    ws.on_upgrade(move |socket| async move {
        let connection = hub.connect(&query.push_ref);
        serve_connection(socket, connection).await;
    })
}

async fn serve_connection(mut socket: WebSocket, mut connection: PushConnection) {
    tracing::debug!(connection_id = %connection.id(), push_ref = connection.push_ref(), "Push client connected");

    let reason = loop {
        tokio::select! {
            command = connection.next_command() => match command {
                Some(PushCommand::Send(message)) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to encode push message");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break None;
                    }
                }
                Some(PushCommand::Close(reason)) => break Some(reason),
                None => break Some(CloseReason::GoingAway),
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if serde_json::from_str::<serde_json::Value>(text.as_str()).is_err() {
                        break Some(CloseReason::InvalidPayload);
                    }
                    tracing::trace!(connection_id = %connection.id(), "Push client message");
                }
                Some(Ok(Message::Binary(_))) => break Some(CloseReason::UnsupportedPayload),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break None,
                Some(Ok(_)) => {}
            },
        }
    };

    if let Some(reason) = reason {
        close(&mut socket, reason).await;
    }
    tracing::debug!(connection_id = %connection.id(), "Push client disconnected");
}

async fn close(socket: &mut WebSocket, reason: CloseReason) {
    let reason = reason.on_wire();
    tracing::debug!(reason = %reason, "Closing push connection");
    let frame = CloseFrame {
        code: map_close_reason(reason),
        reason: reason.description().into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}
