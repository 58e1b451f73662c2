//! Push channel registry.
//!
//! # Responsibilities
//! - Track connected push clients by their push reference
//! - Deliver JSON push messages to one client or all of them
//! - Force-close every connection with a chosen close code at shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::ids::{SessionId, WorkflowId};
use crate::net::close_code::CloseReason;
use crate::observability::metrics;
use crate::webhooks::SessionNotice;

/// Relaxed ordering is enough: ids only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "push-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestWebhookData {
    pub workflow_id: WorkflowId,
    pub session_id: SessionId,
}

/// Message pushed to a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum PushMessage {
    TestWebhookReceived(TestWebhookData),
    TestWebhookDeleted(TestWebhookData),
    TestWebhookExpired(TestWebhookData),
}

impl PushMessage {
    /// The push a session notice turns into.
    pub fn from_notice(notice: SessionNotice, data: TestWebhookData) -> Self {
        match notice {
            SessionNotice::Completed => PushMessage::TestWebhookReceived(data),
            SessionNotice::Expired => PushMessage::TestWebhookExpired(data),
            SessionNotice::Superseded | SessionNotice::Cancelled => {
                PushMessage::TestWebhookDeleted(data)
            }
        }
    }
}

/// Instruction for the task serving one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushCommand {
    Send(PushMessage),
    Close(CloseReason),
}

struct PushClient {
    id: ConnectionId,
    commands: mpsc::UnboundedSender<PushCommand>,
}

struct HubInner {
    clients: DashMap<String, PushClient>,
    /// Set by `close_all`; later connections are closed on arrival.
    closing: OnceLock<CloseReason>,
    /// Live `PushConnection`s, including replaced ones not yet dropped.
    live: watch::Sender<usize>,
}

/// Connected push clients, keyed by push reference.
#[derive(Clone)]
pub struct PushHub {
    inner: Arc<HubInner>,
}

impl Default for PushHub {
    fn default() -> Self {
        Self {
            inner: Arc::new(HubInner {
                clients: DashMap::new(),
                closing: OnceLock::new(),
                live: watch::Sender::new(0),
            }),
        }
    }
}

impl PushHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. A previous connection with the same push
    /// reference is closed normally and replaced. After `close_all` the new
    /// connection is told to close straight away.
    pub fn connect(&self, push_ref: &str) -> PushConnection {
        let (commands, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new();
        self.inner.live.send_modify(|n| *n += 1);
        if let Some(previous) = self
            .inner
            .clients
            .insert(push_ref.to_string(), PushClient { id, commands: commands.clone() })
        {
            tracing::debug!(push_ref, replaced = %previous.id, "Push reference reconnected");
            let _ = previous.commands.send(PushCommand::Close(CloseReason::Normal));
        }
        // Checked after the insert so a concurrent `close_all` cannot miss us.
        if let Some(reason) = self.inner.closing.get() {
            tracing::debug!(push_ref, connection_id = %id, "Push connection opened after close");
            let _ = commands.send(PushCommand::Close(*reason));
        }
        metrics::record_push_connections(self.inner.clients.len());
        tracing::debug!(push_ref, connection_id = %id, "Push connection opened");

        PushConnection {
            id,
            push_ref: push_ref.to_string(),
            commands: rx,
            hub: Arc::clone(&self.inner),
        }
    }

    /// Deliver `message` to one client. Returns whether it was queued.
    pub fn send(&self, push_ref: &str, message: PushMessage) -> bool {
        self.inner
            .clients
            .get(push_ref)
            .is_some_and(|c| c.commands.send(PushCommand::Send(message)).is_ok())
    }

    /// Ask every connection, present and future, to close with `reason`.
    /// Returns how many current connections were asked.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let _ = self.inner.closing.set(reason);
        let mut closed = 0;
        for client in self.inner.clients.iter() {
            if client.commands.send(PushCommand::Close(reason)).is_ok() {
                closed += 1;
            }
        }
        tracing::info!(connections = closed, reason = %reason, "Closing push connections");
        closed
    }

    pub fn is_closing(&self) -> bool {
        self.inner.closing.get().is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn is_connected(&self, push_ref: &str) -> bool {
        self.inner.clients.contains_key(push_ref)
    }

    /// Wait until every connection has been dropped.
    pub async fn drained(&self) {
        let mut live = self.inner.live.subscribe();
        // The hub holds the sender, so this only returns once the count hits zero.
        let _ = live.wait_for(|n| *n == 0).await;
    }
}

/// One registered connection; unregisters itself when dropped.
pub struct PushConnection {
    id: ConnectionId,
    push_ref: String,
    commands: mpsc::UnboundedReceiver<PushCommand>,
    hub: Arc<HubInner>,
}

impl PushConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn push_ref(&self) -> &str {
        &self.push_ref
    }

    /// Next command for this connection; `None` once the hub is gone.
    pub async fn next_command(&mut self) -> Option<PushCommand> {
        self.commands.recv().await
    }
}

impl Drop for PushConnection {
    fn drop(&mut self) {
        let id = self.id;
        self.hub.clients.remove_if(&self.push_ref, |_, c| c.id == id);
        self.hub.live.send_modify(|n| *n = n.saturating_sub(1));
        metrics::record_push_connections(self.hub.clients.len());
        tracing::trace!(connection_id = %self.id, "Push connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn data() -> TestWebhookData {
        TestWebhookData {
            workflow_id: WorkflowId::from("wf-1"),
            session_id: SessionId::generate(),
        }
    }

    #[test]
    fn connection_ids_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[tokio::test]
    async fn send_reaches_the_right_client() {
        let hub = PushHub::new();
        let mut a = hub.connect("a");
        let _b = hub.connect("b");

        let message = PushMessage::TestWebhookReceived(data());
        assert!(hub.send("a", message.clone()));
        assert!(!hub.send("missing", message.clone()));
        assert_eq!(a.next_command().await, Some(PushCommand::Send(message)));
    }

    #[tokio::test]
    async fn reconnect_replaces_and_closes_previous() {
        let hub = PushHub::new();
        let mut first = hub.connect("tab");
        let second = hub.connect("tab");
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(
            first.next_command().await,
            Some(PushCommand::Close(CloseReason::Normal))
        );

        // Dropping the stale connection must not unregister the new one.
        drop(first);
        assert!(hub.is_connected("tab"));
        drop(second);
        assert!(!hub.is_connected("tab"));
    }

    #[tokio::test]
    async fn close_all_then_drain() {
        let hub = PushHub::new();
        let mut a = hub.connect("a");
        let mut b = hub.connect("b");
        assert_eq!(hub.close_all(CloseReason::GoingAway), 2);
        assert_eq!(a.next_command().await, Some(PushCommand::Close(CloseReason::GoingAway)));
        assert_eq!(b.next_command().await, Some(PushCommand::Close(CloseReason::GoingAway)));

        drop(a);
        drop(b);
        tokio::time::timeout(Duration::from_secs(1), hub.drained())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn connect_after_close_all_is_told_to_close() {
        let hub = PushHub::new();
        hub.close_all(CloseReason::GoingAway);
        assert!(hub.is_closing());

        let mut late = hub.connect("late");
        assert_eq!(
            late.next_command().await,
            Some(PushCommand::Close(CloseReason::GoingAway))
        );
        drop(late);
        tokio::time::timeout(Duration::from_secs(1), hub.drained())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn drained_waits_for_replaced_connections() {
        let hub = PushHub::new();
        let first = hub.connect("tab");
        let second = hub.connect("tab");
        drop(second);

        // `first` was replaced in the map but is still alive.
        assert!(tokio::time::timeout(Duration::from_millis(50), hub.drained())
            .await
            .is_err());
        drop(first);
        tokio::time::timeout(Duration::from_secs(1), hub.drained())
            .await
            .unwrap();
    }

    #[test]
    fn push_message_wire_shape() {
        let data = data();
        let json = serde_json::to_value(PushMessage::from_notice(SessionNotice::Expired, data.clone())).unwrap();
        assert_eq!(json["type"], "testWebhookExpired");
        assert_eq!(json["data"]["workflowId"], "wf-1");
        assert_eq!(json["data"]["sessionId"], data.session_id.as_str());

        let deleted = PushMessage::from_notice(SessionNotice::Superseded, data);
        assert!(matches!(deleted, PushMessage::TestWebhookDeleted(_)));
    }
}
