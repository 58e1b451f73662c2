//! Interactive test-webhook sessions.
//!
//! A user who clicks "test workflow" gets a session that waits for one
//! webhook call. The session expires at `created + timeout + buffer`; a new
//! test for the same workflow replaces the pending one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::LifecycleError;
use crate::ids::{SessionId, WorkflowId};
use crate::observability::metrics;
use crate::time::Clock;

/// How long a test webhook waits for its call.
pub const TEST_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(2 * 60);
/// Grace added on top of [`TEST_WEBHOOK_TIMEOUT`] before a session is reaped.
pub const TEST_WEBHOOK_TIMEOUT_BUFFER: Duration = Duration::from_secs(30);
/// How long ids of superseded or swept sessions keep answering `Expired`.
pub const DEFAULT_RETIRED_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSession {
    pub id: SessionId,
    pub workflow_id: WorkflowId,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub pending: bool,
}

/// Delivered once to whoever created a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    /// The webhook was called.
    Completed,
    /// The deadline passed first.
    Expired,
    /// A newer test for the same workflow replaced this one.
    Superseded,
    /// The server is shutting down.
    Cancelled,
}

impl SessionNotice {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionNotice::Completed => "completed",
            SessionNotice::Expired => "expired",
            SessionNotice::Superseded => "superseded",
            SessionNotice::Cancelled => "cancelled",
        }
    }
}

/// A freshly created session plus the channel its notice arrives on.
#[derive(Debug)]
pub struct PendingSession {
    pub session: TestSession,
    pub notice: oneshot::Receiver<SessionNotice>,
}

/// Answer to a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Found(TestSession),
    NotFound,
    Expired,
}

impl CompletionOutcome {
    pub fn into_result(self, id: &SessionId) -> Result<TestSession, LifecycleError> {
        match self {
            CompletionOutcome::Found(session) => Ok(session),
            CompletionOutcome::NotFound => Err(LifecycleError::not_found("test session", id)),
            CompletionOutcome::Expired => Err(LifecycleError::Expired(id.to_string())),
        }
    }
}

struct SessionEntry {
    session: TestSession,
    notifier: oneshot::Sender<SessionNotice>,
}

impl SessionEntry {
    fn finish(self, notice: SessionNotice) -> TestSession {
        // The creator may have stopped listening; that is fine.
        let _ = self.notifier.send(notice);
        metrics::record_test_session(notice.as_str());
        let mut session = self.session;
        session.pending = false;
        session
    }
}

/// Owns every pending test session.
///
/// Sessions are keyed by id, with a second index enforcing one pending
/// session per workflow. The workflow index is always locked before the
/// session map, never the other way round.
pub struct TestSessionManager {
    clock: Arc<dyn Clock>,
    sessions: DashMap<SessionId, SessionEntry>,
    by_workflow: DashMap<WorkflowId, SessionId>,
    retired: DashMap<SessionId, Instant>,
    retired_ttl: Duration,
}

impl TestSessionManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sessions: DashMap::new(),
            by_workflow: DashMap::new(),
            retired: DashMap::new(),
            retired_ttl: DEFAULT_RETIRED_TTL,
        }
    }

    pub fn with_retired_ttl(mut self, ttl: Duration) -> Self {
        self.retired_ttl = ttl;
        self
    }

    /// Open a session for `workflow_id`, replacing any pending one.
    pub fn create(
        &self,
        workflow_id: &WorkflowId,
        base_timeout: Duration,
        buffer: Duration,
    ) -> Result<PendingSession, LifecycleError> {
        if base_timeout.is_zero() {
            return Err(LifecycleError::InvalidArgument(
                "test webhook timeout must be non-zero".into(),
            ));
        }
        let now = self.clock.now();
        let expires_at = base_timeout
            .checked_add(buffer)
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| {
                LifecycleError::InvalidArgument(format!(
                    "test webhook deadline overflows: {base_timeout:?} + {buffer:?}"
                ))
            })?;

        let id = SessionId::generate();
        let session = TestSession {
            id: id.clone(),
            workflow_id: workflow_id.clone(),
            created_at: now,
            expires_at,
            pending: true,
        };
        let (notifier, notice) = oneshot::channel();
        let entry = SessionEntry {
            session: session.clone(),
            notifier,
        };

        match self.by_workflow.entry(workflow_id.clone()) {
            Entry::Occupied(mut slot) => {
                let previous = slot.insert(id.clone());
                if let Some((_, replaced)) = self.sessions.remove(&previous) {
                    self.retired.insert(previous.clone(), now);
                    replaced.finish(SessionNotice::Superseded);
                    tracing::info!(
                        session_id = %previous,
                        workflow_id = %workflow_id,
                        "Test webhook session superseded"
                    );
                }
                self.sessions.insert(id.clone(), entry);
            }
            Entry::Vacant(slot) => {
                self.sessions.insert(id.clone(), entry);
                slot.insert(id.clone());
            }
        }

        metrics::record_test_session("created");
        tracing::debug!(
            session_id = %id,
            workflow_id = %workflow_id,
            ttl = ?(expires_at - now),
            "Test webhook session created"
        );
        Ok(PendingSession { session, notice })
    }

    /// Resolve a session by exact id.
    pub fn complete(&self, id: &SessionId) -> CompletionOutcome {
        let now = self.clock.now();
        let Some((_, entry)) = self.sessions.remove(id) else {
            return if self.retired.contains_key(id) {
                CompletionOutcome::Expired
            } else {
                CompletionOutcome::NotFound
            };
        };
        self.by_workflow
            .remove_if(&entry.session.workflow_id, |_, current| current == id);

        if now >= entry.session.expires_at {
            self.retired.insert(id.clone(), now);
            entry.finish(SessionNotice::Expired);
            return CompletionOutcome::Expired;
        }

        CompletionOutcome::Found(entry.finish(SessionNotice::Completed))
    }

    /// Reap every session whose deadline is at or before `now`.
    pub fn sweep(&self, now: Instant) -> Vec<TestSession> {
        let due: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|e| now >= e.session.expires_at)
            .map(|e| e.key().clone())
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for id in due {
            let Some((_, entry)) = self
                .sessions
                .remove_if(&id, |_, e| now >= e.session.expires_at)
            else {
                continue;
            };
            self.by_workflow
                .remove_if(&entry.session.workflow_id, |_, current| current == &id);
            self.retired.insert(id.clone(), now);
            tracing::info!(
                session_id = %id,
                workflow_id = %entry.session.workflow_id,
                "Test webhook session expired"
            );
            expired.push(entry.finish(SessionNotice::Expired));
        }

        let ttl = self.retired_ttl;
        self.retired
            .retain(|_, retired_at| now.saturating_duration_since(*retired_at) < ttl);
        expired
    }

    /// [`sweep`](Self::sweep) at the clock's current time.
    pub fn sweep_now(&self) -> Vec<TestSession> {
        self.sweep(self.clock.now())
    }

    /// Cancel every pending session. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let now = self.clock.now();
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut cancelled = 0;
        for id in ids {
            if let Some((_, entry)) = self.sessions.remove(&id) {
                self.by_workflow
                    .remove_if(&entry.session.workflow_id, |_, current| current == &id);
                self.retired.insert(id, now);
                entry.finish(SessionNotice::Cancelled);
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn get(&self, id: &SessionId) -> Option<TestSession> {
        self.sessions.get(id).map(|e| e.session.clone())
    }

    /// Id of the pending session for `workflow_id`, if any.
    pub fn pending_for(&self, workflow_id: &WorkflowId) -> Option<SessionId> {
        self.by_workflow.get(workflow_id).map(|id| id.value().clone())
    }

    pub fn pending_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn manager(clock: &ManualClock) -> TestSessionManager {
        TestSessionManager::new(Arc::new(clock.clone()))
    }

    #[test]
    fn deadline_is_timeout_plus_buffer() {
        let clock = ManualClock::new();
        let sessions = manager(&clock);
        let wf = WorkflowId::from("wf");

        let pending = sessions
            .create(&wf, TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER)
            .unwrap();
        assert_eq!(
            pending.session.expires_at - pending.session.created_at,
            Duration::from_millis(150_000)
        );
        assert!(pending.session.pending);
        assert_eq!(sessions.pending_for(&wf), Some(pending.session.id.clone()));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let clock = ManualClock::new();
        let sessions = manager(&clock);
        let err = sessions
            .create(&WorkflowId::from("wf"), Duration::ZERO, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidArgument(_)));
    }

    #[test]
    fn complete_notifies_creator() {
        let clock = ManualClock::new();
        let sessions = manager(&clock);
        let mut pending = sessions
            .create(&WorkflowId::from("wf"), TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER)
            .unwrap();

        let outcome = sessions.complete(&pending.session.id);
        let CompletionOutcome::Found(done) = outcome else {
            panic!("expected Found, got {outcome:?}");
        };
        assert!(!done.pending);
        assert_eq!(pending.notice.try_recv().unwrap(), SessionNotice::Completed);
        assert_eq!(sessions.complete(&pending.session.id), CompletionOutcome::NotFound);
        assert_eq!(sessions.pending_count(), 0);
    }

    #[test]
    fn late_completion_before_sweep_is_expired() {
        let clock = ManualClock::new();
        let sessions = manager(&clock);
        let mut pending = sessions
            .create(&WorkflowId::from("wf"), Duration::from_secs(10), Duration::from_secs(5))
            .unwrap();

        clock.advance(Duration::from_secs(15));
        assert_eq!(sessions.complete(&pending.session.id), CompletionOutcome::Expired);
        assert_eq!(pending.notice.try_recv().unwrap(), SessionNotice::Expired);
        assert_eq!(sessions.complete(&pending.session.id), CompletionOutcome::Expired);
    }

    #[test]
    fn retired_ids_are_forgotten_after_ttl() {
        let clock = ManualClock::new();
        let sessions = manager(&clock).with_retired_ttl(Duration::from_secs(60));
        let pending = sessions
            .create(&WorkflowId::from("wf"), Duration::from_secs(10), Duration::ZERO)
            .unwrap();

        clock.advance(Duration::from_secs(10));
        assert_eq!(sessions.sweep_now().len(), 1);
        assert_eq!(sessions.complete(&pending.session.id), CompletionOutcome::Expired);

        clock.advance(Duration::from_secs(60));
        sessions.sweep_now();
        assert_eq!(sessions.complete(&pending.session.id), CompletionOutcome::NotFound);
    }

    #[test]
    fn cancel_all_notifies_everyone() {
        let clock = ManualClock::new();
        let sessions = manager(&clock);
        let mut a = sessions
            .create(&WorkflowId::from("a"), TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER)
            .unwrap();
        let mut b = sessions
            .create(&WorkflowId::from("b"), TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER)
            .unwrap();

        assert_eq!(sessions.cancel_all(), 2);
        assert_eq!(a.notice.try_recv().unwrap(), SessionNotice::Cancelled);
        assert_eq!(b.notice.try_recv().unwrap(), SessionNotice::Cancelled);
        assert_eq!(sessions.pending_count(), 0);
        assert!(sessions.pending_for(&WorkflowId::from("a")).is_none());
    }

    #[test]
    fn completion_outcome_maps_to_errors() {
        let id = SessionId::generate();
        assert!(matches!(
            CompletionOutcome::NotFound.into_result(&id),
            Err(LifecycleError::NotFound { .. })
        ));
        assert_eq!(
            CompletionOutcome::Expired.into_result(&id),
            Err(LifecycleError::Expired(id.to_string()))
        );
    }
}
