//! Test webhook session expiry, supersession and cancellation.

use std::sync::Arc;
use std::time::Duration;

use workflow_lifecycle::ids::{SessionId, WorkflowId};
use workflow_lifecycle::time::{Clock, ManualClock};
use workflow_lifecycle::webhooks::sessions::{TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER};
use workflow_lifecycle::webhooks::{CompletionOutcome, SessionNotice, SessionSweeper, TestSessionManager};
use workflow_lifecycle::LifecycleError;

fn manager(clock: &ManualClock) -> TestSessionManager {
    TestSessionManager::new(Arc::new(clock.clone()))
}

#[test]
fn session_expires_exactly_at_timeout_plus_buffer() {
    let clock = ManualClock::new();
    let sessions = manager(&clock);
    let wf = WorkflowId::from("wf-1");
    let t0 = clock.now();

    let pending = sessions
        .create(&wf, Duration::from_millis(120_000), Duration::from_millis(30_000))
        .unwrap();
    assert_eq!(pending.session.expires_at, t0 + Duration::from_millis(150_000));

    assert!(sessions.sweep(t0 + Duration::from_millis(149_999)).is_empty());
    assert!(sessions.get(&pending.session.id).unwrap().pending);

    let expired = sessions.sweep(t0 + Duration::from_millis(150_000));
    assert_eq!(expired.len(), 1);
    assert!(!expired[0].pending);
    assert_eq!(sessions.pending_count(), 0);
    assert_eq!(sessions.complete(&pending.session.id), CompletionOutcome::Expired);
}

#[tokio::test]
async fn expiry_notifies_the_creator() {
    let clock = ManualClock::new();
    let sessions = manager(&clock);
    let pending = sessions
        .create(&WorkflowId::from("wf-1"), TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER)
        .unwrap();

    clock.advance(Duration::from_secs(150));
    assert_eq!(sessions.sweep_now().len(), 1);
    assert_eq!(pending.notice.await.unwrap(), SessionNotice::Expired);
}

#[tokio::test]
async fn second_session_supersedes_the_first() {
    let clock = ManualClock::new();
    let sessions = manager(&clock);
    let wf = WorkflowId::from("wf-1");

    let first = sessions.create(&wf, TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER).unwrap();
    let second = sessions.create(&wf, TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER).unwrap();

    assert_eq!(first.notice.await.unwrap(), SessionNotice::Superseded);
    assert_eq!(sessions.pending_for(&wf), Some(second.session.id.clone()));
    assert_eq!(sessions.complete(&first.session.id), CompletionOutcome::Expired);

    let found = sessions.complete(&second.session.id);
    assert!(matches!(found, CompletionOutcome::Found(ref s) if s.workflow_id == wf));
    assert_eq!(second.notice.await.unwrap(), SessionNotice::Completed);
}

#[test]
fn completion_is_exact_match_only() {
    let clock = ManualClock::new();
    let sessions = manager(&clock);
    let pending = sessions
        .create(&WorkflowId::from("wf-1"), TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER)
        .unwrap();

    let unknown = SessionId::generate();
    assert_eq!(
        sessions.complete(&unknown).into_result(&unknown),
        Err(LifecycleError::NotFound {
            kind: "test session",
            id: unknown.to_string()
        })
    );
    assert!(sessions.get(&pending.session.id).is_some());
}

#[test]
fn completion_after_deadline_is_expired_even_before_sweep() {
    let clock = ManualClock::new();
    let sessions = manager(&clock);
    let pending = sessions
        .create(&WorkflowId::from("wf-1"), Duration::from_secs(1), Duration::ZERO)
        .unwrap();

    clock.advance(Duration::from_secs(1));
    let id = pending.session.id;
    assert_eq!(
        sessions.complete(&id).into_result(&id),
        Err(LifecycleError::Expired(id.to_string()))
    );
}

#[test]
fn zero_timeout_is_rejected() {
    let clock = ManualClock::new();
    let sessions = manager(&clock);
    let err = sessions
        .create(&WorkflowId::from("wf-1"), Duration::ZERO, TEST_WEBHOOK_TIMEOUT_BUFFER)
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidArgument(_)));
}

#[tokio::test]
async fn cancel_all_notifies_every_creator() {
    let clock = ManualClock::new();
    let sessions = manager(&clock);
    let a = sessions.create(&WorkflowId::from("a"), TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER).unwrap();
    let b = sessions.create(&WorkflowId::from("b"), TEST_WEBHOOK_TIMEOUT, TEST_WEBHOOK_TIMEOUT_BUFFER).unwrap();

    assert_eq!(sessions.cancel_all(), 2);
    assert_eq!(a.notice.await.unwrap(), SessionNotice::Cancelled);
    assert_eq!(b.notice.await.unwrap(), SessionNotice::Cancelled);
    assert_eq!(sessions.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn sweeper_reaps_in_the_background() {
    let clock = ManualClock::new();
    let sessions = Arc::new(manager(&clock));
    let pending = sessions
        .create(&WorkflowId::from("wf-1"), Duration::from_secs(1), Duration::ZERO)
        .unwrap();

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let sweeper = tokio::spawn(SessionSweeper::new(Arc::clone(&sessions), Duration::from_secs(5)).run(stop_rx));

    clock.advance(Duration::from_secs(2));
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(pending.notice.await.unwrap(), SessionNotice::Expired);

    stop_tx.send(true).unwrap();
    sweeper.await.unwrap();
}
