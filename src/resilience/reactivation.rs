//! Reactivation backoff state for failed triggers.
//!
//! # Responsibilities
//! - Track one backoff state per workflow whose trigger failed to activate
//! - Double the delay on each consecutive failure, bounded by the policy
//! - Forget everything on success, suppress fires on cancel
//!
//! # Design Decisions
//! - Only timing state lives here; the caller owns the retry action
//! - Updates for one workflow are serialized by the map's shard lock and always
//!   computed from the stored value, never from a caller's snapshot
//! - Timers re-check `is_current` before acting, so a late fire after a
//!   cancel or success is a no-op

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::error::LifecycleError;
use crate::ids::WorkflowId;
use crate::observability::metrics;
use crate::resilience::backoff::BackoffPolicy;
use crate::time::Clock;

/// Backoff state of one workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactivationState {
    pub workflow_id: WorkflowId,
    pub current_delay: Duration,
    /// Consecutive failures since the last success.
    pub attempt: u32,
    pub next_fire_at: Instant,
    pub armed: bool,
}

impl ReactivationState {
    fn ticket(&self) -> ReactivationTicket {
        ReactivationTicket {
            workflow_id: self.workflow_id.clone(),
            attempt: self.attempt,
            delay: self.current_delay,
            fire_at: self.next_fire_at,
        }
    }
}

/// When the caller should retry, and which failure it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactivationTicket {
    pub workflow_id: WorkflowId,
    pub attempt: u32,
    pub delay: Duration,
    pub fire_at: Instant,
}

/// Computes and stores the next retry time for failed triggers.
pub struct ReactivationScheduler {
    policy: ArcSwap<BackoffPolicy>,
    clock: Arc<dyn Clock>,
    states: DashMap<WorkflowId, ReactivationState>,
}

impl ReactivationScheduler {
    pub fn new(policy: BackoffPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy: ArcSwap::from_pointee(policy),
            clock,
            states: DashMap::new(),
        }
    }

    pub fn policy(&self) -> BackoffPolicy {
        **self.policy.load()
    }

    /// Swap the policy; existing delays are clamped into the new window.
    pub fn set_policy(&self, policy: BackoffPolicy) {
        self.policy.store(Arc::new(policy));
        for mut state in self.states.iter_mut() {
            state.current_delay = policy.clamp(state.current_delay);
        }
        tracing::info!(
            initial = ?policy.initial(),
            max = ?policy.max(),
            "Reactivation backoff policy updated"
        );
    }

    /// Record an activation failure and arm the next retry.
    pub fn on_failure(&self, workflow_id: &WorkflowId) -> ReactivationTicket {
        let policy = self.policy();
        let now = self.clock.now();
        let mut state = self
            .states
            .entry(workflow_id.clone())
            .or_insert_with(|| ReactivationState {
                workflow_id: workflow_id.clone(),
                current_delay: policy.initial(),
                attempt: 0,
                next_fire_at: now,
                armed: false,
            });
        advance(&mut state, &policy, now)
    }

    /// Record the failure of the retry scheduled by `ticket`.
    ///
    /// Backoff only advances if `ticket` is still the current one; a stale
    /// report returns the current ticket unchanged. `None` means the workflow
    /// was cancelled or recovered in the meantime and must not be retried.
    pub fn on_retry_failure(&self, ticket: &ReactivationTicket) -> Option<ReactivationTicket> {
        let policy = self.policy();
        let now = self.clock.now();
        let mut state = self.states.get_mut(&ticket.workflow_id)?;
        if !state.armed || state.attempt != ticket.attempt {
            tracing::debug!(
                workflow_id = %ticket.workflow_id,
                reported = ticket.attempt,
                current = state.attempt,
                "Ignoring stale reactivation failure"
            );
            return Some(state.ticket());
        }
        Some(advance(&mut state, &policy, now))
    }

    /// Clear all backoff state after a successful activation.
    ///
    /// Returns whether the workflow had been failing.
    pub fn on_success(&self, workflow_id: &WorkflowId) -> bool {
        match self.states.remove(workflow_id) {
            Some((_, state)) => {
                tracing::info!(
                    workflow_id = %workflow_id,
                    attempts = state.attempt,
                    "Trigger recovered, backoff reset"
                );
                true
            }
            None => false,
        }
    }

    /// Drop the state of a deactivated or deleted workflow.
    pub fn cancel(&self, workflow_id: &WorkflowId) -> Result<ReactivationState, LifecycleError> {
        self.states
            .remove(workflow_id)
            .map(|(_, state)| state)
            .ok_or_else(|| LifecycleError::not_found("reactivation state", workflow_id))
    }

    /// Whether `ticket` still names the armed retry of its workflow.
    pub fn is_current(&self, ticket: &ReactivationTicket) -> bool {
        self.states
            .get(&ticket.workflow_id)
            .is_some_and(|s| s.armed && s.attempt == ticket.attempt)
    }

    pub fn state(&self, workflow_id: &WorkflowId) -> Option<ReactivationState> {
        self.states.get(workflow_id).map(|s| s.value().clone())
    }

    /// Number of workflows waiting for a retry.
    pub fn armed_count(&self) -> usize {
        self.states.iter().filter(|s| s.armed).count()
    }
}

fn advance(state: &mut ReactivationState, policy: &BackoffPolicy, now: Instant) -> ReactivationTicket {
    let delay = if state.armed {
        policy.next_delay(Some(state.current_delay))
    } else {
        policy.next_delay(None)
    };
    state.current_delay = delay;
    state.attempt = state.attempt.saturating_add(1);
    state.next_fire_at = now + delay;
    state.armed = true;

    tracing::warn!(
        workflow_id = %state.workflow_id,
        attempt = state.attempt,
        delay = ?delay,
        "Trigger activation failed, retry scheduled"
    );
    metrics::record_reactivation_scheduled(delay);
    state.ticket()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn scheduler(clock: &ManualClock) -> ReactivationScheduler {
        ReactivationScheduler::new(BackoffPolicy::default(), Arc::new(clock.clone()))
    }

    #[test]
    fn first_failure_uses_initial_delay() {
        let clock = ManualClock::new();
        let scheduler = scheduler(&clock);
        let wf = WorkflowId::from("wf-1");

        let ticket = scheduler.on_failure(&wf);
        assert_eq!(ticket.attempt, 1);
        assert_eq!(ticket.delay, Duration::from_secs(1));
        assert_eq!(ticket.fire_at, clock.now() + Duration::from_secs(1));
        assert!(scheduler.is_current(&ticket));
        assert_eq!(scheduler.armed_count(), 1);
    }

    #[test]
    fn fire_at_is_relative_to_failure_time() {
        let clock = ManualClock::new();
        let scheduler = scheduler(&clock);
        let wf = WorkflowId::from("wf-1");

        scheduler.on_failure(&wf);
        clock.advance(Duration::from_secs(10));
        let ticket = scheduler.on_failure(&wf);
        assert_eq!(ticket.fire_at, clock.now() + Duration::from_secs(2));
    }

    #[test]
    fn stale_retry_failure_does_not_double() {
        let clock = ManualClock::new();
        let scheduler = scheduler(&clock);
        let wf = WorkflowId::from("wf-1");

        let first = scheduler.on_failure(&wf);
        let second = scheduler.on_retry_failure(&first).unwrap();
        assert_eq!(second.delay, Duration::from_secs(2));

        // The same failure reported twice must not advance again.
        let again = scheduler.on_retry_failure(&first).unwrap();
        assert_eq!(again, second);
        assert!(!scheduler.is_current(&first));
    }

    #[test]
    fn cancel_suppresses_pending_fire() {
        let clock = ManualClock::new();
        let scheduler = scheduler(&clock);
        let wf = WorkflowId::from("wf-1");

        let ticket = scheduler.on_failure(&wf);
        let state = scheduler.cancel(&wf).unwrap();
        assert_eq!(state.attempt, 1);
        assert!(!scheduler.is_current(&ticket));
        assert!(scheduler.on_retry_failure(&ticket).is_none());
        assert!(matches!(
            scheduler.cancel(&wf),
            Err(LifecycleError::NotFound { .. })
        ));
    }

    #[test]
    fn policy_change_clamps_existing_state() {
        let clock = ManualClock::new();
        let scheduler = scheduler(&clock);
        let wf = WorkflowId::from("wf-1");
        for _ in 0..6 {
            scheduler.on_failure(&wf);
        }
        assert_eq!(scheduler.state(&wf).unwrap().current_delay, Duration::from_secs(32));

        let tighter = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(10)).unwrap();
        scheduler.set_policy(tighter);
        assert_eq!(scheduler.state(&wf).unwrap().current_delay, Duration::from_secs(10));
        assert_eq!(scheduler.on_failure(&wf).delay, Duration::from_secs(10));
    }

    #[test]
    fn concurrent_failures_are_linearized() {
        let clock = ManualClock::new();
        let scheduler = Arc::new(scheduler(&clock));
        let wf = WorkflowId::from("wf-hot");

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                let wf = wf.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        scheduler.on_failure(&wf);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let state = scheduler.state(&wf).unwrap();
        assert_eq!(state.attempt, 40);
        assert_eq!(state.current_delay, Duration::from_secs(86_400));
    }
}
