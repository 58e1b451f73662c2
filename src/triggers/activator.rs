//! Trigger activation with backoff-driven retries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::task::AbortHandle;

use crate::error::{BoxError, LifecycleError};
use crate::ids::WorkflowId;
use crate::resilience::{ReactivationScheduler, ReactivationTicket};
use crate::time::Clock;
use crate::triggers::entitlements::{Entitlements, TRIGGER_LIMIT};

/// Whatever actually subscribes a workflow's trigger (poller, webhook, ...).
pub trait TriggerSource: Send + Sync {
    fn activate(&self, workflow_id: &WorkflowId) -> BoxFuture<'static, Result<(), BoxError>>;

    fn deactivate(&self, workflow_id: &WorkflowId) -> BoxFuture<'static, Result<(), BoxError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationStatus {
    Activated,
    /// Activation failed; a retry is armed.
    RetryScheduled { attempt: u32, next_fire_at: Instant },
    /// Deactivated while the activation was in flight; the trigger was
    /// taken down again.
    Withdrawn,
}

/// A quota slot held by an active trigger or an activation in flight.
struct TriggerSlot {
    claim: u64,
    active: bool,
}

/// The slot an activation attempt works under.
struct Claim {
    id: u64,
    /// Taken by this attempt rather than shared with an existing one.
    fresh: bool,
}

struct RetryTask {
    generation: u64,
    abort: AbortHandle,
}

/// Activates triggers and keeps retrying failed ones on the backoff schedule.
pub struct TriggerActivator {
    source: Arc<dyn TriggerSource>,
    scheduler: Arc<ReactivationScheduler>,
    entitlements: Arc<dyn Entitlements>,
    clock: Arc<dyn Clock>,
    slots: DashMap<WorkflowId, TriggerSlot>,
    /// Makes the quota check and taking a slot one step.
    quota_lock: Mutex<()>,
    retries: DashMap<WorkflowId, RetryTask>,
    next_id: AtomicU64,
}

impl TriggerActivator {
    pub fn new(
        source: Arc<dyn TriggerSource>,
        scheduler: Arc<ReactivationScheduler>,
        entitlements: Arc<dyn Entitlements>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            scheduler,
            entitlements,
            clock,
            slots: DashMap::new(),
            quota_lock: Mutex::new(()),
            retries: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn scheduler(&self) -> &Arc<ReactivationScheduler> {
        &self.scheduler
    }

    /// Activate the trigger of `workflow_id`.
    ///
    /// A failed activation is not an error: it arms a retry and reports when
    /// it will fire. Only the licensed trigger quota refuses outright.
    pub async fn activate(
        self: &Arc<Self>,
        workflow_id: &WorkflowId,
    ) -> Result<ActivationStatus, LifecycleError> {
        let claim = self.claim_slot(workflow_id)?;

        match self.source.activate(workflow_id).await {
            Ok(()) => {
                if !self.promote(workflow_id, &claim) {
                    self.withdraw(workflow_id).await;
                    return Ok(ActivationStatus::Withdrawn);
                }
                self.scheduler.on_success(workflow_id);
                if let Some((_, retry)) = self.retries.remove(workflow_id) {
                    retry.abort.abort();
                }
                tracing::info!(workflow_id = %workflow_id, "Trigger activated");
                Ok(ActivationStatus::Activated)
            }
            Err(e) => {
                self.release_slot(workflow_id, &claim);
                tracing::warn!(workflow_id = %workflow_id, error = %e, "Trigger activation failed");
                let ticket = self.scheduler.on_failure(workflow_id);
                let status = ActivationStatus::RetryScheduled {
                    attempt: ticket.attempt,
                    next_fire_at: ticket.fire_at,
                };
                self.spawn_retry(ticket);
                Ok(status)
            }
        }
    }

    /// Deactivate a trigger and drop any pending retry.
    ///
    /// An activation still in flight loses its slot and withdraws the
    /// trigger itself once it completes.
    pub async fn deactivate(&self, workflow_id: &WorkflowId) -> Result<(), LifecycleError> {
        let had_backoff = self.scheduler.cancel(workflow_id).is_ok();
        if let Some((_, retry)) = self.retries.remove(workflow_id) {
            retry.abort.abort();
        }
        let slot = self.slots.remove(workflow_id).map(|(_, slot)| slot);

        if slot.is_none() && !had_backoff {
            return Err(LifecycleError::not_found("trigger", workflow_id));
        }

        if slot.is_some_and(|s| s.active) {
            if let Err(e) = self.source.deactivate(workflow_id).await {
                tracing::warn!(workflow_id = %workflow_id, error = %e, "Trigger deactivation failed");
            }
        }
        tracing::info!(workflow_id = %workflow_id, "Trigger deactivated");
        Ok(())
    }

    /// Deactivate every active, activating or retrying trigger. Returns how many.
    pub async fn deactivate_all(&self) -> usize {
        let mut ids: Vec<WorkflowId> = self.slots.iter().map(|s| s.key().clone()).collect();
        ids.extend(self.retries.iter().map(|r| r.key().clone()));
        ids.sort();
        ids.dedup();

        let mut deactivated = 0;
        for id in ids {
            if self.deactivate(&id).await.is_ok() {
                deactivated += 1;
            }
        }
        deactivated
    }

    pub fn is_active(&self, workflow_id: &WorkflowId) -> bool {
        self.slots.get(workflow_id).is_some_and(|s| s.active)
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.active).count()
    }

    /// Workflows with a retry task waiting or running.
    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }

    /// Take a quota slot for `workflow_id`, or share the one it already holds.
    fn claim_slot(&self, workflow_id: &WorkflowId) -> Result<Claim, LifecycleError> {
        let _quota = self.quota_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = self.slots.get(workflow_id) {
            return Ok(Claim {
                id: slot.claim,
                fresh: false,
            });
        }

        if let Some(limit) = self.entitlements.quota(TRIGGER_LIMIT) {
            if self.slots.len() as u64 >= limit {
                tracing::warn!(workflow_id = %workflow_id, limit, "Active trigger quota reached");
                return Err(LifecycleError::QuotaExceeded {
                    quota: TRIGGER_LIMIT,
                    limit,
                });
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.insert(
            workflow_id.clone(),
            TriggerSlot {
                claim: id,
                active: false,
            },
        );
        Ok(Claim { id, fresh: true })
    }

    fn release_slot(&self, workflow_id: &WorkflowId, claim: &Claim) {
        if claim.fresh {
            self.slots
                .remove_if(workflow_id, |_, s| s.claim == claim.id && !s.active);
        }
    }

    /// Mark the claimed slot active. False once a deactivation took the slot.
    fn promote(&self, workflow_id: &WorkflowId, claim: &Claim) -> bool {
        match self.slots.get_mut(workflow_id) {
            Some(mut slot) if slot.claim == claim.id => {
                slot.active = true;
                true
            }
            _ => false,
        }
    }

    /// Undo an activation that completed after its workflow was deactivated.
    async fn withdraw(&self, workflow_id: &WorkflowId) {
        tracing::info!(workflow_id = %workflow_id, "Trigger deactivated during activation, withdrawing");
        if let Err(e) = self.source.deactivate(workflow_id).await {
            tracing::warn!(workflow_id = %workflow_id, error = %e, "Trigger deactivation failed");
        }
    }

    fn spawn_retry(self: &Arc<Self>, ticket: ReactivationTicket) {
        let generation = self.next_id.fetch_add(1, Ordering::Relaxed);
        let this = Arc::clone(self);
        // The entry stays locked until the handle is stored, so the task
        // cannot unregister itself before it is registered.
        match self.retries.entry(ticket.workflow_id.clone()) {
            Entry::Occupied(mut entry) => {
                let task = tokio::spawn(async move { this.retry_loop(ticket, generation).await });
                let previous = entry.insert(RetryTask {
                    generation,
                    abort: task.abort_handle(),
                });
                previous.abort.abort();
            }
            Entry::Vacant(entry) => {
                let task = tokio::spawn(async move { this.retry_loop(ticket, generation).await });
                entry.insert(RetryTask {
                    generation,
                    abort: task.abort_handle(),
                });
            }
        }
    }

    async fn retry_loop(self: Arc<Self>, ticket: ReactivationTicket, generation: u64) {
        let workflow_id = ticket.workflow_id.clone();
        self.retry_until_settled(ticket).await;
        self.retries
            .remove_if(&workflow_id, |_, r| r.generation == generation);
    }

    async fn retry_until_settled(&self, mut ticket: ReactivationTicket) {
        loop {
            let wait = ticket.fire_at.saturating_duration_since(self.clock.now());
            tokio::time::sleep(wait).await;

            // Cancelled, recovered or re-armed elsewhere while we slept.
            if !self.scheduler.is_current(&ticket) {
                return;
            }

            let claim = match self.claim_slot(&ticket.workflow_id) {
                Ok(claim) => claim,
                Err(e) => {
                    tracing::warn!(workflow_id = %ticket.workflow_id, error = %e, "Giving up on trigger reactivation");
                    let _ = self.scheduler.cancel(&ticket.workflow_id);
                    return;
                }
            };

            match self.source.activate(&ticket.workflow_id).await {
                Ok(()) => {
                    let current = self.scheduler.on_success(&ticket.workflow_id);
                    if current && self.promote(&ticket.workflow_id, &claim) {
                        tracing::info!(
                            workflow_id = %ticket.workflow_id,
                            attempt = ticket.attempt,
                            "Trigger reactivated"
                        );
                    } else if !self.is_active(&ticket.workflow_id) {
                        self.release_slot(&ticket.workflow_id, &claim);
                        self.withdraw(&ticket.workflow_id).await;
                    }
                    return;
                }
                Err(e) => {
                    self.release_slot(&ticket.workflow_id, &claim);
                    tracing::warn!(
                        workflow_id = %ticket.workflow_id,
                        attempt = ticket.attempt,
                        error = %e,
                        "Trigger reactivation failed"
                    );
                    match self.scheduler.on_retry_failure(&ticket) {
                        Some(next) => ticket = next,
                        None => return,
                    }
                }
            }
        }
    }
}
