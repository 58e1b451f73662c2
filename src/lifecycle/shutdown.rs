//! Shutdown coordination for the server.
//!
//! # Responsibilities
//! - Drain the registry and run bands in strictly descending priority
//! - Fan out the handlers of one band and join on completion or deadline
//! - Enforce the total deadline and report what did not finish
//! - Publish the shutdown phase for health checks

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::error::LifecycleError;
use crate::lifecycle::registry::{HandlerHandle, ShutdownGroup, ShutdownRegistry, TeardownHandler};
use crate::observability::metrics;
use crate::time::Clock;

/// Phase of the process-wide shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    NotStarted,
    InProgress,
    Completed,
    TimedOut,
}

/// Snapshot of the shutdown state, published to health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownState {
    pub phase: ShutdownPhase,
    pub started_at: Option<Instant>,
    /// Priorities of the groups that ran to completion.
    pub completed_groups: BTreeSet<u32>,
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self {
            phase: ShutdownPhase::NotStarted,
            started_at: None,
            completed_groups: BTreeSet::new(),
        }
    }
}

/// How one handler ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Ok,
    Failed(String),
    /// Abandoned after its timeout elapsed.
    TimedOut,
}

impl HandlerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerOutcome::Ok => "ok",
            HandlerOutcome::Failed(_) => "failed",
            HandlerOutcome::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerReport {
    pub handle: HandlerHandle,
    pub outcome: HandlerOutcome,
    pub elapsed: Duration,
}

/// Result of running one band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub priority: u32,
    pub label: String,
    pub handlers: Vec<HandlerReport>,
    pub elapsed: Duration,
}

/// A band that had not finished when the total deadline elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnfinishedGroup {
    pub priority: u32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Completed,
    /// The host should force-exit; these bands never finished.
    TimedOut { unfinished: Vec<UnfinishedGroup> },
}

/// Everything the coordinator observed during one shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub outcome: ShutdownOutcome,
    /// Finished bands in execution order.
    pub groups: Vec<GroupReport>,
    pub deadline: Duration,
    pub elapsed: Duration,
}

impl ShutdownReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == ShutdownOutcome::Completed
    }

    /// Priorities of the finished bands, in the order they ran.
    pub fn execution_order(&self) -> Vec<u32> {
        self.groups.iter().map(|g| g.priority).collect()
    }

    /// Handlers that failed or were abandoned.
    pub fn failed_handlers(&self) -> impl Iterator<Item = (&GroupReport, &HandlerReport)> {
        self.groups.iter().flat_map(|g| {
            g.handlers
                .iter()
                .filter(|h| h.outcome != HandlerOutcome::Ok)
                .map(move |h| (g, h))
        })
    }

    /// `Err(TimedOut)` unless every band finished inside the deadline.
    pub fn ensure_completed(&self) -> Result<(), LifecycleError> {
        match self.outcome {
            ShutdownOutcome::Completed => Ok(()),
            ShutdownOutcome::TimedOut { .. } => Err(LifecycleError::TimedOut(self.deadline)),
        }
    }
}

type SharedReport = Shared<BoxFuture<'static, ShutdownReport>>;

struct CoordinatorInner {
    registry: Arc<ShutdownRegistry>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<ShutdownState>,
    run: Mutex<Option<SharedReport>>,
}

/// Drives the registered bands at shutdown time.
///
/// Construct one per process and hand clones to whoever needs to trigger
/// shutdown or observe its phase.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<ShutdownRegistry>, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(ShutdownState::default());
        Self {
            inner: Arc::new(CoordinatorInner {
                registry,
                clock,
                state,
                run: Mutex::new(None),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ShutdownRegistry> {
        &self.inner.registry
    }

    /// Run every band once, bounded by `total_deadline`.
    ///
    /// Only the first call executes. Concurrent and later calls wait for and
    /// return that execution's report. The run lives in its own task, so a
    /// caller dropping this future does not abort the shutdown.
    pub async fn initiate(&self, total_deadline: Duration) -> ShutdownReport {
        let run = {
            let mut slot = self.inner.run.lock().unwrap_or_else(PoisonError::into_inner);
            slot.get_or_insert_with(|| {
                let started = tokio::time::Instant::now();
                let groups = self.inner.begin();
                let inner = Arc::clone(&self.inner);
                let task = tokio::spawn(async move {
                    inner.execute(groups, started, total_deadline).await
                });
                let fallback = Arc::clone(&self.inner);
                async move {
                    task.await.unwrap_or_else(|e| {
                        tracing::error!(error = %e, "Shutdown task aborted");
                        fallback.state.send_modify(|s| s.phase = ShutdownPhase::TimedOut);
                        ShutdownReport {
                            outcome: ShutdownOutcome::TimedOut { unfinished: Vec::new() },
                            groups: Vec::new(),
                            deadline: total_deadline,
                            elapsed: Duration::ZERO,
                        }
                    })
                }
                .boxed()
                .shared()
            })
            .clone()
        };
        run.await
    }

    pub fn state(&self) -> ShutdownState {
        self.inner.state.borrow().clone()
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.inner.state.borrow().phase
    }

    /// Whether new work should be refused.
    pub fn is_shutting_down(&self) -> bool {
        self.phase() != ShutdownPhase::NotStarted
    }

    /// Watch the shutdown state.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.inner.state.subscribe()
    }
}

impl CoordinatorInner {
    /// Flip to `InProgress` and take the groups out of the registry.
    fn begin(&self) -> Vec<ShutdownGroup> {
        let started_at = self.clock.now();
        self.state.send_modify(|s| {
            s.phase = ShutdownPhase::InProgress;
            s.started_at = Some(started_at);
        });
        self.registry.drain_for_shutdown().unwrap_or_default()
    }

    async fn execute(
        &self,
        groups: Vec<ShutdownGroup>,
        started: tokio::time::Instant,
        total_deadline: Duration,
    ) -> ShutdownReport {
        let deadline_at = started + total_deadline;
        tracing::info!(
            groups = groups.len(),
            deadline = ?total_deadline,
            "Shutdown initiated"
        );

        let mut reports = Vec::with_capacity(groups.len());
        let mut pending = groups.into_iter();
        while let Some(group) = pending.next() {
            let priority = group.priority;
            let label = group.label.clone();
            tracing::info!(
                priority,
                label = %label,
                handlers = group.handlers.len(),
                timeout = ?group.timeout(),
                "Shutting down group"
            );

            match tokio::time::timeout_at(deadline_at, run_group(group)).await {
                Ok(report) => {
                    tracing::info!(
                        priority,
                        label = %label,
                        elapsed = ?report.elapsed,
                        "Shutdown group finished"
                    );
                    self.state.send_modify(|s| {
                        s.completed_groups.insert(priority);
                    });
                    reports.push(report);
                }
                Err(_) => {
                    let unfinished: Vec<UnfinishedGroup> =
                        std::iter::once(UnfinishedGroup { priority, label })
                            .chain(pending.by_ref().map(|g| UnfinishedGroup {
                                priority: g.priority,
                                label: g.label,
                            }))
                            .collect();
                    for group in &unfinished {
                        tracing::error!(
                            priority = group.priority,
                            label = %group.label,
                            "Shutdown group did not finish before the deadline"
                        );
                    }
                    self.state.send_modify(|s| s.phase = ShutdownPhase::TimedOut);
                    let elapsed = started.elapsed();
                    metrics::record_shutdown_duration(elapsed, false);
                    return ShutdownReport {
                        outcome: ShutdownOutcome::TimedOut { unfinished },
                        groups: reports,
                        deadline: total_deadline,
                        elapsed,
                    };
                }
            }
        }

        self.state.send_modify(|s| s.phase = ShutdownPhase::Completed);
        let elapsed = started.elapsed();
        metrics::record_shutdown_duration(elapsed, true);
        tracing::info!(elapsed = ?elapsed, "Shutdown completed");
        ShutdownReport {
            outcome: ShutdownOutcome::Completed,
            groups: reports,
            deadline: total_deadline,
            elapsed,
        }
    }
}

/// Run every handler of a band concurrently, each raced against its timeout.
///
/// The `JoinSet` aborts whatever is still running when it is dropped, so an
/// abandoned handler cannot outlive its band.
async fn run_group(group: ShutdownGroup) -> GroupReport {
    let started = tokio::time::Instant::now();
    let ShutdownGroup {
        priority,
        label,
        handlers,
    } = group;

    let mut tasks = JoinSet::new();
    let mut spawned = HashMap::new();
    for TeardownHandler { handle, timeout, run } in handlers {
        let abort = tasks.spawn(async move {
            let started = tokio::time::Instant::now();
            let outcome = match tokio::time::timeout(timeout, run()).await {
                Ok(Ok(())) => HandlerOutcome::Ok,
                Ok(Err(e)) => HandlerOutcome::Failed(e.to_string()),
                Err(_) => HandlerOutcome::TimedOut,
            };
            HandlerReport {
                handle,
                outcome,
                elapsed: started.elapsed(),
            }
        });
        spawned.insert(abort.id(), handle);
    }

    let mut reports = Vec::with_capacity(spawned.len());
    while let Some(joined) = tasks.join_next().await {
        let report = match joined {
            Ok(report) => report,
            Err(e) => {
                let Some(handle) = spawned.get(&e.id()).copied() else {
                    continue;
                };
                HandlerReport {
                    handle,
                    outcome: HandlerOutcome::Failed(format!("handler panicked: {e}")),
                    elapsed: started.elapsed(),
                }
            }
        };

        match &report.outcome {
            HandlerOutcome::Ok => {}
            HandlerOutcome::Failed(reason) => tracing::warn!(
                handle = %report.handle,
                label = %label,
                reason = %reason,
                "Shutdown handler failed"
            ),
            HandlerOutcome::TimedOut => tracing::warn!(
                handle = %report.handle,
                label = %label,
                "Shutdown handler timed out and was abandoned"
            ),
        }
        metrics::record_shutdown_handler(&label, report.outcome.as_str());
        reports.push(report);
    }
    reports.sort_by_key(|r| r.handle);

    GroupReport {
        priority,
        label,
        handlers: reports,
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::lifecycle::priority::ShutdownPriority;
    use crate::time::SystemClock;

    fn coordinator() -> ShutdownCoordinator {
        ShutdownCoordinator::new(Arc::new(ShutdownRegistry::new()), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn empty_registry_completes_immediately() {
        let coordinator = coordinator();
        assert_eq!(coordinator.phase(), ShutdownPhase::NotStarted);

        let report = coordinator.initiate(Duration::from_secs(1)).await;
        assert!(report.is_completed());
        assert!(report.groups.is_empty());
        assert_eq!(coordinator.phase(), ShutdownPhase::Completed);
        assert!(coordinator.state().started_at.is_some());
    }

    #[tokio::test]
    async fn failed_handler_is_recorded_not_propagated() {
        let coordinator = coordinator();
        coordinator
            .registry()
            .register("flaky", ShutdownPriority::Default, Duration::from_secs(1), || async {
                Err::<(), BoxError>("disk gone".into())
            })
            .unwrap();

        let report = coordinator.initiate(Duration::from_secs(5)).await;
        assert!(report.is_completed());
        assert_eq!(
            report.groups[0].handlers[0].outcome,
            HandlerOutcome::Failed("disk gone".into())
        );
        assert_eq!(report.failed_handlers().count(), 1);
    }

    #[tokio::test]
    async fn panicking_handler_is_recorded_as_failed() {
        let coordinator = coordinator();
        coordinator
            .registry()
            .register("boom", ShutdownPriority::Default, Duration::from_secs(1), || async {
                if true {
                    panic!("handler exploded");
                }
                Ok::<(), BoxError>(())
            })
            .unwrap();

        let report = coordinator.initiate(Duration::from_secs(5)).await;
        assert!(report.is_completed());
        assert!(matches!(
            report.groups[0].handlers[0].outcome,
            HandlerOutcome::Failed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_completed_maps_timeout_to_error() {
        let coordinator = coordinator();
        coordinator
            .registry()
            .register("stuck", ShutdownPriority::Default, Duration::from_secs(60), || {
                std::future::pending::<Result<(), BoxError>>()
            })
            .unwrap();

        let report = coordinator.initiate(Duration::from_secs(2)).await;
        assert_eq!(
            report.ensure_completed(),
            Err(LifecycleError::TimedOut(Duration::from_secs(2)))
        );
        assert_eq!(coordinator.phase(), ShutdownPhase::TimedOut);
    }
}
