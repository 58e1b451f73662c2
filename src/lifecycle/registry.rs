//! Shutdown group registry.
//!
//! # Responsibilities
//! - Hold teardown handlers grouped into bands keyed by priority
//! - Reject a second group claiming an already-owned priority
//! - Freeze itself when shutdown begins so late registrations fail loudly

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::{BoxError, LifecycleError};
use crate::lifecycle::priority::ShutdownPriority;

/// Future produced by a teardown handler.
pub type TeardownFuture = BoxFuture<'static, Result<(), BoxError>>;

type TeardownFn = Box<dyn FnOnce() -> TeardownFuture + Send>;

/// Handle returned by [`ShutdownRegistry::register`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerHandle {
    priority: u32,
    id: u64,
}

impl HandlerHandle {
    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for HandlerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}@{}", self.id, self.priority)
    }
}

/// A single registered teardown action.
pub struct TeardownHandler {
    pub(crate) handle: HandlerHandle,
    pub(crate) timeout: Duration,
    pub(crate) run: TeardownFn,
}

impl fmt::Debug for TeardownHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeardownHandler")
            .field("handle", &self.handle)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A band of handlers sharing one priority, run as a concurrent cohort.
#[derive(Debug)]
pub struct ShutdownGroup {
    pub(crate) priority: u32,
    pub(crate) label: String,
    pub(crate) handlers: Vec<TeardownHandler>,
}

impl ShutdownGroup {
    /// Longest handler timeout, which bounds the whole band.
    pub fn timeout(&self) -> Duration {
        self.handlers
            .iter()
            .map(|h| h.timeout)
            .max()
            .unwrap_or_default()
    }
}

/// Read-only view of a registered group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub priority: u32,
    pub label: String,
    pub handlers: usize,
    pub timeout: Duration,
}

#[derive(Default)]
struct RegistryInner {
    groups: BTreeMap<u32, ShutdownGroup>,
    next_id: u64,
    frozen: bool,
}

/// Holds shutdown groups from startup until shutdown begins.
///
/// Writes happen during startup, the single drain happens at shutdown. The
/// lock is held only for map updates, never while a handler runs.
#[derive(Default)]
pub struct ShutdownRegistry {
    inner: Mutex<RegistryInner>,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a teardown action in the group `label` at `priority`.
    ///
    /// Handlers registered with the same label and priority join one group.
    /// A different label at an occupied priority fails with
    /// [`LifecycleError::DuplicatePriority`].
    pub fn register<F, Fut>(
        &self,
        label: &str,
        priority: ShutdownPriority,
        timeout: Duration,
        run: F,
    ) -> Result<HandlerHandle, LifecycleError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        if timeout.is_zero() {
            return Err(LifecycleError::InvalidArgument(format!(
                "shutdown handler timeout for '{label}' must be non-zero"
            )));
        }

        let priority = priority.value();
        let mut inner = self.lock();
        if inner.frozen {
            return Err(LifecycleError::AlreadyShuttingDown);
        }

        if let Some(existing) = inner.groups.get(&priority) {
            if existing.label != label {
                return Err(LifecycleError::DuplicatePriority {
                    priority,
                    existing: existing.label.clone(),
                });
            }
        }

        inner.next_id += 1;
        let handle = HandlerHandle {
            priority,
            id: inner.next_id,
        };
        let handler = TeardownHandler {
            handle,
            timeout,
            run: Box::new(move || run().boxed()),
        };

        inner
            .groups
            .entry(priority)
            .or_insert_with(|| ShutdownGroup {
                priority,
                label: label.to_string(),
                handlers: Vec::new(),
            })
            .handlers
            .push(handler);

        tracing::debug!(%handle, label, ?timeout, "Registered shutdown handler");
        Ok(handle)
    }

    /// Remove a handler before shutdown begins.
    ///
    /// A group left without handlers is dropped and frees its priority.
    pub fn unregister(&self, handle: HandlerHandle) -> Result<(), LifecycleError> {
        let mut inner = self.lock();
        if inner.frozen {
            return Err(LifecycleError::AlreadyShuttingDown);
        }

        let group = inner
            .groups
            .get_mut(&handle.priority)
            .ok_or_else(|| LifecycleError::not_found("shutdown handler", handle))?;
        let before = group.handlers.len();
        group.handlers.retain(|h| h.handle != handle);
        if group.handlers.len() == before {
            return Err(LifecycleError::not_found("shutdown handler", handle));
        }

        if group.handlers.is_empty() {
            inner.groups.remove(&handle.priority);
        }

        tracing::debug!(%handle, "Unregistered shutdown handler");
        Ok(())
    }

    /// Groups in execution order (highest priority first).
    pub fn groups(&self) -> Vec<GroupSummary> {
        self.lock()
            .groups
            .values()
            .rev()
            .map(|g| GroupSummary {
                priority: g.priority,
                label: g.label.clone(),
                handlers: g.handlers.len(),
                timeout: g.timeout(),
            })
            .collect()
    }

    /// Whether shutdown has already drained the registry.
    pub fn is_frozen(&self) -> bool {
        self.lock().frozen
    }

    /// Freeze the registry and hand every group over, highest priority first.
    ///
    /// Returns `None` if the registry was already drained.
    pub(crate) fn drain_for_shutdown(&self) -> Option<Vec<ShutdownGroup>> {
        let mut inner = self.lock();
        if inner.frozen {
            return None;
        }
        inner.frozen = true;
        let groups = std::mem::take(&mut inner.groups);
        Some(groups.into_values().rev().collect())
    }
}
