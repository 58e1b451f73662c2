//! Process wiring.
//!
//! # Data Flow
//! ```text
//! Application::build(config, source, entitlements)
//!     → clock, registry, coordinator, scheduler, activator, sessions, push hub
//!     → default shutdown bands registered
//!
//! Application::start(listener)  → HTTP server task + session sweeper task
//! Application::watch_config(p)  → reloads → ArcSwap<LifecycleConfig> + set_policy
//! Application::shutdown()       → coordinator.initiate(total deadline)
//!
//! Shutdown bands:
//!     200 "http"           stop listener, close pushes (1001), drain requests
//!     150 "triggers"       deactivate every trigger
//!     100 "test-webhooks"  stop sweeper, cancel pending sessions
//!       0 "config-watcher" stop watching the config file
//! ```
//!
//! # Design Decisions
//! - Every singleton is built once here and shared by `Arc`
//! - Background tasks stop through `watch` flags owned by their band

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use notify::RecommendedWatcher;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{ConfigWatcher, LifecycleConfig};
use crate::error::{BoxError, LifecycleError};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::{ShutdownCoordinator, ShutdownPriority, ShutdownRegistry, ShutdownReport};
use crate::net::close_code::CloseReason;
use crate::net::push::PushHub;
use crate::resilience::ReactivationScheduler;
use crate::time::{Clock, SystemClock};
use crate::triggers::{Entitlements, TriggerActivator, TriggerSource};
use crate::webhooks::{SessionSweeper, TestSessionManager};

pub const HTTP_BAND: &str = "http";
pub const TRIGGERS_BAND: &str = "triggers";
pub const TEST_WEBHOOKS_BAND: &str = "test-webhooks";
pub const CONFIG_WATCHER_BAND: &str = "config-watcher";

/// Between `Default` and `RunsFirst`: triggers stop after the listener and
/// before test sessions are cancelled.
pub const TRIGGERS_PRIORITY: ShutdownPriority = ShutdownPriority::Custom(150);

type ServerTask = Arc<Mutex<Option<JoinHandle<Result<(), std::io::Error>>>>>;

pub struct Application {
    config: Arc<ArcSwap<LifecycleConfig>>,
    registry: Arc<ShutdownRegistry>,
    coordinator: ShutdownCoordinator,
    scheduler: Arc<ReactivationScheduler>,
    activator: Arc<TriggerActivator>,
    sessions: Arc<TestSessionManager>,
    push: PushHub,
    http_stop: Arc<watch::Sender<bool>>,
    sweeper_stop: Arc<watch::Sender<bool>>,
    server_task: ServerTask,
    config_watcher: Arc<Mutex<Option<RecommendedWatcher>>>,
}

impl Application {
    pub fn build(
        config: LifecycleConfig,
        source: Arc<dyn TriggerSource>,
        entitlements: Arc<dyn Entitlements>,
    ) -> Result<Self, LifecycleError> {
        Self::build_with_clock(config, source, entitlements, Arc::new(SystemClock))
    }

    pub fn build_with_clock(
        config: LifecycleConfig,
        source: Arc<dyn TriggerSource>,
        entitlements: Arc<dyn Entitlements>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LifecycleError> {
        let policy = config.reactivation.policy()?;
        let handler_timeout = config.shutdown.handler_timeout();

        let registry = Arc::new(ShutdownRegistry::new());
        let coordinator = ShutdownCoordinator::new(Arc::clone(&registry), Arc::clone(&clock));
        let scheduler = Arc::new(ReactivationScheduler::new(policy, Arc::clone(&clock)));
        let activator = Arc::new(TriggerActivator::new(
            source,
            Arc::clone(&scheduler),
            entitlements,
            Arc::clone(&clock),
        ));
        let sessions = Arc::new(
            TestSessionManager::new(Arc::clone(&clock))
                .with_retired_ttl(config.test_webhooks.retired_ttl()),
        );

        let app = Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            registry,
            coordinator,
            scheduler,
            activator,
            sessions,
            push: PushHub::new(),
            http_stop: Arc::new(watch::channel(false).0),
            sweeper_stop: Arc::new(watch::channel(false).0),
            server_task: Arc::new(Mutex::new(None)),
            config_watcher: Arc::new(Mutex::new(None)),
        };
        app.register_bands(handler_timeout)?;
        Ok(app)
    }

    fn register_bands(&self, timeout: std::time::Duration) -> Result<(), LifecycleError> {
        let push = self.push.clone();
        let push_drain = timeout / 2;
        let http_stop = Arc::clone(&self.http_stop);
        let server_task = Arc::clone(&self.server_task);
        self.registry
            .register(HTTP_BAND, ShutdownPriority::RunsFirst, timeout, move || async move {
                // Stop accepting before anything below can stall.
                let _ = http_stop.send(true);
                push.close_all(CloseReason::GoingAway);
                if tokio::time::timeout(push_drain, push.drained()).await.is_err() {
                    tracing::warn!(
                        connections = push.connection_count(),
                        "Push connections still open, continuing shutdown"
                    );
                }
                let task = server_task.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(task) = task {
                    task.await??;
                }
                Ok::<(), BoxError>(())
            })?;

        let activator = Arc::clone(&self.activator);
        self.registry
            .register(TRIGGERS_BAND, TRIGGERS_PRIORITY, timeout, move || async move {
                let stopped = activator.deactivate_all().await;
                tracing::info!(triggers = stopped, "Triggers deactivated");
                Ok::<(), BoxError>(())
            })?;

        let sessions = Arc::clone(&self.sessions);
        let sweeper_stop = Arc::clone(&self.sweeper_stop);
        self.registry
            .register(TEST_WEBHOOKS_BAND, ShutdownPriority::Default, timeout, move || async move {
                let _ = sweeper_stop.send(true);
                let cancelled = sessions.cancel_all();
                tracing::info!(sessions = cancelled, "Pending test webhooks cancelled");
                Ok::<(), BoxError>(())
            })?;

        let config_watcher = Arc::clone(&self.config_watcher);
        self.registry
            .register(CONFIG_WATCHER_BAND, ShutdownPriority::RunsLast, timeout, move || async move {
                let watcher = config_watcher.lock().unwrap_or_else(PoisonError::into_inner).take();
                if watcher.is_some() {
                    tracing::info!("Config watcher stopped");
                }
                Ok::<(), BoxError>(())
            })?;

        Ok(())
    }

    /// Spawn the HTTP server and the session sweeper. Returns the bound address.
    pub async fn start(&self, listener: TcpListener) -> Result<SocketAddr, std::io::Error> {
        let addr = listener.local_addr()?;

        let server = HttpServer::new(AppState {
            coordinator: self.coordinator.clone(),
            sessions: Arc::clone(&self.sessions),
            push: self.push.clone(),
            config: Arc::clone(&self.config),
        });
        let task = tokio::spawn(server.run(listener, self.http_stop.subscribe()));
        *self.server_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        let interval = self.config.load().test_webhooks.sweep_interval();
        let sweeper = SessionSweeper::new(Arc::clone(&self.sessions), interval);
        tokio::spawn(sweeper.run(self.sweeper_stop.subscribe()));

        Ok(addr)
    }

    /// Watch `path` and apply every validated reload.
    pub fn watch_config(&self, path: &Path) -> Result<(), notify::Error> {
        let (watcher, mut updates) = ConfigWatcher::new(path);
        let handle = watcher.run()?;
        *self.config_watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        let config = Arc::clone(&self.config);
        let scheduler = Arc::clone(&self.scheduler);
        tokio::spawn(async move {
            // Ends once the watcher, and with it the sender, is dropped.
            while let Some(next) = updates.recv().await {
                apply_config(&config, &scheduler, next);
            }
        });
        Ok(())
    }

    /// Swap in a new configuration.
    pub fn reload(&self, next: LifecycleConfig) {
        apply_config(&self.config, &self.scheduler, next);
    }

    /// Run the shutdown bands with the configured total deadline.
    pub async fn shutdown(&self) -> ShutdownReport {
        let deadline = self.config.load().shutdown.total_deadline();
        self.coordinator.initiate(deadline).await
    }

    pub fn config(&self) -> Arc<LifecycleConfig> {
        self.config.load_full()
    }

    pub fn registry(&self) -> &Arc<ShutdownRegistry> {
        &self.registry
    }

    pub fn coordinator(&self) -> &ShutdownCoordinator {
        &self.coordinator
    }

    pub fn scheduler(&self) -> &Arc<ReactivationScheduler> {
        &self.scheduler
    }

    pub fn activator(&self) -> &Arc<TriggerActivator> {
        &self.activator
    }

    pub fn sessions(&self) -> &Arc<TestSessionManager> {
        &self.sessions
    }

    pub fn push(&self) -> &PushHub {
        &self.push
    }
}

fn apply_config(
    config: &ArcSwap<LifecycleConfig>,
    scheduler: &ReactivationScheduler,
    next: LifecycleConfig,
) {
    match next.reactivation.policy() {
        Ok(policy) => scheduler.set_policy(policy),
        Err(e) => tracing::warn!(error = %e, "Keeping current reactivation policy"),
    }
    config.store(Arc::new(next));
    tracing::info!("Configuration reloaded");
}
