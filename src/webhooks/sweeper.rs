//! Periodic reaping of expired test sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::webhooks::sessions::TestSessionManager;

/// Background loop calling [`TestSessionManager::sweep_now`] on a fixed interval.
pub struct SessionSweeper {
    sessions: Arc<TestSessionManager>,
    interval: Duration,
}

impl SessionSweeper {
    pub fn new(sessions: Arc<TestSessionManager>, interval: Duration) -> Self {
        Self { sessions, interval }
    }

    /// Run until `stop` flips to `true` or its sender is dropped.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        tracing::info!(interval = ?self.interval, "Test session sweeper starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let expired = self.sessions.sweep_now();
                    if !expired.is_empty() {
                        tracing::debug!(
                            expired = expired.len(),
                            pending = self.sessions.pending_count(),
                            "Swept test sessions"
                        );
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        tracing::info!("Test session sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        }
    }
}
