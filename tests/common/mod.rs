//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::net::TcpListener;

use workflow_lifecycle::ids::WorkflowId;
use workflow_lifecycle::triggers::{StaticEntitlements, TriggerSource};
use workflow_lifecycle::{Application, BoxError, LifecycleConfig};

/// Trigger source that fails the first `failures` activations.
#[derive(Default)]
pub struct CountingSource {
    pub failures: u32,
    pub activations: AtomicU32,
    pub deactivations: AtomicU32,
}

impl CountingSource {
    pub fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            ..Self::default()
        })
    }
}

impl TriggerSource for CountingSource {
    fn activate(&self, _: &WorkflowId) -> BoxFuture<'static, Result<(), BoxError>> {
        let fail = self.activations.fetch_add(1, Ordering::SeqCst) < self.failures;
        async move {
            if fail {
                Err::<(), BoxError>("trigger endpoint unreachable".into())
            } else {
                Ok(())
            }
        }
        .boxed()
    }

    fn deactivate(&self, _: &WorkflowId) -> BoxFuture<'static, Result<(), BoxError>> {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }.boxed()
    }
}

/// Shared log of labels, appended to by shutdown handlers.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// A running server on an ephemeral port.
pub struct TestServer {
    pub app: Arc<Application>,
    pub addr: SocketAddr,
    pub source: Arc<CountingSource>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

pub fn test_config() -> LifecycleConfig {
    let mut config = LifecycleConfig::default();
    config.server.bind_address = "127.0.0.1:0".to_string();
    config.shutdown.total_deadline_secs = 5;
    config.shutdown.handler_timeout_secs = 2;
    config
}

pub async fn start_server(config: LifecycleConfig) -> TestServer {
    let listener = TcpListener::bind(&config.server.bind_address).await.unwrap();
    let source = CountingSource::failing(0);
    let app = Arc::new(
        Application::build(
            config,
            source.clone(),
            Arc::new(StaticEntitlements::unlimited()),
        )
        .unwrap(),
    );
    let addr = app.start(listener).await.unwrap();
    TestServer { app, addr, source }
}

/// Poll `condition` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
