//! Test helpers for keystone
//!
//! Wrappers around [`Lifecycle`] and [`App`] whose `require_*` methods panic
//! with the full error instead of returning it, so a test reads as a straight
//! line of steps.

use keystone::lifecycle::{App, Context, Hook, Lifecycle, LifecycleError};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied by the `require_*` helpers
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Install a tracing subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_target(false)
        .try_init();
}

/// A [`Lifecycle`] for tests
#[derive(Default)]
pub struct TestLifecycle {
    inner: Arc<Lifecycle>,
}

impl TestLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a lifecycle that is shared with code under test
    pub fn from_shared(inner: Arc<Lifecycle>) -> Self {
        Self { inner }
    }

    pub fn shared(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.inner)
    }

    /// Append a hook, panicking on a blank caller
    #[track_caller]
    pub fn append(&self, hook: Hook) {
        if let Err(err) = self.inner.append(hook) {
            panic!("append failed: {}", report(err));
        }
    }

    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.inner.start(&timeout_context()).await
    }

    pub async fn stop(&self) -> Result<(), LifecycleError> {
        self.inner.stop(&timeout_context()).await
    }

    /// Start, panicking if any hook fails
    pub async fn require_start(&self) -> &Self {
        if let Err(err) = self.start().await {
            panic!("lifecycle did not start cleanly: {}", report(err));
        }
        self
    }

    /// Stop, panicking if any hook fails
    pub async fn require_stop(&self) {
        if let Err(err) = self.stop().await {
            panic!("lifecycle did not stop cleanly: {}", report(err));
        }
    }
}

impl Deref for TestLifecycle {
    type Target = Lifecycle;

    fn deref(&self) -> &Lifecycle {
        &self.inner
    }
}

/// An [`App`] for tests
pub struct TestApp {
    app: App,
}

impl TestApp {
    pub fn new(app: App) -> Self {
        init_tracing();
        Self { app }
    }

    pub fn into_inner(self) -> App {
        self.app
    }

    pub async fn require_start(&self) -> &Self {
        if let Err(err) = self.app.start().await {
            panic!("app did not start cleanly: {}", report(err));
        }
        self
    }

    pub async fn require_stop(&self) {
        if let Err(err) = self.app.stop().await {
            panic!("app did not stop cleanly: {}", report(err));
        }
    }
}

impl Deref for TestApp {
    type Target = App;

    fn deref(&self) -> &App {
        &self.app
    }
}

impl From<App> for TestApp {
    fn from(app: App) -> Self {
        Self::new(app)
    }
}

/// The error with its whole cause chain, `outer: inner: ...`
fn report(err: LifecycleError) -> String {
    format!("{:#}", anyhow::Error::from(err))
}

fn timeout_context() -> Context {
    Context::background().with_timeout(DEFAULT_TIMEOUT)
}
