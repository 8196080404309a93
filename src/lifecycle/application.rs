//! Application Bootstrap
//!
//! Ties a [`Graph`], a [`Lifecycle`] and a [`Shutdowner`] together: build the
//! graph, invoke the top-level components (which append their hooks as they
//! are constructed), then start, wait for a stop request, and stop.

use super::{
    Context, Lifecycle, LifecycleError, Phase, Result, ShutdownReceiver, Shutdowner, Signal,
    os_signal,
};
use crate::config::RuntimeConfig;
use crate::di::{Args, Graph, In, Injectable};
use crate::error::Error;
use crate::module::Module;
use std::future::Future;
use std::sync::Arc;

type Invoke = Box<dyn FnOnce(&Graph) -> crate::Result<()> + Send>;

/// A built application, ready to start
///
/// # Example
///
/// ```rust,ignore
/// use keystone::lifecycle::App;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let app = App::builder()
///         .config(RuntimeConfig::from_env()?)
///         .module::<StorageModule>()
///         .module::<HttpModule>()
///         .invoke("serve", In::new().with::<HttpServer>("server"), |_| Ok(()))
///         .build()?;
///
///     app.run().await?;
///     Ok(())
/// }
/// ```
pub struct App {
    graph: Arc<Graph>,
    lifecycle: Arc<Lifecycle>,
    shutdowner: Shutdowner,
    config: RuntimeConfig,
}

impl App {
    /// Create a new application builder
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    pub fn shutdowner(&self) -> &Shutdowner {
        &self.shutdowner
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Subscribe to stop requests
    pub fn done(&self) -> ShutdownReceiver {
        self.shutdowner.register()
    }

    /// Start under the configured start timeout
    pub async fn start(&self) -> Result<()> {
        let ctx = Context::background().with_timeout(self.config.start_timeout());
        self.start_with(&ctx).await
    }

    /// Start under `ctx`, rolling back on failure.
    ///
    /// If a start hook fails or `ctx` runs out, the hooks that did start are
    /// stopped under the configured stop timeout. The start error is returned
    /// as is, or wrapped in [`LifecycleError::Rollback`] together with the
    /// rollback error if stopping failed as well.
    pub async fn start_with(&self, ctx: &Context) -> Result<()> {
        let start = match self
            .watch(Phase::Start, ctx, self.lifecycle.start(ctx))
            .await
        {
            Ok(()) => {
                tracing::info!("running");
                return Ok(());
            }
            Err(err @ LifecycleError::InvalidTransition { .. }) => return Err(err),
            Err(err) => err,
        };

        tracing::error!(error = %start, "startup failed, rolling back");
        let rollback_ctx = Context::background().with_timeout(self.config.stop_timeout());
        if let Err(rollback) = self.stop_with(&rollback_ctx).await {
            tracing::error!(error = %rollback, "could not rollback cleanly");
            return Err(LifecycleError::Rollback {
                start: Box::new(start),
                rollback: Box::new(rollback),
            });
        }
        Err(start)
    }

    /// Stop under the configured stop timeout
    pub async fn stop(&self) -> Result<()> {
        let ctx = Context::background().with_timeout(self.config.stop_timeout());
        self.stop_with(&ctx).await
    }

    pub async fn stop_with(&self, ctx: &Context) -> Result<()> {
        let result = self
            .watch(Phase::Stop, ctx, self.lifecycle.stop(ctx))
            .await;
        if let Err(err) = &result {
            tracing::error!(error = %err, "failed to stop cleanly");
        }
        result
    }

    /// Start, block until a shutdown broadcast or an OS signal, then stop.
    pub async fn run(&self) -> Result<Signal> {
        let mut done = self.done();
        self.start().await?;

        let signal = wait_for_signal(&mut done).await;
        tracing::info!(%signal, "received signal");

        self.stop().await?;
        Ok(signal)
    }

    /// Drive one lifecycle pass and give up on it when `ctx` is done,
    /// reporting whichever hook was still executing.
    async fn watch<F>(&self, phase: Phase, ctx: &Context, pass: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        tokio::select! {
            biased;
            result = pass => result,
            reason = ctx.done() => {
                let caller = self.lifecycle.running_hook_caller();
                let records = self.lifecycle.hook_records(phase);
                tracing::error!(
                    %phase,
                    caller = caller.as_deref().unwrap_or("<none>"),
                    completed = %records,
                    "lifecycle timed out"
                );
                Err(LifecycleError::Timeout {
                    phase,
                    caller,
                    reason,
                    records,
                })
            }
        }
    }
}

async fn wait_for_signal(done: &mut ShutdownReceiver) -> Signal {
    tokio::select! {
        Some(signal) = done.recv() => signal,
        result = os_signal() => match result {
            Ok(signal) => signal,
            Err(err) => {
                tracing::error!(error = %err, "could not listen for OS signals");
                done.recv().await.unwrap_or(Signal::Terminate)
            }
        },
    }
}

/// Builder for App
///
/// Registration errors do not interrupt the chain; the first one is kept and
/// returned from [`build`](AppBuilder::build).
pub struct AppBuilder {
    graph: Graph,
    lifecycle: Arc<Lifecycle>,
    shutdowner: Shutdowner,
    config: RuntimeConfig,
    invokes: Vec<Invoke>,
    error: Option<Error>,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    /// The graph starts out holding the [`Lifecycle`] and the [`Shutdowner`]
    /// so constructors can depend on them.
    pub fn new() -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        let shutdowner = Shutdowner::new();

        Self {
            graph: Graph::new(),
            lifecycle: Arc::clone(&lifecycle),
            shutdowner: shutdowner.clone(),
            config: RuntimeConfig::default(),
            invokes: Vec::new(),
            error: None,
        }
        .record_with(|graph| graph.register_shared(lifecycle))
        .record_with(|graph| graph.register_value(shutdowner))
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Register everything in module `M`
    pub fn module<M: Module>(self) -> Self {
        self.record_with(M::register)
    }

    /// Register an already constructed value
    pub fn supply<T: 'static + Send + Sync>(self, value: T) -> Self {
        self.record_with(|graph| graph.register_value(value))
    }

    pub fn supply_named<T: 'static + Send + Sync>(self, name: &str, value: T) -> Self {
        self.record_with(|graph| graph.register_named_value(name, value))
    }

    /// Register a constructor; it runs only if something resolves `T`
    pub fn provide<T, F>(self, inputs: In, constructor: F) -> Self
    where
        T: 'static + Send + Sync,
        F: Fn(&Args) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.record_with(|graph| graph.register_constructor(inputs, constructor))
    }

    pub fn provide_named<T, F>(self, name: &str, inputs: In, constructor: F) -> Self
    where
        T: 'static + Send + Sync,
        F: Fn(&Args) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.record_with(|graph| graph.register_named_constructor(name, inputs, constructor))
    }

    pub fn injectable<T: Injectable>(self) -> Self {
        self.record_with(Graph::register::<T>)
    }

    /// Run `function` against its resolved inputs during [`build`](Self::build),
    /// in the order invokes were added
    pub fn invoke<F>(mut self, name: impl Into<String>, inputs: In, function: F) -> Self
    where
        F: FnOnce(&Args) -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        self.invokes
            .push(Box::new(move |graph| graph.invoke(&name, &inputs, function)));
        self
    }

    /// Build the application
    ///
    /// # Errors
    ///
    /// Returns the first registration error, or the first invoke that
    /// failed. Invokes after a failed one do not run.
    pub fn build(self) -> crate::Result<App> {
        if let Some(err) = self.error {
            tracing::error!(error = %err, "error encountered while applying options");
            return Err(err);
        }

        for invoke in self.invokes {
            invoke(&self.graph)?;
        }

        Ok(App {
            graph: Arc::new(self.graph),
            lifecycle: self.lifecycle,
            shutdowner: self.shutdowner,
            config: self.config,
        })
    }

    fn record_with<F>(self, register: F) -> Self
    where
        F: FnOnce(&Graph) -> crate::Result<()>,
    {
        if self.error.is_some() {
            return self;
        }
        let result = register(&self.graph);
        self.record(result)
    }

    fn record(mut self, result: crate::Result<()>) -> Self {
        if let Err(err) = result {
            self.error.get_or_insert(err);
        }
        self
    }
}
