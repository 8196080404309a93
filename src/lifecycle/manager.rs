//! Lifecycle Coordinator
//!
//! Runs start hooks in registration order and stop hooks in reverse, keeping
//! enough bookkeeping that a watchdog can tell which hook is hung.

use super::{
    Context, Hook, HookFn, HookRecord, HookRecords, LifecycleError, Result, StopFailures,
};
use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::time::Instant;

/// Where a lifecycle is between start and stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum LifecycleState {
    #[strum(serialize = "not started")]
    NotStarted,
    #[strum(serialize = "starting")]
    Starting,
    #[strum(serialize = "started")]
    Started,
    #[strum(serialize = "start failed")]
    StartFailed,
    #[strum(serialize = "stopping")]
    Stopping,
    #[strum(serialize = "stopped")]
    Stopped,
}

/// Which pass a hook, record or error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Phase {
    #[strum(serialize = "start")]
    Start,
    #[strum(serialize = "stop")]
    Stop,
}

/// A hook after it has been appended, attribution resolved
struct Registered {
    on_start: Option<HookFn>,
    on_stop: Option<HookFn>,
    caller: String,
}

/// Fields a diagnostic reader may look at while a hook runs.
#[derive(Default)]
struct Status {
    state: Option<LifecycleState>,
    num_started: usize,
    running: Option<String>,
    start_records: HookRecords,
    stop_records: HookRecords,
}

/// Coordinates the start and stop hooks of every long-lived component
///
/// The Lifecycle is responsible for:
/// - Running start hooks in registration order, halting on the first failure
/// - Running stop hooks in reverse, only for hooks whose start completed
/// - Continuing past stop failures and reporting them together
/// - Recording how long each hook took and which one is running right now
///
/// Hooks never run concurrently with each other. The diagnostics lock is
/// never held while a hook runs, so [`running_hook_caller`] stays readable
/// from another task even if a hook hangs.
///
/// [`running_hook_caller`]: Lifecycle::running_hook_caller
///
/// # Example
///
/// ```rust,ignore
/// use keystone::lifecycle::{Context, Hook, Lifecycle};
///
/// let lifecycle = Lifecycle::new();
/// lifecycle.append(Hook::service(db.clone()))?;
/// lifecycle.append(Hook::service(server.clone()))?;
///
/// let ctx = Context::background().with_timeout(Duration::from_secs(15));
/// lifecycle.start(&ctx).await?;
/// // ... application runs ...
/// lifecycle.stop(&ctx).await?;
/// ```
pub struct Lifecycle {
    hooks: RwLock<Vec<Arc<Registered>>>,
    /// Serializes start and stop passes.
    gate: tokio::sync::Mutex<()>,
    status: Mutex<Status>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
            gate: tokio::sync::Mutex::new(()),
            status: Mutex::new(Status::default()),
        }
    }

    /// Append a hook. Order matters: later hooks may rely on earlier ones
    /// having started, and are stopped before them.
    ///
    /// Without an explicit [`Hook::caller`], the hook is attributed to the
    /// `file:line` that called `append`.
    ///
    /// # Errors
    /// Returns [`LifecycleError::BlankCaller`] if the explicit attribution is
    /// empty or whitespace.
    #[track_caller]
    pub fn append(&self, hook: Hook) -> Result<()> {
        let location = Location::caller();
        let caller = match hook.caller {
            Some(caller) if caller.trim().is_empty() => return Err(LifecycleError::BlankCaller),
            Some(caller) => caller,
            None => format!("{}:{}", location.file(), location.line()),
        };

        tracing::debug!(caller = %caller, "appending hook");
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(Registered {
                on_start: hook.on_start,
                on_stop: hook.on_stop,
                caller,
            }));
        Ok(())
    }

    /// Run every start hook in registration order.
    ///
    /// Stops at the first hook that fails, or when `ctx` is already done
    /// before the next hook would run. Either way the hooks that did start
    /// stay counted, so a following [`stop`](Self::stop) rolls back exactly
    /// those.
    pub async fn start(&self, ctx: &Context) -> Result<()> {
        let _gate = self.gate.lock().await;
        {
            let mut status = self.status();
            let state = status.state.unwrap_or(LifecycleState::NotStarted);
            if !matches!(state, LifecycleState::NotStarted | LifecycleState::Stopped) {
                return Err(LifecycleError::InvalidTransition {
                    state,
                    action: "start",
                });
            }
            status.state = Some(LifecycleState::Starting);
            status.start_records = HookRecords::default();
        }

        let hooks = self.snapshot();
        tracing::info!(hooks = hooks.len(), "starting lifecycle");

        for hook in &hooks {
            if let Some(on_start) = &hook.on_start {
                if let Some(reason) = ctx.err() {
                    self.set_state(LifecycleState::StartFailed);
                    return Err(LifecycleError::Cancelled {
                        phase: Phase::Start,
                        caller: hook.caller.clone(),
                        reason,
                        failures: StopFailures::default(),
                    });
                }

                tracing::info!(caller = %hook.caller, "starting");
                self.status().running = Some(hook.caller.clone());

                let begin = Instant::now();
                let result = on_start(ctx.clone()).await;
                let runtime = begin.elapsed();

                let mut status = self.status();
                status.running = None;
                if let Err(source) = result {
                    status.state = Some(LifecycleState::StartFailed);
                    drop(status);
                    tracing::error!(caller = %hook.caller, error = %source, "start hook failed");
                    return Err(LifecycleError::HookFailed {
                        phase: Phase::Start,
                        caller: hook.caller.clone(),
                        source,
                    });
                }
                status.start_records.push(HookRecord {
                    caller: hook.caller.clone(),
                    runtime,
                });
            }
            self.status().num_started += 1;
        }

        self.set_state(LifecycleState::Started);
        tracing::info!(hooks = hooks.len(), "lifecycle started");
        Ok(())
    }

    /// Run the stop hook of every hook that started, newest first.
    ///
    /// A failing stop hook does not prevent the rest from running; all
    /// failures come back together as [`LifecycleError::StopFailed`]. The
    /// only early exit is `ctx` being done before the next stop hook runs,
    /// in which case the remaining hooks stay counted as started and the
    /// failures collected so far travel with [`LifecycleError::Cancelled`].
    ///
    /// A hook leaves the started count as its stop callback begins, so a
    /// pass abandoned mid-hook does not run that callback again on retry.
    pub async fn stop(&self, ctx: &Context) -> Result<()> {
        let _gate = self.gate.lock().await;
        {
            let mut status = self.status();
            status.state = Some(LifecycleState::Stopping);
            status.stop_records = HookRecords::default();
        }

        let hooks = self.snapshot();
        let mut failures = StopFailures::default();

        loop {
            let index = self.status().num_started;
            if index == 0 {
                break;
            }
            let hook = &hooks[index - 1];

            let Some(on_stop) = &hook.on_stop else {
                self.status().num_started -= 1;
                continue;
            };

            if let Some(reason) = ctx.err() {
                if !failures.is_empty() {
                    tracing::error!(failed = failures.len(), %reason, "stop aborted with failures");
                }
                return Err(LifecycleError::Cancelled {
                    phase: Phase::Stop,
                    caller: hook.caller.clone(),
                    reason,
                    failures,
                });
            }

            tracing::info!(caller = %hook.caller, "stopping");
            {
                let mut status = self.status();
                status.num_started -= 1;
                status.running = Some(hook.caller.clone());
            }

            let begin = Instant::now();
            let result = on_stop(ctx.clone()).await;
            let runtime = begin.elapsed();

            {
                let mut status = self.status();
                status.running = None;
                status.stop_records.push(HookRecord {
                    caller: hook.caller.clone(),
                    runtime,
                });
            }
            if let Err(error) = result {
                tracing::error!(caller = %hook.caller, error = %error, "stop hook failed");
                failures.push(hook.caller.clone(), error);
            }
        }

        self.set_state(LifecycleState::Stopped);
        if failures.is_empty() {
            tracing::info!("lifecycle stopped");
            Ok(())
        } else {
            Err(LifecycleError::StopFailed(failures))
        }
    }

    /// Records from the most recent start pass
    pub fn start_hook_records(&self) -> HookRecords {
        self.status().start_records.clone()
    }

    /// Records from the most recent stop pass
    pub fn stop_hook_records(&self) -> HookRecords {
        self.status().stop_records.clone()
    }

    pub fn hook_records(&self, phase: Phase) -> HookRecords {
        match phase {
            Phase::Start => self.start_hook_records(),
            Phase::Stop => self.stop_hook_records(),
        }
    }

    /// Attribution of the hook executing right now, if any.
    ///
    /// If a start or stop pass was abandoned mid-hook this keeps naming that
    /// hook, which is what a timeout report wants.
    pub fn running_hook_caller(&self) -> Option<String> {
        self.status().running.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.status().state.unwrap_or(LifecycleState::NotStarted)
    }

    /// Number of hooks a stop pass would walk back over
    pub fn started_count(&self) -> usize {
        self.status().num_started
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn snapshot(&self) -> Vec<Arc<Registered>> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LifecycleState) {
        self.status().state = Some(state);
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("hooks", &self.hook_count())
            .field("state", &self.state())
            .field("started", &self.started_count())
            .finish()
    }
}
