//! Hooks and the records kept about running them

use super::{Context, OnStart, OnStop};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Future returned by a hook callback
pub type HookFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Type-erased start or stop callback
pub type HookFn = Arc<dyn Fn(Context) -> HookFuture + Send + Sync>;

/// A pair of optional start and stop callbacks
///
/// # Example
///
/// ```rust,ignore
/// lifecycle.append(
///     Hook::new()
///         .on_start(move |_ctx| async move { server.listen().await })
///         .on_stop(move |_ctx| async move { server.close().await })
///         .caller("HttpServer"),
/// )?;
/// ```
#[derive(Clone, Default)]
pub struct Hook {
    pub(crate) on_start: Option<HookFn>,
    pub(crate) on_stop: Option<HookFn>,
    pub(crate) caller: Option<String>,
}

impl Hook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_start = Some(erase(callback));
        self
    }

    pub fn on_stop<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_stop = Some(erase(callback));
        self
    }

    /// Attribute this hook to `caller` instead of the call site that appends
    /// it
    pub fn caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Hook that starts and stops `service`, attributed to its type name
    pub fn service<T>(service: Arc<T>) -> Self
    where
        T: OnStart + OnStop + 'static,
    {
        let stopping = Arc::clone(&service);
        Self::starting(service).with_stop_from(stopping)
    }

    /// Hook that only starts `service`
    pub fn starting<T>(service: Arc<T>) -> Self
    where
        T: OnStart + 'static,
    {
        let hook = Self {
            on_start: None,
            on_stop: None,
            caller: Some(std::any::type_name::<T>().to_string()),
        };
        hook.on_start(move |ctx| {
            let service = Arc::clone(&service);
            async move { service.on_start(&ctx).await }
        })
    }

    /// Hook that only stops `service`
    pub fn stopping<T>(service: Arc<T>) -> Self
    where
        T: OnStop + 'static,
    {
        Self::new()
            .with_stop_from(service)
            .caller(std::any::type_name::<T>())
    }

    pub fn has_start(&self) -> bool {
        self.on_start.is_some()
    }

    pub fn has_stop(&self) -> bool {
        self.on_stop.is_some()
    }

    fn with_stop_from<T>(self, service: Arc<T>) -> Self
    where
        T: OnStop + 'static,
    {
        self.on_stop(move |ctx| {
            let service = Arc::clone(&service);
            async move { service.on_stop(&ctx).await }
        })
    }
}

fn erase<F, Fut>(callback: F) -> HookFn
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx: Context| -> HookFuture { Box::pin(callback(ctx)) })
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("caller", &self.caller)
            .field("on_start", &self.has_start())
            .field("on_stop", &self.has_stop())
            .finish()
    }
}

/// How long one hook callback ran and who registered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRecord {
    pub caller: String,
    pub runtime: Duration,
}

impl fmt::Display for HookRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} took {:?}", self.caller, self.runtime)
    }
}

/// Records of the hooks that ran to completion during a start or stop pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookRecords(Vec<HookRecord>);

impl HookRecords {
    pub(crate) fn push(&mut self, record: HookRecord) {
        self.0.push(record);
    }

    /// Slowest first
    pub fn sorted_by_runtime(&self) -> Self {
        let mut records = self.0.clone();
        records.sort_by(|a, b| b.runtime.cmp(&a.runtime));
        Self(records)
    }

    pub fn total_runtime(&self) -> Duration {
        self.0.iter().map(|r| r.runtime).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HookRecord> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<HookRecord> {
        self.0
    }
}

/// Slowest hooks first, one per line
impl fmt::Display for HookRecords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, record) in self.sorted_by_runtime().iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{record}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a HookRecords {
    type Item = &'a HookRecord;
    type IntoIter = std::slice::Iter<'a, HookRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<HookRecord>> for HookRecords {
    fn from(records: Vec<HookRecord>) -> Self {
        Self(records)
    }
}
