//! Lifecycle hook traits
//!
//! Services that own long-lived resources implement these and are appended
//! to the [`Lifecycle`](super::Lifecycle) with [`Hook::service`](super::Hook::service).

use super::Context;
use async_trait::async_trait;

/// Called when the application starts
///
/// Use this hook to:
/// - Open connection pools
/// - Bind listeners
/// - Spawn background workers
///
/// # Example
///
/// ```rust,ignore
/// use keystone::lifecycle::{Context, OnStart};
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl OnStart for HttpServer {
///     async fn on_start(&self, ctx: &Context) -> anyhow::Result<()> {
///         let listener = TcpListener::bind(&self.addr).await?;
///         self.spawn_accept_loop(listener, ctx.child());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait OnStart: Send + Sync {
    /// Returning an error aborts the remaining start hooks.
    async fn on_start(&self, ctx: &Context) -> anyhow::Result<()>;
}

/// Called when the application stops
///
/// Only runs if the matching start hook completed. Stop hooks run in
/// **reverse order** of registration.
///
/// # Example
///
/// ```rust,ignore
/// use keystone::lifecycle::{Context, OnStop};
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl OnStop for DatabaseService {
///     async fn on_stop(&self, ctx: &Context) -> anyhow::Result<()> {
///         tokio::select! {
///             result = self.pool.close() => result,
///             reason = ctx.done() => Err(reason.into()),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait OnStop: Send + Sync {
    /// A failure here is collected and reported, the other stop hooks still
    /// run.
    async fn on_stop(&self, ctx: &Context) -> anyhow::Result<()>;
}
