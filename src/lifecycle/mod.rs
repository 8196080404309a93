//! Lifecycle Hooks Module
//!
//! Start and stop hooks for the long-lived components of an application,
//! plus the shutdown broadcaster that lets any of them ask to stop.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Configuration Loading
//!    ↓
//! 2. Graph Registration (modules, values, constructors)
//!    ↓
//! 3. Invokes (constructors run, hooks get appended)
//!    ↓
//! 4. Start hooks, in append order      ← rollback on failure or timeout
//!    ↓
//! [Running...]
//!    ↓
//! 5. Shutdown request or OS signal (SIGTERM/SIGINT)
//!    ↓
//! 6. Stop hooks, in reverse, for every hook that started
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use keystone::lifecycle::{Context, Hook, Lifecycle, OnStart, OnStop};
//! use async_trait::async_trait;
//!
//! pub struct DatabaseService {
//!     config: Arc<DatabaseConfig>,
//! }
//!
//! #[async_trait]
//! impl OnStart for DatabaseService {
//!     async fn on_start(&self, _ctx: &Context) -> anyhow::Result<()> {
//!         tracing::info!("Opening database connections");
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl OnStop for DatabaseService {
//!     async fn on_stop(&self, _ctx: &Context) -> anyhow::Result<()> {
//!         tracing::info!("Closing database connections");
//!         Ok(())
//!     }
//! }
//!
//! lifecycle.append(Hook::service(database))?;
//! ```

mod application;
mod context;
mod error;
mod hook;
mod manager;
mod shutdown;
mod traits;

pub use application::{App, AppBuilder};
pub use context::{Context, ContextError};
pub use error::{LifecycleError, Result, ShutdownError, StopFailure, StopFailures};
pub use hook::{Hook, HookFn, HookFuture, HookRecord, HookRecords};
pub use manager::{Lifecycle, LifecycleState, Phase};
pub use shutdown::{ShutdownReceiver, Shutdowner, Signal, os_signal};
pub use traits::{OnStart, OnStop};
