//! # Keystone
//!
//! An in-process dependency graph and lifecycle coordinator for Rust services.
//!
//! Keystone wires a service together from constructors that declare their
//! inputs, builds each component at most once and only when something needs
//! it, then starts and stops the components in dependency order.
//!
//! ## Features
//!
//! - **Dependency Graph**: Lazy, construct-once resolution with missing and circular dependency detection
//! - **Lifecycle Hooks**: Ordered start, reverse stop, rollback of whatever already started
//! - **Diagnostics**: Per-hook runtimes and the caller of a hung hook
//! - **Shutdown Broadcast**: Any component can ask the application to stop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keystone::prelude::*;
//!
//! struct Config {
//!     addr: String,
//! }
//!
//! struct Server {
//!     addr: String,
//! }
//!
//! #[async_trait]
//! impl OnStart for Server {
//!     async fn on_start(&self, _ctx: &Context) -> anyhow::Result<()> {
//!         tracing::info!(addr = %self.addr, "listening");
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl OnStop for Server {
//!     async fn on_stop(&self, _ctx: &Context) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let app = App::builder()
//!         .supply(Config { addr: "0.0.0.0:8080".into() })
//!         .provide(
//!             In::new().with::<Config>("config").with::<Lifecycle>("lifecycle"),
//!             |args| {
//!                 let server = Arc::new(Server {
//!                     addr: args.get::<Config>("config")?.addr.clone(),
//!                 });
//!                 args.get::<Lifecycle>("lifecycle")?
//!                     .append(Hook::service(Arc::clone(&server)))?;
//!                 Ok(server)
//!             },
//!         )
//!         .invoke("serve", In::new().with::<Arc<Server>>("server"), |_| Ok(()))
//!         .build()?;
//!
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod di;
pub mod error;
pub mod lifecycle;
pub mod module;

// Re-export core types
pub use config::{ConfigService, RuntimeConfig};
pub use di::{Args, Graph, In, Injectable, Key, Param};
pub use error::{Error, Result};
pub use lifecycle::{App, AppBuilder, Context, Hook, Lifecycle, Shutdowner};
pub use module::Module;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use keystone::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConfigService, RuntimeConfig};
    pub use crate::di::{Args, Graph, In, Injectable, Key, Param};
    pub use crate::error::{Error, Result};
    pub use crate::lifecycle::{
        App, AppBuilder, Context, Hook, Lifecycle, LifecycleError, OnStart, OnStop, Shutdowner,
        Signal, os_signal,
    };
    pub use crate::module::Module;
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
