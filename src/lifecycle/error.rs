//! Lifecycle-specific error types

use super::{ContextError, HookRecords, LifecycleState, Phase, Signal};
use std::fmt;
use thiserror::Error;

/// Errors that can occur during lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A start hook failed; the hooks after it never ran
    #[error("{phase} hook from {caller} failed")]
    HookFailed {
        phase: Phase,
        /// Attribution of the hook that failed
        caller: String,
        #[source]
        source: anyhow::Error,
    },

    /// The context was already done before the next hook could run
    #[error(
        "{phase} aborted before running hook from {caller}: {reason}{}",
        failures_suffix(.failures)
    )]
    Cancelled {
        phase: Phase,
        /// Attribution of the hook that did not get to run
        caller: String,
        reason: ContextError,
        /// Stop hooks that already failed in this pass; always empty on start
        failures: StopFailures,
    },

    /// The context ran out while a hook was still executing
    #[error("{phase} timed out{}: {reason}", running_suffix(.caller.as_deref()))]
    Timeout {
        phase: Phase,
        /// Attribution of the hook that was executing, if any
        caller: Option<String>,
        reason: ContextError,
        /// Hooks that completed before the timeout
        records: HookRecords,
    },

    /// One or more stop hooks failed; every other stop hook still ran
    #[error(transparent)]
    StopFailed(StopFailures),

    /// Start failed and the rollback Stop failed too
    #[error("start failed: {start}; rollback failed: {rollback}")]
    Rollback {
        start: Box<LifecycleError>,
        rollback: Box<LifecycleError>,
    },

    #[error("cannot {action} a lifecycle that is {state}")]
    InvalidTransition {
        state: LifecycleState,
        action: &'static str,
    },

    #[error("hook caller attribution must not be blank")]
    BlankCaller,
}

impl LifecycleError {
    /// The hook that was executing or about to execute, if known
    pub fn caller(&self) -> Option<&str> {
        match self {
            Self::HookFailed { caller, .. } | Self::Cancelled { caller, .. } => Some(caller),
            Self::Timeout { caller, .. } => caller.as_deref(),
            Self::Rollback { start, .. } => start.caller(),
            _ => None,
        }
    }
}

fn running_suffix(caller: Option<&str>) -> String {
    caller
        .map(|c| format!(" while running hook from {c}"))
        .unwrap_or_default()
}

fn failures_suffix(failures: &StopFailures) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!("; {failures}")
    }
}

/// A stop hook failure
#[derive(Debug)]
pub struct StopFailure {
    pub caller: String,
    pub error: anyhow::Error,
}

/// Every stop hook failure from one Stop pass, in the order they ran
#[derive(Debug, Default)]
pub struct StopFailures(Vec<StopFailure>);

impl StopFailures {
    pub(crate) fn push(&mut self, caller: String, error: anyhow::Error) {
        self.0.push(StopFailure { caller, error });
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StopFailure> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StopFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stop hook(s) failed: ", self.0.len())?;
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", failure.caller, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for StopFailures {}

/// Errors from broadcasting a shutdown signal
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShutdownError {
    #[error("attempted to shutdown without any subscribers")]
    NoSubscribers,

    #[error("failed to send {signal} signal to {unsent} out of {total} channels")]
    Undelivered {
        signal: Signal,
        unsent: usize,
        total: usize,
    },
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
