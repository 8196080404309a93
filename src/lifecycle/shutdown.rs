//! Shutdown Broadcaster
//!
//! Lets any component ask the process to stop, and lets any number of
//! consumers wait for that request.

use super::ShutdownError;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::signal;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// Why the application is being asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Signal {
    #[strum(serialize = "SIGINT")]
    Interrupt,
    #[strum(serialize = "SIGTERM")]
    Terminate,
}

/// Receiving end of one shutdown subscription
///
/// Holds at most one undelivered signal. A subscriber that never drains it
/// makes later broadcasts report it as undelivered.
#[derive(Debug)]
pub struct ShutdownReceiver {
    rx: mpsc::Receiver<Signal>,
}

impl ShutdownReceiver {
    /// Wait for the next signal
    pub async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }

    /// Take a pending signal without waiting
    pub fn try_recv(&mut self) -> Option<Signal> {
        match self.rx.try_recv() {
            Ok(signal) => Some(signal),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// Broadcasts a stop request to every subscriber
///
/// Cloning is cheap; all clones share one subscriber set, which only ever
/// grows.
///
/// # Example
///
/// ```rust,ignore
/// use keystone::lifecycle::Shutdowner;
///
/// let shutdowner = Shutdowner::new();
/// let mut done = shutdowner.register();
///
/// // From anywhere that holds a clone:
/// shutdowner.shutdown()?;
///
/// let signal = done.recv().await;
/// ```
#[derive(Clone, Default)]
pub struct Shutdowner {
    subscribers: Arc<RwLock<Vec<mpsc::Sender<Signal>>>>,
}

impl Shutdowner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber with room for one pending signal
    pub fn register(&self) -> ShutdownReceiver {
        let (tx, rx) = mpsc::channel(1);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        ShutdownReceiver { rx }
    }

    /// Ask the application to terminate
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        self.broadcast(Signal::Terminate)
    }

    /// Send `signal` to every subscriber without blocking.
    ///
    /// A subscriber whose slot still holds an unconsumed signal, or that has
    /// gone away, is skipped and counted; delivery to the others carries on.
    ///
    /// # Errors
    /// - [`ShutdownError::NoSubscribers`] if nobody has registered yet.
    /// - [`ShutdownError::Undelivered`] with the number of subscribers that
    ///   did not get this signal.
    pub fn broadcast(&self, signal: Signal) -> Result<(), ShutdownError> {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if subscribers.is_empty() {
            return Err(ShutdownError::NoSubscribers);
        }

        let mut unsent = 0;
        for tx in subscribers.iter() {
            match tx.try_send(signal) {
                Ok(()) => {}
                Err(TrySendError::Full(_) | TrySendError::Closed(_)) => unsent += 1,
            }
        }

        if unsent != 0 {
            tracing::warn!(
                %signal,
                unsent,
                total = subscribers.len(),
                "shutdown signal not delivered to every subscriber"
            );
            return Err(ShutdownError::Undelivered {
                signal,
                unsent,
                total: subscribers.len(),
            });
        }

        tracing::info!(%signal, subscribers = subscribers.len(), "shutdown signal broadcast");
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for Shutdowner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdowner")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Wait for Ctrl+C or SIGTERM
///
/// # Example
///
/// ```rust,ignore
/// use keystone::lifecycle::os_signal;
///
/// tokio::select! {
///     signal = os_signal() => {
///         tracing::info!("received {}", signal?);
///     }
///     _ = server.serve() => {}
/// }
/// ```
pub async fn os_signal() -> std::io::Result<Signal> {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())?
            .recv()
            .await;
        Ok::<_, std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    tokio::select! {
        result = signal::ctrl_c() => result.map(|()| Signal::Interrupt),
        result = terminate => result.map(|()| Signal::Terminate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_without_subscribers() {
        let shutdowner = Shutdowner::new();
        assert_eq!(shutdowner.shutdown(), Err(ShutdownError::NoSubscribers));
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let shutdowner = Shutdowner::new();
        let mut first = shutdowner.register();
        let mut second = shutdowner.clone().register();

        shutdowner.broadcast(Signal::Interrupt).unwrap();
        assert_eq!(first.recv().await, Some(Signal::Interrupt));
        assert_eq!(second.recv().await, Some(Signal::Interrupt));
    }

    #[test]
    fn test_pending_signal_counts_as_undelivered() {
        let shutdowner = Shutdowner::new();
        let mut blocked = shutdowner.register();
        shutdowner.shutdown().unwrap();

        let mut fresh = shutdowner.register();
        let err = shutdowner.shutdown().unwrap_err();
        assert_eq!(
            err,
            ShutdownError::Undelivered {
                signal: Signal::Terminate,
                unsent: 1,
                total: 2,
            }
        );
        assert_eq!(
            err.to_string(),
            "failed to send SIGTERM signal to 1 out of 2 channels"
        );
        assert_eq!(fresh.try_recv(), Some(Signal::Terminate));

        assert_eq!(blocked.try_recv(), Some(Signal::Terminate));
        assert_eq!(shutdowner.shutdown(), Ok(()));
        assert_eq!(blocked.try_recv(), Some(Signal::Terminate));
        assert_eq!(fresh.try_recv(), Some(Signal::Terminate));
    }

    #[test]
    fn test_dropped_subscriber_counts_as_undelivered() {
        let shutdowner = Shutdowner::new();
        let _kept = shutdowner.register();
        drop(shutdowner.register());

        let err = shutdowner.shutdown().unwrap_err();
        assert!(matches!(
            err,
            ShutdownError::Undelivered {
                unsent: 1,
                total: 2,
                ..
            }
        ));
        assert_eq!(shutdowner.subscriber_count(), 2);
    }
}
