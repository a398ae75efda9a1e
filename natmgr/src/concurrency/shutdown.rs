//! Shutdown signaling primitives for coordinating daemon termination.
//!
//! This module abstracts tokio's watch channels into a pair of shutdown
//! handles. The signal is level-triggered: once shutdown has been requested,
//! every receiver observes it, including receivers that subscribe or start
//! waiting after the request was made.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
///
/// Held by the actor that decides when the daemon terminates, typically the
/// signal listener. Cloning is cheap and all clones signal the same channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Requests shutdown of every subscribed receiver.
    ///
    /// Fails only when all receivers have been dropped, in which case there
    /// is nothing left to shut down.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<bool>> {
        self.0.send(true)
    }

    /// Creates a new shutdown receiver subscription.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` once shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits until shutdown has been requested.
    ///
    /// Returns immediately when shutdown was requested before this call. If
    /// the transmitter is dropped without a request, this also resolves so
    /// that waiters do not hang forever.
    pub async fn wait_for_shutdown(&mut self) {
        let _ = self.0.wait_for(|shutdown| *shutdown).await;
    }
}

/// Creates a linked pair of shutdown handles.
///
/// The channel starts in the "running" state. The returned receiver can be
/// cloned or re-created via [`ShutdownTx::subscribe`].
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}
