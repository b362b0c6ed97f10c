//! Broadcast shutdown signal for workers.
//!
//! One [`ShutdownTx`] is held by the server, every worker owns a [`ShutdownRx`]. Workers check the
//! signal between records, so a record that is being written when the signal fires is finished
//! first.

use tokio::sync::watch;

use crate::error::{ErrorKind, IngestResult};
use crate::ingest_error;

/// Transmitter side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Signals every subscribed receiver to shut down.
    pub fn shutdown(&self) -> IngestResult<()> {
        self.0.send(true).map_err(|_| {
            ingest_error!(
                ErrorKind::InvalidState,
                "No worker is listening for the shutdown signal"
            )
        })
    }

    /// Creates a new receiver for this signal.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` once shutdown was signaled.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits until shutdown is signaled.
    ///
    /// Never resolves when the transmitter was dropped without signaling.
    pub async fn wait_for_shutdown(&mut self) {
        let closed = self.0.wait_for(|shutdown| *shutdown).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

/// Creates a shutdown channel in the running state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}
