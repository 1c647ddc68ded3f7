//! Graceful-shutdown signalling: a `broadcast` channel with a single send,
//! so every listener observes the same signal exactly once.

use tokio::sync::broadcast;

/// Listens for the process-wide shutdown signal. Cheap to clone the sender
/// side; this receiver-side wrapper remembers whether it has already fired
/// so a second `recv` call after shutdown returns immediately.
pub struct Shutdown {
    shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Waits for the shutdown signal, or returns immediately if one has
    /// already been observed.
    pub async fn recv(&mut self) {
        if self.shutdown {
            return;
        }

        // Only one value is ever sent, so a lag error can't happen here.
        let _ = self.notify.recv().await;
        self.shutdown = true;
    }
}
