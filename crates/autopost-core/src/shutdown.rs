use std::time::Duration;
use tokio::sync::watch;

/// Create a linked shutdown pair. The handle side is kept by whoever
/// owns the worker lifecycle; the signal side is cloned into tasks and
/// polled at every sleeping boundary.
pub fn channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle(tx), ShutdownSignal(rx))
}

#[derive(Debug)]
pub struct ShutdownHandle(watch::Sender<bool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Sleep for at most `duration`, waking immediately on shutdown.
    /// Returns true when shutdown has been signalled. A dropped handle
    /// counts as shutdown so orphaned tasks wind down.
    pub async fn wait(&mut self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_shutdown(),
            res = self.0.changed() => res.is_err() || self.is_shutdown(),
        }
    }
}
