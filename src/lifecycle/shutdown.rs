//! Shutdown coordination.

use tokio::sync::broadcast;

/// Fan-out stop signal for the server and its background tasks.
///
/// Every [`subscribe`](Shutdown::subscribe) receiver resolves once
/// [`trigger`](Shutdown::trigger) is called, including receivers created
/// before any task started waiting.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Ask every subscriber to stop. A no-op when nobody listens.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
