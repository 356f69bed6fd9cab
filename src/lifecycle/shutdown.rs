//! Shutdown coordination for the proxy.

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// The server and its background tasks (config reload, limiter sweep)
/// each hold a receiver and stop when the signal is broadcast.
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

    /// Broadcast the signal. Returns how many receivers were still listening.
    pub fn trigger(&self) -> usize {
        let listening = self.tx.send(()).unwrap_or(0);
        tracing::info!(listening, "Shutdown triggered");
        listening
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
