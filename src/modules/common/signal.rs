use crate::modules::utils::shutdown::shutdown_signal;
use tokio::sync::broadcast;
use tracing::info;

/// Fans the process shutdown signal out to every long-running loop.
#[derive(Clone)]
pub struct SignalManager {
    sender: broadcast::Sender<()>,
}

impl Default for SignalManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        SignalManager { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Broadcasts shutdown once Ctrl+C or SIGTERM arrives.
    pub fn listen(&self) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received, notifying subscribers");
            let _ = sender.send(());
        });
    }

    pub fn trigger(&self) {
        let _ = self.sender.send(());
    }
}
