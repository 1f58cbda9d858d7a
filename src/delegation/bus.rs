use super::messages::DelegatedRequest;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Routes delegated requests to the single handler registered for each channel.
#[derive(Default)]
pub struct MessageBus {
    handlers: RwLock<HashMap<String, mpsc::Sender<DelegatedRequest>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for `channel`, replacing any previous one.
    pub async fn register(&self, channel: &str) -> mpsc::Receiver<DelegatedRequest> {
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        if self
            .handlers
            .write()
            .await
            .insert(channel.to_string(), tx)
            .is_some()
        {
            warn!("Replaced existing handler for channel {}", channel);
        } else {
            debug!("Registered handler for channel {}", channel);
        }
        rx
    }

    pub async fn unregister(&self, channel: &str) {
        self.handlers.write().await.remove(channel);
    }

    pub(crate) async fn sender(&self, channel: &str) -> Option<mpsc::Sender<DelegatedRequest>> {
        self.handlers.read().await.get(channel).cloned()
    }

    pub async fn has_handler(&self, channel: &str) -> bool {
        self.handlers
            .read()
            .await
            .get(channel)
            .is_some_and(|tx| !tx.is_closed())
    }
}
