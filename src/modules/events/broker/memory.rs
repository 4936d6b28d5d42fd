use std::collections::HashSet;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::modules::error::MailFusionResult;
use crate::modules::events::broker::{Broker, BrokerMessage, BrokerStream};

const CHANNEL_CAPACITY: usize = 1024;

/// In-process broker on a tokio broadcast channel.
///
/// Used when no NATS server is configured. A slow subscriber that lags behind
/// the channel capacity loses the overflowed messages.
pub struct MemoryBroker {
    sender: broadcast::Sender<BrokerMessage>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> MailFusionResult<()> {
        // no receivers is not an error: nobody subscribed yet
        let _ = self.sender.send((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topics: Vec<String>) -> MailFusionResult<BrokerStream> {
        let topics: HashSet<String> = topics.into_iter().collect();
        let receiver = self.sender.subscribe();
        let stream = futures::stream::unfold(
            (receiver, topics),
            |(mut receiver, topics)| async move {
                loop {
                    match receiver.recv().await {
                        Ok(message) if topics.contains(&message.0) => {
                            return Some((message, (receiver, topics)))
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("In-memory broker subscriber lagged, {} messages dropped", skipped);
                            continue;
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            },
        );
        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
