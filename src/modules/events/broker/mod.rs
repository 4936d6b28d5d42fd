use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::modules::error::MailFusionResult;

pub mod memory;
pub mod nats;

/// One inbound broker message: `(topic, payload)`.
pub type BrokerMessage = (String, Vec<u8>);

pub type BrokerStream = BoxStream<'static, BrokerMessage>;

/// Topic-based pub/sub transport behind the event bus.
///
/// The stream returned by `subscribe` ends when the underlying connection is lost;
/// the bus resubscribes.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> MailFusionResult<()>;

    async fn subscribe(&self, topics: Vec<String>) -> MailFusionResult<BrokerStream>;

    fn name(&self) -> &'static str;
}
