// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::info;

use crate::modules::error::{code::ErrorCode, MailFusionResult};
use crate::modules::events::broker::{Broker, BrokerStream};
use crate::raise_error;

#[derive(Clone, Debug, Default)]
pub struct NatsConfig {
    pub url: String,
    pub token: Option<String>,
}

/// Core NATS pub/sub. No JetStream: events are fire-and-forget.
pub struct NatsBroker {
    client: async_nats::Client,
}

impl NatsBroker {
    pub async fn connect(config: &NatsConfig) -> MailFusionResult<Self> {
        let client = match &config.token {
            Some(token) => async_nats::connect_with_options(
                &config.url,
                async_nats::ConnectOptions::new().token(token.clone()),
            )
            .await
            .map_err(|error| {
                raise_error!(
                    format!(
                        "Failed to connect to NATS server at {} with token authentication. Error: {}",
                        config.url, error
                    ),
                    ErrorCode::NatsConnectionFailed
                )
            })?,
            None => async_nats::connect(&config.url).await.map_err(|error| {
                raise_error!(
                    format!(
                        "Failed to connect to NATS server at {} without authentication. Error: {}",
                        config.url, error
                    ),
                    ErrorCode::NatsConnectionFailed
                )
            })?,
        };
        info!("Connected to NATS event broker at {}", config.url);
        Ok(Self { client })
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> MailFusionResult<()> {
        self.client
            .publish(topic.to_string(), payload.into())
            .await
            .map_err(|e| {
                raise_error!(
                    format!("Failed to publish to NATS subject '{}': {}", topic, e),
                    ErrorCode::NatsRequestFailed
                )
            })
    }

    async fn subscribe(&self, topics: Vec<String>) -> MailFusionResult<BrokerStream> {
        let mut subscribers = Vec::with_capacity(topics.len());
        for topic in topics {
            let subscriber = self.client.subscribe(topic.clone()).await.map_err(|e| {
                raise_error!(
                    format!("Failed to subscribe to NATS subject '{}': {}", topic, e),
                    ErrorCode::NatsRequestFailed
                )
            })?;
            subscribers.push(subscriber);
        }
        let stream = futures::stream::select_all(subscribers)
            .map(|message| (message.subject.to_string(), message.payload.to_vec()));
        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "nats"
    }
}
