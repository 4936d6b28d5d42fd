// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use native_db::Database;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::modules::common::http::{user_agent, HttpClient};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::events::Event;
use crate::modules::hook::entity::Webhook;
use crate::modules::hook::log::WebhookLog;
use crate::modules::utils::shutdown::stop_requested;
use crate::modules::utils::truncate_chars;
use crate::{id, raise_error, utc_now};

const MAX_RESPONSE_BODY_CHARS: usize = 4096;

/// Event deliveries retry and feed the webhook's call counters; test sends do neither.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryKind {
    Event,
    Test,
}

#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// Length of one retry interval unit. Intervals are stored in seconds.
    pub retry_unit: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_unit: Duration::from_secs(1),
        }
    }
}

/// Sends events to one webhook, retrying per its policy and logging each attempt.
pub struct Deliverer {
    database: Arc<Database<'static>>,
    client: HttpClient,
    retry_unit: Duration,
}

impl Deliverer {
    pub fn new(database: Arc<Database<'static>>, config: &DeliveryConfig) -> MailFusionResult<Self> {
        Ok(Self {
            database,
            client: HttpClient::new(None, config.timeout)?,
            retry_unit: config.retry_unit,
        })
    }

    /// `{webhook_id, event, timestamp}`; the envelope timestamp is in Unix seconds.
    pub fn envelope(webhook_id: u64, event: &Event) -> MailFusionResult<Value> {
        let event = serde_json::to_value(event).map_err(|e| {
            raise_error!(
                format!("Failed to encode event: {:#?}", e),
                ErrorCode::InternalError
            )
        })?;
        Ok(json!({
            "webhook_id": webhook_id,
            "event": event,
            "timestamp": utc_now!() / 1000,
        }))
    }

    /// One logical delivery. Returns the log of the last attempt.
    ///
    /// Retries run in this task, one after another, and stop early when `cancel` flips.
    /// For event deliveries the webhook counters are updated once, from the final outcome.
    pub async fn deliver(
        &self,
        webhook: &Webhook,
        event: &Event,
        kind: DeliveryKind,
        cancel: &mut watch::Receiver<bool>,
    ) -> MailFusionResult<WebhookLog> {
        let body = Self::envelope(webhook.id, event)?;
        let mut retry_count = 0u32;
        let last = loop {
            let log = self.attempt(webhook, &body, retry_count).await;
            if let Err(e) = log.append(&self.database).await {
                warn!(webhook_id = webhook.id, "Failed to store webhook log: {}", e);
            }
            if log.success
                || kind == DeliveryKind::Test
                || !webhook.retry_enabled
                || retry_count >= webhook.max_retries
            {
                break log;
            }

            let units = u32::try_from(webhook.retry_interval(retry_count)).unwrap_or(u32::MAX);
            let wait = self.retry_unit.saturating_mul(units);
            debug!(
                webhook_id = webhook.id,
                "Attempt {} failed, retrying in {:?}",
                retry_count + 1,
                wait
            );
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = stop_requested(cancel) => {
                    info!(webhook_id = webhook.id, "Retry cancelled by shutdown");
                    break log;
                }
            }
            retry_count += 1;
        };

        if kind == DeliveryKind::Test {
            return Ok(last);
        }
        Webhook::record_delivery(&self.database, webhook.id, last.success).await?;
        if last.success {
            debug!(webhook_id = webhook.id, event_type = %event.event_type, "Webhook delivered");
        } else {
            warn!(
                webhook_id = webhook.id,
                event_type = %event.event_type,
                "Webhook delivery failed after {} attempt(s): {}",
                last.retry_count + 1,
                last.error_message.as_deref().unwrap_or_default()
            );
        }
        Ok(last)
    }

    async fn attempt(&self, webhook: &Webhook, body: &Value, retry_count: u32) -> WebhookLog {
        let mut headers = webhook.headers.clone();
        headers.insert("Content-Type".into(), "application/json".into());

        let mut log = WebhookLog {
            id: id!(64),
            webhook_id: webhook.id,
            request_url: webhook.url.clone(),
            request_method: webhook.method.to_string(),
            request_headers: logged_headers(&headers),
            request_body: body.to_string(),
            retry_count,
            created_at: utc_now!(),
            ..Default::default()
        };

        let started = Instant::now();
        let result = self
            .client
            .send_json_request(webhook.method.as_reqwest(), &webhook.url, body, &headers)
            .await;
        match result {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                log.response_status = Some(status.as_u16());
                log.response_body = Some(truncate_chars(&text, MAX_RESPONSE_BODY_CHARS));
                log.success = status.is_success();
                if !log.success {
                    log.error_message = Some(format!("Endpoint returned HTTP {}", status));
                }
            }
            Err(e) => {
                log.error_message = Some(e.message().to_string());
            }
        }
        log.latency_ms = started.elapsed().as_millis() as i64;
        log
    }
}

fn logged_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut logged = headers.clone();
    logged.insert("User-Agent".into(), user_agent());
    logged
}
