// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;
use std::time::Duration;

use native_db::Database;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::events::{Event, EventData, EventType};
use crate::modules::hook::delivery::{Deliverer, DeliveryConfig, DeliveryKind};
use crate::modules::hook::entity::{
    Webhook, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVALS,
};
use crate::modules::hook::log::WebhookLog;
use crate::modules::hook::payload::{WebhookCreateRequest, WebhookTestRequest, WebhookUpdateRequest};
use crate::modules::rest::response::DataPage;
use crate::{id, raise_error, utc_now};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Webhook CRUD plus supervised event delivery.
pub struct WebhookService {
    database: Arc<Database<'static>>,
    deliverer: Arc<Deliverer>,
    deliveries: Mutex<JoinSet<()>>,
    cancel: watch::Sender<bool>,
}

impl WebhookService {
    pub fn new(
        database: Arc<Database<'static>>,
        config: DeliveryConfig,
    ) -> MailFusionResult<Self> {
        let (cancel, _) = watch::channel(false);
        Ok(Self {
            deliverer: Arc::new(Deliverer::new(database.clone(), &config)?),
            database,
            deliveries: Mutex::new(JoinSet::new()),
            cancel,
        })
    }

    pub async fn create(&self, request: WebhookCreateRequest) -> MailFusionResult<Webhook> {
        request.validate()?;
        let now = utc_now!();
        let webhook = Webhook {
            id: id!(64),
            name: request.name,
            description: request.description,
            url: request.url,
            method: request.method.unwrap_or_default(),
            headers: request.headers.unwrap_or_default(),
            events: request.events,
            enabled: request.enabled.unwrap_or(true),
            retry_enabled: request.retry_enabled.unwrap_or(true),
            max_retries: request.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_intervals: request
                .retry_intervals
                .unwrap_or_else(|| DEFAULT_RETRY_INTERVALS.to_vec()),
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        webhook.save(&self.database).await?;
        info!(webhook_id = webhook.id, "Webhook '{}' created", webhook.name);
        Ok(webhook)
    }

    pub async fn update(&self, id: u64, request: WebhookUpdateRequest) -> MailFusionResult<Webhook> {
        request.validate()?;
        Webhook::modify(&self.database, id, move |webhook| request.apply(webhook)).await
    }

    /// Removes the webhook and its delivery logs.
    pub async fn delete(&self, id: u64) -> MailFusionResult<()> {
        Webhook::delete(&self.database, id).await?;
        let removed = WebhookLog::delete_by_webhook(&self.database, id).await?;
        info!(webhook_id = id, "Webhook deleted with {} log rows", removed);
        Ok(())
    }

    pub async fn get(&self, id: u64) -> MailFusionResult<Webhook> {
        Webhook::get(&self.database, id).await
    }

    pub async fn list(&self) -> MailFusionResult<Vec<Webhook>> {
        Webhook::list_all(&self.database).await
    }

    pub async fn enable(&self, id: u64) -> MailFusionResult<Webhook> {
        Webhook::modify(&self.database, id, |w| w.enabled = true).await
    }

    pub async fn disable(&self, id: u64) -> MailFusionResult<Webhook> {
        Webhook::modify(&self.database, id, |w| w.enabled = false).await
    }

    pub async fn list_logs(
        &self,
        webhook_id: u64,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> MailFusionResult<DataPage<WebhookLog>> {
        Webhook::get(&self.database, webhook_id).await?;
        WebhookLog::paginate_by_webhook(&self.database, webhook_id, page, page_size)
            .await
            .map(DataPage::from)
    }

    /// Starts one delivery per enabled webhook subscribed to the event's type.
    /// Returns the number of deliveries started.
    pub async fn trigger_event(&self, event: &Event) -> MailFusionResult<usize> {
        let targets: Vec<Webhook> = Webhook::list_all(&self.database)
            .await?
            .into_iter()
            .filter(|w| w.enabled && w.subscribes_to(event.event_type))
            .collect();
        let count = targets.len();
        for webhook in targets {
            self.spawn_delivery(webhook, event.clone()).await;
        }
        if count > 0 {
            debug!(event_type = %event.event_type, "Dispatched event to {} webhook(s)", count);
        }
        Ok(count)
    }

    /// Delivers an event to one webhook regardless of its subscriptions.
    pub async fn deliver_to(&self, webhook_id: u64, event: &Event) -> MailFusionResult<()> {
        let webhook = Webhook::get(&self.database, webhook_id).await?;
        if !webhook.enabled {
            return Err(raise_error!(
                format!("Webhook id='{webhook_id}' is disabled"),
                ErrorCode::InvalidParameter
            ));
        }
        self.spawn_delivery(webhook, event.clone()).await;
        Ok(())
    }

    /// Sends one `test` event without retries and returns the attempt's log.
    /// The webhook's call counters are left untouched.
    pub async fn test_webhook(
        &self,
        id: u64,
        request: WebhookTestRequest,
    ) -> MailFusionResult<WebhookLog> {
        let webhook = Webhook::get(&self.database, id).await?;
        let mut data = EventData::new();
        if let Some(Value::Object(extra)) = request.data {
            data.extend(extra);
        }
        data.insert("test".into(), Value::Bool(true));
        data.insert("webhook_id".into(), Value::from(id));
        let event = Event::new(EventType::Test, data, "webhook_service");
        let mut cancel = self.cancel.subscribe();
        self.deliverer
            .deliver(&webhook, &event, DeliveryKind::Test, &mut cancel)
            .await
    }

    async fn spawn_delivery(&self, webhook: Webhook, event: Event) {
        let deliverer = self.deliverer.clone();
        let mut cancel = self.cancel.subscribe();
        let mut deliveries = self.deliveries.lock().await;
        while deliveries.try_join_next().is_some() {}
        deliveries.spawn(async move {
            if let Err(e) = deliverer
                .deliver(&webhook, &event, DeliveryKind::Event, &mut cancel)
                .await
            {
                warn!(webhook_id = webhook.id, "Webhook delivery aborted: {}", e);
            }
        });
    }

    /// Waits for every delivery started so far, retries included.
    pub async fn wait_idle(&self) {
        let mut deliveries = self.deliveries.lock().await;
        while deliveries.join_next().await.is_some() {}
    }

    /// Cancels pending retries and drains running deliveries. Idempotent.
    pub async fn stop(&self) {
        self.cancel.send_replace(true);
        let mut deliveries = self.deliveries.lock().await;
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while deliveries.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("{} webhook deliveries still running, aborting", deliveries.len());
            deliveries.abort_all();
            while deliveries.join_next().await.is_some() {}
        }
        self.cancel.send_replace(false);
        info!("Webhook deliveries stopped");
    }
}
