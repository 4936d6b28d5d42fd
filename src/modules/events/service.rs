// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::modules::error::MailFusionResult;
use crate::modules::events::bus::{handler, EventBus};
use crate::modules::events::{Event, EventType};
use crate::modules::hook::service::WebhookService;
use crate::modules::rule::service::RuleService;

/// Connects the bus to the rule engine and to webhook dispatch.
pub struct EventService {
    bus: Arc<EventBus>,
    rules: Arc<RuleService>,
    webhooks: Arc<WebhookService>,
    wired: AtomicBool,
}

impl EventService {
    pub fn new(bus: Arc<EventBus>, rules: Arc<RuleService>, webhooks: Arc<WebhookService>) -> Self {
        Self {
            bus,
            rules,
            webhooks,
            wired: AtomicBool::new(false),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Registers the handlers (once per process) and starts the bus.
    pub async fn start(&self) -> MailFusionResult<()> {
        if !self.wired.swap(true, Ordering::SeqCst) {
            self.wire();
        }
        self.bus.start().await?;
        info!("Event service started");
        Ok(())
    }

    /// Stops the bus loop, then cancels pending webhook retries.
    pub async fn stop(&self) {
        self.bus.stop().await;
        self.webhooks.stop().await;
        info!("Event service stopped");
    }

    pub async fn publish_event(&self, event: Event) -> MailFusionResult<()> {
        self.bus.publish(event).await
    }

    pub async fn publish_email_event(
        &self,
        event_type: EventType,
        email_id: u64,
        account_uid: &str,
    ) -> MailFusionResult<()> {
        self.publish_event(Event::email_state(event_type, email_id, account_uid))
            .await
    }

    fn wire(&self) {
        let rules = self.rules.clone();
        self.bus.subscribe(
            EventType::EmailReceived,
            handler(move |event: Event| {
                let rules = rules.clone();
                async move {
                    let Some(email_id) = event.email_id() else {
                        debug!(event_id = %event.id, "email.received without email_id, ignored");
                        return Ok(());
                    };
                    let matched = rules.apply_rules_by_id(email_id).await?;
                    if !matched.is_empty() {
                        debug!(email_id, "Applied {} rule(s)", matched.len());
                    }
                    Ok(())
                }
            }),
        );

        for event_type in EventType::ROUTABLE {
            let webhooks = self.webhooks.clone();
            self.bus.subscribe(
                event_type,
                handler(move |event: Event| {
                    let webhooks = webhooks.clone();
                    async move { webhooks.trigger_event(&event).await.map(|_| ()) }
                }),
            );
        }
    }
}
