// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;
use std::time::Duration;

use native_db::Database;
use tracing::info;

use crate::modules::account::service::AccountService;
use crate::modules::adapter::factory::{DefaultProviderFactory, ProviderFactory};
use crate::modules::common::signal::SignalManager;
use crate::modules::email::service::EmailService;
use crate::modules::error::MailFusionResult;
use crate::modules::events::broker::memory::MemoryBroker;
use crate::modules::events::broker::nats::{NatsBroker, NatsConfig};
use crate::modules::events::broker::Broker;
use crate::modules::events::bus::EventBus;
use crate::modules::events::service::EventService;
use crate::modules::hook::delivery::DeliveryConfig;
use crate::modules::hook::service::WebhookService;
use crate::modules::rule::service::RuleService;
use crate::modules::settings::cli::Settings;
use crate::modules::sync::engine::SyncEngine;
use crate::modules::sync::manager::{SyncManager, SyncManagerConfig};
use crate::modules::utils::encrypt::Cipher;
use crate::utc_now;

pub mod status;

pub trait Initialize {
    async fn initialize() -> MailFusionResult<()>;
}

/// Plain configuration handed to the services; built once from [`Settings`].
#[derive(Clone, Debug)]
pub struct ContextConfig {
    pub encrypt_password: String,
    pub handler_timeout: Duration,
    pub fetch_cap: usize,
    pub sync: SyncManagerConfig,
    pub delivery: DeliveryConfig,
    pub nats: Option<NatsConfig>,
}

impl ContextConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            encrypt_password: settings.mailfusion_encrypt_password.clone(),
            handler_timeout: Duration::from_secs(settings.mailfusion_handler_timeout_sec),
            fetch_cap: settings.mailfusion_sync_fetch_cap as usize,
            sync: SyncManagerConfig {
                tick_interval: Duration::from_secs(settings.mailfusion_sync_tick_interval_sec),
                concurrency: settings.mailfusion_sync_concurrency as usize,
                ..Default::default()
            },
            delivery: DeliveryConfig {
                timeout: Duration::from_secs(settings.mailfusion_webhook_timeout_sec),
                ..Default::default()
            },
            nats: settings.mailfusion_nats_url.as_ref().map(|url| NatsConfig {
                url: url.clone(),
                token: settings.mailfusion_nats_token.clone(),
            }),
        }
    }
}

/// Every long-lived service, wired with injected handles.
pub struct AppContext {
    pub database: Arc<Database<'static>>,
    pub signals: SignalManager,
    pub bus: Arc<EventBus>,
    pub accounts: Arc<AccountService>,
    pub emails: Arc<EmailService>,
    pub rules: Arc<RuleService>,
    pub webhooks: Arc<WebhookService>,
    pub events: Arc<EventService>,
    pub sync: Arc<SyncManager>,
    started_at: i64,
}

impl AppContext {
    /// Connects the configured broker and builds the services.
    pub async fn build(
        config: ContextConfig,
        database: Arc<Database<'static>>,
        signals: SignalManager,
    ) -> MailFusionResult<Arc<Self>> {
        let broker: Arc<dyn Broker> = match &config.nats {
            Some(nats) => Arc::new(NatsBroker::connect(nats).await?),
            None => {
                info!("No NATS server configured, using the in-process event broker");
                Arc::new(MemoryBroker::new())
            }
        };
        Self::assemble(config, database, signals, broker, Arc::new(DefaultProviderFactory::default()))
    }

    pub fn assemble(
        config: ContextConfig,
        database: Arc<Database<'static>>,
        signals: SignalManager,
        broker: Arc<dyn Broker>,
        factory: Arc<dyn ProviderFactory>,
    ) -> MailFusionResult<Arc<Self>> {
        let cipher = Cipher::new(&config.encrypt_password);
        let bus = Arc::new(EventBus::new(broker, config.handler_timeout));

        let webhooks = Arc::new(WebhookService::new(database.clone(), config.delivery)?);
        let emails = Arc::new(EmailService::new(database.clone(), bus.clone()));
        let rules = Arc::new(RuleService::new(
            database.clone(),
            emails.clone(),
            webhooks.clone(),
        ));
        let events = Arc::new(EventService::new(bus.clone(), rules.clone(), webhooks.clone()));
        let engine = Arc::new(SyncEngine::new(
            database.clone(),
            cipher.clone(),
            bus.clone(),
            factory.clone(),
            config.fetch_cap,
        ));
        let sync = Arc::new(SyncManager::new(engine, config.sync));
        let accounts = Arc::new(AccountService::new(
            database.clone(),
            cipher,
            bus.clone(),
            factory,
            sync.locks().clone(),
        ));

        Ok(Arc::new(Self {
            database,
            signals,
            bus,
            accounts,
            emails,
            rules,
            webhooks,
            events,
            sync,
            started_at: utc_now!(),
        }))
    }

    pub fn uptime_ms(&self) -> i64 {
        utc_now!() - self.started_at
    }

    /// Event service first so the first sync's events find their handlers.
    pub async fn start(&self) -> MailFusionResult<()> {
        self.events.start().await?;
        self.sync.start().await?;
        Ok(())
    }

    /// Stops the scheduler, then the event flow. Idempotent.
    pub async fn shutdown(&self) {
        self.sync.stop().await;
        self.events.stop().await;
        info!("All services stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::account::entity::SyncStatus;
    use crate::modules::account::payload::AccountCreateRequest;
    use crate::modules::adapter::testing::{sample_email, FakeFactory, FakeMailbox};
    use crate::modules::adapter::{AuthType, Credentials, EmailProvider, Protocol};
    use crate::modules::context::status::ServiceStatus;
    use crate::modules::database::manager::DatabaseManager;
    use crate::modules::error::code::ErrorCode;
    use crate::modules::settings::cli::SETTINGS;
    use crate::modules::sync::log::SyncType;

    #[test]
    fn test_config_from_settings() {
        let config = ContextConfig::from_settings(&SETTINGS);
        assert_eq!(config.fetch_cap, 1000);
        assert_eq!(config.sync.tick_interval, Duration::from_secs(300));
        assert_eq!(config.sync.concurrency, 8);
        assert_eq!(config.delivery.timeout, Duration::from_secs(10));
        assert!(config.nats.is_none());
    }

    #[tokio::test]
    async fn test_assembled_context_syncs_and_stops() {
        let mailbox = FakeMailbox::with_emails(vec![
            sample_email("a", "first", 1_000),
            sample_email("b", "second", 2_000),
        ]);
        let context = AppContext::assemble(
            ContextConfig::from_settings(&SETTINGS),
            DatabaseManager::in_memory().unwrap(),
            SignalManager::new(),
            Arc::new(MemoryBroker::new()),
            Arc::new(FakeFactory { mailbox }),
        )
        .unwrap();

        context.start().await.unwrap();
        let status = ServiceStatus::get(&context).await;
        assert!(status.scheduler_running);
        assert!(status.event_bus_running);
        assert_eq!(
            context.start().await.unwrap_err().code(),
            ErrorCode::MethodNotAllowed
        );

        let account = context
            .accounts
            .create(AccountCreateRequest {
                email: "ctx@example.com".into(),
                provider: EmailProvider::Qq,
                protocol: Protocol::Imap,
                credentials: Credentials {
                    auth_type: AuthType::Password,
                    password: Some("secret".into()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        let log = context
            .sync
            .sync_account(&account.uid, SyncType::Manual)
            .await
            .unwrap();
        assert_eq!(log.status, SyncStatus::Success);
        // the ticker's first tick may have synced the account already
        assert_eq!(log.emails_new + log.emails_updated, 2);
        let page = context
            .emails
            .list_by_account(&account.uid, None, None)
            .await
            .unwrap();
        assert_eq!(page.total_items, 2);

        context.shutdown().await;
        let status = ServiceStatus::get(&context).await;
        assert!(!status.scheduler_running);
        assert!(!status.event_bus_running);
        context.shutdown().await;
    }
}
