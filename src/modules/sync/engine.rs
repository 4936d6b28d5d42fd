// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::future::Future;
use std::sync::Arc;

use native_db::Database;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::modules::account::entity::{Account, AccountStatus, SyncStatus};
use crate::modules::adapter::factory::ProviderFactory;
use crate::modules::adapter::oauth2::ensure_fresh_token;
use crate::modules::adapter::MailProvider;
use crate::modules::email::entity::{EmailRecord, UpsertOutcome};
use crate::modules::email::model::Email;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::{MailFusionError, MailFusionResult};
use crate::modules::events::bus::EventBus;
use crate::modules::events::{Event, EventData, EventType};
use crate::modules::sync::log::{SyncCounters, SyncLog, SyncType};
use crate::modules::utils::encrypt::Cipher;
use crate::modules::utils::shutdown::stop_requested;
use crate::{raise_error, utc_now};

/// Overlap applied to the previous successful sync to absorb clock skew and late delivery.
pub const SYNC_OVERLAP_MS: i64 = 5 * 60 * 1000;
/// Lookback of an account that never synced successfully.
pub const COLD_START_LOOKBACK_MS: i64 = 30 * 24 * 60 * 60 * 1000;
pub const DEFAULT_FETCH_CAP: usize = 1000;

/// Lower bound of the fetch window.
pub fn compute_since(last_sync_at: Option<i64>, now: i64) -> i64 {
    match last_sync_at {
        Some(last) if last > 0 => last - SYNC_OVERLAP_MS,
        _ => now - COLD_START_LOOKBACK_MS,
    }
}

/// Runs one account sync from fetch to persisted outcome.
pub struct SyncEngine {
    database: Arc<Database<'static>>,
    cipher: Cipher,
    bus: Arc<EventBus>,
    factory: Arc<dyn ProviderFactory>,
    fetch_cap: usize,
}

impl SyncEngine {
    pub fn new(
        database: Arc<Database<'static>>,
        cipher: Cipher,
        bus: Arc<EventBus>,
        factory: Arc<dyn ProviderFactory>,
        fetch_cap: usize,
    ) -> Self {
        Self {
            database,
            cipher,
            bus,
            factory,
            fetch_cap: if fetch_cap == 0 { DEFAULT_FETCH_CAP } else { fetch_cap },
        }
    }

    pub fn database(&self) -> &Arc<Database<'static>> {
        &self.database
    }

    /// Syncs one account and returns its finalized log.
    ///
    /// Rejections before the run starts (unknown account, sync disabled, account disabled)
    /// are errors. Once the log is written, a failed run is reported through the log and
    /// the account, and still returns `Ok`.
    pub async fn sync_account(
        &self,
        account_uid: &str,
        sync_type: SyncType,
        cancel: &mut watch::Receiver<bool>,
    ) -> MailFusionResult<SyncLog> {
        let account = Account::get(&self.database, account_uid).await?;
        if !account.sync_enabled {
            return Err(raise_error!(
                format!("Sync is disabled for account uid='{account_uid}'"),
                ErrorCode::SyncDisabled
            ));
        }
        if account.status == AccountStatus::Disabled {
            return Err(raise_error!(
                format!("Account uid='{account_uid}' is disabled"),
                ErrorCode::AccountDisabled
            ));
        }

        let log = SyncLog::start(&self.database, account_uid, sync_type).await?;
        let marked = Account::modify(&self.database, account_uid, |a| {
            a.last_sync_status = Some(SyncStatus::Running);
            Ok(())
        })
        .await;
        if let Err(e) = marked {
            return Err(abandon_log(&self.database, log.id, e).await);
        }
        info!(account_uid = %account_uid, sync_type = ?sync_type, "Sync started");
        self.bus
            .emit(self.sync_event(EventType::SyncStarted, &account, &log, None))
            .await;

        let mut counters = SyncCounters::default();
        let outcome = self.run(&account, &mut counters, cancel).await;
        let error = outcome
            .as_ref()
            .err()
            .map(|e| (e.message().to_string(), stack_of(e)));
        let finished = SyncLog::finish(&self.database, log.id, counters, error).await?;
        let total = EmailRecord::count_by_account(&self.database, account_uid).await?;
        let updated = self.record_outcome(&account, &outcome, total).await?;

        match &outcome {
            Ok(()) => {
                info!(
                    account_uid = %account_uid,
                    "Sync completed: fetched={} new={} updated={} in {}ms",
                    counters.fetched, counters.new, counters.updated,
                    finished.duration_ms.unwrap_or_default()
                );
                self.bus
                    .emit(self.sync_event(EventType::SyncCompleted, &updated, &finished, None))
                    .await;
            }
            Err(e) => {
                error!(account_uid = %account_uid, "Sync failed: {}", e);
                self.bus
                    .emit(self.sync_event(EventType::SyncFailed, &updated, &finished, Some(e)))
                    .await;
            }
        }
        self.bus
            .emit(self.sync_event(EventType::AccountSynced, &updated, &finished, None))
            .await;
        Ok(finished)
    }

    async fn run(
        &self,
        account: &Account,
        counters: &mut SyncCounters,
        cancel: &mut watch::Receiver<bool>,
    ) -> MailFusionResult<()> {
        let since = compute_since(account.last_sync_at, utc_now!());
        let mut config = account.adapter_config(&self.cipher)?;
        if ensure_fresh_token(&mut config.credentials, config.proxy.as_ref()).await? {
            let encrypted = Account::encrypt_credentials(&self.cipher, &config.credentials)?;
            Account::modify(&self.database, &account.uid, move |a| {
                a.encrypted_credentials = encrypted;
                Ok(())
            })
            .await?;
            debug!(account_uid = %account.uid, "Persisted refreshed OAuth2 credentials");
        }

        let mut adapter = self.factory.create(config)?;
        let fetched = self.fetch(adapter.as_mut(), since, cancel).await;
        if let Err(e) = adapter.disconnect().await {
            warn!(account_uid = %account.uid, "Disconnect failed: {}", e);
        }
        let emails = fetched?;
        counters.fetched = emails.len() as u64;

        for email in emails {
            if cancelled(cancel) {
                return Err(shutdown_error());
            }
            let provider_id = email.provider_id.clone();
            match self.store(&account.uid, email).await {
                Ok(UpsertOutcome::Created(_)) => counters.new += 1,
                Ok(UpsertOutcome::Updated(_)) => counters.updated += 1,
                Err(e) => warn!(
                    account_uid = %account.uid,
                    provider_id = %provider_id,
                    "Skipping email: {}", e
                ),
            }
        }
        Ok(())
    }

    async fn fetch(
        &self,
        adapter: &mut dyn MailProvider,
        since: i64,
        cancel: &mut watch::Receiver<bool>,
    ) -> MailFusionResult<Vec<Email>> {
        until_cancelled(cancel, adapter.connect()).await?;
        until_cancelled(cancel, adapter.fetch_emails(Some(since), self.fetch_cap)).await
    }

    /// Upserts one email; a new row publishes `email.received`.
    async fn store(&self, account_uid: &str, email: Email) -> MailFusionResult<UpsertOutcome> {
        if email.provider_id.trim().is_empty() {
            return Err(raise_error!(
                "Email has no provider id".into(),
                ErrorCode::MessageParseFailed
            ));
        }
        let subject = email.subject.clone();
        let outcome = EmailRecord::upsert_from_sync(&self.database, account_uid, email).await?;
        if let UpsertOutcome::Created(id) = outcome {
            self.bus
                .emit(Event::email_received(id, account_uid, &subject))
                .await;
        }
        Ok(outcome)
    }

    async fn record_outcome(
        &self,
        account: &Account,
        outcome: &MailFusionResult<()>,
        total_emails: u64,
    ) -> MailFusionResult<Account> {
        let failure = outcome.as_ref().err().map(|e| (e.code(), e.message().to_string()));
        Account::modify(&self.database, &account.uid, move |a| {
            a.total_emails = total_emails;
            match failure {
                None => {
                    a.last_sync_at = Some(utc_now!());
                    a.last_sync_status = Some(SyncStatus::Success);
                    a.last_sync_error = None;
                }
                Some((code, message)) => {
                    a.last_sync_status = Some(SyncStatus::Failed);
                    a.last_sync_error = Some(message);
                    // rejected credentials need user action before the scheduler retries
                    if code == ErrorCode::AuthenticationFailed && a.status == AccountStatus::Active
                    {
                        a.status = AccountStatus::Error;
                    }
                }
            }
            Ok(())
        })
        .await
    }

    fn sync_event(
        &self,
        event_type: EventType,
        account: &Account,
        log: &SyncLog,
        error: Option<&MailFusionError>,
    ) -> Event {
        let mut data = EventData::new();
        data.insert("account_uid".into(), Value::from(account.uid.as_str()));
        data.insert("email".into(), Value::from(account.email.as_str()));
        data.insert("sync_log_id".into(), Value::from(log.id));
        data.insert("emails_fetched".into(), Value::from(log.emails_fetched));
        data.insert("emails_new".into(), Value::from(log.emails_new));
        data.insert("emails_updated".into(), Value::from(log.emails_updated));
        if let Some(e) = error {
            data.insert("error".into(), Value::from(e.message()));
        }
        Event::new(event_type, data, "sync_engine")
    }

    /// Builds the account's adapter and runs its credential check.
    pub async fn test_connection(&self, account_uid: &str) -> MailFusionResult<()> {
        let account = Account::get(&self.database, account_uid).await?;
        let adapter = self.factory.create(account.adapter_config(&self.cipher)?)?;
        adapter.test_connection().await
    }
}

fn cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow()
}

/// Finishes a log whose run never started as failed and hands the error back.
pub(crate) async fn abandon_log(
    database: &Arc<Database<'static>>,
    log_id: u64,
    error: MailFusionError,
) -> MailFusionError {
    let detail = (error.message().to_string(), stack_of(&error));
    if let Err(e) = SyncLog::finish(database, log_id, SyncCounters::default(), Some(detail)).await {
        warn!(log_id, "Failed to close abandoned sync log: {}", e);
    }
    error
}

fn shutdown_error() -> MailFusionError {
    raise_error!("Sync cancelled by shutdown".into(), ErrorCode::InternalError)
}

async fn until_cancelled<T>(
    cancel: &mut watch::Receiver<bool>,
    task: impl Future<Output = MailFusionResult<T>>,
) -> MailFusionResult<T> {
    if cancelled(cancel) {
        return Err(shutdown_error());
    }
    tokio::select! {
        result = task => result,
        _ = stop_requested(cancel) => Err(shutdown_error()),
    }
}

fn stack_of(error: &MailFusionError) -> String {
    match error {
        MailFusionError::Generic { code, location, .. } => {
            format!("{:?} ({}) at {}", code, *code as u32, location)
        }
    }
}
