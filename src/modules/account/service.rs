// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use native_db::Database;
use tracing::info;

use crate::modules::account::entity::{Account, AccountStatus, DEFAULT_SYNC_INTERVAL_MIN};
use crate::modules::account::payload::{AccountCreateRequest, AccountUpdateRequest};
use crate::modules::adapter::factory::ProviderFactory;
use crate::modules::email::entity::EmailRecord;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::events::bus::EventBus;
use crate::modules::events::{Event, EventType};
use crate::modules::rule::entity::EmailRule;
use crate::modules::sync::lock::SyncLocks;
use crate::modules::sync::log::SyncLog;
use crate::modules::utils::encrypt::Cipher;
use crate::{raise_error, uid, utc_now};

/// Account lifecycle. Secrets are encrypted before they reach the store.
pub struct AccountService {
    database: Arc<Database<'static>>,
    cipher: Cipher,
    bus: Arc<EventBus>,
    factory: Arc<dyn ProviderFactory>,
    /// Shared with the sync manager so deletes never overlap a running sync.
    locks: SyncLocks,
}

impl AccountService {
    pub fn new(
        database: Arc<Database<'static>>,
        cipher: Cipher,
        bus: Arc<EventBus>,
        factory: Arc<dyn ProviderFactory>,
        locks: SyncLocks,
    ) -> Self {
        Self {
            database,
            cipher,
            bus,
            factory,
            locks,
        }
    }

    pub async fn create(&self, request: AccountCreateRequest) -> MailFusionResult<Account> {
        request.validate()?;
        if self.list().await?.iter().any(|a| a.email == request.email) {
            return Err(raise_error!(
                format!("An account for '{}' already exists", request.email),
                ErrorCode::AlreadyExists
            ));
        }

        let now = utc_now!();
        let account = Account {
            uid: uid!(),
            email: request.email,
            provider: request.provider,
            protocol: request.protocol,
            auth_type: request.credentials.auth_type,
            encrypted_credentials: Account::encrypt_credentials(
                &self.cipher,
                &request.credentials,
            )?,
            server: request.server.filter(|s| !s.host.trim().is_empty()),
            proxy: Account::map_proxy_password(request.proxy.as_ref(), |p| {
                self.cipher.encrypt(p)
            })?,
            status: AccountStatus::Active,
            sync_enabled: request.sync_enabled.unwrap_or(true),
            sync_interval: request.sync_interval.unwrap_or(DEFAULT_SYNC_INTERVAL_MIN),
            last_sync_at: None,
            last_sync_status: None,
            last_sync_error: None,
            total_emails: 0,
            created_at: now,
            updated_at: now,
        };
        account.save(&self.database).await?;
        info!(account_uid = %account.uid, email = %account.email, "Account created");
        self.bus
            .emit(Event::account(
                EventType::AccountAdded,
                &account.uid,
                &account.email,
            ))
            .await;
        Ok(account)
    }

    pub async fn get_by_uid(&self, uid: &str) -> MailFusionResult<Account> {
        Account::get(&self.database, uid).await
    }

    pub async fn list(&self) -> MailFusionResult<Vec<Account>> {
        Account::list_all(&self.database).await
    }

    pub async fn update(
        &self,
        uid: &str,
        request: AccountUpdateRequest,
    ) -> MailFusionResult<Account> {
        let current = self.get_by_uid(uid).await?;
        request.validate(current.provider, current.protocol)?;

        // encrypt before entering the write transaction
        let credentials = request
            .credentials
            .as_ref()
            .map(|c| Account::encrypt_credentials(&self.cipher, c).map(|e| (c.auth_type, e)))
            .transpose()?;
        let proxy =
            Account::map_proxy_password(request.proxy.as_ref(), |p| self.cipher.encrypt(p))?;

        let updated = Account::modify(&self.database, uid, move |account| {
            if let Some((auth_type, encrypted)) = credentials {
                account.auth_type = auth_type;
                account.encrypted_credentials = encrypted;
            }
            if let Some(server) = request.server {
                account.server = Some(server).filter(|s| !s.host.trim().is_empty());
            }
            if let Some(proxy) = proxy {
                account.proxy = Some(proxy);
            }
            if let Some(sync_enabled) = request.sync_enabled {
                account.sync_enabled = sync_enabled;
            }
            if let Some(interval) = request.sync_interval {
                account.sync_interval = interval;
            }
            Ok(())
        })
        .await?;
        self.bus
            .emit(Event::account(
                EventType::AccountUpdated,
                &updated.uid,
                &updated.email,
            ))
            .await;
        Ok(updated)
    }

    /// Removes the account together with its emails, rules and sync logs.
    ///
    /// Waits for a sync of the account that is already running; syncs queued
    /// behind the delete find no account and are rejected.
    pub async fn delete(&self, uid: &str) -> MailFusionResult<()> {
        let account = self.get_by_uid(uid).await?;
        let guard = self.locks.acquire(uid).await;
        let cascade = self.cascade_delete(uid).await;
        drop(guard);
        self.locks.forget(uid);
        let (emails, rules, logs) = cascade?;
        info!(
            account_uid = %uid,
            "Account deleted with {} emails, {} rules and {} sync logs",
            emails, rules, logs
        );
        self.bus
            .emit(Event::account(
                EventType::AccountDeleted,
                &account.uid,
                &account.email,
            ))
            .await;
        Ok(())
    }

    async fn cascade_delete(&self, uid: &str) -> MailFusionResult<(usize, usize, usize)> {
        let emails = EmailRecord::delete_by_account(&self.database, uid).await?;
        let rules = EmailRule::delete_by_account(&self.database, uid).await?;
        let logs = SyncLog::delete_by_account(&self.database, uid).await?;
        Account::delete(&self.database, uid).await?;
        Ok((emails, rules, logs))
    }

    /// Checks the stored credentials against the remote without syncing.
    pub async fn test_connection(&self, uid: &str) -> MailFusionResult<()> {
        let account = self.get_by_uid(uid).await?;
        let adapter = self
            .factory
            .create(account.adapter_config(&self.cipher)?)?;
        adapter.test_connection().await
    }

    pub async fn set_status(&self, uid: &str, status: AccountStatus) -> MailFusionResult<Account> {
        if status == AccountStatus::Error {
            return Err(raise_error!(
                "Status 'error' is set by the sync engine and cannot be assigned".into(),
                ErrorCode::InvalidParameter
            ));
        }
        Account::modify(&self.database, uid, move |account| {
            account.status = status;
            Ok(())
        })
        .await
    }

    pub async fn enable_sync(&self, uid: &str) -> MailFusionResult<Account> {
        self.set_sync_enabled(uid, true).await
    }

    pub async fn disable_sync(&self, uid: &str) -> MailFusionResult<Account> {
        self.set_sync_enabled(uid, false).await
    }

    async fn set_sync_enabled(&self, uid: &str, enabled: bool) -> MailFusionResult<Account> {
        Account::modify(&self.database, uid, move |account| {
            account.sync_enabled = enabled;
            Ok(())
        })
        .await
    }

    /// Forgets the last failure and takes the account out of the `error` state.
    pub async fn clear_sync_error(&self, uid: &str) -> MailFusionResult<Account> {
        Account::modify(&self.database, uid, |account| {
            account.last_sync_error = None;
            if account.status == AccountStatus::Error {
                account.status = AccountStatus::Active;
            }
            Ok(())
        })
        .await
    }
}
