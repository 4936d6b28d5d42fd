// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::modules::adapter::factory::resolve_server;
use crate::modules::adapter::{
    AdapterConfig, AuthType, Credentials, EmailProvider, Protocol, ServerConfig,
};
use crate::modules::common::proxy::ProxyConfig;
use crate::modules::database::{
    async_find_impl, db_error, delete_impl, insert_impl, list_all_impl, update_impl,
};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::utils::encrypt::Cipher;
use crate::{raise_error, utc_now};

pub const DEFAULT_SYNC_INTERVAL_MIN: u32 = 5;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Disabled,
    /// Set by the system after a failed sync; cleared with `clear_sync_error`.
    Error,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
    Running,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Object)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct Account {
    /// Stable account identifier
    #[primary_key]
    pub uid: String,
    /// Mailbox address
    #[secondary_key(unique)]
    pub email: String,
    pub provider: EmailProvider,
    pub protocol: Protocol,
    pub auth_type: AuthType,
    /// Credential JSON blob, encrypted. Never leaves the server.
    #[oai(skip)]
    pub encrypted_credentials: String,
    /// Explicit endpoint, required for the `generic` provider
    pub server: Option<ServerConfig>,
    /// Outbound proxy. The stored password is ciphertext.
    pub proxy: Option<ProxyConfig>,
    pub status: AccountStatus,
    pub sync_enabled: bool,
    /// Scheduled sync interval in minutes
    pub sync_interval: u32,
    /// Completion time of the last successful sync (UNIX epoch milliseconds)
    pub last_sync_at: Option<i64>,
    pub last_sync_status: Option<SyncStatus>,
    pub last_sync_error: Option<String>,
    pub total_emails: u64,
    /// Creation timestamp (UNIX epoch milliseconds)
    pub created_at: i64,
    /// Last update timestamp (UNIX epoch milliseconds)
    pub updated_at: i64,
}

impl Account {
    pub fn credentials(&self, cipher: &Cipher) -> MailFusionResult<Credentials> {
        let json = cipher.decrypt(&self.encrypted_credentials)?;
        if json.is_empty() {
            return Ok(Credentials {
                auth_type: self.auth_type,
                ..Default::default()
            });
        }
        serde_json::from_str(&json).map_err(|e| {
            raise_error!(
                format!("Stored credentials of account {} are unreadable: {}", self.uid, e),
                ErrorCode::InternalError
            )
        })
    }

    pub fn encrypt_credentials(
        cipher: &Cipher,
        credentials: &Credentials,
    ) -> MailFusionResult<String> {
        let json = serde_json::to_string(credentials).map_err(|e| {
            raise_error!(
                format!("Failed to encode credentials: {}", e),
                ErrorCode::InternalError
            )
        })?;
        cipher.encrypt(&json)
    }

    /// Copy of `proxy` with the password run through `f`.
    pub fn map_proxy_password(
        proxy: Option<&ProxyConfig>,
        f: impl Fn(&str) -> MailFusionResult<String>,
    ) -> MailFusionResult<Option<ProxyConfig>> {
        proxy
            .map(|proxy| {
                let mut copy = proxy.clone();
                copy.password = proxy
                    .password
                    .as_deref()
                    .map(&f)
                    .transpose()?
                    .filter(|p| !p.is_empty());
                Ok(copy)
            })
            .transpose()
    }

    /// Decrypted, endpoint-resolved configuration for building an adapter.
    pub fn adapter_config(&self, cipher: &Cipher) -> MailFusionResult<AdapterConfig> {
        let server = resolve_server(self.provider, self.protocol, self.server.as_ref())?;
        let proxy = Self::map_proxy_password(self.proxy.as_ref(), |p| cipher.decrypt(p))?;
        Ok(AdapterConfig {
            email: self.email.clone(),
            provider: self.provider,
            protocol: self.protocol,
            credentials: self.credentials(cipher)?,
            server,
            proxy,
        })
    }

    /// Copy safe to hand out over the API: the proxy password is dropped.
    pub fn redacted(mut self) -> Self {
        if let Some(proxy) = self.proxy.as_mut() {
            proxy.password = None;
        }
        self.encrypted_credentials.clear();
        self
    }

    pub fn is_syncable(&self) -> bool {
        self.sync_enabled && self.status == AccountStatus::Active
    }

    pub async fn find(
        database: &Arc<Database<'static>>,
        uid: &str,
    ) -> MailFusionResult<Option<Account>> {
        async_find_impl(database, uid.to_string()).await
    }

    pub async fn get(database: &Arc<Database<'static>>, uid: &str) -> MailFusionResult<Account> {
        Self::find(database, uid).await?.ok_or_else(|| {
            raise_error!(
                format!("Account uid='{uid}' not found"),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn save(&self, database: &Arc<Database<'static>>) -> MailFusionResult<()> {
        insert_impl(database, self.to_owned()).await
    }

    /// Oldest first.
    pub async fn list_all(database: &Arc<Database<'static>>) -> MailFusionResult<Vec<Account>> {
        let mut accounts: Vec<Account> = list_all_impl(database).await?;
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    /// Applies `apply` to the stored row inside one write transaction and returns the result.
    pub async fn modify(
        database: &Arc<Database<'static>>,
        uid: &str,
        apply: impl FnOnce(&mut Account) -> MailFusionResult<()> + Send + 'static,
    ) -> MailFusionResult<Account> {
        let key = uid.to_string();
        update_impl(
            database,
            move |rw| {
                rw.get()
                    .primary::<Account>(key.clone())
                    .map_err(db_error)?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Account uid='{key}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                apply(&mut updated)?;
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await
    }

    pub async fn delete(database: &Arc<Database<'static>>, uid: &str) -> MailFusionResult<()> {
        let key = uid.to_string();
        delete_impl(database, move |rw| {
            rw.get()
                .primary::<Account>(key.clone())
                .map_err(db_error)?
                .ok_or_else(|| {
                    raise_error!(
                        format!("The account uid='{key}' that you want to delete was not found."),
                        ErrorCode::ResourceNotFound
                    )
                })
        })
        .await
    }
}
