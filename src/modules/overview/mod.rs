// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashMap;
use std::sync::Arc;

use native_db::Database;
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::modules::account::entity::{Account, AccountStatus, SyncStatus};
use crate::modules::adapter::EmailProvider;
use crate::modules::email::entity::EmailRecord;
use crate::modules::email::service::is_unread;
use crate::modules::error::MailFusionResult;
use crate::modules::hook::entity::Webhook;
use crate::modules::rule::entity::EmailRule;
use crate::modules::sync::log::SyncLog;
use crate::utc_now;


pub(crate) const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Counters across every stored entity.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Object)]
pub struct SystemStats {
    pub total_emails: u64,
    pub unread_emails: u64,
    /// Emails received since midnight UTC
    pub today_emails: u64,
    pub total_accounts: u64,
    pub active_accounts: u64,
    pub total_syncs: u64,
    pub success_syncs: u64,
    pub failed_syncs: u64,
    /// Start time of the newest sync run (UNIX epoch milliseconds)
    pub last_sync_time: Option<i64>,
    pub total_rules: u64,
    pub active_rules: u64,
    pub total_webhooks: u64,
    pub active_webhooks: u64,
}

impl SystemStats {
    pub async fn get(database: &Arc<Database<'static>>) -> MailFusionResult<Self> {
        Self::at(database, utc_now!()).await
    }

    pub async fn at(database: &Arc<Database<'static>>, now: i64) -> MailFusionResult<Self> {
        let day_start = now - now.rem_euclid(DAY_MS);
        let mut stats = Self::default();

        for email in EmailRecord::list_all(database).await? {
            if email.is_deleted {
                continue;
            }
            stats.total_emails += 1;
            if is_unread(&email) {
                stats.unread_emails += 1;
            }
            if email.received_at >= day_start {
                stats.today_emails += 1;
            }
        }

        let accounts = Account::list_all(database).await?;
        stats.total_accounts = accounts.len() as u64;
        stats.active_accounts = accounts
            .iter()
            .filter(|a| a.status == AccountStatus::Active)
            .count() as u64;

        for log in SyncLog::list_all(database).await? {
            stats.total_syncs += 1;
            match log.status {
                SyncStatus::Success => stats.success_syncs += 1,
                SyncStatus::Failed => stats.failed_syncs += 1,
                SyncStatus::Running => {}
            }
            stats.last_sync_time = stats.last_sync_time.max(Some(log.started_at));
        }

        let rules = EmailRule::list_all(database).await?;
        stats.total_rules = rules.len() as u64;
        stats.active_rules = rules.iter().filter(|r| r.enabled).count() as u64;

        let webhooks = Webhook::list_all(database).await?;
        stats.total_webhooks = webhooks.len() as u64;
        stats.active_webhooks = webhooks.iter().filter(|w| w.enabled).count() as u64;
        Ok(stats)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Running,
    Failed,
}

/// Per-account sync overview, derived from the newest sync log.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize, Object)]
pub struct SyncStatusEntry {
    pub account_uid: String,
    pub account_email: String,
    pub provider: EmailProvider,
    /// Minutes between scheduled syncs
    pub sync_interval: u32,
    pub status: SyncState,
    /// Start time of the newest sync run (UNIX epoch milliseconds)
    pub last_sync_time: Option<i64>,
    /// Earliest next scheduled run, absent when sync is disabled
    pub next_sync_time: Option<i64>,
    pub error_message: Option<String>,
    pub email_count: u64,
    pub unread_count: u64,
}

impl SyncStatusEntry {
    /// One entry per account, ordered by account email.
    pub async fn list(database: &Arc<Database<'static>>) -> MailFusionResult<Vec<Self>> {
        let mut counts: HashMap<String, (u64, u64)> = HashMap::new();
        for email in EmailRecord::list_all(database).await? {
            if email.is_deleted {
                continue;
            }
            let entry = counts.entry(email.account_uid.clone()).or_default();
            entry.0 += 1;
            if is_unread(&email) {
                entry.1 += 1;
            }
        }

        let mut accounts = Account::list_all(database).await?;
        accounts.sort_by(|a, b| a.email.cmp(&b.email));
        let mut entries = Vec::with_capacity(accounts.len());
        for account in accounts {
            let latest = SyncLog::latest_for_account(database, &account.uid).await?;
            let (email_count, unread_count) = counts.get(&account.uid).copied().unwrap_or_default();
            entries.push(Self::from_parts(account, latest, email_count, unread_count));
        }
        Ok(entries)
    }

    fn from_parts(
        account: Account,
        latest: Option<SyncLog>,
        email_count: u64,
        unread_count: u64,
    ) -> Self {
        let (status, error_message) = match &latest {
            Some(log) if log.status == SyncStatus::Running => (SyncState::Running, None),
            Some(log) if log.status == SyncStatus::Failed => {
                (SyncState::Failed, log.error_message.clone())
            }
            _ => (SyncState::Idle, None),
        };
        let last_sync_time = latest.as_ref().map(|log| log.started_at);
        let next_sync_time = match (account.sync_enabled, last_sync_time) {
            (true, Some(last)) => Some(last + i64::from(account.sync_interval.max(1)) * 60 * 1000),
            _ => None,
        };
        Self {
            account_uid: account.uid,
            account_email: account.email,
            provider: account.provider,
            sync_interval: account.sync_interval,
            status,
            last_sync_time,
            next_sync_time,
            error_message,
            email_count,
            unread_count,
        }
    }
}
