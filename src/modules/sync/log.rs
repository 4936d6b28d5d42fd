// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use itertools::Itertools;
use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::modules::account::entity::SyncStatus;
use crate::modules::database::{
    batch_delete_impl, db_error, insert_impl, list_all_impl, paginate_secondary_scan_impl,
    time_key, update_impl, Paginated,
};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::{id, raise_error, utc_now};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum SyncType {
    #[default]
    Scheduled,
    Manual,
}

/// One sync run. Inserted as `running`, finalized exactly once.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 6, version = 1)]
#[native_db(secondary_key(account_time_key -> String))]
pub struct SyncLog {
    #[primary_key]
    pub id: u64,
    pub account_uid: String,
    pub sync_type: SyncType,
    pub status: SyncStatus,
    pub emails_fetched: u64,
    pub emails_new: u64,
    pub emails_updated: u64,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    /// Error code and source location of the failure
    pub error_stack: Option<String>,
}

/// Counters gathered while a run is in flight.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SyncCounters {
    pub fetched: u64,
    pub new: u64,
    pub updated: u64,
}

impl SyncLog {
    fn account_time_key(&self) -> String {
        format!("{}:{}:{}", self.account_uid, time_key(self.started_at), self.id)
    }

    pub async fn start(
        database: &Arc<Database<'static>>,
        account_uid: &str,
        sync_type: SyncType,
    ) -> MailFusionResult<SyncLog> {
        let log = SyncLog {
            id: id!(64),
            account_uid: account_uid.to_string(),
            sync_type,
            status: SyncStatus::Running,
            emails_fetched: 0,
            emails_new: 0,
            emails_updated: 0,
            started_at: utc_now!(),
            completed_at: None,
            duration_ms: None,
            error_message: None,
            error_stack: None,
        };
        insert_impl(database, log.clone()).await?;
        Ok(log)
    }

    /// Writes the terminal state. `error` carries the message and the stack text.
    pub async fn finish(
        database: &Arc<Database<'static>>,
        id: u64,
        counters: SyncCounters,
        error: Option<(String, String)>,
    ) -> MailFusionResult<SyncLog> {
        update_impl(
            database,
            move |rw| {
                rw.get()
                    .primary::<SyncLog>(id)
                    .map_err(db_error)?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Sync log id='{id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                if current.status != SyncStatus::Running {
                    return Err(raise_error!(
                        format!("Sync log id='{id}' is already finalized"),
                        ErrorCode::MethodNotAllowed
                    ));
                }
                let now = utc_now!();
                let mut done = current.clone();
                done.emails_fetched = counters.fetched;
                done.emails_new = counters.new;
                done.emails_updated = counters.updated;
                done.completed_at = Some(now);
                done.duration_ms = Some((now - current.started_at).max(0));
                match error {
                    Some((message, stack)) => {
                        done.status = SyncStatus::Failed;
                        done.error_message = Some(message);
                        done.error_stack = Some(stack);
                    }
                    None => done.status = SyncStatus::Success,
                }
                Ok(done)
            },
        )
        .await
    }

    /// Newest first.
    pub async fn paginate_by_account(
        database: &Arc<Database<'static>>,
        account_uid: &str,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> MailFusionResult<Paginated<SyncLog>> {
        paginate_secondary_scan_impl(
            database,
            page,
            page_size,
            Some(true),
            SyncLogKey::account_time_key,
            format!("{}:", account_uid),
        )
        .await
    }

    pub async fn latest_for_account(
        database: &Arc<Database<'static>>,
        account_uid: &str,
    ) -> MailFusionResult<Option<SyncLog>> {
        let page = Self::paginate_by_account(database, account_uid, Some(1), Some(1)).await?;
        Ok(page.items.into_iter().next())
    }

    pub async fn list_all(database: &Arc<Database<'static>>) -> MailFusionResult<Vec<SyncLog>> {
        list_all_impl(database).await
    }

    pub async fn delete_by_account(
        database: &Arc<Database<'static>>,
        account_uid: &str,
    ) -> MailFusionResult<usize> {
        let prefix = format!("{}:", account_uid);
        batch_delete_impl(database, move |rw| {
            let logs: Vec<SyncLog> = rw
                .scan()
                .secondary(SyncLogKey::account_time_key)
                .map_err(db_error)?
                .start_with(prefix)
                .map_err(db_error)?
                .try_collect()
                .map_err(db_error)?;
            Ok(logs)
        })
        .await
    }
}
