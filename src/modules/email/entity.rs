// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use itertools::Itertools;
use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::modules::common::Addr;
use crate::modules::database::{
    async_find_impl, batch_delete_impl, db_error, filter_by_secondary_key_impl, list_all_impl,
    paginate_secondary_scan_impl, secondary_find_impl, time_key, update_impl, write_txn,
    Paginated,
};
use crate::modules::email::model::{Attachment, Email};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::{id, raise_error, utc_now};

/// Persisted message: the canonical email plus local-only state.
///
/// Sync only ever rewrites the remote-derived fields. `is_read`, `is_starred`,
/// `is_archived`, `is_deleted`, `local_labels` and `local_folder` belong to the user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 2, version = 1)]
#[native_db(
    secondary_key(email_key -> String, unique),
    secondary_key(account_time_key -> String)
)]
pub struct EmailRecord {
    #[primary_key]
    pub id: u64,
    #[secondary_key]
    pub account_uid: String,
    pub provider_id: String,
    pub message_id: Option<String>,
    pub subject: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub to: Vec<Addr>,
    pub cc: Vec<Addr>,
    pub bcc: Vec<Addr>,
    pub reply_to: Vec<Addr>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub snippet: String,

    pub is_read: bool,
    pub is_starred: bool,
    pub is_archived: bool,
    /// Soft delete marker. Records are never removed by sync.
    pub is_deleted: bool,
    pub local_labels: Vec<String>,
    pub local_folder: Option<String>,

    pub source_is_read: Option<bool>,
    pub source_labels: Vec<String>,
    pub source_folder: Option<String>,

    pub has_attachments: bool,
    pub attachments_count: u32,
    pub attachments: Vec<Attachment>,

    pub sent_at: i64,
    pub received_at: i64,
    pub synced_at: i64,
    pub size_bytes: u64,
    pub thread_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Natural key of a message: `(provider_id, account_uid)`.
pub fn email_key_of(account_uid: &str, provider_id: &str) -> String {
    format!("{}:{}", account_uid, provider_id)
}

/// Prefix shared by every `account_time_key` of one account.
pub fn account_prefix(account_uid: &str) -> String {
    format!("{}:", account_uid)
}

/// What an upsert did to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(u64),
    Updated(u64),
}

impl EmailRecord {
    fn email_key(&self) -> String {
        email_key_of(&self.account_uid, &self.provider_id)
    }

    fn account_time_key(&self) -> String {
        format!(
            "{}{}:{}",
            account_prefix(&self.account_uid),
            time_key(self.received_at),
            self.id
        )
    }

    pub fn from_email(account_uid: &str, email: Email) -> Self {
        let now = utc_now!();
        Self {
            id: id!(64),
            account_uid: account_uid.to_string(),
            provider_id: email.provider_id,
            message_id: email.message_id,
            subject: email.subject,
            from_address: email.from_address,
            from_name: email.from_name,
            to: email.to,
            cc: email.cc,
            bcc: email.bcc,
            reply_to: email.reply_to,
            text_body: email.text_body,
            html_body: email.html_body,
            snippet: email.snippet,
            source_is_read: email.source_is_read,
            source_labels: email.source_labels,
            source_folder: email.source_folder,
            has_attachments: email.has_attachments,
            attachments_count: email.attachments_count,
            attachments: email.attachments,
            sent_at: email.sent_at,
            received_at: email.received_at,
            synced_at: now,
            size_bytes: email.size_bytes,
            thread_id: email.thread_id,
            in_reply_to: email.in_reply_to,
            references: email.references,
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }

    /// Overwrites the remote-derived fields from a fresh fetch.
    ///
    /// Identity, local state and `received_at` (part of the sort key) are kept.
    pub fn refresh_from(&self, email: &Email) -> Self {
        let now = utc_now!();
        let mut updated = self.clone();
        updated.subject = email.subject.clone();
        updated.text_body = email.text_body.clone();
        updated.html_body = email.html_body.clone();
        updated.snippet = email.snippet.clone();
        updated.source_is_read = email.source_is_read;
        updated.source_labels = email.source_labels.clone();
        updated.source_folder = email.source_folder.clone();
        updated.has_attachments = email.has_attachments;
        updated.attachments_count = email.attachments_count;
        updated.attachments = email.attachments.clone();
        updated.size_bytes = email.size_bytes;
        updated.synced_at = now;
        updated.updated_at = now;
        updated
    }

    /// Inserts the email or refreshes the existing row with the same natural key,
    /// inside one transaction.
    pub async fn upsert_from_sync(
        database: &Arc<Database<'static>>,
        account_uid: &str,
        email: Email,
    ) -> MailFusionResult<UpsertOutcome> {
        let account_uid = account_uid.to_string();
        write_txn(database, move |rw| {
            let key = email_key_of(&account_uid, &email.provider_id);
            let existing: Option<EmailRecord> = rw
                .get()
                .secondary(EmailRecordKey::email_key, key)
                .map_err(db_error)?;
            match existing {
                Some(current) => {
                    let refreshed = current.refresh_from(&email);
                    let id = current.id;
                    rw.update(current, refreshed).map_err(db_error)?;
                    Ok(UpsertOutcome::Updated(id))
                }
                None => {
                    let record = EmailRecord::from_email(&account_uid, email);
                    let id = record.id;
                    rw.insert(record).map_err(db_error)?;
                    Ok(UpsertOutcome::Created(id))
                }
            }
        })
        .await
    }

    pub async fn find(
        database: &Arc<Database<'static>>,
        id: u64,
    ) -> MailFusionResult<Option<EmailRecord>> {
        async_find_impl(database, id).await
    }

    pub async fn get(database: &Arc<Database<'static>>, id: u64) -> MailFusionResult<EmailRecord> {
        Self::find(database, id).await?.ok_or_else(|| {
            raise_error!(
                format!("Email id='{id}' not found"),
                ErrorCode::ResourceNotFound
            )
        })
    }

    /// Read-modify-write of the local-only state of one record.
    pub async fn modify_local(
        database: &Arc<Database<'static>>,
        id: u64,
        apply: impl FnOnce(&mut EmailRecord) + Send + 'static,
    ) -> MailFusionResult<EmailRecord> {
        update_impl(
            database,
            move |rw| {
                rw.get()
                    .primary::<EmailRecord>(id)
                    .map_err(db_error)?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Email id='{id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                apply(&mut updated);
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await
    }

    pub async fn find_by_natural_key(
        database: &Arc<Database<'static>>,
        account_uid: &str,
        provider_id: &str,
    ) -> MailFusionResult<Option<EmailRecord>> {
        secondary_find_impl(
            database,
            EmailRecordKey::email_key,
            email_key_of(account_uid, provider_id),
        )
        .await
    }

    pub async fn list_all(database: &Arc<Database<'static>>) -> MailFusionResult<Vec<EmailRecord>> {
        list_all_impl(database).await
    }

    pub async fn list_by_account(
        database: &Arc<Database<'static>>,
        account_uid: &str,
    ) -> MailFusionResult<Vec<EmailRecord>> {
        let owner = account_uid.to_string();
        let records: Vec<EmailRecord> = filter_by_secondary_key_impl(
            database,
            EmailRecordKey::account_uid,
            account_uid.to_string(),
        )
        .await?;
        Ok(records.into_iter().filter(|r| r.account_uid == owner).collect())
    }

    /// Newest first.
    pub async fn paginate_by_account(
        database: &Arc<Database<'static>>,
        account_uid: &str,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> MailFusionResult<Paginated<EmailRecord>> {
        paginate_secondary_scan_impl(
            database,
            page,
            page_size,
            Some(true),
            EmailRecordKey::account_time_key,
            account_prefix(account_uid),
        )
        .await
    }

    pub async fn count_by_account(
        database: &Arc<Database<'static>>,
        account_uid: &str,
    ) -> MailFusionResult<u64> {
        Ok(Self::list_by_account(database, account_uid).await?.len() as u64)
    }

    pub async fn delete_by_account(
        database: &Arc<Database<'static>>,
        account_uid: &str,
    ) -> MailFusionResult<usize> {
        let prefix = account_prefix(account_uid);
        batch_delete_impl(database, move |rw| {
            let records: Vec<EmailRecord> = rw
                .scan()
                .secondary(EmailRecordKey::account_time_key)
                .map_err(db_error)?
                .start_with(prefix)
                .map_err(db_error)?
                .try_collect()
                .map_err(db_error)?;
            Ok(records)
        })
        .await
    }
}
