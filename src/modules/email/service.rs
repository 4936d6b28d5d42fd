// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use native_db::Database;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::modules::database::paginate_vec;
use crate::modules::email::entity::EmailRecord;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::events::bus::EventBus;
use crate::modules::events::{Event, EventType};
use crate::modules::rest::response::DataPage;
use crate::raise_error;

/// Change to the user-owned state of a stored email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalMutation {
    MarkRead,
    MarkUnread,
    Star,
    Unstar,
    Archive,
    Delete,
    MoveFolder(String),
    AddLabel(String),
    RemoveLabel(String),
}

impl LocalMutation {
    pub fn apply(&self, record: &mut EmailRecord) {
        match self {
            LocalMutation::MarkRead => record.is_read = true,
            LocalMutation::MarkUnread => record.is_read = false,
            LocalMutation::Star => record.is_starred = true,
            LocalMutation::Unstar => record.is_starred = false,
            LocalMutation::Archive => record.is_archived = true,
            LocalMutation::Delete => record.is_deleted = true,
            LocalMutation::MoveFolder(folder) => record.local_folder = Some(folder.clone()),
            LocalMutation::AddLabel(label) => {
                if !record.local_labels.contains(label) {
                    record.local_labels.push(label.clone());
                }
            }
            LocalMutation::RemoveLabel(label) => record.local_labels.retain(|l| l != label),
        }
    }

    /// Event announcing the mutation. Unstarring and folder/label edits are silent.
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            LocalMutation::MarkRead => Some(EventType::EmailRead),
            LocalMutation::MarkUnread => Some(EventType::EmailUnread),
            LocalMutation::Star => Some(EventType::EmailStarred),
            LocalMutation::Archive => Some(EventType::EmailArchived),
            LocalMutation::Delete => Some(EventType::EmailDeleted),
            _ => None,
        }
    }
}

/// Local state flags to set on one email. Absent fields are left alone.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct LocalStateRequest {
    pub is_read: Option<bool>,
    pub is_starred: Option<bool>,
    pub is_archived: Option<bool>,
    /// Soft delete. Only `true` is accepted; records are never undeleted.
    pub is_deleted: Option<bool>,
}

impl LocalStateRequest {
    pub fn mutations(&self) -> MailFusionResult<Vec<LocalMutation>> {
        let mut mutations = Vec::new();
        match self.is_read {
            Some(true) => mutations.push(LocalMutation::MarkRead),
            Some(false) => mutations.push(LocalMutation::MarkUnread),
            None => {}
        }
        match self.is_starred {
            Some(true) => mutations.push(LocalMutation::Star),
            Some(false) => mutations.push(LocalMutation::Unstar),
            None => {}
        }
        if self.is_archived == Some(true) {
            mutations.push(LocalMutation::Archive);
        }
        if self.is_archived == Some(false) || self.is_deleted == Some(false) {
            return Err(raise_error!(
                "Archive and delete are one-way; 'false' is not accepted".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if self.is_deleted == Some(true) {
            mutations.push(LocalMutation::Delete);
        }
        if mutations.is_empty() {
            return Err(raise_error!(
                "At least one state field must be set".into(),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(mutations)
    }
}

/// Counts over the emails of one account that are not soft-deleted.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct AccountEmailStats {
    pub account_uid: String,
    pub total_count: u64,
    pub unread_count: u64,
    pub starred_count: u64,
    pub archived_count: u64,
}

impl AccountEmailStats {
    pub fn tally(account_uid: &str, records: &[EmailRecord]) -> Self {
        let mut stats = Self {
            account_uid: account_uid.to_string(),
            ..Default::default()
        };
        for record in records.iter().filter(|r| !r.is_deleted) {
            stats.total_count += 1;
            stats.unread_count += u64::from(!record.is_read);
            stats.starred_count += u64::from(record.is_starred);
            stats.archived_count += u64::from(record.is_archived);
        }
        stats
    }
}

pub fn is_unread(record: &EmailRecord) -> bool {
    !record.is_read && !record.is_deleted
}

/// Lowercased, whitespace-separated search terms.
pub fn search_terms(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_lowercase).collect()
}

/// Every term must occur in the subject, the sender or the text body.
pub fn matches_terms(record: &EmailRecord, terms: &[String]) -> bool {
    let haystack = [
        Some(record.subject.as_str()),
        record.from_name.as_deref(),
        Some(record.from_address.as_str()),
        record.text_body.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase();
    terms.iter().all(|term| haystack.contains(term.as_str()))
}

pub struct EmailService {
    database: Arc<Database<'static>>,
    bus: Arc<EventBus>,
}

impl EmailService {
    pub fn new(database: Arc<Database<'static>>, bus: Arc<EventBus>) -> Self {
        Self { database, bus }
    }

    pub async fn get(&self, id: u64) -> MailFusionResult<EmailRecord> {
        EmailRecord::get(&self.database, id).await
    }

    /// Newest first.
    pub async fn list_by_account(
        &self,
        account_uid: &str,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> MailFusionResult<DataPage<EmailRecord>> {
        EmailRecord::paginate_by_account(&self.database, account_uid, page, page_size)
            .await
            .map(DataPage::from)
    }

    /// Full-text search over live emails, newest sent first.
    pub async fn search(
        &self,
        query: &str,
        account_uid: Option<&str>,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> MailFusionResult<DataPage<EmailRecord>> {
        let terms = search_terms(query);
        if terms.is_empty() {
            return Err(raise_error!(
                "A search query is required".into(),
                ErrorCode::InvalidParameter
            ));
        }
        let records = self.records(account_uid).await?;
        let mut hits: Vec<EmailRecord> = records
            .into_iter()
            .filter(|r| !r.is_deleted && matches_terms(r, &terms))
            .collect();
        hits.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));
        paginate_vec(hits, page, page_size).map(DataPage::from)
    }

    /// Unread and not deleted; across every account when `account_uid` is `None`.
    pub async fn unread_count(&self, account_uid: Option<&str>) -> MailFusionResult<u64> {
        let records = self.records(account_uid).await?;
        Ok(records.iter().filter(|r| is_unread(r)).count() as u64)
    }

    pub async fn account_stats(&self, account_uid: &str) -> MailFusionResult<AccountEmailStats> {
        let records = EmailRecord::list_by_account(&self.database, account_uid).await?;
        Ok(AccountEmailStats::tally(account_uid, &records))
    }

    async fn records(&self, account_uid: Option<&str>) -> MailFusionResult<Vec<EmailRecord>> {
        match account_uid {
            Some(uid) => EmailRecord::list_by_account(&self.database, uid).await,
            None => EmailRecord::list_all(&self.database).await,
        }
    }

    pub async fn set_local_state(
        &self,
        id: u64,
        request: LocalStateRequest,
    ) -> MailFusionResult<EmailRecord> {
        let mutations = request.mutations()?;
        self.apply_all(id, mutations).await
    }

    pub async fn apply(&self, id: u64, mutation: LocalMutation) -> MailFusionResult<EmailRecord> {
        self.apply_all(id, vec![mutation]).await
    }

    /// Persists the mutations in one transaction, then publishes their events.
    async fn apply_all(
        &self,
        id: u64,
        mutations: Vec<LocalMutation>,
    ) -> MailFusionResult<EmailRecord> {
        let events: Vec<EventType> = mutations.iter().filter_map(|m| m.event_type()).collect();
        let record = EmailRecord::modify_local(&self.database, id, move |record| {
            for mutation in &mutations {
                mutation.apply(record);
            }
        })
        .await?;
        debug!(email_id = id, account_uid = %record.account_uid, "Local email state updated");
        for event_type in events {
            self.bus
                .emit(Event::email_state(event_type, record.id, &record.account_uid))
                .await;
        }
        Ok(record)
    }
}
