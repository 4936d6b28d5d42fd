// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use itertools::Itertools;
use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::modules::database::{
    async_find_impl, batch_delete_impl, db_error, delete_impl, filter_by_secondary_key_impl,
    insert_impl, list_all_impl, update_impl,
};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::{raise_error, utc_now};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every condition must hold.
    #[default]
    All,
    /// At least one condition must hold.
    Any,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum ConditionField {
    /// Sender address or display name
    From,
    /// Joined `to` recipients
    To,
    Subject,
    /// Text body, falling back to the HTML body
    Body,
    /// Compared with `"true"` / `"false"`
    HasAttachment,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum ConditionOperator {
    Contains,
    NotContains,
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    /// Pattern applied as given, case-sensitive unless the pattern says otherwise.
    Regex,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum ActionType {
    MarkRead,
    MarkUnread,
    Star,
    Unstar,
    Archive,
    Delete,
    MoveFolder,
    AddLabel,
    RemoveLabel,
    /// Delivers the email to the webhook whose id is the action value.
    Webhook,
}

impl ActionType {
    pub fn requires_value(&self) -> bool {
        matches!(
            self,
            ActionType::MoveFolder
                | ActionType::AddLabel
                | ActionType::RemoveLabel
                | ActionType::Webhook
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct RuleCondition {
    pub field: ConditionField,
    pub operator: ConditionOperator,
    pub value: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct RuleAction {
    #[serde(rename = "type")]
    #[oai(rename = "type")]
    pub action_type: ActionType,
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 3, version = 1)]
#[native_db]
pub struct EmailRule {
    #[primary_key]
    pub id: u64,
    pub name: String,
    /// Owning account
    #[secondary_key]
    pub account_uid: String,
    pub description: Option<String>,
    pub enabled: bool,
    /// Lower runs first.
    pub priority: i32,
    pub match_mode: MatchMode,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    /// Skip lower-priority rules once this one matched.
    pub stop_processing: bool,
    pub matched_count: u64,
    pub last_matched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EmailRule {
    pub async fn find(
        database: &Arc<Database<'static>>,
        id: u64,
    ) -> MailFusionResult<Option<EmailRule>> {
        async_find_impl(database, id).await
    }

    pub async fn get(database: &Arc<Database<'static>>, id: u64) -> MailFusionResult<EmailRule> {
        Self::find(database, id).await?.ok_or_else(|| {
            raise_error!(
                format!("Rule id='{id}' not found"),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn save(&self, database: &Arc<Database<'static>>) -> MailFusionResult<()> {
        insert_impl(database, self.clone()).await
    }

    pub async fn list_all(database: &Arc<Database<'static>>) -> MailFusionResult<Vec<EmailRule>> {
        list_all_impl(database).await
    }

    /// Sorted by priority, then creation time.
    pub async fn list_by_account(
        database: &Arc<Database<'static>>,
        account_uid: &str,
    ) -> MailFusionResult<Vec<EmailRule>> {
        let rules: Vec<EmailRule> = filter_by_secondary_key_impl(
            database,
            EmailRuleKey::account_uid,
            account_uid.to_string(),
        )
        .await?;
        Ok(rules
            .into_iter()
            .filter(|r| r.account_uid == account_uid)
            .sorted_by_key(|r| (r.priority, r.created_at))
            .collect())
    }

    pub async fn replace(
        database: &Arc<Database<'static>>,
        id: u64,
        change: impl FnOnce(&mut EmailRule) + Send + 'static,
    ) -> MailFusionResult<EmailRule> {
        update_impl(
            database,
            move |rw| current(rw, id),
            move |current| {
                let mut updated = current.clone();
                change(&mut updated);
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await
    }

    /// `matched_count += 1` and `last_matched_at = now`, inside one write transaction.
    pub async fn record_match(
        database: &Arc<Database<'static>>,
        id: u64,
    ) -> MailFusionResult<EmailRule> {
        update_impl(
            database,
            move |rw| current(rw, id),
            move |current| {
                let mut updated = current.clone();
                updated.matched_count += 1;
                updated.last_matched_at = Some(utc_now!());
                Ok(updated)
            },
        )
        .await
    }

    pub async fn delete(database: &Arc<Database<'static>>, id: u64) -> MailFusionResult<()> {
        delete_impl(database, move |rw| current(rw, id)).await
    }

    pub async fn delete_by_account(
        database: &Arc<Database<'static>>,
        account_uid: &str,
    ) -> MailFusionResult<usize> {
        let account_uid = account_uid.to_string();
        batch_delete_impl(database, move |rw| {
            let rules: Vec<EmailRule> = rw
                .scan()
                .secondary(EmailRuleKey::account_uid)
                .map_err(db_error)?
                .start_with(account_uid.clone())
                .map_err(db_error)?
                .try_collect()
                .map_err(db_error)?;
            Ok(rules
                .into_iter()
                .filter(|r| r.account_uid == account_uid)
                .collect())
        })
        .await
    }
}

fn current(rw: &transaction::RwTransaction, id: u64) -> MailFusionResult<EmailRule> {
    rw.get()
        .primary::<EmailRule>(id)
        .map_err(db_error)?
        .ok_or_else(|| {
            raise_error!(
                format!("Rule id='{id}' not found"),
                ErrorCode::ResourceNotFound
            )
        })
}
