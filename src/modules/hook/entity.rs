// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::modules::database::{
    async_find_impl, db_error, delete_impl, insert_impl, list_all_impl, update_impl,
};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::events::EventType;
use crate::{raise_error, utc_now};

/// Subscribes a webhook to every routable event type.
pub const WILDCARD_EVENT: &str = "*";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_INTERVALS: [u64; 3] = [10, 30, 60];

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "UPPERCASE")]
#[oai(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
    Patch,
}

impl HttpMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Patch => write!(f, "PATCH"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 4, version = 1)]
#[native_db]
pub struct Webhook {
    /// The unique identifier of the webhook
    #[primary_key]
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    /// Target URL, http or https.
    pub url: String,
    pub method: HttpMethod,
    /// Custom headers sent with every delivery.
    pub headers: BTreeMap<String, String>,
    /// Subscribed event types, or `*` for all of them.
    pub events: Vec<String>,
    pub enabled: bool,
    pub retry_enabled: bool,
    pub max_retries: u32,
    /// Seconds to wait before each retry; the last value repeats.
    pub retry_intervals: Vec<u64>,
    /// Logical deliveries, retries excluded.
    pub total_calls: u64,
    pub success_calls: u64,
    pub failed_calls: u64,
    pub last_called_at: Option<i64>,
    pub last_status: Option<DeliveryStatus>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Webhook {
    /// `test` events only reach a webhook through an explicit test send,
    /// never through a subscription, wildcard included.
    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        event_type != EventType::Test
            && self
                .events
                .iter()
                .any(|e| e == WILDCARD_EVENT || e == event_type.as_str())
    }

    /// Wait before retry number `retry_count + 1`, in interval units.
    pub fn retry_interval(&self, retry_count: u32) -> u64 {
        if self.retry_intervals.is_empty() {
            return DEFAULT_RETRY_INTERVALS[0];
        }
        let idx = (retry_count as usize).min(self.retry_intervals.len() - 1);
        self.retry_intervals[idx]
    }

    pub async fn find(
        database: &Arc<Database<'static>>,
        id: u64,
    ) -> MailFusionResult<Option<Webhook>> {
        async_find_impl(database, id).await
    }

    pub async fn get(database: &Arc<Database<'static>>, id: u64) -> MailFusionResult<Webhook> {
        Self::find(database, id).await?.ok_or_else(|| {
            raise_error!(
                format!("Webhook id='{id}' not found"),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn save(&self, database: &Arc<Database<'static>>) -> MailFusionResult<()> {
        insert_impl(database, self.clone()).await
    }

    /// Oldest first.
    pub async fn list_all(database: &Arc<Database<'static>>) -> MailFusionResult<Vec<Webhook>> {
        let hooks: Vec<Webhook> = list_all_impl(database).await?;
        Ok(hooks.into_iter().sorted_by_key(|h| h.created_at).collect())
    }

    pub async fn modify(
        database: &Arc<Database<'static>>,
        id: u64,
        change: impl FnOnce(&mut Webhook) + Send + 'static,
    ) -> MailFusionResult<Webhook> {
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

    /// Folds the final outcome of one logical delivery into the counters.
    pub async fn record_delivery(
        database: &Arc<Database<'static>>,
        id: u64,
        success: bool,
    ) -> MailFusionResult<Webhook> {
        update_impl(
            database,
            move |rw| current(rw, id),
            move |current| {
                let mut updated = current.clone();
                updated.total_calls += 1;
                if success {
                    updated.success_calls += 1;
                    updated.last_status = Some(DeliveryStatus::Success);
                } else {
                    updated.failed_calls += 1;
                    updated.last_status = Some(DeliveryStatus::Failed);
                }
                updated.last_called_at = Some(utc_now!());
                Ok(updated)
            },
        )
        .await
    }

    pub async fn delete(database: &Arc<Database<'static>>, id: u64) -> MailFusionResult<()> {
        delete_impl(database, move |rw| current(rw, id)).await
    }
}

fn current(rw: &transaction::RwTransaction, id: u64) -> MailFusionResult<Webhook> {
    rw.get()
        .primary::<Webhook>(id)
        .map_err(db_error)?
        .ok_or_else(|| {
            raise_error!(
                format!("Webhook id='{id}' not found"),
                ErrorCode::ResourceNotFound
            )
        })
}
