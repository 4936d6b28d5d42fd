use std::collections::BTreeMap;
use std::sync::Arc;

use itertools::Itertools;
use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::modules::database::{
    batch_delete_impl, db_error, insert_impl, paginate_secondary_scan_impl, time_key, Paginated,
};
use crate::modules::error::MailFusionResult;

/// One delivery attempt. Append-only.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 5, version = 1)]
#[native_db(secondary_key(webhook_time_key -> String))]
pub struct WebhookLog {
    #[primary_key]
    pub id: u64,
    pub webhook_id: u64,
    pub request_url: String,
    pub request_method: String,
    pub request_headers: BTreeMap<String, String>,
    pub request_body: String,
    /// Absent when no response arrived.
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub latency_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
    /// 0 for the first attempt.
    pub retry_count: u32,
    pub created_at: i64,
}

impl WebhookLog {
    fn webhook_time_key(&self) -> String {
        format!("{}:{}:{}", self.webhook_id, time_key(self.created_at), self.id)
    }

    pub async fn append(&self, database: &Arc<Database<'static>>) -> MailFusionResult<()> {
        insert_impl(database, self.clone()).await
    }

    /// Newest first.
    pub async fn paginate_by_webhook(
        database: &Arc<Database<'static>>,
        webhook_id: u64,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> MailFusionResult<Paginated<WebhookLog>> {
        paginate_secondary_scan_impl(
            database,
            page,
            page_size,
            Some(true),
            WebhookLogKey::webhook_time_key,
            format!("{}:", webhook_id),
        )
        .await
    }

    pub async fn delete_by_webhook(
        database: &Arc<Database<'static>>,
        webhook_id: u64,
    ) -> MailFusionResult<usize> {
        let prefix = format!("{}:", webhook_id);
        batch_delete_impl(database, move |rw| {
            let logs: Vec<WebhookLog> = rw
                .scan()
                .secondary(WebhookLogKey::webhook_time_key)
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
