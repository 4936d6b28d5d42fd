// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use poem_openapi::payload::Json;
use poem_openapi::{Object, OpenApi};
use serde::{Deserialize, Serialize};

use crate::modules::context::status::ServiceStatus;
use crate::modules::context::AppContext;
use crate::modules::overview::{SyncStatusEntry, SystemStats};
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::ApiResult;

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct SyncAllResult {
    /// Number of account syncs started. They finish in the background.
    pub dispatched: u64,
}

pub struct SystemApi {
    pub context: Arc<AppContext>,
}

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::System")]
impl SystemApi {
    /// Uptime, version and whether the scheduler and event bus are running
    #[oai(path = "/status", method = "get", operation_id = "get_status")]
    async fn get_status(&self) -> ApiResult<Json<ServiceStatus>> {
        Ok(Json(ServiceStatus::get(&self.context).await))
    }

    /// Start the periodic sync ticker. Fails if it is already running.
    #[oai(
        path = "/scheduler/start",
        method = "post",
        operation_id = "start_scheduler"
    )]
    async fn start_scheduler(&self) -> ApiResult<()> {
        Ok(self.context.sync.start().await?)
    }

    /// Stop the periodic sync ticker and wait for running syncs
    #[oai(
        path = "/scheduler/stop",
        method = "post",
        operation_id = "stop_scheduler"
    )]
    async fn stop_scheduler(&self) -> ApiResult<()> {
        self.context.sync.stop().await;
        Ok(())
    }

    /// Start a sync of every active account with sync enabled
    #[oai(path = "/sync-all", method = "post", operation_id = "sync_all")]
    async fn sync_all(&self) -> ApiResult<Json<SyncAllResult>> {
        let dispatched = self.context.sync.sync_all_accounts().await?;
        Ok(Json(SyncAllResult {
            dispatched: dispatched as u64,
        }))
    }

    /// Totals across emails, accounts, sync runs, rules and webhooks
    #[oai(path = "/stats", method = "get", operation_id = "get_stats")]
    async fn get_stats(&self) -> ApiResult<Json<SystemStats>> {
        Ok(Json(SystemStats::get(&self.context.database).await?))
    }

    /// Sync state of every account, taken from its newest sync run
    #[oai(path = "/sync-status", method = "get", operation_id = "get_sync_status")]
    async fn get_sync_status(&self) -> ApiResult<Json<Vec<SyncStatusEntry>>> {
        Ok(Json(SyncStatusEntry::list(&self.context.database).await?))
    }
}
