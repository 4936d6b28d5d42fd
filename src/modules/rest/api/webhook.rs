// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use poem_openapi::param::{Path, Query};
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;

use crate::modules::context::AppContext;
use crate::modules::hook::entity::Webhook;
use crate::modules::hook::log::WebhookLog;
use crate::modules::hook::payload::{
    WebhookCreateRequest, WebhookTestRequest, WebhookUpdateRequest,
};
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::response::DataPage;
use crate::modules::rest::ApiResult;

pub struct WebhookApi {
    pub context: Arc<AppContext>,
}

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::Webhook")]
impl WebhookApi {
    #[oai(path = "/webhooks", method = "get", operation_id = "list_webhooks")]
    async fn list_webhooks(&self) -> ApiResult<Json<DataPage<Webhook>>> {
        Ok(Json(DataPage::all(self.context.webhooks.list().await?)))
    }

    /// Create a webhook subscribed to event types, or `*` for all of them
    #[oai(path = "/webhooks", method = "post", operation_id = "create_webhook")]
    async fn create_webhook(
        &self,
        payload: Json<WebhookCreateRequest>,
    ) -> ApiResult<Json<Webhook>> {
        Ok(Json(self.context.webhooks.create(payload.0).await?))
    }

    #[oai(path = "/webhooks/:id", method = "get", operation_id = "get_webhook")]
    async fn get_webhook(&self, id: Path<u64>) -> ApiResult<Json<Webhook>> {
        Ok(Json(self.context.webhooks.get(id.0).await?))
    }

    #[oai(path = "/webhooks/:id", method = "put", operation_id = "update_webhook")]
    async fn update_webhook(
        &self,
        id: Path<u64>,
        payload: Json<WebhookUpdateRequest>,
    ) -> ApiResult<Json<Webhook>> {
        Ok(Json(self.context.webhooks.update(id.0, payload.0).await?))
    }

    /// Delete a webhook together with its delivery logs
    #[oai(
        path = "/webhooks/:id",
        method = "delete",
        operation_id = "remove_webhook"
    )]
    async fn remove_webhook(&self, id: Path<u64>) -> ApiResult<()> {
        Ok(self.context.webhooks.delete(id.0).await?)
    }

    #[oai(
        path = "/webhooks/:id/enable",
        method = "post",
        operation_id = "enable_webhook"
    )]
    async fn enable_webhook(&self, id: Path<u64>) -> ApiResult<Json<Webhook>> {
        Ok(Json(self.context.webhooks.enable(id.0).await?))
    }

    #[oai(
        path = "/webhooks/:id/disable",
        method = "post",
        operation_id = "disable_webhook"
    )]
    async fn disable_webhook(&self, id: Path<u64>) -> ApiResult<Json<Webhook>> {
        Ok(Json(self.context.webhooks.disable(id.0).await?))
    }

    /// Send a single `test` event and return the delivery log. Never retried.
    #[oai(
        path = "/webhooks/:id/test",
        method = "post",
        operation_id = "test_webhook"
    )]
    async fn test_webhook(
        &self,
        id: Path<u64>,
        payload: Json<WebhookTestRequest>,
    ) -> ApiResult<Json<WebhookLog>> {
        Ok(Json(
            self.context.webhooks.test_webhook(id.0, payload.0).await?,
        ))
    }

    /// List delivery attempts of a webhook, newest first
    #[oai(
        path = "/webhooks/:id/logs",
        method = "get",
        operation_id = "list_webhook_logs"
    )]
    async fn list_webhook_logs(
        &self,
        id: Path<u64>,
        /// Optional. The page number to retrieve (starting from 1).
        page: Query<Option<u64>>,
        /// Optional. The number of items per page.
        page_size: Query<Option<u64>>,
    ) -> ApiResult<Json<DataPage<WebhookLog>>> {
        Ok(Json(
            self.context
                .webhooks
                .list_logs(id.0, page.0, page_size.0)
                .await?,
        ))
    }
}
