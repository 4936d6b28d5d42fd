// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use poem_openapi::param::{Path, Query};
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;

use crate::modules::account::entity::Account;
use crate::modules::account::payload::{
    AccountCreateRequest, AccountStatusRequest, AccountUpdateRequest,
};
use crate::modules::adapter::factory::{provider_infos, ProviderInfo};
use crate::modules::context::AppContext;
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::response::DataPage;
use crate::modules::rest::ApiResult;
use crate::modules::sync::log::{SyncLog, SyncType};

pub struct AccountApi {
    pub context: Arc<AppContext>,
}

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::Account")]
impl AccountApi {
    /// List the supported providers with their protocols and default hosts
    #[oai(path = "/providers", method = "get", operation_id = "list_providers")]
    async fn list_providers(&self) -> ApiResult<Json<Vec<ProviderInfo>>> {
        Ok(Json(provider_infos()))
    }

    /// List all accounts. Credentials are never returned.
    #[oai(path = "/accounts", method = "get", operation_id = "list_accounts")]
    async fn list_accounts(&self) -> ApiResult<Json<DataPage<Account>>> {
        let accounts = self.context.accounts.list().await?;
        Ok(Json(DataPage::all(
            accounts.into_iter().map(Account::redacted).collect(),
        )))
    }

    /// Create an account. Credentials are encrypted before they are stored.
    #[oai(path = "/accounts", method = "post", operation_id = "create_account")]
    async fn create_account(
        &self,
        payload: Json<AccountCreateRequest>,
    ) -> ApiResult<Json<Account>> {
        let account = self.context.accounts.create(payload.0).await?;
        Ok(Json(account.redacted()))
    }

    /// Get one account
    #[oai(path = "/accounts/:uid", method = "get", operation_id = "get_account")]
    async fn get_account(&self, uid: Path<String>) -> ApiResult<Json<Account>> {
        let account = self.context.accounts.get_by_uid(&uid.0).await?;
        Ok(Json(account.redacted()))
    }

    /// Update credentials, server, proxy or sync settings of an account
    #[oai(path = "/accounts/:uid", method = "put", operation_id = "update_account")]
    async fn update_account(
        &self,
        uid: Path<String>,
        payload: Json<AccountUpdateRequest>,
    ) -> ApiResult<Json<Account>> {
        let account = self.context.accounts.update(&uid.0, payload.0).await?;
        Ok(Json(account.redacted()))
    }

    /// Delete an account - WARNING: its emails, rules and sync logs are removed too
    #[oai(
        path = "/accounts/:uid",
        method = "delete",
        operation_id = "remove_account"
    )]
    async fn remove_account(&self, uid: Path<String>) -> ApiResult<()> {
        Ok(self.context.accounts.delete(&uid.0).await?)
    }

    /// Connect and authenticate with the stored credentials without syncing
    #[oai(
        path = "/accounts/:uid/test",
        method = "post",
        operation_id = "test_account"
    )]
    async fn test_account(&self, uid: Path<String>) -> ApiResult<()> {
        Ok(self.context.accounts.test_connection(&uid.0).await?)
    }

    /// Set the account status to `active` or `disabled`
    #[oai(
        path = "/accounts/:uid/status",
        method = "post",
        operation_id = "set_account_status"
    )]
    async fn set_account_status(
        &self,
        uid: Path<String>,
        payload: Json<AccountStatusRequest>,
    ) -> ApiResult<Json<Account>> {
        let account = self
            .context
            .accounts
            .set_status(&uid.0, payload.0.status)
            .await?;
        Ok(Json(account.redacted()))
    }

    #[oai(
        path = "/accounts/:uid/enable-sync",
        method = "post",
        operation_id = "enable_account_sync"
    )]
    async fn enable_account_sync(&self, uid: Path<String>) -> ApiResult<Json<Account>> {
        let account = self.context.accounts.enable_sync(&uid.0).await?;
        Ok(Json(account.redacted()))
    }

    #[oai(
        path = "/accounts/:uid/disable-sync",
        method = "post",
        operation_id = "disable_account_sync"
    )]
    async fn disable_account_sync(&self, uid: Path<String>) -> ApiResult<Json<Account>> {
        let account = self.context.accounts.disable_sync(&uid.0).await?;
        Ok(Json(account.redacted()))
    }

    /// Forget the last sync failure and return an `error` account to `active`
    #[oai(
        path = "/accounts/:uid/clear-sync-error",
        method = "post",
        operation_id = "clear_sync_error"
    )]
    async fn clear_sync_error(&self, uid: Path<String>) -> ApiResult<Json<Account>> {
        let account = self.context.accounts.clear_sync_error(&uid.0).await?;
        Ok(Json(account.redacted()))
    }

    /// Sync the account now and return the finished sync log.
    ///
    /// Waits for a sync of the same account that is already running.
    #[oai(
        path = "/accounts/:uid/sync",
        method = "post",
        operation_id = "sync_account"
    )]
    async fn sync_account(&self, uid: Path<String>) -> ApiResult<Json<SyncLog>> {
        let log = self
            .context
            .sync
            .sync_account(&uid.0, SyncType::Manual)
            .await?;
        Ok(Json(log))
    }

    /// List the sync runs of an account, newest first
    #[oai(
        path = "/accounts/:uid/sync-logs",
        method = "get",
        operation_id = "list_sync_logs"
    )]
    async fn list_sync_logs(
        &self,
        uid: Path<String>,
        /// Optional. The page number to retrieve (starting from 1).
        page: Query<Option<u64>>,
        /// Optional. The number of items per page.
        page_size: Query<Option<u64>>,
    ) -> ApiResult<Json<DataPage<SyncLog>>> {
        let account = self.context.accounts.get_by_uid(&uid.0).await?;
        let logs =
            SyncLog::paginate_by_account(&self.context.database, &account.uid, page.0, page_size.0)
                .await?;
        Ok(Json(logs.into()))
    }
}
