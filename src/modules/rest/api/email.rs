use std::sync::Arc;

use poem_openapi::param::{Path, Query};
use poem_openapi::payload::Json;
use poem_openapi::{Object, OpenApi};
use serde::{Deserialize, Serialize};

use crate::modules::context::AppContext;
use crate::modules::email::entity::EmailRecord;
use crate::modules::email::service::{AccountEmailStats, LocalStateRequest};
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::response::DataPage;
use crate::modules::rest::ApiResult;

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct UnreadCount {
    pub count: u64,
}

pub struct EmailApi {
    pub context: Arc<AppContext>,
}

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::Email")]
impl EmailApi {
    /// List the stored emails of an account, newest first
    #[oai(
        path = "/accounts/:uid/emails",
        method = "get",
        operation_id = "list_emails"
    )]
    async fn list_emails(
        &self,
        uid: Path<String>,
        /// Optional. The page number to retrieve (starting from 1).
        page: Query<Option<u64>>,
        /// Optional. The number of items per page.
        page_size: Query<Option<u64>>,
    ) -> ApiResult<Json<DataPage<EmailRecord>>> {
        let account = self.context.accounts.get_by_uid(&uid.0).await?;
        Ok(Json(
            self.context
                .emails
                .list_by_account(&account.uid, page.0, page_size.0)
                .await?,
        ))
    }

    #[oai(path = "/emails/:id", method = "get", operation_id = "get_email")]
    async fn get_email(&self, id: Path<u64>) -> ApiResult<Json<EmailRecord>> {
        Ok(Json(self.context.emails.get(id.0).await?))
    }

    /// Change the local read/starred/archived/deleted flags of an email.
    ///
    /// Archive and delete cannot be undone. Sync never overwrites these flags.
    #[oai(
        path = "/emails/:id/state",
        method = "post",
        operation_id = "set_email_state"
    )]
    async fn set_email_state(
        &self,
        id: Path<u64>,
        payload: Json<LocalStateRequest>,
    ) -> ApiResult<Json<EmailRecord>> {
        Ok(Json(
            self.context.emails.set_local_state(id.0, payload.0).await?,
        ))
    }

    /// Search live emails by subject, sender and text body. Every term must match.
    #[oai(path = "/emails/search", method = "get", operation_id = "search_emails")]
    async fn search_emails(
        &self,
        /// Whitespace-separated search terms, case-insensitive
        q: Query<String>,
        /// Optional. Restrict the search to one account.
        account_uid: Query<Option<String>>,
        /// Optional. The page number to retrieve (starting from 1).
        page: Query<Option<u64>>,
        /// Optional. The number of items per page.
        page_size: Query<Option<u64>>,
    ) -> ApiResult<Json<DataPage<EmailRecord>>> {
        Ok(Json(
            self.context
                .emails
                .search(&q.0, account_uid.0.as_deref(), page.0, page_size.0)
                .await?,
        ))
    }

    /// Unread emails across every account, or one when `account_uid` is given
    #[oai(
        path = "/emails/unread-count",
        method = "get",
        operation_id = "unread_count"
    )]
    async fn unread_count(
        &self,
        account_uid: Query<Option<String>>,
    ) -> ApiResult<Json<UnreadCount>> {
        let count = self
            .context
            .emails
            .unread_count(account_uid.0.as_deref())
            .await?;
        Ok(Json(UnreadCount { count }))
    }

    #[oai(
        path = "/accounts/:uid/email-stats",
        method = "get",
        operation_id = "account_email_stats"
    )]
    async fn account_email_stats(&self, uid: Path<String>) -> ApiResult<Json<AccountEmailStats>> {
        let account = self.context.accounts.get_by_uid(&uid.0).await?;
        Ok(Json(self.context.emails.account_stats(&account.uid).await?))
    }
}
