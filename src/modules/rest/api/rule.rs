// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use poem_openapi::param::{Path, Query};
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;

use crate::modules::context::AppContext;
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::response::DataPage;
use crate::modules::rest::ApiResult;
use crate::modules::rule::entity::EmailRule;
use crate::modules::rule::payload::{
    ApplyRulesReport, RuleCreateRequest, RuleTestRequest, RuleTestResult, RuleUpdateRequest,
};

pub struct RuleApi {
    pub context: Arc<AppContext>,
}

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::Rule")]
impl RuleApi {
    /// List the rules of an account in evaluation order
    #[oai(path = "/rules", method = "get", operation_id = "list_rules")]
    async fn list_rules(
        &self,
        /// The account the rules belong to
        account_uid: Query<String>,
    ) -> ApiResult<Json<DataPage<EmailRule>>> {
        let rules = self.context.rules.list_by_account(&account_uid.0).await?;
        Ok(Json(DataPage::all(rules)))
    }

    /// Create a rule for an existing account
    #[oai(path = "/rules", method = "post", operation_id = "create_rule")]
    async fn create_rule(&self, payload: Json<RuleCreateRequest>) -> ApiResult<Json<EmailRule>> {
        Ok(Json(self.context.rules.create(payload.0).await?))
    }

    #[oai(path = "/rules/:id", method = "get", operation_id = "get_rule")]
    async fn get_rule(&self, id: Path<u64>) -> ApiResult<Json<EmailRule>> {
        Ok(Json(self.context.rules.get_by_id(id.0).await?))
    }

    /// Update a rule. Absent fields are left unchanged.
    #[oai(path = "/rules/:id", method = "put", operation_id = "update_rule")]
    async fn update_rule(
        &self,
        id: Path<u64>,
        payload: Json<RuleUpdateRequest>,
    ) -> ApiResult<Json<EmailRule>> {
        Ok(Json(self.context.rules.update(id.0, payload.0).await?))
    }

    #[oai(path = "/rules/:id", method = "delete", operation_id = "remove_rule")]
    async fn remove_rule(&self, id: Path<u64>) -> ApiResult<()> {
        Ok(self.context.rules.delete(id.0).await?)
    }

    /// Evaluate a rule against a stored email without running its actions
    #[oai(path = "/rules/:id/test", method = "post", operation_id = "test_rule")]
    async fn test_rule(
        &self,
        id: Path<u64>,
        payload: Json<RuleTestRequest>,
    ) -> ApiResult<Json<RuleTestResult>> {
        Ok(Json(
            self.context
                .rules
                .test_rule(id.0, payload.0.email_id)
                .await?,
        ))
    }

    /// Enable a disabled rule or disable an enabled one
    #[oai(path = "/rules/:id/toggle", method = "post", operation_id = "toggle_rule")]
    async fn toggle_rule(&self, id: Path<u64>) -> ApiResult<Json<EmailRule>> {
        Ok(Json(self.context.rules.toggle(id.0).await?))
    }

    /// Run the account's enabled rules over its stored emails, newest first
    #[oai(
        path = "/accounts/:uid/apply-rules",
        method = "post",
        operation_id = "apply_rules_to_account"
    )]
    async fn apply_rules_to_account(&self, uid: Path<String>) -> ApiResult<Json<ApplyRulesReport>> {
        Ok(Json(
            self.context.rules.apply_rules_to_account(&uid.0).await?,
        ))
    }
}
