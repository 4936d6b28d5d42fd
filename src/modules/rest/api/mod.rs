// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use account::AccountApi;
use email::EmailApi;
use poem_openapi::{OpenApiService, Tags};
use rule::RuleApi;
use system::SystemApi;
use webhook::WebhookApi;

use crate::mailfusion_version;
use crate::modules::context::AppContext;

pub mod account;
pub mod email;
pub mod rule;
pub mod system;
pub mod webhook;

#[derive(Tags)]
pub enum ApiTags {
    Account,
    Email,
    Rule,
    Webhook,
    System,
}

type MailFusionOpenApi = (AccountApi, EmailApi, RuleApi, WebhookApi, SystemApi);

pub fn create_openapi_service(context: Arc<AppContext>) -> OpenApiService<MailFusionOpenApi, ()> {
    OpenApiService::new(
        (
            AccountApi {
                context: context.clone(),
            },
            EmailApi {
                context: context.clone(),
            },
            RuleApi {
                context: context.clone(),
            },
            WebhookApi {
                context: context.clone(),
            },
            SystemApi { context },
        ),
        "MailFusion API",
        mailfusion_version!(),
    )
}
