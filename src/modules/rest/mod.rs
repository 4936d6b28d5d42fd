// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;
use std::time::Duration;

use api::create_openapi_service;
use poem::listener::TcpListener;
use poem::middleware::{CatchPanic, Cors};
use poem::{EndpointExt, Route, Server};
use tokio::sync::broadcast;

use crate::modules::common::log::Tracing;
use crate::modules::context::AppContext;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::handler::error_handler;
use crate::modules::error::{ApiErrorResponse, MailFusionResult};
use crate::raise_error;

pub mod api;
pub mod response;

pub type ApiResult<T, E = ApiErrorResponse> = std::result::Result<T, E>;

const DESCRIPTION: &str = r#"
    MailFusion pulls mail from IMAP, POP3, Gmail and Microsoft Graph accounts into one local store.

    - Periodic and on-demand sync per account, with sync logs.
    - Per-account rules that flag, move or forward new mail.
    - Webhooks for account, sync and email events, with retries and delivery logs.
"#;

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub bind_ip: String,
    pub port: u16,
}

pub async fn start_http_server(
    config: HttpConfig,
    context: Arc<AppContext>,
    mut shutdown: broadcast::Receiver<()>,
) -> MailFusionResult<()> {
    let listener = TcpListener::bind((config.bind_ip.clone(), config.port));

    let api_service = create_openapi_service(context)
        .description(DESCRIPTION)
        .summary("Multi-provider mail ingestion with rules and webhooks");
    let swagger = api_service.swagger_ui();
    let redoc = api_service.redoc();
    let spec_json = api_service.spec_endpoint();

    let open_api_route = Route::new()
        .nest_no_strip("/api/v1", api_service)
        .with(Tracing);

    let route = Route::new()
        .nest("/api-docs/swagger", swagger)
        .nest("/api-docs/redoc", redoc)
        .nest("/api-docs/spec.json", spec_json)
        .nest_no_strip("/api/v1", open_api_route)
        .with(Cors::new())
        .with(CatchPanic::new());

    let server = Server::new(listener)
        .name("MailFusion API Service")
        .idle_timeout(Duration::from_secs(60))
        .run_with_graceful_shutdown(
            route.catch_all_error(error_handler),
            async move {
                let _ = shutdown.recv().await;
            },
            Some(Duration::from_secs(5)),
        );
    tracing::info!(
        "MailFusion API Service is listening on {}:{}",
        config.bind_ip,
        config.port
    );
    server
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
}
