// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};
use url::Url;

use crate::modules::adapter::graph::model::{
    Attachment, AttachmentListResponse, Message, MessageListResponse, User,
};
use crate::modules::adapter::oauth2::{ensure_fresh_token, require_access_token};
use crate::modules::adapter::{
    effective_limit, effective_since, AdapterConfig, EmailProvider, MailProvider, Protocol,
};
use crate::modules::common::http::HttpClient;
use crate::modules::email::model::Email;
use crate::modules::error::{code::ErrorCode, MailFusionResult};
use crate::{raise_error, utc_now};

pub mod model;

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
/// Graph caps `$top` for messages at 1000.
const MAX_PAGE_SIZE: usize = 1000;

struct Connection {
    client: HttpClient,
    access_token: String,
}

/// Microsoft Graph adapter over `/me/messages`.
pub struct GraphProvider {
    config: AdapterConfig,
    base_url: String,
    timeout: Duration,
    connection: Option<Connection>,
}

pub fn to_rfc3339(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl GraphProvider {
    pub fn new(config: AdapterConfig, base_url: &str, timeout: Duration) -> Self {
        Self {
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            connection: None,
        }
    }

    fn connection(&self) -> MailFusionResult<&Connection> {
        self.connection.as_ref().ok_or_else(|| {
            raise_error!(
                "Graph client is not connected; call connect first".into(),
                ErrorCode::NetworkError
            )
        })
    }

    fn first_page_url(&self, since: i64, limit: usize) -> MailFusionResult<String> {
        let mut url = Url::parse(&format!("{}/me/messages", self.base_url)).map_err(|e| {
            raise_error!(
                format!("Invalid Graph base URL {}: {}", self.base_url, e),
                ErrorCode::InvalidParameter
            )
        })?;
        url.query_pairs_mut()
            .append_pair("$top", &limit.min(MAX_PAGE_SIZE).to_string())
            .append_pair("$orderby", "receivedDateTime DESC")
            .append_pair(
                "$filter",
                &format!("receivedDateTime ge {}", to_rfc3339(since)),
            );
        Ok(url.to_string())
    }

    async fn list_messages(&self, since: i64, limit: usize) -> MailFusionResult<Vec<Message>> {
        let connection = self.connection()?;
        let mut messages = Vec::new();
        let mut next = Some(self.first_page_url(since, limit)?);

        while let Some(url) = next.take() {
            let page: MessageListResponse = connection
                .client
                .get_json(&url, &connection.access_token, ErrorCode::GraphApiCallFailed)
                .await?;
            messages.extend(page.value);
            if messages.len() < limit {
                next = page.next_link;
            }
        }
        messages.truncate(limit);
        Ok(messages)
    }

    async fn list_attachments(&self, message_id: &str) -> MailFusionResult<Vec<Attachment>> {
        let connection = self.connection()?;
        let url = format!(
            "{}/me/messages/{}/attachments",
            self.base_url,
            urlencoding::encode(message_id)
        );
        let response: AttachmentListResponse = connection
            .client
            .get_json(&url, &connection.access_token, ErrorCode::GraphApiCallFailed)
            .await?;
        Ok(response.value)
    }

    /// Loads attachment metadata when the message has any, then maps it.
    async fn complete(&self, message: Message) -> MailFusionResult<Email> {
        let attachments = if message.has_attachments {
            self.list_attachments(&message.id).await?
        } else {
            Vec::new()
        };
        Ok(message.into_email(attachments, utc_now!()))
    }
}

#[async_trait]
impl MailProvider for GraphProvider {
    async fn connect(&mut self) -> MailFusionResult<()> {
        if self.connection.is_some() {
            return Ok(());
        }
        ensure_fresh_token(&mut self.config.credentials, self.config.proxy.as_ref()).await?;
        let access_token = require_access_token(&self.config.credentials)?;
        let client = HttpClient::new(self.config.proxy.as_ref(), self.timeout)?;
        self.connection = Some(Connection {
            client,
            access_token,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> MailFusionResult<()> {
        self.connection = None;
        Ok(())
    }

    async fn fetch_emails(
        &mut self,
        since: Option<i64>,
        limit: usize,
    ) -> MailFusionResult<Vec<Email>> {
        let since = effective_since(since, utc_now!());
        let limit = effective_limit(limit);
        let messages = self.list_messages(since, limit).await?;
        debug!(email = %self.config.email, "Graph listed {} messages", messages.len());

        let mut emails = Vec::with_capacity(messages.len());
        for message in messages {
            let id = message.id.clone();
            match self.complete(message).await {
                Ok(email) => emails.push(email),
                Err(e) if e.code() == ErrorCode::AuthenticationFailed => return Err(e),
                Err(e) => warn!(email = %self.config.email, "Skipping Graph message {}: {}", id, e),
            }
        }
        Ok(emails)
    }

    async fn fetch_email_detail(&mut self, provider_id: &str) -> MailFusionResult<Email> {
        let connection = self.connection()?;
        let url = format!(
            "{}/me/messages/{}",
            self.base_url,
            urlencoding::encode(provider_id)
        );
        let message: Message = connection
            .client
            .get_json(&url, &connection.access_token, ErrorCode::GraphApiCallFailed)
            .await?;
        self.complete(message).await
    }

    async fn test_connection(&self) -> MailFusionResult<()> {
        let mut credentials = self.config.credentials.clone();
        ensure_fresh_token(&mut credentials, self.config.proxy.as_ref()).await?;
        let access_token = require_access_token(&credentials)?;
        let client = HttpClient::new(self.config.proxy.as_ref(), self.timeout)?;
        let user: User = client
            .get_json(
                &format!("{}/me", self.base_url),
                &access_token,
                ErrorCode::GraphApiCallFailed,
            )
            .await?;
        debug!(
            "Graph test connection succeeded for {}",
            user.mail.or(user.user_principal_name).unwrap_or_default()
        );
        Ok(())
    }

    fn provider_type(&self) -> EmailProvider {
        EmailProvider::Outlook
    }

    fn protocol(&self) -> Protocol {
        Protocol::Graph
    }
}
