// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::modules::adapter::gmail::model::{FullMessage, MessageList, Profile};
use crate::modules::adapter::oauth2::{ensure_fresh_token, require_access_token};
use crate::modules::adapter::{
    effective_limit, effective_since, AdapterConfig, EmailProvider, MailProvider, Protocol,
};
use crate::modules::common::http::HttpClient;
use crate::modules::common::parallel::run_with_limit;
use crate::modules::email::model::Email;
use crate::modules::error::{code::ErrorCode, MailFusionResult};
use crate::{raise_error, utc_now};

pub mod model;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
/// Gmail rejects larger `maxResults` values.
const MAX_PAGE_SIZE: usize = 500;
/// Message detail requests in flight per sync.
const FETCH_CONCURRENCY: usize = 8;

#[derive(Clone)]
struct Connection {
    client: HttpClient,
    access_token: String,
}

/// Gmail REST adapter. Reads `INBOX` through `users.messages`.
pub struct GmailProvider {
    config: AdapterConfig,
    base_url: String,
    timeout: Duration,
    connection: Option<Connection>,
}

impl GmailProvider {
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
                "Gmail client is not connected; call connect first".into(),
                ErrorCode::NetworkError
            )
        })
    }

    async fn list_ids(&self, since: i64, limit: usize) -> MailFusionResult<Vec<String>> {
        let connection = self.connection()?;
        let query = format!("in:inbox after:{}", since / 1000);
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page_size = (limit - ids.len()).min(MAX_PAGE_SIZE);
            let mut url = format!(
                "{}/users/me/messages?q={}&maxResults={}",
                self.base_url,
                urlencoding::encode(&query),
                page_size
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
            }
            let page: MessageList = connection
                .client
                .get_json(&url, &connection.access_token, ErrorCode::GmailApiCallFailed)
                .await?;
            ids.extend(page.messages.into_iter().map(|m| m.id));
            page_token = page.next_page_token;
            if ids.len() >= limit || page_token.is_none() {
                break;
            }
        }
        ids.truncate(limit);
        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> MailFusionResult<Email> {
        fetch_message(self.connection()?, &self.base_url, id).await
    }
}

async fn fetch_message(
    connection: &Connection,
    base_url: &str,
    id: &str,
) -> MailFusionResult<Email> {
    let url = format!(
        "{}/users/me/messages/{}?format=full",
        base_url,
        urlencoding::encode(id)
    );
    let message: FullMessage = connection
        .client
        .get_json(&url, &connection.access_token, ErrorCode::GmailApiCallFailed)
        .await?;
    Ok(message.into_email(utc_now!()))
}

#[async_trait]
impl MailProvider for GmailProvider {
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
        let ids = self.list_ids(since, limit).await?;
        debug!(email = %self.config.email, "Gmail listed {} messages", ids.len());

        let connection = self.connection()?.clone();
        let base_url = self.base_url.clone();
        let results = run_with_limit(FETCH_CONCURRENCY, ids.clone(), move |id: String| {
            let connection = connection.clone();
            let base_url = base_url.clone();
            async move { fetch_message(&connection, &base_url, &id).await }
        })
        .await;

        let mut emails = Vec::with_capacity(results.len());
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(email) => emails.push(email),
                Err(e) if e.code() == ErrorCode::AuthenticationFailed => return Err(e),
                Err(e) => warn!(email = %self.config.email, "Skipping Gmail message {}: {}", id, e),
            }
        }
        Ok(emails)
    }

    async fn fetch_email_detail(&mut self, provider_id: &str) -> MailFusionResult<Email> {
        self.get_message(provider_id).await
    }

    async fn test_connection(&self) -> MailFusionResult<()> {
        let mut credentials = self.config.credentials.clone();
        ensure_fresh_token(&mut credentials, self.config.proxy.as_ref()).await?;
        let access_token = require_access_token(&credentials)?;
        let client = HttpClient::new(self.config.proxy.as_ref(), self.timeout)?;
        let profile: Profile = client
            .get_json(
                &format!("{}/users/me/profile", self.base_url),
                &access_token,
                ErrorCode::GmailApiCallFailed,
            )
            .await?;
        debug!("Gmail test connection succeeded for {}", profile.email_address);
        Ok(())
    }

    fn provider_type(&self) -> EmailProvider {
        EmailProvider::Gmail
    }

    fn protocol(&self) -> Protocol {
        Protocol::GmailApi
    }
}

#[cfg(test)]
mod tests;
