// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use async_imap::types::{Fetch, Flag};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, warn};

use crate::modules::adapter::imap::client::{Client, Session};
use crate::modules::adapter::imap::oauth2::XOAuth2;
use crate::modules::adapter::mime::parse_rfc822;
use crate::modules::adapter::oauth2::{ensure_fresh_token, require_access_token};
use crate::modules::adapter::{
    effective_limit, effective_since, AdapterConfig, AuthType, EmailProvider, MailProvider,
    Protocol,
};
use crate::modules::email::model::Email;
use crate::modules::error::{code::ErrorCode, MailFusionError, MailFusionResult};
use crate::{raise_error, utc_now};

pub mod client;
pub mod oauth2;

pub const DEFAULT_IMAP_PORT: u16 = 993;
const INBOX: &str = "INBOX";
const FETCH_QUERY: &str = "(UID FLAGS INTERNALDATE RFC822.SIZE BODY.PEEK[])";

fn command_error(e: async_imap::error::Error) -> MailFusionError {
    raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed)
}

/// `SINCE` criterion for a millisecond cutoff. IMAP compares dates only, in the
/// server's zone, so the search starts a day early and callers filter exactly.
pub fn since_criterion(since_ms: i64) -> String {
    let day_before = since_ms.saturating_sub(24 * 60 * 60 * 1000);
    let date = chrono::DateTime::from_timestamp_millis(day_before)
        .unwrap_or_default()
        .format("%d-%b-%Y");
    format!("SINCE {}", date)
}

/// The newest `limit` UIDs, highest first.
pub fn newest_uids(uids: impl IntoIterator<Item = u32>, limit: usize) -> Vec<u32> {
    let mut uids: Vec<u32> = uids.into_iter().collect();
    uids.sort_unstable_by(|a, b| b.cmp(a));
    uids.truncate(limit);
    uids
}

fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// IMAP mailbox reader. Only `INBOX` is synchronized.
pub struct ImapProvider {
    config: AdapterConfig,
    session: Option<Session>,
}

impl ImapProvider {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    async fn open_session(config: &AdapterConfig) -> MailFusionResult<Session> {
        let server = &config.server;
        let port = if server.port == 0 {
            DEFAULT_IMAP_PORT
        } else {
            server.port
        };
        let client =
            Client::connection(&server.host, port, server.encryption, config.proxy.as_ref())
                .await?;
        match config.credentials.auth_type {
            AuthType::OAuth2 => {
                let token = require_access_token(&config.credentials)?;
                client
                    .authenticate(XOAuth2::new(config.email.clone(), token))
                    .await
            }
            AuthType::Password | AuthType::AppPassword => {
                client
                    .login(&config.email, config.credentials.password_or_empty())
                    .await
            }
        }
    }

    fn session_mut(&mut self) -> MailFusionResult<&mut Session> {
        self.session.as_mut().ok_or_else(|| {
            raise_error!(
                "IMAP session is not connected; call connect first".into(),
                ErrorCode::NetworkError
            )
        })
    }

    async fn fetch_messages(session: &mut Session, uids: &str) -> MailFusionResult<Vec<Fetch>> {
        let stream = session
            .uid_fetch(uids, FETCH_QUERY)
            .await
            .map_err(command_error)?;
        Ok(collect_fetches(stream).await)
    }
}

/// Drains a FETCH stream, skipping responses that fail to decode.
async fn collect_fetches(
    stream: impl futures::Stream<Item = Result<Fetch, async_imap::error::Error>>,
) -> Vec<Fetch> {
    tokio::pin!(stream);
    let mut fetched = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(fetch) => fetched.push(fetch),
            Err(e) => warn!("Skipping unreadable IMAP FETCH response: {:#?}", e),
        }
    }
    fetched
}

/// Builds the canonical email from one FETCH response; the UID becomes the provider id.
fn fetch_to_email(fetch: &Fetch, now: i64) -> MailFusionResult<Email> {
    let uid = fetch
        .uid
        .ok_or_else(|| raise_error!("No uid available".into(), ErrorCode::ImapCommandFailed))?;
    let body = fetch.body().ok_or_else(|| {
        raise_error!(
            format!("No body returned for UID {}", uid),
            ErrorCode::ImapCommandFailed
        )
    })?;
    let mut email = parse_rfc822(&uid.to_string(), body, now)?;
    email.source_is_read = Some(fetch.flags().any(|f| matches!(f, Flag::Seen)));
    email.source_folder = Some(INBOX.to_string());
    if let Some(date) = fetch.internal_date() {
        email.received_at = date.timestamp_millis();
    }
    if let Some(size) = fetch.size {
        email.size_bytes = size as u64;
    }
    Ok(email)
}

#[async_trait]
impl MailProvider for ImapProvider {
    async fn connect(&mut self) -> MailFusionResult<()> {
        if self.session.is_some() {
            return Ok(());
        }
        ensure_fresh_token(&mut self.config.credentials, self.config.proxy.as_ref()).await?;
        let session = Self::open_session(&self.config).await?;
        debug!(email = %self.config.email, "IMAP session established");
        self.session = Some(session);
        Ok(())
    }

    async fn disconnect(&mut self) -> MailFusionResult<()> {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.logout().await {
                warn!(email = %self.config.email, "IMAP LOGOUT failed: {:#?}", e);
            }
        }
        Ok(())
    }

    async fn fetch_emails(
        &mut self,
        since: Option<i64>,
        limit: usize,
    ) -> MailFusionResult<Vec<Email>> {
        let now = utc_now!();
        let since = effective_since(since, now);
        let limit = effective_limit(limit);
        let email = self.config.email.clone();
        let session = self.session_mut()?;

        let mailbox = session.select(INBOX).await.map_err(command_error)?;
        if mailbox.exists == 0 {
            return Ok(Vec::new());
        }
        let criterion = since_criterion(since);
        let matched = session
            .uid_search(&criterion)
            .await
            .map_err(command_error)?;
        let uids = newest_uids(matched, limit);
        debug!(email = %email, criterion = %criterion, "Fetching {} INBOX messages", uids.len());
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let fetched = Self::fetch_messages(session, &uid_set(&uids)).await?;

        let mut emails = Vec::with_capacity(fetched.len());
        for fetch in &fetched {
            match fetch_to_email(fetch, now) {
                Ok(parsed) if parsed.received_at >= since => emails.push(parsed),
                Ok(_) => {}
                Err(e) => warn!(email = %email, "Skipping IMAP message: {}", e),
            }
        }
        emails.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(emails)
    }

    async fn fetch_email_detail(&mut self, provider_id: &str) -> MailFusionResult<Email> {
        let uid: u32 = provider_id.parse().map_err(|_| {
            raise_error!(
                format!("'{}' is not an IMAP UID", provider_id),
                ErrorCode::InvalidParameter
            )
        })?;
        let session = self.session_mut()?;
        session.select(INBOX).await.map_err(command_error)?;
        let fetched = Self::fetch_messages(session, &uid.to_string()).await?;
        let fetch = fetched.first().ok_or_else(|| {
            raise_error!(
                format!("Message with UID {} not found in INBOX", uid),
                ErrorCode::ResourceNotFound
            )
        })?;
        fetch_to_email(fetch, utc_now!())
    }

    async fn test_connection(&self) -> MailFusionResult<()> {
        let mut config = self.config.clone();
        ensure_fresh_token(&mut config.credentials, config.proxy.as_ref()).await?;
        let mut session = Self::open_session(&config).await?;
        {
            let names = session
                .list(Some(""), Some("*"))
                .await
                .map_err(command_error)?;
            let names: Vec<_> = names.try_collect().await.map_err(command_error)?;
            debug!(email = %config.email, "IMAP test listed {} mailboxes", names.len());
        }
        if let Err(e) = session.logout().await {
            warn!("IMAP LOGOUT after test failed: {:#?}", e);
        }
        Ok(())
    }

    fn provider_type(&self) -> EmailProvider {
        self.config.provider
    }

    fn protocol(&self) -> Protocol {
        Protocol::Imap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::adapter::{Credentials, ServerConfig};

    #[test]
    fn test_search_window() {
        // 2025-03-02T10:00:00Z
        assert_eq!(since_criterion(1_740_909_600_000), "SINCE 01-Mar-2025");
        assert_eq!(newest_uids([3, 10, 7, 1], 2), vec![10, 7]);
        assert_eq!(newest_uids([5], 100), vec![5]);
        assert_eq!(uid_set(&[10, 7, 1]), "10,7,1");
    }

    #[tokio::test]
    async fn test_fetch_requires_connect() {
        let mut provider = ImapProvider::new(AdapterConfig {
            email: "a@example.com".into(),
            provider: EmailProvider::Generic,
            protocol: Protocol::Imap,
            credentials: Credentials::default(),
            server: ServerConfig::default(),
            proxy: None,
        });
        let err = provider.fetch_emails(None, 10).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkError);
        assert!(provider.disconnect().await.is_ok());
    }
}
