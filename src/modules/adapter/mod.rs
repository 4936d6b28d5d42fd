// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;

use async_trait::async_trait;
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::modules::common::proxy::ProxyConfig;
use crate::modules::email::model::Email;
use crate::modules::error::MailFusionResult;

pub mod factory;
pub mod gmail;
pub mod graph;
pub mod imap;
pub mod mime;
pub mod oauth2;
pub mod pop3;
pub mod session;
#[cfg(test)]
pub mod testing;

/// Fetch size used when the caller passes a limit of 0.
pub const DEFAULT_FETCH_LIMIT: usize = 100;
/// Lookback used when the caller passes no lower bound.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum EmailProvider {
    Gmail,
    Outlook,
    Icloud,
    Qq,
    #[serde(rename = "163")]
    #[oai(rename = "163")]
    Netease163,
    #[default]
    Generic,
}

impl EmailProvider {
    pub const ALL: [EmailProvider; 6] = [
        EmailProvider::Gmail,
        EmailProvider::Outlook,
        EmailProvider::Icloud,
        EmailProvider::Qq,
        EmailProvider::Netease163,
        EmailProvider::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmailProvider::Gmail => "gmail",
            EmailProvider::Outlook => "outlook",
            EmailProvider::Icloud => "icloud",
            EmailProvider::Qq => "qq",
            EmailProvider::Netease163 => "163",
            EmailProvider::Generic => "generic",
        }
    }
}

impl fmt::Display for EmailProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Imap,
    Pop3,
    GmailApi,
    Graph,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Imap => "imap",
            Protocol::Pop3 => "pop3",
            Protocol::GmailApi => "gmail_api",
            Protocol::Graph => "graph",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    Password,
    AppPassword,
    #[serde(rename = "oauth2")]
    #[oai(rename = "oauth2")]
    OAuth2,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum Encryption {
    #[default]
    Ssl,
    StartTls,
    None,
}

/// Explicit server endpoint, required for the `generic` provider.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct ServerConfig {
    #[oai(validator(max_length = 253))]
    pub host: String,
    #[oai(validator(minimum(value = "1"), maximum(value = "65535")))]
    pub port: u16,
    pub encryption: Encryption,
}

/// Decrypted credential blob. Stored on the account as encrypted JSON.
#[derive(Clone, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct Credentials {
    pub auth_type: AuthType,
    pub password: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Access token expiry, UTC millis.
    pub token_expiry: Option<i64>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// OAuth2 token endpoint used for refresh.
    pub token_url: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_type", &self.auth_type)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("token_expiry", &self.token_expiry)
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .finish()
    }
}

impl Credentials {
    pub fn password_or_empty(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }

    pub fn access_token_or_empty(&self) -> &str {
        self.access_token.as_deref().unwrap_or_default()
    }
}

/// Everything an adapter needs to talk to one mailbox.
#[derive(Clone, Debug)]
pub struct AdapterConfig {
    pub email: String,
    pub provider: EmailProvider,
    pub protocol: Protocol,
    pub credentials: Credentials,
    /// Resolved endpoint; empty host for the REST protocols.
    pub server: ServerConfig,
    /// Decrypted proxy, if any.
    pub proxy: Option<ProxyConfig>,
}

/// A mailbox reachable through one protocol.
///
/// `since` and every timestamp are UTC millis.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Opens the session or prepares the token-bound client.
    async fn connect(&mut self) -> MailFusionResult<()>;

    /// No-op when not connected.
    async fn disconnect(&mut self) -> MailFusionResult<()>;

    /// Messages received at or after `since`, at most `limit` of them.
    ///
    /// `None` means a 30 day lookback, a `limit` of 0 means 100. Messages that fail
    /// to parse are skipped.
    async fn fetch_emails(&mut self, since: Option<i64>, limit: usize)
        -> MailFusionResult<Vec<Email>>;

    async fn fetch_email_detail(&mut self, provider_id: &str) -> MailFusionResult<Email>;

    /// Validates credentials with a cheap round-trip, independent of `connect`.
    async fn test_connection(&self) -> MailFusionResult<()>;

    fn provider_type(&self) -> EmailProvider;

    fn protocol(&self) -> Protocol;
}

/// Resolves the fetch window bound: `None` or non-positive becomes now − 30 days.
pub fn effective_since(since: Option<i64>, now: i64) -> i64 {
    match since {
        Some(since) if since > 0 => since,
        _ => now - DEFAULT_LOOKBACK_DAYS * 24 * 60 * 60 * 1000,
    }
}

pub fn effective_limit(limit: usize) -> usize {
    if limit == 0 {
        DEFAULT_FETCH_LIMIT
    } else {
        limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_defaults() {
        let now = 100 * 24 * 60 * 60 * 1000;
        assert_eq!(effective_since(None, now), 70 * 24 * 60 * 60 * 1000);
        assert_eq!(effective_since(Some(0), now), 70 * 24 * 60 * 60 * 1000);
        assert_eq!(effective_since(Some(5), now), 5);
        assert_eq!(effective_limit(0), DEFAULT_FETCH_LIMIT);
        assert_eq!(effective_limit(7), 7);
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&EmailProvider::Netease163).unwrap(),
            "\"163\""
        );
        assert_eq!(
            serde_json::to_string(&Protocol::GmailApi).unwrap(),
            "\"gmail_api\""
        );
        assert_eq!(serde_json::to_string(&AuthType::OAuth2).unwrap(), "\"oauth2\"");
        let parsed: Encryption = serde_json::from_str("\"starttls\"").unwrap();
        assert_eq!(parsed, Encryption::StartTls);
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
