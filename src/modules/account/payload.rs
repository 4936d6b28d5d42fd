// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::modules::account::entity::AccountStatus;
use crate::modules::adapter::factory::{resolve_server, validate_combination};
use crate::modules::adapter::{AuthType, Credentials, EmailProvider, Protocol, ServerConfig};
use crate::modules::common::proxy::ProxyConfig;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::utils::validate_email;
use crate::raise_error;

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Object)]
pub struct AccountCreateRequest {
    /// Mailbox address. Cannot be changed after creation.
    pub email: String,
    pub provider: EmailProvider,
    pub protocol: Protocol,
    pub credentials: Credentials,
    /// Explicit host/port/encryption. Required for the `generic` provider,
    /// overrides the built-in host table otherwise.
    pub server: Option<ServerConfig>,
    pub proxy: Option<ProxyConfig>,
    /// Defaults to true
    pub sync_enabled: Option<bool>,
    /// Scheduled sync interval in minutes, default 5
    #[oai(validator(minimum(value = "1"), maximum(value = "1440")))]
    pub sync_interval: Option<u32>,
}

impl AccountCreateRequest {
    pub fn validate(&self) -> MailFusionResult<()> {
        validate_email(&self.email)?;
        validate_combination(self.provider, self.protocol)?;
        resolve_server(self.provider, self.protocol, self.server.as_ref())?;
        validate_credentials(self.protocol, &self.credentials)?;
        if let Some(proxy) = &self.proxy {
            proxy.validate()?;
        }
        validate_interval(self.sync_interval)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Object)]
pub struct AccountUpdateRequest {
    /// Replaces the stored credentials; they are re-encrypted.
    pub credentials: Option<Credentials>,
    pub server: Option<ServerConfig>,
    pub proxy: Option<ProxyConfig>,
    pub sync_enabled: Option<bool>,
    #[oai(validator(minimum(value = "1"), maximum(value = "1440")))]
    pub sync_interval: Option<u32>,
}

impl AccountUpdateRequest {
    pub fn validate(&self, provider: EmailProvider, protocol: Protocol) -> MailFusionResult<()> {
        if let Some(credentials) = &self.credentials {
            validate_credentials(protocol, credentials)?;
        }
        if self.server.is_some() {
            resolve_server(provider, protocol, self.server.as_ref())?;
        }
        if let Some(proxy) = &self.proxy {
            proxy.validate()?;
        }
        validate_interval(self.sync_interval)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize, Object)]
pub struct AccountStatusRequest {
    /// `active` or `disabled`; `error` is reserved for the sync engine.
    pub status: AccountStatus,
}

fn validate_interval(interval: Option<u32>) -> MailFusionResult<()> {
    match interval {
        Some(0) => Err(raise_error!(
            "'sync_interval' must be at least 1 minute".into(),
            ErrorCode::InvalidParameter
        )),
        _ => Ok(()),
    }
}

fn validate_credentials(protocol: Protocol, credentials: &Credentials) -> MailFusionResult<()> {
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    match credentials.auth_type {
        AuthType::Password | AuthType::AppPassword => {
            if matches!(protocol, Protocol::GmailApi | Protocol::Graph) {
                return Err(raise_error!(
                    format!("Protocol '{}' only supports oauth2 credentials", protocol),
                    ErrorCode::InvalidParameter
                ));
            }
            if !present(&credentials.password) {
                return Err(raise_error!(
                    "A password is required for password authentication".into(),
                    ErrorCode::InvalidParameter
                ));
            }
        }
        AuthType::OAuth2 => {
            if protocol == Protocol::Pop3 {
                return Err(raise_error!(
                    "OAuth2 is not supported over POP3".into(),
                    ErrorCode::InvalidParameter
                ));
            }
            if !present(&credentials.access_token) && !present(&credentials.refresh_token) {
                return Err(raise_error!(
                    "OAuth2 credentials need an access token or a refresh token".into(),
                    ErrorCode::InvalidParameter
                ));
            }
            if present(&credentials.refresh_token)
                && (!present(&credentials.client_id) || !present(&credentials.token_url))
            {
                return Err(raise_error!(
                    "Refreshable OAuth2 credentials need 'client_id' and 'token_url'".into(),
                    ErrorCode::InvalidParameter
                ));
            }
        }
    }
    Ok(())
}
