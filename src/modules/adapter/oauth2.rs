// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use oauth2::{basic::BasicClient, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use tracing::{info, warn};

use crate::modules::adapter::{AuthType, Credentials};
use crate::modules::common::proxy::ProxyConfig;
use crate::modules::error::{code::ErrorCode, MailFusionResult};
use crate::{raise_error, utc_now};

/// Tokens expiring within this window are refreshed ahead of time.
const EXPIRY_SKEW_MS: i64 = 60_000;

pub fn needs_refresh(credentials: &Credentials, now: i64) -> bool {
    credentials.auth_type == AuthType::OAuth2
        && credentials
            .token_expiry
            .map(|expiry| expiry - EXPIRY_SKEW_MS <= now)
            .unwrap_or(false)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

pub fn can_refresh(credentials: &Credentials) -> bool {
    non_empty(&credentials.refresh_token).is_some()
        && non_empty(&credentials.client_id).is_some()
        && non_empty(&credentials.client_secret).is_some()
        && non_empty(&credentials.token_url).is_some()
}

/// Bearer token for the REST adapters and XOAUTH2.
pub fn require_access_token(credentials: &Credentials) -> MailFusionResult<String> {
    non_empty(&credentials.access_token)
        .map(String::from)
        .ok_or_else(|| {
            raise_error!(
                "OAuth2 access token is missing from the account credentials".into(),
                ErrorCode::AuthenticationFailed
            )
        })
}

/// Refreshes an expired OAuth2 access token in place.
///
/// Returns `true` when the credentials changed. Expired tokens without the material needed
/// to refresh are left as they are and the remote will reject them.
pub async fn ensure_fresh_token(
    credentials: &mut Credentials,
    proxy: Option<&ProxyConfig>,
) -> MailFusionResult<bool> {
    if !needs_refresh(credentials, utc_now!()) {
        return Ok(false);
    }
    if !can_refresh(credentials) {
        warn!("OAuth2 access token expired and no refresh material is available");
        return Ok(false);
    }

    let (Some(refresh_token), Some(client_id), Some(client_secret), Some(token_url)) = (
        non_empty(&credentials.refresh_token),
        non_empty(&credentials.client_id),
        non_empty(&credentials.client_secret),
        non_empty(&credentials.token_url),
    ) else {
        return Ok(false);
    };
    let refresh_token = refresh_token.to_string();

    let token_url = TokenUrl::new(token_url.to_string())
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InvalidParameter))?;
    let client = BasicClient::new(ClientId::new(client_id.to_string()))
        .set_client_secret(ClientSecret::new(client_secret.to_string()))
        .set_token_uri(token_url);
    let http_client = build_http_client(proxy)?;

    let response = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
        .request_async(&http_client)
        .await
        .map_err(|e| {
            raise_error!(
                format!("Failed to refresh OAuth2 access token: {}", e),
                ErrorCode::AuthenticationFailed
            )
        })?;

    credentials.access_token = Some(response.access_token().secret().to_owned());
    credentials.refresh_token = Some(
        response
            .refresh_token()
            .map(|r| r.secret().to_owned())
            .unwrap_or(refresh_token),
    );
    credentials.token_expiry = response
        .expires_in()
        .map(|d| utc_now!() + d.as_millis() as i64);
    info!("OAuth2 access token refreshed");
    Ok(true)
}

fn build_http_client(proxy: Option<&ProxyConfig>) -> MailFusionResult<reqwest::Client> {
    let mut builder =
        oauth2::reqwest::ClientBuilder::new().redirect(oauth2::reqwest::redirect::Policy::none());
    if let Some(proxy) = ProxyConfig::active(proxy) {
        builder = builder.proxy(reqwest::Proxy::all(proxy.url()).map_err(|e| {
            raise_error!(
                format!(
                    "Failed to configure proxy {}:{}: {:#?}",
                    proxy.host, proxy.port, e
                ),
                ErrorCode::InvalidParameter
            )
        })?);
    }
    builder
        .build()
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expired(token_url: String) -> Credentials {
        Credentials {
            auth_type: AuthType::OAuth2,
            access_token: Some("old".into()),
            refresh_token: Some("refresh-1".into()),
            token_expiry: Some(1),
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
            token_url: Some(token_url),
            ..Default::default()
        }
    }

    #[test]
    fn test_refresh_only_for_expired_oauth2() {
        let mut creds = expired("https://example.com/token".into());
        assert!(needs_refresh(&creds, 10_000_000));
        creds.token_expiry = Some(i64::MAX);
        assert!(!needs_refresh(&creds, 10_000_000));
        creds.token_expiry = None;
        assert!(!needs_refresh(&creds, 10_000_000));
        creds.auth_type = AuthType::Password;
        creds.token_expiry = Some(1);
        assert!(!needs_refresh(&creds, 10_000_000));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"fresh","token_type":"bearer","expires_in":3600}"#)
            .create_async()
            .await;

        let mut creds = expired(format!("{}/token", server.url()));
        let refreshed = ensure_fresh_token(&mut creds, None).await.unwrap();
        assert!(refreshed);
        assert_eq!(creds.access_token.as_deref(), Some("fresh"));
        assert_eq!(creds.refresh_token.as_deref(), Some("refresh-1"));
        assert!(creds.token_expiry.unwrap() > utc_now!());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_refresh_material_keeps_token() {
        let mut creds = expired("https://example.com/token".into());
        creds.client_secret = None;
        assert!(!ensure_fresh_token(&mut creds, None).await.unwrap());
        assert_eq!(creds.access_token.as_deref(), Some("old"));
    }
}
