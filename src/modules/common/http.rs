// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::modules::common::proxy::ProxyConfig;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::{mailfusion_version, raise_error};

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub fn user_agent() -> String {
    format!("MailFusion/{}", mailfusion_version!())
}

#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(proxy: Option<&ProxyConfig>, timeout: Duration) -> MailFusionResult<HttpClient> {
        let mut builder = reqwest::ClientBuilder::new()
            .user_agent(user_agent())
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10));

        if let Some(proxy) = ProxyConfig::active(proxy) {
            let proxy_obj = reqwest::Proxy::all(proxy.url()).map_err(|e| {
                raise_error!(
                    format!(
                        "Failed to configure proxy {}:{}: {:#?}",
                        &proxy.host, proxy.port, e
                    ),
                    ErrorCode::InvalidParameter
                )
            })?;
            builder = builder
                .redirect(reqwest::redirect::Policy::none())
                .proxy(proxy_obj);
        }

        let client = builder.build().map_err(|e| {
            raise_error!(
                format!("Failed to build HTTP client: {:#?}", e),
                ErrorCode::InternalError
            )
        })?;

        Ok(Self { client })
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Bearer-authenticated GET decoded into `T`.
    ///
    /// 401/403 map to `AuthenticationFailed`, 404 to `ResourceNotFound`, any other non-2xx to
    /// `api_error`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
        api_error: ErrorCode,
    ) -> MailFusionResult<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| map_transport_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let code = match status.as_u16() {
                401 | 403 => ErrorCode::AuthenticationFailed,
                404 => ErrorCode::ResourceNotFound,
                _ => api_error,
            };
            return Err(raise_error!(
                format!("GET {} returned {}: {}", url, status, body),
                code
            ));
        }

        response.json::<T>().await.map_err(|e| {
            raise_error!(
                format!(
                    "Failed to deserialize response from {}: {:#?}. Possible model mismatch or API change.",
                    url, e
                ),
                api_error
            )
        })
    }

    pub async fn send_json_request(
        &self,
        method: Method,
        url: &str,
        payload: &serde_json::Value,
        headers: &BTreeMap<String, String>,
    ) -> MailFusionResult<reqwest::Response> {
        let mut request_builder = self
            .client
            .request(method, url)
            .header(reqwest::header::USER_AGENT, user_agent());

        for (key, value) in headers {
            request_builder = request_builder.header(key, value);
        }

        request_builder
            .json(payload)
            .send()
            .await
            .map_err(|e| map_transport_error(e, url))
    }
}

fn map_transport_error(error: reqwest::Error, url: &str) -> crate::modules::error::MailFusionError {
    let code = if error.is_timeout() {
        ErrorCode::ConnectionTimeout
    } else {
        ErrorCode::NetworkError
    };
    raise_error!(format!("Request to {} failed: {}", url, error), code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_json_maps_status_codes() {
        let mut server = mockito::Server::new_async().await;
        let _unauthorized = server
            .mock("GET", "/me")
            .with_status(401)
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = HttpClient::new(None, DEFAULT_HTTP_TIMEOUT).unwrap();
        let err = client
            .get_json::<serde_json::Value>(
                &format!("{}/me", server.url()),
                "token",
                ErrorCode::GraphApiCallFailed,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthenticationFailed);

        let err = client
            .get_json::<serde_json::Value>(
                &format!("{}/missing", server.url()),
                "token",
                ErrorCode::GraphApiCallFailed,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResourceNotFound);
    }

    #[tokio::test]
    async fn test_send_json_request_sets_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/hook")
            .match_header("x-token", "abc")
            .match_header("content-type", "application/json")
            .with_status(204)
            .create_async()
            .await;

        let client = HttpClient::new(None, DEFAULT_HTTP_TIMEOUT).unwrap();
        let mut headers = BTreeMap::new();
        headers.insert("x-token".to_string(), "abc".to_string());
        let response = client
            .send_json_request(
                Method::PUT,
                &format!("{}/hook", server.url()),
                &serde_json::json!({"k": "v"}),
                &headers,
            )
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 204);
        mock.assert_async().await;
    }
}
