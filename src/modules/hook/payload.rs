use std::collections::BTreeMap;

use http::{HeaderName, HeaderValue};
use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::events::EventType;
use crate::modules::hook::entity::{HttpMethod, Webhook, WILDCARD_EVENT};
use crate::raise_error;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct WebhookCreateRequest {
    #[oai(validator(min_length = 1, max_length = 128))]
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    /// Defaults to POST
    pub method: Option<HttpMethod>,
    pub headers: Option<BTreeMap<String, String>>,
    /// Event types such as `email.received`, or `*`.
    pub events: Vec<String>,
    /// Defaults to true
    pub enabled: Option<bool>,
    /// Defaults to true
    pub retry_enabled: Option<bool>,
    /// Defaults to 3
    pub max_retries: Option<u32>,
    /// Seconds. Defaults to `[10, 30, 60]`
    pub retry_intervals: Option<Vec<u64>>,
}

impl WebhookCreateRequest {
    pub fn validate(&self) -> MailFusionResult<()> {
        validate_url(&self.url)?;
        if let Some(headers) = &self.headers {
            validate_headers(headers)?;
        }
        validate_events(&self.events)?;
        if let Some(intervals) = &self.retry_intervals {
            validate_intervals(intervals)?;
        }
        Ok(())
    }
}

/// Absent fields are left unchanged.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct WebhookUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<BTreeMap<String, String>>,
    pub events: Option<Vec<String>>,
    pub enabled: Option<bool>,
    pub retry_enabled: Option<bool>,
    pub max_retries: Option<u32>,
    pub retry_intervals: Option<Vec<u64>>,
}

impl WebhookUpdateRequest {
    pub fn validate(&self) -> MailFusionResult<()> {
        if let Some(url) = &self.url {
            validate_url(url)?;
        }
        if let Some(headers) = &self.headers {
            validate_headers(headers)?;
        }
        if let Some(events) = &self.events {
            validate_events(events)?;
        }
        if let Some(intervals) = &self.retry_intervals {
            validate_intervals(intervals)?;
        }
        Ok(())
    }

    pub fn apply(self, webhook: &mut Webhook) {
        if let Some(name) = self.name {
            webhook.name = name;
        }
        if self.description.is_some() {
            webhook.description = self.description;
        }
        if let Some(url) = self.url {
            webhook.url = url;
        }
        if let Some(method) = self.method {
            webhook.method = method;
        }
        if let Some(headers) = self.headers {
            webhook.headers = headers;
        }
        if let Some(events) = self.events {
            webhook.events = events;
        }
        if let Some(enabled) = self.enabled {
            webhook.enabled = enabled;
        }
        if let Some(retry_enabled) = self.retry_enabled {
            webhook.retry_enabled = retry_enabled;
        }
        if let Some(max_retries) = self.max_retries {
            webhook.max_retries = max_retries;
        }
        if let Some(intervals) = self.retry_intervals {
            webhook.retry_intervals = intervals;
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct WebhookTestRequest {
    /// JSON object whose fields are merged into the test event data.
    pub data: Option<serde_json::Value>,
}

fn validate_url(url: &str) -> MailFusionResult<()> {
    let parsed = Url::parse(url).map_err(|e| {
        raise_error!(
            format!("Invalid webhook url '{}': {}", url, e),
            ErrorCode::InvalidParameter
        )
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(raise_error!(
            format!("Webhook url must use http or https, got '{}'", parsed.scheme()),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

fn validate_headers(headers: &BTreeMap<String, String>) -> MailFusionResult<()> {
    for (key, value) in headers {
        if HeaderName::from_bytes(key.as_bytes()).is_err() {
            return Err(raise_error!(
                format!("Invalid header name: {}", key),
                ErrorCode::InvalidParameter
            ));
        }
        if HeaderValue::from_str(value).is_err() {
            return Err(raise_error!(
                format!("Invalid header value: {}", value),
                ErrorCode::InvalidParameter
            ));
        }
    }
    Ok(())
}

fn validate_events(events: &[String]) -> MailFusionResult<()> {
    if events.is_empty() {
        return Err(raise_error!(
            "Please select at least one event to watch".into(),
            ErrorCode::InvalidParameter
        ));
    }
    for event in events {
        let known = event == WILDCARD_EVENT
            || EventType::parse(event).is_some_and(|t| t != EventType::Test);
        if !known {
            return Err(raise_error!(
                format!("Unknown event type '{}'", event),
                ErrorCode::InvalidParameter
            ));
        }
    }
    Ok(())
}

fn validate_intervals(intervals: &[u64]) -> MailFusionResult<()> {
    if intervals.iter().any(|i| *i == 0) {
        return Err(raise_error!(
            "Retry intervals must be positive".into(),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}
