// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use super::error::code::ErrorCode;
use super::error::MailFusionError;
use mail_parser::{Addr as MimeAddr, Address as MimeAddress};
use poem::error::ResponseError;
use poem::Body;
use poem::{http::StatusCode, Error, Response};
use poem_openapi::Object;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::error;

pub mod http;
pub mod log;
pub mod parallel;
pub mod proxy;
pub mod rustls;
pub mod signal;

static ADDR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:(?P<name>.*)\s*)?<(?P<email>[^<>]+)>"#).expect("static address pattern")
});

#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize, Object)]
pub struct Addr {
    /// Display name, e.g. "John Doe".
    pub name: Option<String>,
    /// Mailbox address, e.g. "john.doe@example.com".
    pub address: Option<String>,
}

impl Addr {
    /// Parses `Name <addr>` or a bare address.
    pub fn parse(s: &str) -> Self {
        if let Some(caps) = ADDR_RE.captures(s) {
            let name = caps
                .name("name")
                .map(|m| m.as_str().trim().trim_matches('"').to_string())
                .filter(|n| !n.is_empty());
            let address = caps.name("email").map(|m| m.as_str().trim().to_string());
            Addr { name, address }
        } else {
            let trimmed = s.trim();
            Addr {
                name: None,
                address: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            }
        }
    }

    pub fn address_or_empty(&self) -> &str {
        self.address.as_deref().unwrap_or_default()
    }
}

impl std::fmt::Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.name, &self.address) {
            (Some(name), Some(address)) => write!(f, "{} <{}>", name, address),
            (None, Some(address)) => write!(f, "{}", address),
            (Some(name), None) => write!(f, "{}", name),
            (None, None) => Ok(()),
        }
    }
}

impl<'x> From<&MimeAddr<'x>> for Addr {
    fn from(original: &MimeAddr<'x>) -> Self {
        Addr {
            name: original.name.as_ref().map(|s| s.to_string()),
            address: original.address.as_ref().map(|s| s.to_string()),
        }
    }
}

/// Flattens address lists and groups into a single list.
pub fn collect_addrs(original: Option<&MimeAddress<'_>>) -> Vec<Addr> {
    match original {
        Some(MimeAddress::List(addrs)) => addrs.iter().map(Addr::from).collect(),
        Some(MimeAddress::Group(groups)) => groups
            .iter()
            .flat_map(|group| group.addresses.iter().map(Addr::from))
            .collect(),
        None => Vec::new(),
    }
}

#[inline]
pub fn create_api_error_response(message: &str, code: ErrorCode) -> Error {
    MailFusionError::Generic {
        message: message.into(),
        location: snafu::Location::default(),
        code,
    }
    .into()
}

impl ResponseError for MailFusionError {
    fn status(&self) -> StatusCode {
        self.code().status()
    }

    fn as_response(&self) -> Response
    where
        Self: std::error::Error + Send + Sync + 'static,
    {
        match self {
            MailFusionError::Generic {
                message,
                location,
                code,
            } => {
                error!(
                    error_code = *code as u32,
                    error_message = %message,
                    error_location = ?location
                );
                let body = Body::from_json(serde_json::json!({
                    "code": *code as u32,
                    "message": message.to_string(),
                }))
                .unwrap_or_else(|_| Body::from_string(message.to_string()));
                Response::builder().status(self.status()).body(body)
            }
        }
    }
}
