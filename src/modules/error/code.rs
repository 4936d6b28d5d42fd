// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem::http::StatusCode;
use poem_openapi::Enum;

#[derive(Copy, Clone, Debug, Enum, Eq, PartialEq)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    MissingConfiguration = 10020,
    UnsupportedProvider = 10030,
    MethodNotAllowed = 10090,

    // Authentication and account state errors (20000–20999)
    AuthenticationFailed = 20000,
    AccountDisabled = 20010,
    SyncDisabled = 20020,
    MissingRefreshToken = 20060,

    // Resource errors (30000–30999)
    ResourceNotFound = 30000,
    AlreadyExists = 30010,

    // Network connection errors (40000–40999)
    NetworkError = 40000,
    ConnectionTimeout = 40010,
    TlsHandshakeFailed = 40020,
    HttpResponseError = 40030,
    WebhookDeliveryFailed = 40040,

    // Mail protocol errors (50000–50999)
    ImapCommandFailed = 50000,
    Pop3CommandFailed = 50010,
    MessageParseFailed = 50020,
    GmailApiCallFailed = 50070,
    GraphApiCallFailed = 50080,

    // Message broker errors (60000–60999)
    NatsRequestFailed = 60000,
    NatsConnectionFailed = 60010,

    // Internal system errors (70000–70999)
    InternalError = 70000,
    UnhandledPoemError = 70010,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidParameter
            | ErrorCode::MissingConfiguration
            | ErrorCode::UnsupportedProvider => StatusCode::BAD_REQUEST,
            ErrorCode::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            ErrorCode::AccountDisabled | ErrorCode::SyncDisabled => StatusCode::FORBIDDEN,
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::NetworkError
            | ErrorCode::ConnectionTimeout
            | ErrorCode::TlsHandshakeFailed
            | ErrorCode::HttpResponseError
            | ErrorCode::WebhookDeliveryFailed
            | ErrorCode::ImapCommandFailed
            | ErrorCode::Pop3CommandFailed
            | ErrorCode::GmailApiCallFailed
            | ErrorCode::GraphApiCallFailed => StatusCode::BAD_GATEWAY,
            ErrorCode::MissingRefreshToken
            | ErrorCode::MessageParseFailed
            | ErrorCode::NatsRequestFailed
            | ErrorCode::NatsConnectionFailed
            | ErrorCode::InternalError
            | ErrorCode::UnhandledPoemError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Errors raised while talking to a remote server, as opposed to bad input or local failures.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError | ErrorCode::ConnectionTimeout | ErrorCode::TlsHandshakeFailed
        )
    }
}
