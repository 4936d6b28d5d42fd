use mockito::Matcher;

use super::*;
use crate::modules::adapter::{AuthType, Credentials, ServerConfig};
use crate::modules::common::http::DEFAULT_HTTP_TIMEOUT;

const FULL_MESSAGE: &str = r#"{
  "id": "m1",
  "threadId": "t1",
  "labelIds": ["INBOX", "UNREAD", "CATEGORY_UPDATES"],
  "internalDate": "1751364000000",
  "sizeEstimate": 2048,
  "snippet": "Hello world",
  "payload": {
    "partId": "",
    "mimeType": "multipart/mixed",
    "filename": "",
    "headers": [
      {"name": "Subject", "value": "Hi there"},
      {"name": "From", "value": "Alice <alice@example.com>"},
      {"name": "To", "value": "bob@example.com, \"Doe, Carol\" <carol@example.com>"},
      {"name": "Date", "value": "Tue, 1 Jul 2025 09:59:00 +0000"},
      {"name": "Message-ID", "value": "<m1@example.com>"}
    ],
    "body": {"size": 0},
    "parts": [
      {"partId": "0", "mimeType": "text/plain", "filename": "", "headers": [],
       "body": {"size": 11, "data": "SGVsbG8gd29ybGQ"}},
      {"partId": "1", "mimeType": "image/png", "filename": "logo.png",
       "headers": [{"name": "Content-ID", "value": "<logo1>"}],
       "body": {"attachmentId": "att1", "size": 1234}}
    ]
  }
}"#;

fn gmail_config() -> AdapterConfig {
    AdapterConfig {
        email: "alice@example.com".into(),
        provider: EmailProvider::Gmail,
        protocol: Protocol::GmailApi,
        credentials: Credentials {
            auth_type: AuthType::OAuth2,
            access_token: Some("token-1".into()),
            ..Default::default()
        },
        server: ServerConfig::default(),
        proxy: None,
    }
}

#[test]
fn test_full_message_mapping() {
    let message: FullMessage = serde_json::from_str(FULL_MESSAGE).unwrap();
    let email = message.into_email(1);
    assert_eq!(email.provider_id, "m1");
    assert_eq!(email.thread_id.as_deref(), Some("t1"));
    assert_eq!(email.subject, "Hi there");
    assert_eq!(email.from_address, "alice@example.com");
    assert_eq!(email.to.len(), 2);
    assert_eq!(email.text_body.as_deref(), Some("Hello world"));
    assert_eq!(email.source_is_read, Some(false));
    assert_eq!(email.source_labels.len(), 3);
    assert_eq!(email.received_at, 1_751_364_000_000);
    assert_eq!(email.sent_at, 1_751_363_940_000);
    assert_eq!(email.message_id.as_deref(), Some("m1@example.com"));
    assert_eq!(email.attachments_count, 1);
    let attachment = &email.attachments[0];
    assert_eq!(attachment.filename, "logo.png");
    assert_eq!(attachment.size, 1234);
    assert_eq!(attachment.content_id.as_deref(), Some("logo1"));
    assert!(attachment.is_inline);
}

#[tokio::test]
async fn test_fetch_emails_skips_failed_messages() {
    let mut server = mockito::Server::new_async().await;
    let list = server
        .mock("GET", "/users/me/messages")
        .match_query(Matcher::UrlEncoded("maxResults".into(), "10".into()))
        .match_header("authorization", "Bearer token-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"messages":[{"id":"m1","threadId":"t1"},{"id":"m2","threadId":"t2"}]}"#)
        .create_async()
        .await;
    let _m1 = server
        .mock("GET", "/users/me/messages/m1")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(FULL_MESSAGE)
        .create_async()
        .await;
    let _m2 = server
        .mock("GET", "/users/me/messages/m2")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let mut provider = GmailProvider::new(gmail_config(), &server.url(), DEFAULT_HTTP_TIMEOUT);
    provider.connect().await.unwrap();
    let emails = provider.fetch_emails(None, 10).await.unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].provider_id, "m1");
    list.assert_async().await;
    provider.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_listing_follows_page_tokens_until_limit() {
    let mut server = mockito::Server::new_async().await;
    let _first = server
        .mock("GET", "/users/me/messages")
        .match_query(Matcher::Regex("maxResults=2$".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"messages":[{"id":"a","threadId":"a"}],"nextPageToken":"p2"}"#)
        .create_async()
        .await;
    let _second = server
        .mock("GET", "/users/me/messages")
        .match_query(Matcher::UrlEncoded("pageToken".into(), "p2".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"messages":[{"id":"b","threadId":"b"},{"id":"c","threadId":"c"}],"nextPageToken":"p3"}"#)
        .create_async()
        .await;

    let mut provider = GmailProvider::new(gmail_config(), &server.url(), DEFAULT_HTTP_TIMEOUT);
    provider.connect().await.unwrap();
    let ids = provider.list_ids(0, 2).await.unwrap();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn test_connection_uses_profile_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let profile = server
        .mock("GET", "/users/me/profile")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"emailAddress":"alice@example.com","messagesTotal":3}"#)
        .create_async()
        .await;
    let provider = GmailProvider::new(gmail_config(), &server.url(), DEFAULT_HTTP_TIMEOUT);
    provider.test_connection().await.unwrap();
    profile.assert_async().await;
}

#[tokio::test]
async fn test_rejected_token_is_auth_error() {
    let mut server = mockito::Server::new_async().await;
    let _denied = server
        .mock("GET", "/users/me/profile")
        .with_status(401)
        .create_async()
        .await;
    let provider = GmailProvider::new(gmail_config(), &server.url(), DEFAULT_HTTP_TIMEOUT);
    let err = provider.test_connection().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthenticationFailed);
}
