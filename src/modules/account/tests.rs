use std::sync::Arc;
use std::time::Duration;

use crate::modules::account::entity::{Account, AccountStatus};
use crate::modules::account::payload::{AccountCreateRequest, AccountUpdateRequest};
use crate::modules::account::service::AccountService;
use crate::modules::adapter::testing::{sample_email, FakeFactory, FakeMailbox};
use crate::modules::adapter::{
    AuthType, Credentials, EmailProvider, Encryption, Protocol, ServerConfig,
};
use crate::modules::common::proxy::{ProxyConfig, ProxyType};
use crate::modules::database::manager::DatabaseManager;
use crate::modules::email::entity::EmailRecord;
use crate::modules::error::code::ErrorCode;
use crate::modules::events::broker::memory::MemoryBroker;
use crate::modules::events::bus::EventBus;
use crate::modules::sync::lock::SyncLocks;
use crate::modules::utils::encrypt::Cipher;

fn service(mailbox: Arc<FakeMailbox>) -> (AccountService, Arc<native_db::Database<'static>>) {
    let database = DatabaseManager::in_memory().unwrap();
    let bus = Arc::new(EventBus::new(
        Arc::new(MemoryBroker::new()),
        Duration::from_secs(5),
    ));
    let service = AccountService::new(
        database.clone(),
        Cipher::new("test-key"),
        bus,
        Arc::new(FakeFactory { mailbox }),
        SyncLocks::default(),
    );
    (service, database)
}

fn qq_request() -> AccountCreateRequest {
    AccountCreateRequest {
        email: "alice@qq.com".into(),
        provider: EmailProvider::Qq,
        protocol: Protocol::Imap,
        credentials: Credentials {
            auth_type: AuthType::AppPassword,
            password: Some("app-secret".into()),
            ..Default::default()
        },
        proxy: Some(ProxyConfig {
            enabled: true,
            proxy_type: ProxyType::Socks5,
            host: "127.0.0.1".into(),
            port: 1080,
            username: Some("proxy-user".into()),
            password: Some("proxy-secret".into()),
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_encrypts_secrets_and_applies_defaults() {
    let (service, database) = service(Arc::new(FakeMailbox::default()));
    let account = service.create(qq_request()).await.unwrap();

    assert!(!account.uid.is_empty());
    assert_eq!(account.sync_interval, 5);
    assert!(account.sync_enabled);
    assert_eq!(account.status, AccountStatus::Active);
    assert_eq!(account.auth_type, AuthType::AppPassword);
    assert!(!account.encrypted_credentials.contains("app-secret"));
    let stored_proxy_password = account.proxy.as_ref().unwrap().password.clone().unwrap();
    assert_ne!(stored_proxy_password, "proxy-secret");

    let stored = Account::get(&database, &account.uid).await.unwrap();
    let config = stored.adapter_config(&Cipher::new("test-key")).unwrap();
    assert_eq!(config.credentials.password.as_deref(), Some("app-secret"));
    assert_eq!(config.server.host, "imap.qq.com");
    assert_eq!(
        config.proxy.unwrap().password.as_deref(),
        Some("proxy-secret")
    );

    let redacted = stored.redacted();
    assert!(redacted.encrypted_credentials.is_empty());
    assert!(redacted.proxy.unwrap().password.is_none());
}

#[tokio::test]
async fn test_create_rejects_invalid_input() {
    let (service, _) = service(Arc::new(FakeMailbox::default()));

    let mut request = qq_request();
    request.email = "not-an-email".into();
    let err = service.create(request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);

    let mut request = qq_request();
    request.protocol = Protocol::Graph;
    let err = service.create(request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedProvider);

    let mut request = qq_request();
    request.provider = EmailProvider::Generic;
    let err = service.create(request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::MissingConfiguration);

    let mut request = qq_request();
    request.protocol = Protocol::Pop3;
    request.credentials = Credentials {
        auth_type: AuthType::OAuth2,
        access_token: Some("t".into()),
        ..Default::default()
    };
    let err = service.create(request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);

    assert!(service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_email_is_rejected() {
    let (service, _) = service(Arc::new(FakeMailbox::default()));
    service.create(qq_request()).await.unwrap();
    let err = service.create(qq_request()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyExists);
}

#[tokio::test]
async fn test_generic_provider_with_explicit_server() {
    let (service, _) = service(Arc::new(FakeMailbox::default()));
    let mut request = qq_request();
    request.provider = EmailProvider::Generic;
    request.server = Some(ServerConfig {
        host: "mail.example.org".into(),
        port: 110,
        encryption: Encryption::StartTls,
    });
    request.protocol = Protocol::Pop3;
    let account = service.create(request).await.unwrap();
    assert_eq!(account.server.unwrap().port, 110);
}

#[tokio::test]
async fn test_update_reencrypts_credentials() {
    let (service, database) = service(Arc::new(FakeMailbox::default()));
    let account = service.create(qq_request()).await.unwrap();

    let updated = service
        .update(
            &account.uid,
            AccountUpdateRequest {
                credentials: Some(Credentials {
                    auth_type: AuthType::Password,
                    password: Some("rotated".into()),
                    ..Default::default()
                }),
                sync_interval: Some(15),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.sync_interval, 15);
    assert_eq!(updated.auth_type, AuthType::Password);
    assert_ne!(updated.encrypted_credentials, account.encrypted_credentials);

    let stored = Account::get(&database, &account.uid).await.unwrap();
    let credentials = stored.credentials(&Cipher::new("test-key")).unwrap();
    assert_eq!(credentials.password.as_deref(), Some("rotated"));
}

#[tokio::test]
async fn test_status_and_sync_flags() {
    let (service, _) = service(Arc::new(FakeMailbox::default()));
    let account = service.create(qq_request()).await.unwrap();

    let disabled = service.disable_sync(&account.uid).await.unwrap();
    assert!(!disabled.sync_enabled);
    assert!(!disabled.is_syncable());
    let enabled = service.enable_sync(&account.uid).await.unwrap();
    assert!(enabled.sync_enabled);

    let err = service
        .set_status(&account.uid, AccountStatus::Error)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);
    let off = service
        .set_status(&account.uid, AccountStatus::Disabled)
        .await
        .unwrap();
    assert_eq!(off.status, AccountStatus::Disabled);
    assert!(!off.is_syncable());
}

#[tokio::test]
async fn test_clear_sync_error_reactivates() {
    let (service, database) = service(Arc::new(FakeMailbox::default()));
    let account = service.create(qq_request()).await.unwrap();
    Account::modify(&database, &account.uid, |a| {
        a.status = AccountStatus::Error;
        a.last_sync_error = Some("boom".into());
        Ok(())
    })
    .await
    .unwrap();

    let cleared = service.clear_sync_error(&account.uid).await.unwrap();
    assert_eq!(cleared.status, AccountStatus::Active);
    assert!(cleared.last_sync_error.is_none());
}

#[tokio::test]
async fn test_delete_cascades_to_emails() {
    let (service, database) = service(Arc::new(FakeMailbox::default()));
    let account = service.create(qq_request()).await.unwrap();
    let other = {
        let mut request = qq_request();
        request.email = "bob@qq.com".into();
        service.create(request).await.unwrap()
    };
    for (uid, id) in [(&account.uid, "1"), (&account.uid, "2"), (&other.uid, "1")] {
        EmailRecord::upsert_from_sync(&database, uid, sample_email(id, "hello", 1_000))
            .await
            .unwrap();
    }

    service.delete(&account.uid).await.unwrap();
    assert!(Account::find(&database, &account.uid).await.unwrap().is_none());
    assert_eq!(
        EmailRecord::count_by_account(&database, &account.uid)
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        EmailRecord::count_by_account(&database, &other.uid)
            .await
            .unwrap(),
        1
    );

    let err = service.delete(&account.uid).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn test_connection_goes_through_factory() {
    let mailbox = Arc::new(FakeMailbox::default());
    let (service, _) = service(mailbox.clone());
    let account = service.create(qq_request()).await.unwrap();

    service.test_connection(&account.uid).await.unwrap();
    mailbox.fail_connect(ErrorCode::AuthenticationFailed);
    let err = service.test_connection(&account.uid).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthenticationFailed);

    let configs = mailbox.configs.lock().unwrap();
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[0].email, "alice@qq.com");
}
