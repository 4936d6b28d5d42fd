use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::modules::adapter::testing::sample_email;
use crate::modules::database::manager::DatabaseManager;
use crate::modules::email::entity::{EmailRecord, UpsertOutcome};
use crate::modules::email::service::{
    AccountEmailStats, EmailService, LocalMutation, LocalStateRequest,
};
use crate::modules::error::code::ErrorCode;
use crate::modules::events::broker::memory::MemoryBroker;
use crate::modules::events::bus::{handler, EventBus};
use crate::modules::events::EventType;

#[tokio::test]
async fn test_upsert_keeps_local_state() {
    let database = DatabaseManager::in_memory().unwrap();
    let first = EmailRecord::upsert_from_sync(&database, "acc", sample_email("p1", "v1", 1_000))
        .await
        .unwrap();
    let UpsertOutcome::Created(id) = first else {
        panic!("expected a new record, got {:?}", first);
    };

    EmailRecord::modify_local(&database, id, |r| {
        r.is_starred = true;
        r.local_labels.push("keep".into());
    })
    .await
    .unwrap();

    let mut remote = sample_email("p1", "v2", 1_000);
    remote.source_is_read = Some(true);
    let second = EmailRecord::upsert_from_sync(&database, "acc", remote)
        .await
        .unwrap();
    assert_eq!(second, UpsertOutcome::Updated(id));

    let record = EmailRecord::get(&database, id).await.unwrap();
    assert_eq!(record.subject, "v2");
    assert_eq!(record.source_is_read, Some(true));
    assert!(record.is_starred);
    assert!(!record.is_read);
    assert_eq!(record.local_labels, vec!["keep".to_string()]);

    // same provider id under another account is a different email
    let other = EmailRecord::upsert_from_sync(&database, "acc2", sample_email("p1", "v1", 1_000))
        .await
        .unwrap();
    assert!(matches!(other, UpsertOutcome::Created(_)));
    assert_eq!(EmailRecord::count_by_account(&database, "acc").await.unwrap(), 1);
}

#[tokio::test]
async fn test_list_is_newest_first_and_paginated() {
    let database = DatabaseManager::in_memory().unwrap();
    for (i, ts) in [3_000i64, 1_000, 2_000, 5_000, 4_000].iter().enumerate() {
        EmailRecord::upsert_from_sync(
            &database,
            "acc",
            sample_email(&i.to_string(), "s", *ts),
        )
        .await
        .unwrap();
    }
    EmailRecord::upsert_from_sync(&database, "acc-other", sample_email("x", "s", 9_000))
        .await
        .unwrap();

    let service = EmailService::new(
        database,
        Arc::new(EventBus::new(Arc::new(MemoryBroker::new()), Duration::from_secs(1))),
    );
    let page = service
        .list_by_account("acc", Some(1), Some(2))
        .await
        .unwrap();
    assert_eq!(page.total_items, 5);
    assert_eq!(page.total_pages, Some(3));
    let times: Vec<i64> = page.items.iter().map(|r| r.received_at).collect();
    assert_eq!(times, vec![5_000, 4_000]);

    let last = service
        .list_by_account("acc", Some(3), Some(2))
        .await
        .unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].received_at, 1_000);
}

#[test]
fn test_state_request_mapping() {
    let request = LocalStateRequest {
        is_read: Some(true),
        is_starred: Some(false),
        ..Default::default()
    };
    assert_eq!(
        request.mutations().unwrap(),
        vec![LocalMutation::MarkRead, LocalMutation::Unstar]
    );
    assert!(LocalStateRequest::default().mutations().is_err());
    let undelete = LocalStateRequest {
        is_deleted: Some(false),
        ..Default::default()
    };
    assert_eq!(
        undelete.mutations().unwrap_err().code(),
        ErrorCode::InvalidParameter
    );
}

#[tokio::test]
async fn test_set_local_state_publishes_events() {
    let database = DatabaseManager::in_memory().unwrap();
    let bus = Arc::new(EventBus::new(
        Arc::new(MemoryBroker::new()),
        Duration::from_secs(1),
    ));
    let (tx, mut rx) = mpsc::unbounded_channel();
    for event_type in [EventType::EmailRead, EventType::EmailStarred, EventType::EmailDeleted] {
        let tx = tx.clone();
        bus.subscribe(
            event_type,
            handler(move |event| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((event.event_type, event.email_id()));
                    Ok(())
                }
            }),
        );
    }
    bus.start().await.unwrap();

    let UpsertOutcome::Created(id) =
        EmailRecord::upsert_from_sync(&database, "acc", sample_email("p1", "s", 1_000))
            .await
            .unwrap()
    else {
        panic!("expected a new record");
    };
    let service = EmailService::new(database, bus.clone());
    let record = service
        .set_local_state(
            id,
            LocalStateRequest {
                is_read: Some(true),
                is_starred: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(record.is_read && record.is_starred);

    let record = service
        .apply(id, LocalMutation::MoveFolder("Receipts".into()))
        .await
        .unwrap();
    assert_eq!(record.local_folder.as_deref(), Some("Receipts"));
    service.apply(id, LocalMutation::Delete).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let item = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(item);
    }
    seen.sort_by_key(|(t, _)| t.as_str());
    assert_eq!(
        seen,
        vec![
            (EventType::EmailDeleted, Some(id)),
            (EventType::EmailRead, Some(id)),
            (EventType::EmailStarred, Some(id)),
        ]
    );
    assert!(service.get(id).await.unwrap().is_deleted);
    bus.stop().await;
}

async fn seeded_service() -> (EmailService, Vec<u64>) {
    let database = DatabaseManager::in_memory().unwrap();
    let mut ids = Vec::new();
    for (provider_id, account, subject, ts) in [
        ("p1", "acc", "Invoice for March", 1_000i64),
        ("p2", "acc", "Lunch on Friday", 2_000),
        ("p3", "acc", "Final invoice reminder", 3_000),
        ("p4", "acc-other", "Invoice copy", 4_000),
    ] {
        let outcome = EmailRecord::upsert_from_sync(
            &database,
            account,
            sample_email(provider_id, subject, ts),
        )
        .await
        .unwrap();
        let UpsertOutcome::Created(id) = outcome else {
            panic!("expected a new record");
        };
        ids.push(id);
    }
    let service = EmailService::new(
        database,
        Arc::new(EventBus::new(Arc::new(MemoryBroker::new()), Duration::from_secs(1))),
    );
    (service, ids)
}

#[tokio::test]
async fn test_search_matches_every_term() {
    let (service, ids) = seeded_service().await;

    let all = service.search("INVOICE", None, None, None).await.unwrap();
    assert_eq!(all.total_items, 3);
    assert_eq!(all.items[0].id, ids[3]);

    let scoped = service
        .search("invoice", Some("acc"), Some(1), Some(1))
        .await
        .unwrap();
    assert_eq!(scoped.total_items, 2);
    assert_eq!(scoped.total_pages, Some(2));
    assert_eq!(scoped.items[0].id, ids[2]);

    let both = service.search("final invoice", None, None, None).await.unwrap();
    assert_eq!(both.items.len(), 1);
    let by_sender = service.search("sender@example", Some("acc"), None, None).await.unwrap();
    assert_eq!(by_sender.total_items, 3);

    service.apply(ids[2], LocalMutation::Delete).await.unwrap();
    let live = service.search("invoice", Some("acc"), None, None).await.unwrap();
    assert_eq!(live.total_items, 1);

    let err = service.search("   ", None, None, None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParameter);
}

#[tokio::test]
async fn test_unread_count_and_account_stats() {
    let (service, ids) = seeded_service().await;
    assert_eq!(service.unread_count(None).await.unwrap(), 4);
    assert_eq!(service.unread_count(Some("acc")).await.unwrap(), 3);

    service.apply(ids[0], LocalMutation::MarkRead).await.unwrap();
    service.apply(ids[0], LocalMutation::Star).await.unwrap();
    service.apply(ids[1], LocalMutation::Archive).await.unwrap();
    service.apply(ids[2], LocalMutation::Delete).await.unwrap();

    assert_eq!(service.unread_count(Some("acc")).await.unwrap(), 1);
    let stats = service.account_stats("acc").await.unwrap();
    assert_eq!(
        stats,
        AccountEmailStats {
            account_uid: "acc".into(),
            total_count: 2,
            unread_count: 1,
            starred_count: 1,
            archived_count: 1,
        }
    );
    let empty = service.account_stats("nobody").await.unwrap();
    assert_eq!(empty.total_count, 0);
}
