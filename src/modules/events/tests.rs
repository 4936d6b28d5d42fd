use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use serde_json::json;
use tokio::sync::mpsc;

use crate::modules::account::entity::Account;
use crate::modules::adapter::testing::sample_email;
use crate::modules::database::manager::DatabaseManager;
use crate::modules::email::entity::{EmailRecord, UpsertOutcome};
use crate::modules::email::service::EmailService;
use crate::modules::error::code::ErrorCode;
use crate::modules::events::broker::memory::MemoryBroker;
use crate::modules::events::bus::{handler, EventBus};
use crate::modules::events::service::EventService;
use crate::modules::events::{Event, EventData, EventType};
use crate::modules::hook::delivery::DeliveryConfig;
use crate::modules::hook::payload::WebhookCreateRequest;
use crate::modules::hook::service::WebhookService;
use crate::modules::rule::entity::{
    ActionType, ConditionField, ConditionOperator, RuleAction, RuleCondition,
};
use crate::modules::rule::payload::RuleCreateRequest;
use crate::modules::rule::service::RuleService;
use crate::modules::error::MailFusionResult;
use crate::{raise_error, utc_now};

fn bus(timeout: Duration) -> Arc<EventBus> {
    Arc::new(EventBus::new(Arc::new(MemoryBroker::new()), timeout))
}

fn forward(tx: mpsc::UnboundedSender<Event>) -> crate::modules::events::bus::EventHandler {
    handler(move |event| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(event);
            Ok(())
        }
    })
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event not delivered in time")
        .expect("channel closed")
}

#[test]
fn test_topic_mapping() {
    assert_eq!(
        EventType::EmailReceived.topic(),
        "mailfusion.events.email.received"
    );
    for event_type in EventType::ROUTABLE {
        assert_eq!(EventType::from_topic(&event_type.topic()), Some(event_type));
    }
    assert_eq!(EventType::from_topic("other.email.received"), None);
    assert_eq!(EventType::parse("test"), Some(EventType::Test));
    assert!(!EventType::ROUTABLE.contains(&EventType::Test));
}

#[tokio::test]
async fn test_publish_reaches_every_handler_of_the_type() {
    let bus = bus(Duration::from_secs(1));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (other_tx, mut other_rx) = mpsc::unbounded_channel();
    bus.subscribe(EventType::AccountAdded, forward(tx.clone()));
    bus.subscribe(EventType::AccountAdded, forward(tx));
    bus.subscribe(EventType::AccountDeleted, forward(other_tx));
    assert_eq!(bus.handler_count(EventType::AccountAdded), 2);

    bus.start().await.unwrap();
    assert!(bus.is_running().await);
    assert_eq!(bus.start().await.unwrap_err().code(), ErrorCode::MethodNotAllowed);

    let mut event = Event::account(EventType::AccountAdded, "uid-1", "a@example.com");
    event.id = String::new();
    event.timestamp = 0;
    bus.publish(event).await.unwrap();

    let first = next(&mut rx).await;
    let second = next(&mut rx).await;
    assert_eq!(first.account_uid(), Some("uid-1"));
    assert!(!first.id.is_empty());
    assert!(first.timestamp > 0);
    assert_eq!(first.id, second.id);
    assert!(other_rx.try_recv().is_err());

    bus.stop().await;
    assert!(!bus.is_running().await);
    bus.stop().await;
}

#[tokio::test]
async fn test_late_subscription_and_unsubscribe() {
    let bus = bus(Duration::from_secs(1));
    bus.start().await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    bus.subscribe(EventType::SyncFailed, forward(tx));
    // give the loop a moment to resubscribe with the new topic
    tokio::time::sleep(Duration::from_millis(100)).await;
    bus.publish(Event::new(EventType::SyncFailed, EventData::new(), "test"))
        .await
        .unwrap();
    assert_eq!(next(&mut rx).await.event_type, EventType::SyncFailed);

    bus.unsubscribe(EventType::SyncFailed);
    assert_eq!(bus.handler_count(EventType::SyncFailed), 0);
    bus.stop().await;
}

#[tokio::test]
async fn test_failing_and_slow_handlers_are_isolated() {
    let bus = bus(Duration::from_millis(50));
    let (tx, mut rx) = mpsc::unbounded_channel();
    bus.subscribe(
        EventType::SyncStarted,
        handler(|_event| async move {
            Err::<(), _>(raise_error!("boom".into(), ErrorCode::InternalError))
        }),
    );
    bus.subscribe(
        EventType::SyncStarted,
        handler(|_event| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            MailFusionResult::Ok(())
        }),
    );
    bus.subscribe(EventType::SyncStarted, forward(tx));
    bus.start().await.unwrap();

    for _ in 0..2 {
        bus.publish(Event::new(EventType::SyncStarted, EventData::new(), "test"))
            .await
            .unwrap();
    }
    next(&mut rx).await;
    next(&mut rx).await;
    bus.stop().await;
}

#[tokio::test]
async fn test_stop_waits_for_running_handlers() {
    let bus = bus(Duration::from_secs(5));
    let done = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::unbounded_channel();
    {
        let done = done.clone();
        bus.subscribe(
            EventType::AccountUpdated,
            handler(move |event| {
                let done = done.clone();
                let tx = tx.clone();
                async move {
                    let _ = tx.send(event);
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    done.store(true, Ordering::SeqCst);
                    MailFusionResult::Ok(())
                }
            }),
        );
    }
    bus.start().await.unwrap();
    bus.publish(Event::account(EventType::AccountUpdated, "uid-1", "a@example.com"))
        .await
        .unwrap();
    next(&mut rx).await;

    bus.stop().await;
    assert!(done.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_event_service_runs_rules_and_webhooks() {
    let database = DatabaseManager::in_memory().unwrap();
    let bus = bus(Duration::from_secs(5));
    let emails = Arc::new(EmailService::new(database.clone(), bus.clone()));
    let webhooks = Arc::new(
        WebhookService::new(
            database.clone(),
            DeliveryConfig {
                timeout: Duration::from_secs(5),
                retry_unit: Duration::from_millis(1),
            },
        )
        .unwrap(),
    );
    let rules = Arc::new(RuleService::new(database.clone(), emails, webhooks.clone()));
    let service = EventService::new(bus.clone(), rules.clone(), webhooks.clone());

    let account = Account {
        uid: "acct-events".into(),
        email: "events@example.com".into(),
        created_at: utc_now!(),
        updated_at: utc_now!(),
        ..Default::default()
    };
    account.save(&database).await.unwrap();
    rules
        .create(RuleCreateRequest {
            name: "star orders".into(),
            account_uid: account.uid.clone(),
            conditions: vec![RuleCondition {
                field: ConditionField::Subject,
                operator: ConditionOperator::Contains,
                value: "order".into(),
            }],
            actions: vec![RuleAction {
                action_type: ActionType::Star,
                value: None,
            }],
            ..Default::default()
        })
        .await
        .unwrap();

    let mut server = mockito::Server::new_async().await;
    let received_hook = server
        .mock("POST", "/all")
        .match_body(Matcher::PartialJson(json!({"event": {"type": "email.received"}})))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let starred_hook = server
        .mock("POST", "/all")
        .match_body(Matcher::PartialJson(json!({"event": {"type": "email.starred"}})))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    webhooks
        .create(WebhookCreateRequest {
            name: "all".into(),
            url: format!("{}/all", server.url()),
            events: vec!["email.received".into(), "email.starred".into()],
            ..Default::default()
        })
        .await
        .unwrap();

    service.start().await.unwrap();
    let outcome = EmailRecord::upsert_from_sync(
        &database,
        &account.uid,
        sample_email("m-1", "Your order shipped", 1_000),
    )
    .await
    .unwrap();
    let UpsertOutcome::Created(id) = outcome else {
        panic!("expected a new email");
    };
    service
        .publish_event(Event::email_received(id, &account.uid, "Your order shipped"))
        .await
        .unwrap();

    let mut starred = false;
    for _ in 0..100 {
        if EmailRecord::get(&database, id).await.unwrap().is_starred {
            starred = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(starred, "rule action was not applied");

    // email.starred travels through the bus before it reaches the webhook
    for _ in 0..100 {
        let hook = webhooks.list().await.unwrap().remove(0);
        if hook.total_calls >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    webhooks.wait_idle().await;
    received_hook.assert_async().await;
    starred_hook.assert_async().await;

    service.stop().await;
    assert!(!service.bus().is_running().await);
    // restart does not register the handlers twice
    service.start().await.unwrap();
    assert_eq!(service.bus().handler_count(EventType::EmailReceived), 2);
    service.stop().await;
}
