use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use native_db::Database;
use serde_json::json;

use crate::modules::account::entity::Account;
use crate::modules::adapter::testing::sample_email;
use crate::modules::common::Addr;
use crate::modules::database::manager::DatabaseManager;
use crate::modules::email::entity::{EmailRecord, UpsertOutcome};
use crate::modules::email::model::Attachment;
use crate::modules::email::service::EmailService;
use crate::modules::error::code::ErrorCode;
use crate::modules::events::broker::memory::MemoryBroker;
use crate::modules::events::bus::EventBus;
use crate::modules::hook::delivery::DeliveryConfig;
use crate::modules::hook::payload::WebhookCreateRequest;
use crate::modules::hook::service::WebhookService;
use crate::modules::rule::engine::{evaluate, test_rule};
use crate::modules::rule::entity::{
    ActionType, ConditionField, ConditionOperator, EmailRule, MatchMode, RuleAction,
    RuleCondition,
};
use crate::modules::rule::payload::{RuleCreateRequest, RuleUpdateRequest};
use crate::modules::rule::service::RuleService;
use crate::utc_now;

fn condition(field: ConditionField, operator: ConditionOperator, value: &str) -> RuleCondition {
    RuleCondition {
        field,
        operator,
        value: value.into(),
    }
}

fn action(action_type: ActionType, value: Option<&str>) -> RuleAction {
    RuleAction {
        action_type,
        value: value.map(str::to_string),
    }
}

fn rule(match_mode: MatchMode, conditions: Vec<RuleCondition>) -> EmailRule {
    EmailRule {
        id: 1,
        name: "r".into(),
        enabled: true,
        match_mode,
        conditions,
        actions: vec![action(ActionType::Star, None)],
        ..Default::default()
    }
}

fn record(subject: &str) -> EmailRecord {
    let mut email = sample_email("p1", subject, 1_000);
    email.from_address = "billing@shop.example".into();
    email.from_name = Some("Shop Billing".into());
    email.to = vec![Addr::parse("Alice <alice@example.com>"), Addr::parse("bob@example.com")];
    EmailRecord::from_email("acct", email)
}

#[test]
fn test_match_mode_all_versus_any() {
    let email = record("Invoice 42");
    let conditions = vec![
        condition(ConditionField::Subject, ConditionOperator::Contains, "invoice"),
        condition(ConditionField::From, ConditionOperator::EndsWith, "@other.example"),
    ];
    assert!(!evaluate(&rule(MatchMode::All, conditions.clone()), &email));
    assert!(evaluate(&rule(MatchMode::Any, conditions), &email));
    assert!(!evaluate(&rule(MatchMode::Any, vec![]), &email));
}

#[test]
fn test_regex_condition() {
    let order = rule(
        MatchMode::All,
        vec![condition(
            ConditionField::Subject,
            ConditionOperator::Regex,
            "ORDER-[0-9]{6}",
        )],
    );
    assert!(test_rule(&order, &record("Your ORDER-123456 shipped")));
    assert!(!test_rule(&order, &record("Your order shipped")));
    // the pattern is applied as given
    assert!(!test_rule(&order, &record("Your order-123456 shipped")));
}

#[test]
fn test_field_and_operator_semantics() {
    let mut email = record("Weekly REPORT");
    let check = |email: &EmailRecord, c: RuleCondition| evaluate(&rule(MatchMode::All, vec![c]), email);

    assert!(check(&email, condition(ConditionField::Subject, ConditionOperator::Equals, "weekly report")));
    assert!(check(&email, condition(ConditionField::Subject, ConditionOperator::StartsWith, "WEEKLY")));
    assert!(check(&email, condition(ConditionField::Subject, ConditionOperator::NotEquals, "daily report")));
    assert!(check(&email, condition(ConditionField::Subject, ConditionOperator::NotContains, "invoice")));
    // display name or address
    assert!(check(&email, condition(ConditionField::From, ConditionOperator::Contains, "shop billing")));
    assert!(check(&email, condition(ConditionField::From, ConditionOperator::Equals, "billing@shop.example")));
    assert!(!check(&email, condition(ConditionField::From, ConditionOperator::NotContains, "shop")));
    assert!(check(&email, condition(ConditionField::To, ConditionOperator::Contains, "bob@example.com")));
    assert!(check(&email, condition(ConditionField::To, ConditionOperator::Contains, "alice")));
    assert!(check(&email, condition(ConditionField::HasAttachment, ConditionOperator::Equals, "false")));

    email.text_body = None;
    email.html_body = Some("<p>Quarterly numbers</p>".into());
    email.has_attachments = true;
    email.attachments = vec![Attachment::new("r.pdf".into(), "application/pdf".into(), 10, None)];
    assert!(check(&email, condition(ConditionField::Body, ConditionOperator::Contains, "quarterly")));
    assert!(check(&email, condition(ConditionField::HasAttachment, ConditionOperator::Equals, "TRUE")));
}

struct Harness {
    database: Arc<Database<'static>>,
    webhooks: Arc<WebhookService>,
    rules: RuleService,
    account: Account,
}

async fn harness() -> Harness {
    let database = DatabaseManager::in_memory().unwrap();
    let bus = Arc::new(EventBus::new(
        Arc::new(MemoryBroker::new()),
        Duration::from_secs(1),
    ));
    let emails = Arc::new(EmailService::new(database.clone(), bus));
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
    let account = Account {
        uid: "acct-rules".into(),
        email: "rules@example.com".into(),
        sync_enabled: true,
        created_at: utc_now!(),
        updated_at: utc_now!(),
        ..Default::default()
    };
    account.save(&database).await.unwrap();
    Harness {
        rules: RuleService::new(database.clone(), emails, webhooks.clone()),
        database,
        webhooks,
        account,
    }
}

async fn stored_email(h: &Harness, subject: &str) -> EmailRecord {
    let outcome =
        EmailRecord::upsert_from_sync(&h.database, &h.account.uid, sample_email("m1", subject, 1_000))
            .await
            .unwrap();
    let UpsertOutcome::Created(id) = outcome else {
        panic!("expected a new email");
    };
    EmailRecord::get(&h.database, id).await.unwrap()
}

fn create_request(account_uid: &str, priority: i32, actions: Vec<RuleAction>) -> RuleCreateRequest {
    RuleCreateRequest {
        name: format!("priority {priority}"),
        account_uid: account_uid.into(),
        priority: Some(priority),
        conditions: vec![condition(
            ConditionField::Subject,
            ConditionOperator::Contains,
            "order",
        )],
        actions,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_stop_processing_halts_lower_priority_rules() {
    let h = harness().await;
    let second = h
        .rules
        .create(create_request(
            &h.account.uid,
            2,
            vec![action(ActionType::AddLabel, Some("second"))],
        ))
        .await
        .unwrap();
    let mut first_request = create_request(
        &h.account.uid,
        1,
        vec![
            action(ActionType::AddLabel, Some("first")),
            action(ActionType::MarkRead, None),
        ],
    );
    first_request.stop_processing = Some(true);
    let first = h.rules.create(first_request).await.unwrap();

    let listed: Vec<u64> = h
        .rules
        .list_by_account(&h.account.uid)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, vec![first.id, second.id]);

    let email = stored_email(&h, "Your order shipped").await;
    let matched = h.rules.apply_rules(&email).await.unwrap();
    assert_eq!(matched, vec![first.id]);

    let after = EmailRecord::get(&h.database, email.id).await.unwrap();
    assert_eq!(after.local_labels, vec!["first".to_string()]);
    assert!(after.is_read);

    let first = h.rules.get_by_id(first.id).await.unwrap();
    assert_eq!(first.matched_count, 1);
    assert!(first.last_matched_at.is_some());
    assert_eq!(h.rules.get_by_id(second.id).await.unwrap().matched_count, 0);

    // without the stop flag both rules run, in priority order
    h.rules
        .update(
            first.id,
            RuleUpdateRequest {
                stop_processing: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let matched = h.rules.apply_rules_by_id(email.id).await.unwrap();
    assert_eq!(matched, vec![first.id, second.id]);
    let after = EmailRecord::get(&h.database, email.id).await.unwrap();
    assert_eq!(after.local_labels, vec!["first".to_string(), "second".to_string()]);
}

#[tokio::test]
async fn test_failing_action_does_not_stop_the_rest() {
    let h = harness().await;
    let created = h
        .rules
        .create(create_request(
            &h.account.uid,
            0,
            vec![
                action(ActionType::Webhook, Some("999")),
                action(ActionType::Star, None),
                action(ActionType::MoveFolder, Some("Orders")),
            ],
        ))
        .await
        .unwrap();
    let email = stored_email(&h, "Order confirmation").await;
    assert_eq!(h.rules.apply_rules(&email).await.unwrap(), vec![created.id]);

    let after = EmailRecord::get(&h.database, email.id).await.unwrap();
    assert!(after.is_starred);
    assert_eq!(after.local_folder.as_deref(), Some("Orders"));
    assert_eq!(h.rules.get_by_id(created.id).await.unwrap().matched_count, 1);
}

#[tokio::test]
async fn test_disabled_rules_and_test_rule_have_no_effect() {
    let h = harness().await;
    let mut request = create_request(&h.account.uid, 0, vec![action(ActionType::Archive, None)]);
    request.enabled = Some(false);
    let disabled = h.rules.create(request).await.unwrap();
    let email = stored_email(&h, "order 1").await;

    assert!(h.rules.apply_rules(&email).await.unwrap().is_empty());
    let result = h.rules.test_rule(disabled.id, email.id).await.unwrap();
    assert!(result.matched);

    let after = EmailRecord::get(&h.database, email.id).await.unwrap();
    assert!(!after.is_archived);
    assert_eq!(h.rules.get_by_id(disabled.id).await.unwrap().matched_count, 0);
}

#[tokio::test]
async fn test_rule_validation_and_removal() {
    let h = harness().await;
    let err = h
        .rules
        .create(create_request("missing", 0, vec![action(ActionType::Star, None)]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceNotFound);

    let mut bad = create_request(&h.account.uid, 0, vec![action(ActionType::Star, None)]);
    bad.conditions = vec![condition(ConditionField::Subject, ConditionOperator::Regex, "(")];
    assert_eq!(
        h.rules.create(bad).await.unwrap_err().code(),
        ErrorCode::InvalidParameter
    );
    let missing_value = create_request(&h.account.uid, 0, vec![action(ActionType::AddLabel, None)]);
    assert!(h.rules.create(missing_value).await.is_err());

    let created = h
        .rules
        .create(create_request(&h.account.uid, 0, vec![action(ActionType::Star, None)]))
        .await
        .unwrap();
    assert_eq!(created.match_mode, MatchMode::All);
    assert!(created.enabled);

    let removed = EmailRule::delete_by_account(&h.database, &h.account.uid)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(
        h.rules.delete(created.id).await.unwrap_err().code(),
        ErrorCode::ResourceNotFound
    );
}

#[tokio::test]
async fn test_webhook_action_delivers_the_email() {
    let mut server = mockito::Server::new_async().await;
    let h = harness().await;
    let webhook = h
        .webhooks
        .create(WebhookCreateRequest {
            name: "orders".into(),
            url: format!("{}/orders", server.url()),
            events: vec!["sync.completed".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    let email = stored_email(&h, "Your ORDER-123456 shipped").await;
    let mock = server
        .mock("POST", "/orders")
        .match_body(Matcher::PartialJson(json!({
            "webhook_id": webhook.id,
            "event": {"type": "email.received", "data": {"email_id": email.id}}
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let mut request = create_request(
        &h.account.uid,
        0,
        vec![action(ActionType::Webhook, Some(&webhook.id.to_string()))],
    );
    request.conditions = vec![condition(
        ConditionField::Subject,
        ConditionOperator::Regex,
        "ORDER-[0-9]{6}",
    )];
    h.rules.create(request).await.unwrap();

    h.rules.apply_rules(&email).await.unwrap();
    h.webhooks.wait_idle().await;
    mock.assert_async().await;
    assert_eq!(h.webhooks.get(webhook.id).await.unwrap().success_calls, 1);
}

#[tokio::test]
async fn test_toggle_flips_enabled() {
    let h = harness().await;
    let rule = h
        .rules
        .create(create_request(&h.account.uid, 0, vec![action(ActionType::Star, None)]))
        .await
        .unwrap();
    assert!(rule.enabled);

    let off = h.rules.toggle(rule.id).await.unwrap();
    assert!(!off.enabled);
    let on = h.rules.toggle(rule.id).await.unwrap();
    assert!(on.enabled);
    assert_eq!(
        h.rules.toggle(u64::MAX).await.unwrap_err().code(),
        ErrorCode::ResourceNotFound
    );
}

#[tokio::test]
async fn test_apply_rules_to_account_skips_deleted_emails() {
    let h = harness().await;
    let rule = h
        .rules
        .create(create_request(
            &h.account.uid,
            0,
            vec![action(ActionType::AddLabel, Some("orders"))],
        ))
        .await
        .unwrap();
    let mut ids = Vec::new();
    for (provider_id, subject) in [("a", "Order 1"), ("b", "Hello"), ("c", "Order 2")] {
        let outcome = EmailRecord::upsert_from_sync(
            &h.database,
            &h.account.uid,
            sample_email(provider_id, subject, 1_000),
        )
        .await
        .unwrap();
        let UpsertOutcome::Created(id) = outcome else {
            panic!("expected a new email");
        };
        ids.push(id);
    }
    EmailRecord::modify_local(&h.database, ids[2], |r| r.is_deleted = true)
        .await
        .unwrap();

    let report = h.rules.apply_rules_to_account(&h.account.uid).await.unwrap();
    assert_eq!(report.emails_processed, 2);
    assert_eq!(report.emails_matched, 1);
    assert_eq!(report.rule_matches, 1);
    assert_eq!(report.emails_failed, 0);

    let labelled = EmailRecord::get(&h.database, ids[0]).await.unwrap();
    assert_eq!(labelled.local_labels, vec!["orders".to_string()]);
    let deleted = EmailRecord::get(&h.database, ids[2]).await.unwrap();
    assert!(deleted.local_labels.is_empty());
    assert_eq!(h.rules.get_by_id(rule.id).await.unwrap().matched_count, 1);

    let err = h.rules.apply_rules_to_account("missing").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResourceNotFound);
}
