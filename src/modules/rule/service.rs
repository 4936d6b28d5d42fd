// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use native_db::Database;
use tracing::{debug, info, warn};

use crate::modules::account::entity::Account;
use crate::modules::email::entity::EmailRecord;
use crate::modules::email::service::{EmailService, LocalMutation};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::events::Event;
use crate::modules::hook::service::WebhookService;
use crate::modules::rule::engine;
use crate::modules::rule::entity::{ActionType, EmailRule, RuleAction};
use crate::modules::rule::payload::{
    ApplyRulesReport, RuleCreateRequest, RuleTestResult, RuleUpdateRequest,
};
use crate::{id, raise_error, utc_now};

/// Upper bound of emails one account-wide rule run looks at, newest first.
pub const APPLY_TO_ACCOUNT_CAP: usize = 10_000;

pub struct RuleService {
    database: Arc<Database<'static>>,
    emails: Arc<EmailService>,
    webhooks: Arc<WebhookService>,
}

impl RuleService {
    pub fn new(
        database: Arc<Database<'static>>,
        emails: Arc<EmailService>,
        webhooks: Arc<WebhookService>,
    ) -> Self {
        Self {
            database,
            emails,
            webhooks,
        }
    }

    pub async fn create(&self, request: RuleCreateRequest) -> MailFusionResult<EmailRule> {
        request.validate()?;
        Account::get(&self.database, &request.account_uid).await?;
        let now = utc_now!();
        let rule = EmailRule {
            id: id!(64),
            name: request.name,
            account_uid: request.account_uid,
            description: request.description,
            enabled: request.enabled.unwrap_or(true),
            priority: request.priority.unwrap_or_default(),
            match_mode: request.match_mode.unwrap_or_default(),
            conditions: request.conditions,
            actions: request.actions,
            stop_processing: request.stop_processing.unwrap_or_default(),
            matched_count: 0,
            last_matched_at: None,
            created_at: now,
            updated_at: now,
        };
        rule.save(&self.database).await?;
        info!(rule_id = rule.id, account_uid = %rule.account_uid, "Rule '{}' created", rule.name);
        Ok(rule)
    }

    pub async fn update(&self, id: u64, request: RuleUpdateRequest) -> MailFusionResult<EmailRule> {
        request.validate()?;
        EmailRule::replace(&self.database, id, move |rule| {
            if let Some(name) = request.name {
                rule.name = name;
            }
            if request.description.is_some() {
                rule.description = request.description;
            }
            if let Some(enabled) = request.enabled {
                rule.enabled = enabled;
            }
            if let Some(priority) = request.priority {
                rule.priority = priority;
            }
            if let Some(match_mode) = request.match_mode {
                rule.match_mode = match_mode;
            }
            if let Some(conditions) = request.conditions {
                rule.conditions = conditions;
            }
            if let Some(actions) = request.actions {
                rule.actions = actions;
            }
            if let Some(stop_processing) = request.stop_processing {
                rule.stop_processing = stop_processing;
            }
        })
        .await
    }

    pub async fn delete(&self, id: u64) -> MailFusionResult<()> {
        EmailRule::delete(&self.database, id).await
    }

    /// Flips `enabled` in one write transaction.
    pub async fn toggle(&self, id: u64) -> MailFusionResult<EmailRule> {
        let rule = EmailRule::replace(&self.database, id, |rule| rule.enabled = !rule.enabled).await?;
        info!(rule_id = id, enabled = rule.enabled, "Rule toggled");
        Ok(rule)
    }

    pub async fn get_by_id(&self, id: u64) -> MailFusionResult<EmailRule> {
        EmailRule::get(&self.database, id).await
    }

    /// Sorted by priority.
    pub async fn list_by_account(&self, account_uid: &str) -> MailFusionResult<Vec<EmailRule>> {
        EmailRule::list_by_account(&self.database, account_uid).await
    }

    /// Evaluates a stored rule against a stored email without side effects.
    pub async fn test_rule(&self, rule_id: u64, email_id: u64) -> MailFusionResult<RuleTestResult> {
        let rule = EmailRule::get(&self.database, rule_id).await?;
        let email = EmailRecord::get(&self.database, email_id).await?;
        Ok(RuleTestResult {
            rule_id,
            email_id,
            matched: engine::test_rule(&rule, &email),
        })
    }

    /// Runs the account's enabled rules in priority order against one email.
    /// Returns the ids of the rules that matched.
    pub async fn apply_rules(&self, email: &EmailRecord) -> MailFusionResult<Vec<u64>> {
        let rules = EmailRule::list_by_account(&self.database, &email.account_uid).await?;
        let mut matched = Vec::new();
        for rule in rules.into_iter().filter(|r| r.enabled) {
            if !engine::evaluate(&rule, email) {
                continue;
            }
            debug!(rule_id = rule.id, email_id = email.id, "Rule matched");
            for action in &rule.actions {
                if let Err(e) = self.execute(action, email).await {
                    warn!(
                        rule_id = rule.id,
                        email_id = email.id,
                        "Rule action {:?} failed: {}",
                        action.action_type,
                        e
                    );
                }
            }
            if let Err(e) = EmailRule::record_match(&self.database, rule.id).await {
                warn!(rule_id = rule.id, "Failed to update rule statistics: {}", e);
            }
            matched.push(rule.id);
            if rule.stop_processing {
                break;
            }
        }
        Ok(matched)
    }

    /// Loads the email and applies the rules; used by the `email.received` handler.
    pub async fn apply_rules_by_id(&self, email_id: u64) -> MailFusionResult<Vec<u64>> {
        let email = EmailRecord::get(&self.database, email_id).await?;
        self.apply_rules(&email).await
    }

    /// Runs the account's rules over its live emails, newest first, up to
    /// [`APPLY_TO_ACCOUNT_CAP`]. A failure on one email is logged and counted.
    pub async fn apply_rules_to_account(
        &self,
        account_uid: &str,
    ) -> MailFusionResult<ApplyRulesReport> {
        Account::get(&self.database, account_uid).await?;
        let mut emails: Vec<EmailRecord> = EmailRecord::list_by_account(&self.database, account_uid)
            .await?
            .into_iter()
            .filter(|e| !e.is_deleted)
            .collect();
        emails.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        emails.truncate(APPLY_TO_ACCOUNT_CAP);

        let mut report = ApplyRulesReport {
            account_uid: account_uid.to_string(),
            ..Default::default()
        };
        for email in &emails {
            report.emails_processed += 1;
            match self.apply_rules(email).await {
                Ok(matched) if matched.is_empty() => {}
                Ok(matched) => {
                    report.emails_matched += 1;
                    report.rule_matches += matched.len() as u64;
                }
                Err(e) => {
                    report.emails_failed += 1;
                    warn!(email_id = email.id, "Failed to apply rules: {}", e);
                }
            }
        }
        info!(
            account_uid = %account_uid,
            "Applied rules to {} emails, {} matched",
            report.emails_processed, report.emails_matched
        );
        Ok(report)
    }

    async fn execute(&self, action: &RuleAction, email: &EmailRecord) -> MailFusionResult<()> {
        let value = action.value.as_deref().map(str::trim).unwrap_or_default();
        let mutation = match action.action_type {
            ActionType::MarkRead => LocalMutation::MarkRead,
            ActionType::MarkUnread => LocalMutation::MarkUnread,
            ActionType::Star => LocalMutation::Star,
            ActionType::Unstar => LocalMutation::Unstar,
            ActionType::Archive => LocalMutation::Archive,
            ActionType::Delete => LocalMutation::Delete,
            ActionType::MoveFolder => LocalMutation::MoveFolder(required(value)?),
            ActionType::AddLabel => LocalMutation::AddLabel(required(value)?),
            ActionType::RemoveLabel => LocalMutation::RemoveLabel(required(value)?),
            ActionType::Webhook => {
                let webhook_id = value.parse::<u64>().map_err(|_| {
                    raise_error!(
                        format!("Webhook action value '{value}' is not a webhook id"),
                        ErrorCode::InvalidParameter
                    )
                })?;
                let event = Event::email_received(email.id, &email.account_uid, &email.subject);
                return self.webhooks.deliver_to(webhook_id, &event).await;
            }
        };
        self.emails.apply(email.id, mutation).await.map(|_| ())
    }
}

fn required(value: &str) -> MailFusionResult<String> {
    if value.is_empty() {
        return Err(raise_error!(
            "Action requires a value".into(),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(value.to_string())
}
