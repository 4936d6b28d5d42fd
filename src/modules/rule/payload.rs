use poem_openapi::Object;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::rule::entity::{
    ConditionField, ConditionOperator, MatchMode, RuleAction, RuleCondition,
};
use crate::raise_error;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct RuleCreateRequest {
    #[oai(validator(min_length = 1, max_length = 128))]
    pub name: String,
    pub account_uid: String,
    pub description: Option<String>,
    /// Defaults to true
    pub enabled: Option<bool>,
    /// Defaults to 0
    pub priority: Option<i32>,
    pub match_mode: Option<MatchMode>,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    pub stop_processing: Option<bool>,
}

impl RuleCreateRequest {
    pub fn validate(&self) -> MailFusionResult<()> {
        if self.name.trim().is_empty() {
            return Err(raise_error!(
                "Rule name must not be empty".into(),
                ErrorCode::InvalidParameter
            ));
        }
        validate_conditions(&self.conditions)?;
        validate_actions(&self.actions)
    }
}

/// Absent fields are left unchanged.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct RuleUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub match_mode: Option<MatchMode>,
    pub conditions: Option<Vec<RuleCondition>>,
    pub actions: Option<Vec<RuleAction>>,
    pub stop_processing: Option<bool>,
}

impl RuleUpdateRequest {
    pub fn validate(&self) -> MailFusionResult<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(raise_error!(
                    "Rule name must not be empty".into(),
                    ErrorCode::InvalidParameter
                ));
            }
        }
        if let Some(conditions) = &self.conditions {
            validate_conditions(conditions)?;
        }
        if let Some(actions) = &self.actions {
            validate_actions(actions)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct RuleTestRequest {
    pub email_id: u64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct RuleTestResult {
    pub rule_id: u64,
    pub email_id: u64,
    pub matched: bool,
}

/// Outcome of re-running an account's rules over its stored emails.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct ApplyRulesReport {
    pub account_uid: String,
    /// Live emails the rules were evaluated against.
    pub emails_processed: u64,
    /// Emails at least one rule matched.
    pub emails_matched: u64,
    /// Matches summed over every rule.
    pub rule_matches: u64,
    /// Emails whose rule run failed before any action ran.
    pub emails_failed: u64,
}

fn validate_conditions(conditions: &[RuleCondition]) -> MailFusionResult<()> {
    if conditions.is_empty() {
        return Err(raise_error!(
            "A rule needs at least one condition".into(),
            ErrorCode::InvalidParameter
        ));
    }
    for condition in conditions {
        if condition.operator == ConditionOperator::Regex {
            Regex::new(&condition.value).map_err(|e| {
                raise_error!(
                    format!("Invalid regex '{}': {}", condition.value, e),
                    ErrorCode::InvalidParameter
                )
            })?;
        }
        if condition.field == ConditionField::HasAttachment
            && condition.operator != ConditionOperator::Regex
            && !matches!(
                condition.value.trim().to_ascii_lowercase().as_str(),
                "true" | "false"
            )
        {
            return Err(raise_error!(
                format!(
                    "has_attachment compares with 'true' or 'false', got '{}'",
                    condition.value
                ),
                ErrorCode::InvalidParameter
            ));
        }
    }
    Ok(())
}

fn validate_actions(actions: &[RuleAction]) -> MailFusionResult<()> {
    if actions.is_empty() {
        return Err(raise_error!(
            "A rule needs at least one action".into(),
            ErrorCode::InvalidParameter
        ));
    }
    for action in actions {
        let value = action.value.as_deref().map(str::trim).unwrap_or_default();
        if action.action_type.requires_value() && value.is_empty() {
            return Err(raise_error!(
                format!("Action {:?} requires a value", action.action_type),
                ErrorCode::InvalidParameter
            ));
        }
        if action.action_type == crate::modules::rule::entity::ActionType::Webhook
            && value.parse::<u64>().is_err()
        {
            return Err(raise_error!(
                format!("Webhook action value must be a webhook id, got '{value}'"),
                ErrorCode::InvalidParameter
            ));
        }
    }
    Ok(())
}
