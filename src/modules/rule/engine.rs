use regex::Regex;
use tracing::warn;

use crate::modules::email::entity::EmailRecord;
use crate::modules::rule::entity::{
    ConditionField, ConditionOperator, EmailRule, MatchMode, RuleCondition,
};

/// Pure evaluation of a rule against an email. No actions, no statistics.
pub fn test_rule(rule: &EmailRule, email: &EmailRecord) -> bool {
    evaluate(rule, email)
}

pub fn evaluate(rule: &EmailRule, email: &EmailRecord) -> bool {
    if rule.conditions.is_empty() {
        return false;
    }
    match rule.match_mode {
        MatchMode::All => rule.conditions.iter().all(|c| condition_matches(c, email)),
        MatchMode::Any => rule.conditions.iter().any(|c| condition_matches(c, email)),
    }
}

pub fn condition_matches(condition: &RuleCondition, email: &EmailRecord) -> bool {
    match condition.field {
        ConditionField::From => {
            // either the address or the display name may satisfy the condition
            let name = email.from_name.as_deref().unwrap_or_default();
            match condition.operator {
                ConditionOperator::NotContains | ConditionOperator::NotEquals => {
                    compare(condition, &email.from_address) && compare(condition, name)
                }
                _ => compare(condition, &email.from_address) || compare(condition, name),
            }
        }
        ConditionField::To => compare(condition, &recipients_joined(email)),
        ConditionField::Subject => compare(condition, &email.subject),
        ConditionField::Body => {
            let body = email
                .text_body
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .or(email.html_body.as_deref())
                .unwrap_or_default();
            compare(condition, body)
        }
        ConditionField::HasAttachment => {
            let flag = if email.has_attachments { "true" } else { "false" };
            compare(condition, flag)
        }
    }
}

fn compare(condition: &RuleCondition, actual: &str) -> bool {
    let expected = condition.value.trim().to_lowercase();
    let lowered = actual.to_lowercase();
    match condition.operator {
        ConditionOperator::Contains => lowered.contains(&expected),
        ConditionOperator::NotContains => !lowered.contains(&expected),
        ConditionOperator::Equals => lowered.trim() == expected,
        ConditionOperator::NotEquals => lowered.trim() != expected,
        ConditionOperator::StartsWith => lowered.starts_with(&expected),
        ConditionOperator::EndsWith => lowered.ends_with(&expected),
        ConditionOperator::Regex => match Regex::new(&condition.value) {
            Ok(re) => re.is_match(actual),
            Err(e) => {
                warn!("Skipping condition with invalid regex '{}': {}", condition.value, e);
                false
            }
        },
    }
}

fn recipients_joined(email: &EmailRecord) -> String {
    email
        .to
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
