// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;

use poem_openapi::Enum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{uid, utc_now};

pub mod broker;
pub mod bus;
pub mod service;
#[cfg(test)]
mod tests;

pub const TOPIC_PREFIX: &str = "mailfusion.events";

pub type EventData = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Enum)]
pub enum EventType {
    #[serde(rename = "email.received")]
    #[oai(rename = "email.received")]
    EmailReceived,
    #[serde(rename = "email.read")]
    #[oai(rename = "email.read")]
    EmailRead,
    #[serde(rename = "email.unread")]
    #[oai(rename = "email.unread")]
    EmailUnread,
    #[serde(rename = "email.starred")]
    #[oai(rename = "email.starred")]
    EmailStarred,
    #[serde(rename = "email.archived")]
    #[oai(rename = "email.archived")]
    EmailArchived,
    #[serde(rename = "email.deleted")]
    #[oai(rename = "email.deleted")]
    EmailDeleted,
    #[serde(rename = "account.added")]
    #[oai(rename = "account.added")]
    AccountAdded,
    #[serde(rename = "account.updated")]
    #[oai(rename = "account.updated")]
    AccountUpdated,
    #[serde(rename = "account.deleted")]
    #[oai(rename = "account.deleted")]
    AccountDeleted,
    #[serde(rename = "account.synced")]
    #[oai(rename = "account.synced")]
    AccountSynced,
    #[serde(rename = "sync.started")]
    #[oai(rename = "sync.started")]
    SyncStarted,
    #[serde(rename = "sync.completed")]
    #[oai(rename = "sync.completed")]
    SyncCompleted,
    #[serde(rename = "sync.failed")]
    #[oai(rename = "sync.failed")]
    SyncFailed,
    /// Only produced by webhook tests.
    #[serde(rename = "test")]
    #[oai(rename = "test")]
    Test,
}

impl EventType {
    /// Every type a webhook may subscribe to. `test` is sent directly and never routed.
    pub const ROUTABLE: [EventType; 13] = [
        EventType::EmailReceived,
        EventType::EmailRead,
        EventType::EmailUnread,
        EventType::EmailStarred,
        EventType::EmailArchived,
        EventType::EmailDeleted,
        EventType::AccountAdded,
        EventType::AccountUpdated,
        EventType::AccountDeleted,
        EventType::AccountSynced,
        EventType::SyncStarted,
        EventType::SyncCompleted,
        EventType::SyncFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EmailReceived => "email.received",
            EventType::EmailRead => "email.read",
            EventType::EmailUnread => "email.unread",
            EventType::EmailStarred => "email.starred",
            EventType::EmailArchived => "email.archived",
            EventType::EmailDeleted => "email.deleted",
            EventType::AccountAdded => "account.added",
            EventType::AccountUpdated => "account.updated",
            EventType::AccountDeleted => "account.deleted",
            EventType::AccountSynced => "account.synced",
            EventType::SyncStarted => "sync.started",
            EventType::SyncCompleted => "sync.completed",
            EventType::SyncFailed => "sync.failed",
            EventType::Test => "test",
        }
    }

    pub fn parse(value: &str) -> Option<EventType> {
        if value == EventType::Test.as_str() {
            return Some(EventType::Test);
        }
        Self::ROUTABLE.into_iter().find(|t| t.as_str() == value)
    }

    /// Broker topic, e.g. `mailfusion.events.email.received`.
    pub fn topic(&self) -> String {
        format!("{}.{}", TOPIC_PREFIX, self.as_str())
    }

    pub fn from_topic(topic: &str) -> Option<EventType> {
        topic
            .strip_prefix(TOPIC_PREFIX)
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(EventType::parse)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral notification carried by the bus. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: i64,
    pub data: EventData,
    pub source: String,
}

impl Event {
    pub fn new(event_type: EventType, data: EventData, source: &str) -> Self {
        Self {
            id: uid!(),
            event_type,
            timestamp: utc_now!(),
            data,
            source: source.to_string(),
        }
    }

    pub fn email_received(email_id: u64, account_uid: &str, subject: &str) -> Self {
        let mut data = email_data(email_id, account_uid);
        data.insert("subject".into(), Value::from(subject));
        Self::new(EventType::EmailReceived, data, "sync_engine")
    }

    /// `email.read`, `email.unread`, `email.starred`, `email.archived`, `email.deleted`.
    pub fn email_state(event_type: EventType, email_id: u64, account_uid: &str) -> Self {
        Self::new(event_type, email_data(email_id, account_uid), "email_service")
    }

    pub fn account(event_type: EventType, account_uid: &str, email: &str) -> Self {
        let mut data = EventData::new();
        data.insert("account_uid".into(), Value::from(account_uid));
        data.insert("email".into(), Value::from(email));
        Self::new(event_type, data, "account_service")
    }

    pub fn email_id(&self) -> Option<u64> {
        self.data.get("email_id").and_then(Value::as_u64)
    }

    pub fn account_uid(&self) -> Option<&str> {
        self.data.get("account_uid").and_then(Value::as_str)
    }
}

fn email_data(email_id: u64, account_uid: &str) -> EventData {
    let mut data = EventData::new();
    data.insert("email_id".into(), Value::from(email_id));
    data.insert("account_uid".into(), Value::from(account_uid));
    data
}
