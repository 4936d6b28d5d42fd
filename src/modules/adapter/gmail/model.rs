// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::modules::adapter::mime::parse_address_list;
use crate::modules::common::Addr;
use crate::modules::email::model::{Attachment, Email};
use crate::modules::utils::base64_url_decode;

pub const UNREAD_LABEL: &str = "UNREAD";
pub const INBOX_LABEL: &str = "INBOX";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageIndex {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageIndex>,
    #[serde(rename = "nextPageToken")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    #[serde(rename = "resultSizeEstimate")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_size_estimate: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Profile {
    #[serde(rename = "emailAddress")]
    pub email_address: String,
    #[serde(rename = "messagesTotal", default)]
    pub messages_total: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartBody {
    Attachment {
        #[serde(rename = "attachmentId")]
        attachment_id: String,
        size: u64,
    },
    Body {
        data: String,
        size: u64,
    },
    Empty {
        #[serde(default)]
        size: u64,
    },
}

impl Default for PartBody {
    fn default() -> Self {
        PartBody::Empty { size: 0 }
    }
}

impl PartBody {
    fn size(&self) -> u64 {
        match self {
            PartBody::Attachment { size, .. }
            | PartBody::Body { size, .. }
            | PartBody::Empty { size } => *size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessagePart {
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub filename: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(rename = "partId", default)]
    pub part_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// `users.messages.get` with `format=full`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FullMessage {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: String,
    #[serde(rename = "labelIds", default)]
    pub label_ids: Vec<String>,
    #[serde(rename = "internalDate", default)]
    pub internal_date: String,
    #[serde(rename = "sizeEstimate", default)]
    pub size_estimate: u64,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub payload: MessagePart,
}

#[derive(Default)]
struct WalkState {
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
}

fn walk_part(part: &MessagePart, state: &mut WalkState) {
    if !part.filename.is_empty() {
        state.attachments.push(Attachment::new(
            part.filename.clone(),
            part.mime_type.clone(),
            part.body.size(),
            part.header("Content-ID").map(String::from),
        ));
    } else if let PartBody::Body { data, .. } = &part.body {
        let slot = match part.mime_type.as_str() {
            "text/plain" => Some(&mut state.text),
            "text/html" => Some(&mut state.html),
            _ => None,
        };
        if let Some(slot) = slot.filter(|slot| slot.is_none()) {
            match base64_url_decode(data) {
                Ok(bytes) => *slot = Some(String::from_utf8_lossy(&bytes).into_owned()),
                Err(e) => tracing::warn!("Skipping undecodable Gmail part {}: {}", part.part_id, e),
            }
        }
    }

    for child in &part.parts {
        walk_part(child, state);
    }
}

fn clean_message_id(value: &str) -> String {
    value.trim().trim_matches(|c| c == '<' || c == '>').to_string()
}

impl FullMessage {
    pub fn into_email(self, now: i64) -> Email {
        let mut state = WalkState::default();
        walk_part(&self.payload, &mut state);

        let mut email = Email {
            provider_id: self.id.clone(),
            thread_id: (!self.thread_id.is_empty()).then(|| self.thread_id.clone()),
            text_body: state.text,
            html_body: state.html,
            attachments: state.attachments,
            source_is_read: Some(!self.label_ids.iter().any(|l| l == UNREAD_LABEL)),
            source_folder: self
                .label_ids
                .iter()
                .any(|l| l == INBOX_LABEL)
                .then(|| INBOX_LABEL.to_string()),
            received_at: self.internal_date.parse().unwrap_or_default(),
            size_bytes: self.size_estimate,
            ..Default::default()
        };

        for header in &self.payload.headers {
            match header.name.to_ascii_lowercase().as_str() {
                "subject" => email.subject = header.value.clone(),
                "from" => {
                    let from = Addr::parse(&header.value);
                    email.from_address = from.address.unwrap_or_default();
                    email.from_name = from.name;
                }
                "to" => email.to = parse_address_list(&header.value),
                "cc" => email.cc = parse_address_list(&header.value),
                "bcc" => email.bcc = parse_address_list(&header.value),
                "reply-to" => email.reply_to = parse_address_list(&header.value),
                "message-id" => email.message_id = Some(clean_message_id(&header.value)),
                "in-reply-to" => email.in_reply_to = Some(clean_message_id(&header.value)),
                "references" => {
                    email.references = header
                        .value
                        .split_whitespace()
                        .map(clean_message_id)
                        .filter(|id| !id.is_empty())
                        .collect()
                }
                "date" => {
                    if let Ok(date) = DateTime::parse_from_rfc2822(header.value.trim()) {
                        email.sent_at = date.timestamp_millis();
                    }
                }
                _ => {}
            }
        }
        if email.sent_at <= 0 {
            email.sent_at = email.received_at;
        }
        if email.text_body.is_none() && !self.snippet.is_empty() {
            email.snippet = crate::modules::email::model::make_snippet(Some(&self.snippet), "");
        }
        email.source_labels = self.label_ids;
        email.normalize(now)
    }
}
