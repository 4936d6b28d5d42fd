use crate::modules::common::Addr;
use crate::modules::utils::truncate_chars;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

pub const SNIPPET_MAX_CHARS: usize = 200;
pub const DEFAULT_SUBJECT: &str = "No Subject";
pub const DEFAULT_FROM_ADDRESS: &str = "unknown@example.com";

/// Attachment metadata. Content bytes are never kept.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Object)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub content_id: Option<String>,
    /// True when the part carries a Content-ID.
    pub is_inline: bool,
}

impl Attachment {
    pub fn new(
        filename: String,
        content_type: String,
        size: u64,
        content_id: Option<String>,
    ) -> Self {
        let content_id = content_id
            .map(|cid| cid.trim().trim_matches(|c| c == '<' || c == '>').to_string())
            .filter(|cid| !cid.is_empty());
        Self {
            filename,
            content_type,
            size,
            is_inline: content_id.is_some(),
            content_id,
        }
    }
}

/// Protocol-agnostic message produced by every adapter.
///
/// `provider_id` is only unique inside one account.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub provider_id: String,
    pub message_id: Option<String>,
    pub subject: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub to: Vec<Addr>,
    pub cc: Vec<Addr>,
    pub bcc: Vec<Addr>,
    pub reply_to: Vec<Addr>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub snippet: String,
    pub source_is_read: Option<bool>,
    pub source_labels: Vec<String>,
    pub source_folder: Option<String>,
    pub attachments: Vec<Attachment>,
    pub has_attachments: bool,
    pub attachments_count: u32,
    pub sent_at: i64,
    pub received_at: i64,
    pub size_bytes: u64,
    pub thread_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
}

impl Email {
    /// Fills the defaults every adapter guarantees and derives the snippet and
    /// attachment counters. Call once the remote fields are populated.
    pub fn normalize(mut self, now: i64) -> Self {
        if self.subject.trim().is_empty() {
            self.subject = DEFAULT_SUBJECT.to_string();
        }
        if self.from_address.trim().is_empty() {
            self.from_address = DEFAULT_FROM_ADDRESS.to_string();
        }
        if self.sent_at <= 0 {
            self.sent_at = now;
        }
        if self.received_at <= 0 {
            self.received_at = now;
        }
        if self.snippet.is_empty() {
            self.snippet = make_snippet(self.text_body.as_deref(), &self.subject);
        }
        self.attachments_count = self.attachments.len() as u32;
        self.has_attachments = !self.attachments.is_empty();
        self
    }

    /// Recipients joined as `a, b, c`, used by `to` rule conditions.
    pub fn recipients_joined(&self) -> String {
        self.to
            .iter()
            .map(|addr| addr.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// First 200 chars of the text body with newlines flattened, else the subject.
pub fn make_snippet(text_body: Option<&str>, subject: &str) -> String {
    match text_body.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => {
            let flattened = text
                .split(['\r', '\n'])
                .filter(|line| !line.trim().is_empty())
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(" ");
            truncate_chars(&flattened, SNIPPET_MAX_CHARS)
        }
        None => truncate_chars(subject, SNIPPET_MAX_CHARS),
    }
}
