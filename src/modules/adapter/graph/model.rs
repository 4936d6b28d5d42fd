use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::modules::common::Addr;
use crate::modules::email::model::{Attachment as EmailAttachment, Email};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageListResponse {
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
    #[serde(default)]
    pub value: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Message {
    pub id: String,
    #[serde(rename = "internetMessageId")]
    pub internet_message_id: Option<String>,
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<String>,
    pub subject: Option<String>,
    #[serde(rename = "isRead")]
    pub is_read: Option<bool>,
    #[serde(rename = "hasAttachments", default)]
    pub has_attachments: bool,
    #[serde(rename = "receivedDateTime")]
    pub received_date_time: Option<String>,
    #[serde(rename = "sentDateTime")]
    pub sent_date_time: Option<String>,
    pub body: Option<ItemBody>,
    #[serde(rename = "bodyPreview")]
    pub body_preview: Option<String>,
    pub categories: Option<Vec<String>>,
    #[serde(rename = "parentFolderId")]
    pub parent_folder_id: Option<String>,
    pub from: Option<Recipient>,
    #[serde(rename = "replyTo")]
    pub reply_to: Option<Vec<Recipient>>,
    #[serde(rename = "toRecipients")]
    pub to_recipients: Option<Vec<Recipient>>,
    #[serde(rename = "ccRecipients")]
    pub cc_recipients: Option<Vec<Recipient>>,
    #[serde(rename = "bccRecipients")]
    pub bcc_recipients: Option<Vec<Recipient>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ItemBody {
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Recipient {
    #[serde(rename = "emailAddress")]
    pub email_address: EmailAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmailAddress {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AttachmentListResponse {
    #[serde(default)]
    pub value: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Attachment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "isInline", default)]
    pub is_inline: bool,
    #[serde(rename = "contentId")]
    pub content_id: Option<String>,
}

/// `/me` response used by the connection test.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct User {
    #[serde(rename = "userPrincipalName")]
    pub user_principal_name: Option<String>,
    pub mail: Option<String>,
}

impl From<&Recipient> for Addr {
    fn from(value: &Recipient) -> Self {
        Addr {
            name: value.email_address.name.clone().filter(|n| !n.is_empty()),
            address: value.email_address.address.clone(),
        }
    }
}

fn addrs(list: &Option<Vec<Recipient>>) -> Vec<Addr> {
    list.as_deref()
        .unwrap_or_default()
        .iter()
        .map(Addr::from)
        .collect()
}

fn parse_time(value: &Option<String>) -> i64 {
    value
        .as_deref()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|d| d.timestamp_millis())
        .unwrap_or_default()
}

impl From<Attachment> for EmailAttachment {
    fn from(value: Attachment) -> Self {
        EmailAttachment::new(
            value.name,
            value
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            value.size,
            value.content_id,
        )
    }
}

impl Message {
    pub fn into_email(self, attachments: Vec<Attachment>, now: i64) -> Email {
        let from = self.from.as_ref().map(Addr::from);
        let (text_body, html_body) = match self.body {
            Some(body) if body.content_type.eq_ignore_ascii_case("html") => {
                (None, Some(body.content))
            }
            Some(body) => (Some(body.content), None),
            None => (None, None),
        };
        let snippet = match (&text_body, self.body_preview) {
            (None, Some(preview)) => {
                crate::modules::email::model::make_snippet(Some(&preview), "")
            }
            _ => String::new(),
        };

        let email = Email {
            provider_id: self.id,
            message_id: self
                .internet_message_id
                .map(|id| id.trim_matches(|c| c == '<' || c == '>').to_string()),
            subject: self.subject.unwrap_or_default(),
            from_address: from
                .as_ref()
                .map(|a| a.address_or_empty().to_string())
                .unwrap_or_default(),
            from_name: from.and_then(|a| a.name),
            to: addrs(&self.to_recipients),
            cc: addrs(&self.cc_recipients),
            bcc: addrs(&self.bcc_recipients),
            reply_to: addrs(&self.reply_to),
            text_body,
            html_body,
            snippet,
            source_is_read: self.is_read,
            source_labels: self.categories.unwrap_or_default(),
            source_folder: self.parent_folder_id,
            attachments: attachments.into_iter().map(EmailAttachment::from).collect(),
            sent_at: parse_time(&self.sent_date_time),
            received_at: parse_time(&self.received_date_time),
            thread_id: self.conversation_id,
            ..Default::default()
        };
        email.normalize(now)
    }
}
