use mail_parser::{HeaderValue, Message, MessageParser, MimeHeaders};

use crate::modules::common::{collect_addrs, Addr};
use crate::modules::email::model::{Attachment, Email};
use crate::modules::error::{code::ErrorCode, MailFusionResult};
use crate::raise_error;

/// Parses a raw RFC 822 message into the canonical model.
///
/// Protocol-level fields (flags, internal date, size) are left for the caller.
pub fn parse_rfc822(provider_id: &str, raw: &[u8], now: i64) -> MailFusionResult<Email> {
    let message = MessageParser::default().parse(raw).ok_or_else(|| {
        raise_error!(
            format!("Message {} could not be parsed", provider_id),
            ErrorCode::MessageParseFailed
        )
    })?;

    let from = collect_addrs(message.from()).into_iter().next();
    let sent_at = message
        .date()
        .map(|d| d.to_timestamp() * 1000)
        .unwrap_or_default();

    let email = Email {
        provider_id: provider_id.to_string(),
        message_id: message.message_id().map(String::from),
        subject: message.subject().map(String::from).unwrap_or_default(),
        from_address: from
            .as_ref()
            .map(|addr| addr.address_or_empty().to_string())
            .unwrap_or_default(),
        from_name: from.and_then(|addr| addr.name),
        to: collect_addrs(message.to()),
        cc: collect_addrs(message.cc()),
        bcc: collect_addrs(message.bcc()),
        reply_to: collect_addrs(message.reply_to()),
        text_body: message.body_text(0).map(|b| b.into_owned()),
        html_body: message.body_html(0).map(|b| b.into_owned()),
        attachments: extract_attachments(&message),
        sent_at,
        received_at: sent_at,
        size_bytes: raw.len() as u64,
        in_reply_to: message.in_reply_to().as_text().map(String::from),
        references: extract_references(&message),
        ..Default::default()
    };
    Ok(email.normalize(now))
}

fn extract_attachments(message: &Message<'_>) -> Vec<Attachment> {
    message
        .attachments()
        .map(|part| {
            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());
            Attachment::new(
                part.attachment_name().unwrap_or("unnamed").to_string(),
                content_type,
                part.len() as u64,
                part.content_id().map(String::from),
            )
        })
        .collect()
}

fn extract_references(message: &Message<'_>) -> Vec<String> {
    match message.references() {
        HeaderValue::Text(cow) => vec![cow.to_string()],
        HeaderValue::TextList(list) => list.iter().map(|cow| cow.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Splits a `From`-style header into `(address, name)`.
pub fn split_address(value: &str) -> (String, Option<String>) {
    let addr = Addr::parse(value);
    (addr.address.unwrap_or_default(), addr.name)
}

/// Splits a header such as `To` into addresses, honouring quoted display names.
pub fn parse_address_list(value: &str) -> Vec<Addr> {
    let mut addrs = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    for c in value.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                push_addr(&mut addrs, &current);
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    push_addr(&mut addrs, &current);
    addrs
}

fn push_addr(addrs: &mut Vec<Addr>, raw: &str) {
    if !raw.trim().is_empty() {
        addrs.push(Addr::parse(raw));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::email::model::{DEFAULT_FROM_ADDRESS, DEFAULT_SUBJECT};

    const SAMPLE: &str = "From: \"Alice Example\" <alice@example.com>\r\n\
To: bob@example.com, carol@example.com\r\n\
Subject: Quarterly report\r\n\
Message-ID: <abc@example.com>\r\n\
In-Reply-To: <parent@example.com>\r\n\
Date: Tue, 1 Jul 2025 10:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Numbers attached.\r\n\
--b1\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--b1--\r\n";

    #[test]
    fn test_parse_multipart_message() {
        let email = parse_rfc822("42", SAMPLE.as_bytes(), 1).unwrap();
        assert_eq!(email.provider_id, "42");
        assert_eq!(email.subject, "Quarterly report");
        assert_eq!(email.from_address, "alice@example.com");
        assert_eq!(email.from_name.as_deref(), Some("Alice Example"));
        assert_eq!(email.to.len(), 2);
        assert_eq!(email.message_id.as_deref(), Some("abc@example.com"));
        assert_eq!(email.in_reply_to.as_deref(), Some("parent@example.com"));
        assert_eq!(email.sent_at, 1_751_364_000_000);
        assert!(email.text_body.unwrap().contains("Numbers attached."));
        assert!(email.has_attachments);
        assert_eq!(email.attachments_count, 1);
        assert_eq!(email.attachments[0].filename, "report.pdf");
        assert_eq!(email.attachments[0].content_type, "application/pdf");
        assert!(!email.attachments[0].is_inline);
    }

    #[test]
    fn test_missing_headers_get_defaults() {
        let email = parse_rfc822("7", b"X-Mailer: test\r\n\r\nbody only\r\n", 99).unwrap();
        assert_eq!(email.subject, DEFAULT_SUBJECT);
        assert_eq!(email.from_address, DEFAULT_FROM_ADDRESS);
        assert_eq!(email.sent_at, 99);
        assert_eq!(email.received_at, 99);
    }

    #[test]
    fn test_parse_address_list_keeps_quoted_commas() {
        let list = parse_address_list("bob@example.com, \"Doe, Carol\" <carol@example.com>");
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].name.as_deref(), Some("Doe, Carol"));
        assert_eq!(list[1].address.as_deref(), Some("carol@example.com"));
        assert!(parse_address_list("  ").is_empty());
    }

    #[test]
    fn test_split_address() {
        let (address, name) = split_address("Bob <bob@example.com>");
        assert_eq!(address, "bob@example.com");
        assert_eq!(name.as_deref(), Some("Bob"));
    }
}
