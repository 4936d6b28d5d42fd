// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use base64::{engine::general_purpose, Engine};
use rand::{rng, Rng};

use super::error::code::ErrorCode;
use crate::raise_error;

pub mod encrypt;
pub mod net;
pub mod shutdown;
pub mod tls;

#[macro_export]
macro_rules! mailfusion_version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
}

#[macro_export]
macro_rules! utc_now {
    () => {{
        use chrono::Utc;
        Utc::now().timestamp_millis()
    }};
}

#[macro_export]
macro_rules! raise_error {
    ($msg:expr, $code:expr) => {
        $crate::modules::error::MailFusionError::Generic {
            message: $msg,
            location: snafu::Location::default(),
            code: $code,
        }
    };
}

#[macro_export]
macro_rules! run_with_timeout {
    ($duration:expr, $task:expr, $err_msg:expr) => {{
        match tokio::time::timeout($duration, $task).await {
            Ok(result) => Ok(result),
            Err(_) => Err($err_msg),
        }
    }};
}

#[macro_export]
macro_rules! id {
    ($bit_strength:expr) => {{
        let token = $crate::modules::utils::generate_token_impl($bit_strength);
        $crate::modules::utils::hash(&token)
    }};
}

/// Account uids are stable, URL-safe and human-copyable, unlike the numeric record ids.
#[macro_export]
macro_rules! uid {
    () => {{
        $crate::modules::utils::generate_token_impl(128)
    }};
}

pub fn validate_email(email: &str) -> crate::modules::error::MailFusionResult<()> {
    use std::str::FromStr;
    let email_address = email_address::EmailAddress::from_str(email).map_err(|_| {
        raise_error!(
            format!("Invalid email format : {}", email),
            ErrorCode::InvalidParameter
        )
    })?;
    if email != email_address.email() {
        return Err(raise_error!(
            format!("Invalid email format: {}", email),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

pub(crate) fn generate_token_impl(bit_strength: usize) -> String {
    let byte_length = (bit_strength + 23) / 24 * 3;
    let random_bytes: Vec<u8> = (0..byte_length).map(|_| rand::random::<u8>()).collect();
    let encoded = general_purpose::URL_SAFE.encode(&random_bytes);

    encoded
        .chars()
        .map(|c| {
            if c == '/' || c == '+' || c == '-' || c == '_' {
                make_single_random_char()
            } else {
                c
            }
        })
        .collect()
}

fn make_single_random_char() -> char {
    let random_bytes: [u8; 3] = rng().random();
    let encoded = general_purpose::URL_SAFE.encode(random_bytes);
    encoded
        .chars()
        .find(|&c| c != '-' && c != '_' && c != '+' && c != '/')
        .unwrap_or('a')
}

pub fn base64_standard(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decodes base64url with or without padding, as REST mail APIs emit both.
pub fn base64_url_decode(data: &str) -> crate::modules::error::MailFusionResult<Vec<u8>> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(data.trim().trim_end_matches('='))
        .map_err(|e| {
            raise_error!(
                format!("Failed to decode base64url content: {}", e),
                ErrorCode::MessageParseFailed
            )
        })
}

pub fn hash(s: &str) -> u64 {
    let mut cursor = std::io::Cursor::new(s.as_bytes());
    // reading from an in-memory cursor cannot fail
    let hash = murmur3::murmur3_x64_128(&mut cursor, 0).unwrap_or_default();
    (hash & 0x1F_FFFF_FFFF_FFFF) as u64
}

/// Cuts `text` to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_js_safe() {
        for _ in 0..100 {
            assert!(id!(64) <= 0x1F_FFFF_FFFF_FFFF);
        }
    }

    #[test]
    fn test_uid_is_alphanumeric() {
        let uid = uid!();
        assert!(uid.len() >= 20);
        assert!(uid.chars().all(|c| c.is_ascii_alphanumeric() || c == '='));
    }

    #[test]
    fn test_base64_url_decode_accepts_padding() {
        assert_eq!(base64_url_decode("SGVsbG8gd29ybGQ").unwrap(), b"Hello world");
        assert_eq!(base64_url_decode("SGVsbG8gd29ybGQ=").unwrap(), b"Hello world");
        assert!(base64_url_decode("***").is_err());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
    }
}
