// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::modules::adapter::mime::parse_rfc822;
use crate::modules::adapter::pop3::client::Pop3Client;
use crate::modules::adapter::session::SessionStream;
use crate::modules::adapter::{
    effective_limit, effective_since, AdapterConfig, AuthType, EmailProvider, Encryption,
    MailProvider, Protocol,
};
use crate::modules::email::model::Email;
use crate::modules::error::{code::ErrorCode, MailFusionResult};
use crate::modules::utils::net::{establish_tcp_connection_with_timeout, establish_tls_connection};
use crate::modules::utils::tls::establish_tls_stream;
use crate::{raise_error, utc_now};

pub mod client;

pub const DEFAULT_POP3_PORT: u16 = 995;

type Session = Pop3Client<Box<dyn SessionStream>>;

/// POP3 maildrop reader. There is no server-side time filter, so `since` is applied
/// to the parsed sent date.
pub struct Pop3Provider {
    config: AdapterConfig,
    session: Option<Session>,
}

impl Pop3Provider {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    async fn open_session(config: &AdapterConfig) -> MailFusionResult<Session> {
        if config.credentials.auth_type == AuthType::OAuth2 {
            return Err(raise_error!(
                "POP3 accounts authenticate with USER/PASS only".into(),
                ErrorCode::InvalidParameter
            ));
        }
        let server = &config.server;
        let port = if server.port == 0 {
            DEFAULT_POP3_PORT
        } else {
            server.port
        };
        let proxy = config.proxy.as_ref();

        let mut session = match server.encryption {
            Encryption::Ssl => {
                let stream = establish_tls_connection(&server.host, port, &[], proxy).await?;
                Pop3Client::new(stream).await?
            }
            Encryption::StartTls => {
                let tcp = establish_tcp_connection_with_timeout(&server.host, port, proxy).await?;
                let stream: Box<dyn SessionStream> = Box::new(tcp);
                let mut plain = Pop3Client::new(stream).await?;
                plain.stls().await?;
                let tls = establish_tls_stream(&server.host, &[], plain.into_inner()).await?;
                Pop3Client::upgraded(tls)
            }
            Encryption::None => {
                let tcp = establish_tcp_connection_with_timeout(&server.host, port, proxy).await?;
                let stream: Box<dyn SessionStream> = Box::new(tcp);
                Pop3Client::new(stream).await?
            }
        };
        session
            .login(&config.email, config.credentials.password_or_empty())
            .await?;
        Ok(session)
    }

    fn session_mut(&mut self) -> MailFusionResult<&mut Session> {
        self.session.as_mut().ok_or_else(|| {
            raise_error!(
                "POP3 session is not connected; call connect first".into(),
                ErrorCode::NetworkError
            )
        })
    }
}

fn provider_id_of(uids: &Option<HashMap<u32, String>>, number: u32) -> String {
    uids.as_ref()
        .and_then(|map| map.get(&number).cloned())
        .unwrap_or_else(|| number.to_string())
}

/// Retrieves the newest `limit` messages, newest first, up to the first one sent
/// before `since`. Message numbers follow arrival order, so everything below it is older.
///
/// A RETR or parse failure skips that message; a broken connection ends the walk with
/// what was already read.
pub async fn retrieve_newest<S>(
    session: &mut Pop3Client<S>,
    since: i64,
    limit: usize,
    now: i64,
) -> MailFusionResult<Vec<Email>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (count, _) = session.stat().await?;
    if count == 0 {
        return Ok(Vec::new());
    }
    let uids = session.uidl().await?;
    let lowest = count.saturating_sub(limit.min(u32::MAX as usize) as u32) + 1;

    let mut emails = Vec::new();
    for number in (lowest..=count).rev() {
        let provider_id = provider_id_of(&uids, number);
        let raw = match session.retr(number).await {
            Ok(raw) => raw,
            Err(e) if e.code() == ErrorCode::NetworkError => {
                warn!("POP3 connection lost at message {}: {}", number, e);
                break;
            }
            Err(e) => {
                warn!("Skipping POP3 message {}: {}", number, e);
                continue;
            }
        };
        match parse_rfc822(&provider_id, &raw, now) {
            Ok(email) if email.sent_at >= since => emails.push(email),
            Ok(_) => {
                debug!("POP3 message {} is older than the window, stopping", number);
                break;
            }
            Err(e) => warn!("Skipping POP3 message {}: {}", number, e),
        }
    }
    Ok(emails)
}

#[async_trait]
impl MailProvider for Pop3Provider {
    async fn connect(&mut self) -> MailFusionResult<()> {
        if self.session.is_none() {
            self.session = Some(Self::open_session(&self.config).await?);
            debug!(email = %self.config.email, "POP3 session established");
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> MailFusionResult<()> {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.quit().await {
                warn!(email = %self.config.email, "POP3 QUIT failed: {}", e);
            }
        }
        Ok(())
    }

    async fn fetch_emails(
        &mut self,
        since: Option<i64>,
        limit: usize,
    ) -> MailFusionResult<Vec<Email>> {
        let now = utc_now!();
        let since = effective_since(since, now);
        let limit = effective_limit(limit);
        let session = self.session_mut()?;
        retrieve_newest(session, since, limit, now).await
    }

    async fn fetch_email_detail(&mut self, provider_id: &str) -> MailFusionResult<Email> {
        let session = self.session_mut()?;
        let uids = session.uidl().await?;
        let number = match &uids {
            Some(map) => map
                .iter()
                .find(|(_, uid)| uid.as_str() == provider_id)
                .map(|(number, _)| *number),
            None => provider_id.parse::<u32>().ok(),
        }
        .ok_or_else(|| {
            raise_error!(
                format!("POP3 message '{}' not found", provider_id),
                ErrorCode::ResourceNotFound
            )
        })?;
        let raw = session.retr(number).await?;
        parse_rfc822(provider_id, &raw, utc_now!())
    }

    async fn test_connection(&self) -> MailFusionResult<()> {
        let mut session = Self::open_session(&self.config).await?;
        let (count, size) = session.stat().await?;
        debug!(email = %self.config.email, "POP3 test: {} messages, {} octets", count, size);
        if let Err(e) = session.quit().await {
            warn!("POP3 QUIT after test failed: {}", e);
        }
        Ok(())
    }

    fn provider_type(&self) -> EmailProvider {
        self.config.provider
    }

    fn protocol(&self) -> Protocol {
        Protocol::Pop3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn message(subject: &str, date: &str) -> String {
        format!(
            "+OK\r\nFrom: a@example.com\r\nSubject: {subject}\r\nDate: {date}\r\n\r\nhello\r\n.\r\n"
        )
    }

    async fn maildrop(stream: tokio::io::DuplexStream) {
        let (read, mut write) = tokio::io::split(stream);
        let mut reader = BufReader::new(read);
        write.write_all(b"+OK ready\r\n").await.unwrap();
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                return;
            }
            let reply = match line.trim_end() {
                "STAT" => "+OK 4 400\r\n".to_string(),
                "UIDL" => "+OK\r\n1 u1\r\n2 u2\r\n3 u3\r\n4 u4\r\n.\r\n".to_string(),
                "RETR 4" => message("newest", "Wed, 2 Jul 2025 10:00:00 +0000"),
                "RETR 3" => "-ERR gone\r\n".to_string(),
                "RETR 2" => message("old", "Mon, 2 Jan 2023 10:00:00 +0000"),
                "RETR 1" => message("misdated", "Thu, 3 Jul 2025 10:00:00 +0000"),
                _ => "-ERR unexpected\r\n".to_string(),
            };
            write.write_all(reply.as_bytes()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_retrieve_newest_stops_at_first_old_message() {
        let (client_side, server_side) = duplex(8192);
        tokio::spawn(maildrop(server_side));
        let mut session = Pop3Client::new(client_side).await.unwrap();

        // July 1st 2025
        let since = 1_751_328_000_000;
        let emails = retrieve_newest(&mut session, since, 4, utc_now!())
            .await
            .unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].provider_id, "u4");
        assert_eq!(emails[0].subject, "newest");
    }

    #[test]
    fn test_provider_id_falls_back_to_number() {
        assert_eq!(provider_id_of(&None, 7), "7");
        let map = HashMap::from([(7, "abc".to_string())]);
        assert_eq!(provider_id_of(&Some(map), 7), "abc");
    }
}
