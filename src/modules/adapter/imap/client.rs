// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::ops::{Deref, DerefMut};

use async_imap::Client as ImapClient;
use async_imap::Session as ImapSession;
use tokio::io::BufWriter;
use tracing::debug;

use crate::modules::adapter::session::SessionStream;
use crate::modules::adapter::Encryption;
use crate::modules::common::proxy::ProxyConfig;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::utils::net::{establish_tcp_connection_with_timeout, establish_tls_connection};
use crate::modules::utils::tls::establish_tls_stream;
use crate::raise_error;

pub type Session = ImapSession<Box<dyn SessionStream>>;

#[derive(Debug)]
pub(crate) struct Client {
    inner: ImapClient<Box<dyn SessionStream>>,
}

impl Deref for Client {
    type Target = ImapClient<Box<dyn SessionStream>>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for Client {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

fn alpn(port: u16) -> &'static [&'static str] {
    if port == 993 {
        &[]
    } else {
        &["imap"]
    }
}

impl Client {
    fn new(stream: Box<dyn SessionStream>) -> Self {
        Self {
            inner: ImapClient::new(stream),
        }
    }

    pub(crate) async fn login(self, username: &str, password: &str) -> MailFusionResult<Session> {
        let Client { inner } = self;
        inner.login(username, password).await.map_err(|(e, _)| {
            raise_error!(
                format!("IMAP LOGIN rejected for {}: {:#?}", username, e),
                ErrorCode::AuthenticationFailed
            )
        })
    }

    pub(crate) async fn authenticate(
        self,
        authenticator: impl async_imap::Authenticator,
    ) -> MailFusionResult<Session> {
        let Client { inner } = self;
        inner
            .authenticate("XOAUTH2", authenticator)
            .await
            .map_err(|(e, _)| {
                raise_error!(
                    format!("IMAP XOAUTH2 rejected: {:#?}", e),
                    ErrorCode::AuthenticationFailed
                )
            })
    }

    pub async fn connection(
        host: &str,
        port: u16,
        encryption: Encryption,
        proxy: Option<&ProxyConfig>,
    ) -> MailFusionResult<Self> {
        if host.is_empty() || host.contains(|c: char| c.is_whitespace()) {
            return Err(raise_error!(
                format!("Invalid IMAP host '{}'", host),
                ErrorCode::InvalidParameter
            ));
        }
        debug!("Attempting IMAP connection to {host}:{port} ({encryption:?}).");
        match encryption {
            Encryption::Ssl => Self::establish_secure_connection(host, port, proxy).await,
            Encryption::StartTls => Self::establish_starttls_connection(host, port, proxy).await,
            Encryption::None => Self::establish_insecure_connection(host, port, proxy).await,
        }
    }

    async fn read_greeting<T>(client: &mut ImapClient<T>) -> MailFusionResult<()>
    where
        T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + std::fmt::Debug + Send,
    {
        client
            .read_response()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?
            .ok_or_else(|| {
                raise_error!(
                    "failed to read greeting".into(),
                    ErrorCode::ImapCommandFailed
                )
            })?;
        Ok(())
    }

    async fn establish_secure_connection(
        host: &str,
        port: u16,
        proxy: Option<&ProxyConfig>,
    ) -> MailFusionResult<Self> {
        let tls_stream = establish_tls_connection(host, port, alpn(port), proxy).await?;
        let session_stream: Box<dyn SessionStream> = Box::new(BufWriter::new(tls_stream));
        let mut client = Client::new(session_stream);
        Self::read_greeting(&mut client.inner).await?;
        Ok(client)
    }

    async fn establish_insecure_connection(
        host: &str,
        port: u16,
        proxy: Option<&ProxyConfig>,
    ) -> MailFusionResult<Self> {
        let tcp_stream = establish_tcp_connection_with_timeout(host, port, proxy).await?;
        let session_stream: Box<dyn SessionStream> = Box::new(BufWriter::new(tcp_stream));
        let mut client = Client::new(session_stream);
        Self::read_greeting(&mut client.inner).await?;
        Ok(client)
    }

    async fn establish_starttls_connection(
        host: &str,
        port: u16,
        proxy: Option<&ProxyConfig>,
    ) -> MailFusionResult<Self> {
        let tcp_stream = establish_tcp_connection_with_timeout(host, port, proxy).await?;
        let mut client = async_imap::Client::new(BufWriter::new(tcp_stream));
        Self::read_greeting(&mut client).await?;

        client
            .run_command_and_check_ok("STARTTLS", None)
            .await
            .map_err(|_| {
                raise_error!(
                    "STARTTLS command failed".into(),
                    ErrorCode::ImapCommandFailed
                )
            })?;

        let tcp_stream = client.into_inner().into_inner();
        let tls_stream = establish_tls_stream(host, &[], tcp_stream).await?;
        let session_stream: Box<dyn SessionStream> = Box::new(BufWriter::new(tls_stream));
        Ok(Client::new(session_stream))
    }
}
