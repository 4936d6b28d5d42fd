// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::time::Duration;

use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::modules::adapter::gmail::{GmailProvider, GMAIL_API_BASE};
use crate::modules::adapter::graph::{GraphProvider, GRAPH_API_BASE};
use crate::modules::adapter::imap::ImapProvider;
use crate::modules::adapter::pop3::Pop3Provider;
use crate::modules::adapter::{
    AdapterConfig, EmailProvider, Encryption, MailProvider, Protocol, ServerConfig,
};
use crate::modules::common::http::DEFAULT_HTTP_TIMEOUT;
use crate::modules::error::{code::ErrorCode, MailFusionResult};
use crate::raise_error;

/// Static facts about one provider, served to clients picking a protocol.
#[derive(Clone, Debug, Serialize, Deserialize, Object)]
pub struct ProviderInfo {
    pub provider: EmailProvider,
    pub supported_protocols: Vec<Protocol>,
    pub recommended_protocol: Protocol,
    pub imap: Option<ServerConfig>,
    pub pop3: Option<ServerConfig>,
    /// True when host/port must come from the account.
    pub requires_server: bool,
}

fn server(host: &str, port: u16) -> ServerConfig {
    ServerConfig {
        host: host.to_string(),
        port,
        encryption: Encryption::Ssl,
    }
}

/// Well-known endpoint of `provider` for a wire protocol.
pub fn default_server(provider: EmailProvider, protocol: Protocol) -> Option<ServerConfig> {
    match (provider, protocol) {
        (EmailProvider::Gmail, Protocol::Imap) => Some(server("imap.gmail.com", 993)),
        (EmailProvider::Outlook, Protocol::Imap) => Some(server("outlook.office365.com", 993)),
        (EmailProvider::Icloud, Protocol::Imap) => Some(server("imap.mail.me.com", 993)),
        (EmailProvider::Qq, Protocol::Imap) => Some(server("imap.qq.com", 993)),
        (EmailProvider::Qq, Protocol::Pop3) => Some(server("pop.qq.com", 995)),
        (EmailProvider::Netease163, Protocol::Imap) => Some(server("imap.163.com", 993)),
        (EmailProvider::Netease163, Protocol::Pop3) => Some(server("pop.163.com", 995)),
        _ => None,
    }
}

pub fn supported_protocols(provider: EmailProvider) -> &'static [Protocol] {
    match provider {
        EmailProvider::Gmail => &[Protocol::GmailApi, Protocol::Imap],
        EmailProvider::Outlook => &[Protocol::Graph, Protocol::Imap],
        EmailProvider::Icloud => &[Protocol::Imap],
        EmailProvider::Qq | EmailProvider::Netease163 | EmailProvider::Generic => {
            &[Protocol::Imap, Protocol::Pop3]
        }
    }
}

pub fn recommended_protocol(provider: EmailProvider) -> Protocol {
    match provider {
        EmailProvider::Gmail => Protocol::GmailApi,
        EmailProvider::Outlook => Protocol::Graph,
        _ => Protocol::Imap,
    }
}

pub fn validate_combination(provider: EmailProvider, protocol: Protocol) -> MailFusionResult<()> {
    if supported_protocols(provider).contains(&protocol) {
        return Ok(());
    }
    let reason = match protocol {
        Protocol::GmailApi => "the Gmail API is only available for gmail accounts".to_string(),
        Protocol::Graph => "Microsoft Graph is only available for outlook accounts".to_string(),
        _ => format!("{} does not offer {}", provider, protocol),
    };
    Err(raise_error!(
        format!(
            "Unsupported provider/protocol combination {}/{}: {}",
            provider, protocol, reason
        ),
        ErrorCode::UnsupportedProvider
    ))
}

/// Endpoint an adapter should dial.
///
/// REST protocols get an empty config. Known providers use the explicit server when one
/// is given and the host table otherwise; `generic` requires an explicit host and port.
pub fn resolve_server(
    provider: EmailProvider,
    protocol: Protocol,
    explicit: Option<&ServerConfig>,
) -> MailFusionResult<ServerConfig> {
    validate_combination(provider, protocol)?;
    if matches!(protocol, Protocol::GmailApi | Protocol::Graph) {
        return Ok(ServerConfig::default());
    }

    let explicit = explicit.filter(|s| !s.host.trim().is_empty());
    if let Some(server) = explicit {
        if server.port == 0 {
            return Err(raise_error!(
                format!("Server port for {} must be between 1 and 65535", server.host),
                ErrorCode::InvalidParameter
            ));
        }
        return Ok(server.clone());
    }

    default_server(provider, protocol).ok_or_else(|| {
        raise_error!(
            format!(
                "Provider '{}' requires an explicit server host, port and encryption for {}",
                provider, protocol
            ),
            ErrorCode::MissingConfiguration
        )
    })
}

pub fn provider_info(provider: EmailProvider) -> ProviderInfo {
    ProviderInfo {
        provider,
        supported_protocols: supported_protocols(provider).to_vec(),
        recommended_protocol: recommended_protocol(provider),
        imap: default_server(provider, Protocol::Imap),
        pop3: default_server(provider, Protocol::Pop3),
        requires_server: provider == EmailProvider::Generic,
    }
}

pub fn provider_infos() -> Vec<ProviderInfo> {
    EmailProvider::ALL.iter().copied().map(provider_info).collect()
}

/// Builds the adapter for a resolved config. The sync engine only sees this seam.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, config: AdapterConfig) -> MailFusionResult<Box<dyn MailProvider>>;
}

/// Production factory dispatching on the protocol.
#[derive(Clone, Debug)]
pub struct DefaultProviderFactory {
    pub gmail_api_base: String,
    pub graph_api_base: String,
    pub http_timeout: Duration,
}

impl Default for DefaultProviderFactory {
    fn default() -> Self {
        Self {
            gmail_api_base: GMAIL_API_BASE.to_string(),
            graph_api_base: GRAPH_API_BASE.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl ProviderFactory for DefaultProviderFactory {
    fn create(&self, config: AdapterConfig) -> MailFusionResult<Box<dyn MailProvider>> {
        validate_combination(config.provider, config.protocol)?;
        let provider: Box<dyn MailProvider> = match config.protocol {
            Protocol::Imap => Box::new(ImapProvider::new(config)),
            Protocol::Pop3 => Box::new(Pop3Provider::new(config)),
            Protocol::GmailApi => Box::new(GmailProvider::new(
                config,
                &self.gmail_api_base,
                self.http_timeout,
            )),
            Protocol::Graph => Box::new(GraphProvider::new(
                config,
                &self.graph_api_base,
                self.http_timeout,
            )),
        };
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::adapter::Credentials;

    fn config(provider: EmailProvider, protocol: Protocol) -> AdapterConfig {
        AdapterConfig {
            email: "user@example.com".into(),
            provider,
            protocol,
            credentials: Credentials::default(),
            server: ServerConfig::default(),
            proxy: None,
        }
    }

    #[test]
    fn test_rest_protocols_are_provider_bound() {
        assert!(validate_combination(EmailProvider::Gmail, Protocol::GmailApi).is_ok());
        assert!(validate_combination(EmailProvider::Outlook, Protocol::Graph).is_ok());
        let err = validate_combination(EmailProvider::Outlook, Protocol::GmailApi).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedProvider);
        let err = validate_combination(EmailProvider::Qq, Protocol::Graph).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedProvider);
        assert!(validate_combination(EmailProvider::Icloud, Protocol::Pop3).is_err());
    }

    #[test]
    fn test_host_table() {
        let qq = resolve_server(EmailProvider::Qq, Protocol::Pop3, None).unwrap();
        assert_eq!((qq.host.as_str(), qq.port), ("pop.qq.com", 995));
        let outlook = resolve_server(EmailProvider::Outlook, Protocol::Imap, None).unwrap();
        assert_eq!(outlook.host, "outlook.office365.com");
        let graph = resolve_server(EmailProvider::Outlook, Protocol::Graph, None).unwrap();
        assert!(graph.host.is_empty());
    }

    #[test]
    fn test_generic_requires_explicit_server() {
        let err = resolve_server(EmailProvider::Generic, Protocol::Imap, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingConfiguration);

        let explicit = ServerConfig {
            host: "mail.example.org".into(),
            port: 143,
            encryption: Encryption::StartTls,
        };
        let resolved =
            resolve_server(EmailProvider::Generic, Protocol::Imap, Some(&explicit)).unwrap();
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn test_recommended_protocol() {
        assert_eq!(recommended_protocol(EmailProvider::Gmail), Protocol::GmailApi);
        assert_eq!(recommended_protocol(EmailProvider::Outlook), Protocol::Graph);
        assert_eq!(recommended_protocol(EmailProvider::Netease163), Protocol::Imap);
        let infos = provider_infos();
        assert_eq!(infos.len(), 6);
        assert!(infos.iter().any(|i| i.requires_server));
    }

    #[test]
    fn test_factory_dispatches_on_protocol() {
        let factory = DefaultProviderFactory::default();
        let adapter = factory
            .create(config(EmailProvider::Gmail, Protocol::GmailApi))
            .unwrap();
        assert_eq!(adapter.protocol(), Protocol::GmailApi);
        assert_eq!(adapter.provider_type(), EmailProvider::Gmail);

        let adapter = factory
            .create(config(EmailProvider::Qq, Protocol::Pop3))
            .unwrap();
        assert_eq!(adapter.protocol(), Protocol::Pop3);

        assert!(factory
            .create(config(EmailProvider::Icloud, Protocol::Graph))
            .is_err());
    }
}
