// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::{Arc, LazyLock};

use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use tokio_rustls::TlsConnector;

use crate::modules::adapter::session::SessionStream;
use crate::modules::error::{code::ErrorCode, MailFusionResult};
use crate::raise_error;

static WEBPKI_ROOTS: LazyLock<Arc<RootCertStore>> = LazyLock::new(|| {
    Arc::new(RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.into(),
    })
});

fn connector(alpn_protocols: &[&str]) -> TlsConnector {
    let mut config = ClientConfig::builder()
        .with_root_certificates(WEBPKI_ROOTS.clone())
        .with_no_client_auth();
    config.alpn_protocols = alpn_protocols.iter().map(|p| p.as_bytes().to_vec()).collect();
    TlsConnector::from(Arc::new(config))
}

fn server_name(hostname: &str) -> MailFusionResult<ServerName<'static>> {
    ServerName::try_from(hostname.to_string()).map_err(|_| {
        raise_error!(
            format!("'{}' is not a valid TLS server name", hostname),
            ErrorCode::InvalidParameter
        )
    })
}

/// Wraps an open stream (plain TCP or a proxy tunnel) in client-side TLS.
pub async fn establish_tls_stream(
    server_hostname: &str,
    alpn_protocols: &[&str],
    stream: impl SessionStream + 'static,
) -> MailFusionResult<Box<dyn SessionStream>> {
    let name = server_name(server_hostname)?;
    let tls_stream = connector(alpn_protocols)
        .connect(name, stream)
        .await
        .map_err(|e| {
            raise_error!(
                format!("TLS handshake with {} failed: {}", server_hostname, e),
                ErrorCode::TlsHandshakeFailed
            )
        })?;
    Ok(Box::new(tls_stream))
}
