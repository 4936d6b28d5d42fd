// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::adapter::session::SessionStream;
use crate::modules::common::proxy::{ProxyConfig, ProxyType};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::utils::tls::establish_tls_stream;
use crate::raise_error;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_io_timeout::TimeoutStream;
use tokio_socks::tcp::Socks5Stream;
use tracing::{debug, error};

pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const IO_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) async fn establish_tcp_connection_with_timeout(
    host: &str,
    port: u16,
    proxy: Option<&ProxyConfig>,
) -> MailFusionResult<Pin<Box<TimeoutStream<TcpStream>>>> {
    let tcp_stream = connect_with_optional_proxy(host, port, proxy).await?;

    tcp_stream
        .set_nodelay(true)
        .map_err(|e| raise_error!(e.to_string(), ErrorCode::NetworkError))?;

    let mut timeout_stream = TimeoutStream::new(tcp_stream);
    timeout_stream.set_write_timeout(Some(IO_TIMEOUT));
    timeout_stream.set_read_timeout(Some(IO_TIMEOUT));

    Ok(Box::pin(timeout_stream))
}

pub(crate) async fn establish_tls_connection(
    host: &str,
    port: u16,
    alpn_protocols: &[&str],
    proxy: Option<&ProxyConfig>,
) -> MailFusionResult<Box<dyn SessionStream>> {
    let tcp_stream = establish_tcp_connection_with_timeout(host, port, proxy).await?;
    establish_tls_stream(host, alpn_protocols, tcp_stream).await
}

fn timeout_error(target: &str) -> crate::modules::error::MailFusionError {
    error!(
        "Connection to {} timed out after {}s",
        target,
        CONNECT_TIMEOUT.as_secs()
    );
    raise_error!(
        format!(
            "Connection to {} timed out after {}s",
            target,
            CONNECT_TIMEOUT.as_secs()
        ),
        ErrorCode::ConnectionTimeout
    )
}

async fn connect_with_optional_proxy(
    host: &str,
    port: u16,
    proxy: Option<&ProxyConfig>,
) -> MailFusionResult<TcpStream> {
    let target = format!("{}:{}", host, port);
    let Some(proxy) = ProxyConfig::active(proxy) else {
        debug!("Opening direct TCP connection to {}", target);
        return timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| timeout_error(&target))?
            .map_err(|e| {
                raise_error!(
                    format!("TCP connection to {} failed: {}", target, e),
                    ErrorCode::NetworkError
                )
            });
    };

    debug!(
        "Opening TCP connection to {} via {:?} proxy {}:{}",
        target, proxy.proxy_type, proxy.host, proxy.port
    );
    let proxy_addr = (proxy.host.as_str(), proxy.port);
    match proxy.proxy_type {
        ProxyType::Socks5 => {
            let connecting = async {
                match (&proxy.username, &proxy.password) {
                    (Some(user), Some(pass)) if !user.is_empty() => {
                        Socks5Stream::connect_with_password(proxy_addr, (host, port), user, pass)
                            .await
                    }
                    _ => Socks5Stream::connect(proxy_addr, (host, port)).await,
                }
            };
            timeout(CONNECT_TIMEOUT, connecting)
                .await
                .map_err(|_| timeout_error(&target))?
                .map(|s| s.into_inner())
                .map_err(|e| {
                    raise_error!(
                        format!("SOCKS5 connection to {} failed: {}", target, e),
                        ErrorCode::NetworkError
                    )
                })
        }
        ProxyType::Http => timeout(CONNECT_TIMEOUT, http_connect_tunnel(proxy, host, port))
            .await
            .map_err(|_| timeout_error(&target))?,
    }
}

/// Opens a raw tunnel through an HTTP proxy with `CONNECT`.
async fn http_connect_tunnel(
    proxy: &ProxyConfig,
    host: &str,
    port: u16,
) -> MailFusionResult<TcpStream> {
    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port))
        .await
        .map_err(|e| {
            raise_error!(
                format!("Failed to reach HTTP proxy {}:{}: {}", proxy.host, proxy.port, e),
                ErrorCode::NetworkError
            )
        })?;

    let mut request = format!(
        "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\nProxy-Connection: Keep-Alive\r\n"
    );
    if let (Some(user), Some(pass)) = (&proxy.username, &proxy.password) {
        let token = crate::modules::utils::base64_standard(format!("{user}:{pass}").as_bytes());
        request.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| raise_error!(e.to_string(), ErrorCode::NetworkError))?;

    // Read the proxy response headers byte by byte so no tunneled data is consumed.
    let mut response = Vec::with_capacity(128);
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| raise_error!(e.to_string(), ErrorCode::NetworkError))?;
        if n == 0 || response.len() > 8192 {
            return Err(raise_error!(
                "HTTP proxy closed the connection during CONNECT".into(),
                ErrorCode::NetworkError
            ));
        }
        response.push(byte[0]);
    }

    let status_line = String::from_utf8_lossy(&response);
    let status_ok = status_line
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(|code| code == "200")
        .unwrap_or(false);
    if !status_ok {
        return Err(raise_error!(
            format!(
                "HTTP proxy refused CONNECT to {}:{}: {}",
                host,
                port,
                status_line.lines().next().unwrap_or_default()
            ),
            ErrorCode::NetworkError
        ));
    }
    Ok(stream)
}
