use std::collections::HashMap;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::modules::error::{code::ErrorCode, MailFusionError, MailFusionResult};
use crate::raise_error;

fn io_error(e: std::io::Error) -> MailFusionError {
    raise_error!(format!("POP3 I/O error: {}", e), ErrorCode::NetworkError)
}

/// Minimal RFC 1939 client: the commands a read-only sync needs, plus STLS.
pub struct Pop3Client<S> {
    stream: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Pop3Client<S> {
    /// Wraps a fresh connection and consumes the server greeting.
    pub async fn new(stream: S) -> MailFusionResult<Self> {
        let mut client = Self::upgraded(stream);
        let greeting = client.read_status().await?;
        debug!("POP3 greeting: {}", greeting);
        Ok(client)
    }

    /// Wraps a stream that already went through the greeting, as after STLS.
    pub fn upgraded(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    async fn read_line(&mut self) -> MailFusionResult<Vec<u8>> {
        let mut line = Vec::new();
        let n = self
            .stream
            .read_until(b'\n', &mut line)
            .await
            .map_err(io_error)?;
        if n == 0 {
            return Err(raise_error!(
                "POP3 server closed the connection".into(),
                ErrorCode::NetworkError
            ));
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        Ok(line)
    }

    /// Reads a status line and returns the text after `+OK`.
    async fn read_status(&mut self) -> MailFusionResult<String> {
        let line = self.read_line().await?;
        let line = String::from_utf8_lossy(&line).to_string();
        parse_status(&line)
    }

    async fn send(&mut self, command: &str) -> MailFusionResult<()> {
        let stream = self.stream.get_mut();
        stream
            .write_all(format!("{}\r\n", command).as_bytes())
            .await
            .map_err(io_error)?;
        stream.flush().await.map_err(io_error)
    }

    async fn command(&mut self, command: &str) -> MailFusionResult<String> {
        self.send(command).await?;
        self.read_status().await
    }

    /// Reads a dot-terminated block, undoing byte-stuffing.
    async fn read_multiline(&mut self) -> MailFusionResult<Vec<u8>> {
        let mut body = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == b"." {
                return Ok(body);
            }
            body.extend_from_slice(unstuff(&line));
            body.extend_from_slice(b"\r\n");
        }
    }

    pub async fn login(&mut self, user: &str, password: &str) -> MailFusionResult<()> {
        self.command(&format!("USER {}", user))
            .await
            .map_err(auth_error)?;
        self.send(&format!("PASS {}", password)).await?;
        self.read_status().await.map_err(auth_error)?;
        Ok(())
    }

    /// `(message count, maildrop size in octets)`.
    pub async fn stat(&mut self) -> MailFusionResult<(u32, u64)> {
        let reply = self.command("STAT").await?;
        parse_stat(&reply)
    }

    /// Message number to unique id. `None` when the server lacks UIDL.
    pub async fn uidl(&mut self) -> MailFusionResult<Option<HashMap<u32, String>>> {
        self.send("UIDL").await?;
        let line = self.read_line().await?;
        if !line.starts_with(b"+OK") {
            debug!("POP3 server does not support UIDL");
            return Ok(None);
        }
        let listing = self.read_multiline().await?;
        let map = String::from_utf8_lossy(&listing)
            .lines()
            .filter_map(parse_uidl_line)
            .collect();
        Ok(Some(map))
    }

    pub async fn retr(&mut self, number: u32) -> MailFusionResult<Vec<u8>> {
        self.command(&format!("RETR {}", number)).await?;
        self.read_multiline().await
    }

    pub async fn stls(&mut self) -> MailFusionResult<()> {
        self.command("STLS").await.map(|_| ())
    }

    pub async fn quit(&mut self) -> MailFusionResult<()> {
        self.command("QUIT").await.map(|_| ())
    }
}

fn auth_error(e: MailFusionError) -> MailFusionError {
    if e.code() == ErrorCode::Pop3CommandFailed {
        raise_error!(
            format!("POP3 login rejected: {}", e.message()),
            ErrorCode::AuthenticationFailed
        )
    } else {
        e
    }
}

pub fn parse_status(line: &str) -> MailFusionResult<String> {
    if let Some(rest) = line.strip_prefix("+OK") {
        Ok(rest.trim().to_string())
    } else if let Some(rest) = line.strip_prefix("-ERR") {
        Err(raise_error!(
            format!("POP3 server replied -ERR {}", rest.trim()),
            ErrorCode::Pop3CommandFailed
        ))
    } else {
        Err(raise_error!(
            format!("Unexpected POP3 response: {}", line),
            ErrorCode::Pop3CommandFailed
        ))
    }
}

pub fn parse_stat(reply: &str) -> MailFusionResult<(u32, u64)> {
    let mut parts = reply.split_whitespace();
    let count = parts.next().and_then(|c| c.parse().ok());
    let size = parts.next().and_then(|s| s.parse().ok());
    match (count, size) {
        (Some(count), Some(size)) => Ok((count, size)),
        _ => Err(raise_error!(
            format!("Malformed STAT reply: {}", reply),
            ErrorCode::Pop3CommandFailed
        )),
    }
}

pub fn parse_uidl_line(line: &str) -> Option<(u32, String)> {
    let mut parts = line.split_whitespace();
    let number = parts.next()?.parse().ok()?;
    let uid = parts.next()?;
    Some((number, uid.to_string()))
}

fn unstuff(line: &[u8]) -> &[u8] {
    if line.starts_with(b"..") {
        &line[1..]
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn scripted_server(stream: tokio::io::DuplexStream) {
        let (read, mut write) = tokio::io::split(stream);
        let mut reader = BufReader::new(read);
        write.write_all(b"+OK ready\r\n").await.unwrap();
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                return;
            }
            let reply: &[u8] = match line.trim_end() {
                "USER alice" => b"+OK\r\n",
                "PASS secret" => b"+OK logged in\r\n",
                "PASS wrong" => b"-ERR invalid password\r\n",
                "STAT" => b"+OK 2 320\r\n",
                "UIDL" => b"+OK\r\n1 aaa\r\n2 bbb\r\n.\r\n",
                "RETR 2" => b"+OK 120 octets\r\nSubject: Hi\r\n\r\n..hidden dot\r\nbody\r\n.\r\n",
                "RETR 9" => b"-ERR no such message\r\n",
                "QUIT" => b"+OK bye\r\n",
                _ => b"-ERR unknown\r\n",
            };
            write.write_all(reply).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_session_against_scripted_server() {
        let (client_side, server_side) = duplex(4096);
        tokio::spawn(scripted_server(server_side));

        let mut client = Pop3Client::new(client_side).await.unwrap();
        client.login("alice", "secret").await.unwrap();
        assert_eq!(client.stat().await.unwrap(), (2, 320));

        let uids = client.uidl().await.unwrap().unwrap();
        assert_eq!(uids.get(&2).map(String::as_str), Some("bbb"));

        let raw = client.retr(2).await.unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.contains("\r\n.hidden dot\r\n"));
        assert!(text.starts_with("Subject: Hi\r\n"));

        let err = client.retr(9).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Pop3CommandFailed);
        client.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_password_is_auth_error() {
        let (client_side, server_side) = duplex(4096);
        tokio::spawn(scripted_server(server_side));
        let mut client = Pop3Client::new(client_side).await.unwrap();
        let err = client.login("alice", "wrong").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthenticationFailed);
    }

    #[test]
    fn test_reply_parsing() {
        assert_eq!(parse_stat("3 1024").unwrap(), (3, 1024));
        assert!(parse_stat("x").is_err());
        assert_eq!(parse_uidl_line("4 XYZ"), Some((4, "XYZ".to_string())));
        assert_eq!(parse_uidl_line("garbage"), None);
        assert_eq!(parse_status("+OK hello").unwrap(), "hello");
        assert!(parse_status("-ERR nope").is_err());
    }
}
