// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use clap::{builder::ValueParser, Parser};
use std::{path::PathBuf, sync::LazyLock};
use url::Url;

#[cfg(not(test))]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::parse);

#[cfg(test)]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::new_for_test);

#[derive(Debug, Parser)]
#[clap(
    name = "mailfusion",
    about = "Ingests mail from IMAP, POP3, Gmail and Microsoft Graph accounts into one store,
    then drives rules and webhooks from the resulting events.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// mailfusion log level (default: "info")
    #[clap(
        long,
        default_value = "info",
        env,
        help = "Set the log level for mailfusion"
    )]
    pub mailfusion_log_level: String,

    /// mailfusion HTTP port (default: 15730)
    #[clap(
        long,
        default_value = "15730",
        env,
        help = "Set the HTTP port for mailfusion"
    )]
    pub mailfusion_http_port: i32,

    #[clap(
        long,
        env,
        default_value = "0.0.0.0",
        help = "The IPv4 address the REST server binds to (e.g., 192.168.1.1)",
        value_parser = ValueParser::new(|s: &str| {
            if s.parse::<std::net::Ipv4Addr>().is_err() {
                return Err("The bind IP address must be a valid IPv4 address.".to_string());
            }
            Ok(s.to_string())
        })
    )]
    pub mailfusion_bind_ip: Option<String>,

    /// Enable ANSI logs (default: true)
    #[clap(long, default_value = "true", env, help = "Enable ANSI formatted logs")]
    pub mailfusion_ansi_logs: bool,

    /// If false, logs will be printed to stdout
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable log file output (otherwise logs go to stdout)"
    )]
    pub mailfusion_log_to_file: bool,

    #[clap(
        long,
        default_value = "5",
        env,
        help = "Set the maximum number of server log files"
    )]
    pub mailfusion_max_server_log_files: usize,

    /// Passphrase for credential encryption. Also read from `ENCRYPTION_KEY`.
    #[clap(
        long,
        default_value = "change-this-default-password-now",
        env = "ENCRYPTION_KEY",
        help = "Set the encryption password for stored credentials. Change this default in production!"
    )]
    pub mailfusion_encrypt_password: String,

    #[clap(
        long,
        env,
        help = "Set the data directory for mailfusion (database and logs)",
        value_parser = ValueParser::new(|s: &str| {
            let path = PathBuf::from(s);
            if !path.is_absolute() {
                return Err("Path must be an absolute directory path".to_string());
            }
            if path.exists() && !path.is_dir() {
                return Err(format!("Path {:?} is not a directory", path));
            }
            Ok(s.to_string())
        })
    )]
    pub mailfusion_root_dir: String,

    #[clap(
        long,
        env,
        default_value = "300",
        help = "Interval in seconds between scheduled sync ticks (minimum: 10)",
        value_parser = clap::value_parser!(u64).range(10..)
    )]
    pub mailfusion_sync_tick_interval_sec: u64,

    #[clap(
        long,
        env,
        default_value = "1000",
        help = "Maximum number of messages fetched per account sync",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub mailfusion_sync_fetch_cap: u32,

    #[clap(
        long,
        env,
        default_value = "8",
        help = "Maximum number of account syncs running at the same time",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub mailfusion_sync_concurrency: u16,

    #[clap(
        long,
        env,
        default_value = "30",
        help = "Timeout in seconds for a single event handler invocation",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub mailfusion_handler_timeout_sec: u64,

    #[clap(
        long,
        env,
        default_value = "10",
        help = "Timeout in seconds for one webhook HTTP request",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub mailfusion_webhook_timeout_sec: u64,

    #[clap(
        long,
        env,
        default_value = "false",
        help = "Keep metadata in memory only (data is lost on restart)"
    )]
    pub mailfusion_metadata_memory_mode_enabled: bool,

    /// When unset, events travel through an in-process broker.
    #[clap(
        long,
        env,
        help = "NATS server URL used as the event broker (e.g., nats://127.0.0.1:4222)",
        value_parser = ValueParser::new(|s: &str| -> Result<String, String> {
            Url::parse(s).map_err(|_| format!("Invalid NATS URL: {}", s))?;
            Ok(s.to_string())
        })
    )]
    pub mailfusion_nats_url: Option<String>,

    #[clap(long, env, help = "Token used to authenticate with the NATS server")]
    pub mailfusion_nats_token: Option<String>,
}

impl Settings {
    #[cfg(test)]
    fn new_for_test() -> Self {
        Self {
            mailfusion_log_level: "info".to_string(),
            mailfusion_http_port: 15730,
            mailfusion_bind_ip: Default::default(),
            mailfusion_ansi_logs: false,
            mailfusion_log_to_file: false,
            mailfusion_max_server_log_files: 5,
            mailfusion_encrypt_password: "change-this-default-password-now".into(),
            mailfusion_root_dir: std::env::temp_dir()
                .join("mailfusion_data")
                .to_string_lossy()
                .into_owned(),
            mailfusion_sync_tick_interval_sec: 300,
            mailfusion_sync_fetch_cap: 1000,
            mailfusion_sync_concurrency: 8,
            mailfusion_handler_timeout_sec: 30,
            mailfusion_webhook_timeout_sec: 10,
            mailfusion_metadata_memory_mode_enabled: true,
            mailfusion_nats_url: None,
            mailfusion_nats_token: None,
        }
    }
}
