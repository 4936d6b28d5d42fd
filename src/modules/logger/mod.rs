use std::path::Path;

use chrono::Local;
use tracing::Level;
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::logger::file::setup_file_logger;
use crate::modules::settings::cli::Settings;
use crate::raise_error;

mod file;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Installs the global subscriber: stdout, or a daily rolling file under `log_dir`.
pub fn initialize_logging(settings: &Settings, log_dir: &Path) -> MailFusionResult<()> {
    let level = parse_log_level(&settings.mailfusion_log_level)?;
    let installed = if settings.mailfusion_log_to_file {
        setup_file_logger(
            level,
            settings.mailfusion_ansi_logs,
            settings.mailfusion_max_server_log_files,
            log_dir,
        )?
    } else {
        setup_stdout_logger(level, settings.mailfusion_ansi_logs)
    };
    installed.map_err(|e| {
        raise_error!(
            format!("Failed to install the log subscriber: {}", e),
            ErrorCode::InternalError
        )
    })
}

fn setup_stdout_logger(
    level: Level,
    with_ansi: bool,
) -> Result<(), tracing::dispatcher::SetGlobalDefaultError> {
    let format = tracing_subscriber::fmt::format()
        .with_level(true)
        .with_target(true)
        .with_timer(LocalTimer);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(with_ansi)
        .with_writer(std::io::stdout)
        .event_format(format)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

fn parse_log_level(value: &str) -> MailFusionResult<Level> {
    value.parse::<Level>().map_err(|_| {
        raise_error!(
            format!(
                "Invalid log level 'mailfusion_log_level'='{}'. Use one of: error, warn, info, debug, trace.",
                value
            ),
            ErrorCode::InvalidParameter
        )
    })
}
