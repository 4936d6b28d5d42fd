use std::path::Path;
use std::sync::OnceLock;

use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailFusionResult;
use crate::modules::logger::LocalTimer;
use crate::raise_error;

/// Keeps the non-blocking writer flushing until the process exits.
pub static LOG_WORKER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn setup_file_logger(
    level: Level,
    with_ansi: bool,
    max_files: usize,
    log_dir: &Path,
) -> MailFusionResult<Result<(), tracing::dispatcher::SetGlobalDefaultError>> {
    let (server_nonb, server_guard) = server_log_writer(max_files, log_dir)?;
    if LOG_WORKER_GUARD.set(server_guard).is_err() {
        return Err(raise_error!(
            "File logging is already initialized".into(),
            ErrorCode::MethodNotAllowed
        ));
    }

    let server_layer = fmt::layer()
        .with_timer(LocalTimer)
        .with_ansi(with_ansi)
        .with_level(true)
        .with_writer(server_nonb)
        .with_target(true);

    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(server_layer);

    Ok(tracing::subscriber::set_global_default(subscriber))
}

fn server_log_writer(
    max_files: usize,
    log_dir: &Path,
) -> MailFusionResult<(NonBlocking, WorkerGuard)> {
    let rolling = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("server")
        .max_log_files(max_files)
        .build(log_dir)
        .map_err(|e| {
            raise_error!(
                format!("Failed to initialize rolling file appender in {:?}: {}", log_dir, e),
                ErrorCode::InternalError
            )
        })?;
    Ok(tracing_appender::non_blocking(rolling))
}
