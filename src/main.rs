use std::path::PathBuf;

use mimalloc::MiMalloc;
use modules::{
    common::{rustls::MailFusionTls, signal::SignalManager},
    context::{AppContext, ContextConfig, Initialize},
    database::manager::{DatabaseLocation, DatabaseManager},
    error::MailFusionResult,
    logger,
    rest::{start_http_server, HttpConfig},
    settings::{cli::SETTINGS, dir::DataDirManager},
};
use tracing::{error, info};

mod modules;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

static LOGO: &str = r#"
  __  __       _ _ _____          _
 |  \/  | __ _(_) |  ___|   _ ___(_) ___  _ __
 | |\/| |/ _` | | | |_ | | | / __| |/ _ \| '_ \
 | |  | | (_| | | |  _|| |_| \__ \ | (_) | | | |
 |_|  |_|\__,_|_|_|_|   \__,_|___/_|\___/|_| |_|
"#;

#[tokio::main]
async fn main() -> MailFusionResult<()> {
    let dirs = DataDirManager::new(PathBuf::from(&SETTINGS.mailfusion_root_dir));
    dirs.ensure_dirs()?;
    if let Err(error) = logger::initialize_logging(&SETTINGS, &dirs.log_dir) {
        eprintln!("{:?}", error);
        return Err(error);
    }
    info!("{}", LOGO);
    info!("Starting mailfusion-server");
    info!("Version:  {}", mailfusion_version!());

    MailFusionTls::initialize().await?;
    let signals = SignalManager::new();
    signals.listen();

    let location = if SETTINGS.mailfusion_metadata_memory_mode_enabled {
        DatabaseLocation::Memory
    } else {
        DatabaseLocation::File(dirs.meta_db.clone())
    };
    let database = DatabaseManager::open(location)?;
    let context = AppContext::build(
        ContextConfig::from_settings(&SETTINGS),
        database,
        signals.clone(),
    )
    .await?;

    if let Err(error) = context.start().await {
        error!("Failed to start background services: {:?}", error);
        context.shutdown().await;
        return Err(error);
    }

    let http = HttpConfig {
        bind_ip: SETTINGS
            .mailfusion_bind_ip
            .clone()
            .unwrap_or_else(|| "0.0.0.0".into()),
        port: SETTINGS.mailfusion_http_port as u16,
    };
    let served = start_http_server(http, context.clone(), context.signals.subscribe()).await;
    if let Err(e) = &served {
        error!("REST server stopped with an error: {:?}", e);
    }

    context.shutdown().await;
    info!("mailfusion-server exited");
    served
}
