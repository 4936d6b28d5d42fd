use chrono::Local;
use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::mailfusion_version;
use crate::modules::context::AppContext;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct ServiceStatus {
    /// The service uptime in milliseconds since it started.
    pub uptime_ms: i64,
    /// The timezone offset the service runs in (e.g., "+08:00").
    pub timezone: String,
    pub version: String,
    /// Whether the periodic sync ticker is running.
    pub scheduler_running: bool,
    pub event_bus_running: bool,
}

impl ServiceStatus {
    pub async fn get(context: &AppContext) -> Self {
        Self {
            uptime_ms: context.uptime_ms(),
            timezone: Local::now().offset().to_string(),
            version: mailfusion_version!().into(),
            scheduler_running: context.sync.is_running().await,
            event_bus_running: context.bus.is_running().await,
        }
    }
}
