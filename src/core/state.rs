// src/core/state.rs

//! The central `AppState` struct, holding all shared components.
//!
//! Composed once in `server::initialization`; no component is reachable
//! through a global. Wrapped in an `Arc` and handed to every task and HTTP
//! handler.

use crate::config::Settings;
use crate::core::cron::{CronManager, RestartScheduler};
use crate::core::dns::DnsManager;
use crate::core::dynamic_config::DynamicConfigManager;
use crate::core::events::EventDispatcher;
use crate::core::instance::DockerMcManager;
use crate::core::log_monitor::LogMonitor;
use crate::core::snapshots::ResticManager;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing_subscriber::{filter::EnvFilter, reload};

/// The shared application state.
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: SqlitePool,
    pub dispatcher: Arc<EventDispatcher>,
    pub docker: Arc<DockerMcManager>,
    pub dynamic_config: Arc<DynamicConfigManager>,
    pub log_monitor: Arc<LogMonitor>,
    pub cron: Arc<CronManager>,
    pub dns: Arc<DnsManager>,
    /// Present only when a restic repository is configured.
    pub restic: Option<Arc<ResticManager>>,
    /// Handle for changing the log filter at runtime.
    pub log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
}

impl AppState {
    /// The restart slot finder bound to this state's cron manager and
    /// configured start time.
    pub fn restart_scheduler(&self) -> RestartScheduler {
        RestartScheduler::new(self.cron.clone(), self.settings.restart_start())
    }
}
