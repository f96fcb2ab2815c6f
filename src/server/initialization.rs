// src/server/initialization.rs

//! Handles the complete startup sequence: database, shared state, event
//! handler wiring, cron recovery and the boot-time crash check.

use crate::config::Settings;
use crate::core::cron::jobs::{BackupJob, RestartServerJob};
use crate::core::cron::params::{BACKUP_IDENTIFIER, RESTART_SERVER_IDENTIFIER};
use crate::core::cron::{CronManager, CronRegistry};
use crate::core::db;
use crate::core::dns::{DnsManager, ReconcileOnServerCreated, ReconcileOnServerRemoved};
use crate::core::dynamic_config::DynamicConfigManager;
use crate::core::events::EventDispatcher;
use crate::core::instance::DockerMcManager;
use crate::core::log_monitor::parser::LogParser;
use crate::core::log_monitor::{LogMonitor, UnwatchRemovedServers, WatchCreatedServers};
use crate::core::players::heartbeat::HeartbeatTask;
use crate::core::players::identity::IdentityTracker;
use crate::core::players::mojang::MojangClient;
use crate::core::players::reconciler::RconReconciler;
use crate::core::players::sessions::SessionTracker;
use crate::core::players::skins::{SkinFetcher, SkinUpdater};
use crate::core::players::{PlayerDirectory, chat::ChatTracker};
use crate::core::server_tracker::ServerTracker;
use crate::core::snapshots::ResticManager;
use crate::core::state::AppState;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, reload};

/// Everything `server::run` needs after setup: the shared state plus the
/// task structs the spawner consumes.
pub struct ServerContext {
    pub state: Arc<AppState>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<()>,
    pub heartbeat: Option<HeartbeatTask>,
    pub reconciler: Option<Arc<RconReconciler>>,
    pub server_tracker: Option<ServerTracker>,
}

/// Initializes all components before the HTTP listener starts.
pub async fn setup(
    settings: Settings,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<ServerContext> {
    let settings = Arc::new(settings);
    let (shutdown_tx, _) = broadcast::channel(1);

    let pool = db::connect(&settings.database_url).await?;
    let dynamic_config = Arc::new(DynamicConfigManager::initialize(pool.clone()).await?);
    let dispatcher = Arc::new(EventDispatcher::new());
    let docker = Arc::new(DockerMcManager::new(&settings.servers_path));

    // Log pipeline.
    let parser = Arc::new(LogParser::new(dynamic_config.clone()));
    let log_monitor = Arc::new(LogMonitor::new(dispatcher.clone(), parser));
    dispatcher.on_server_created(Arc::new(WatchCreatedServers {
        monitor: log_monitor.clone(),
        docker: docker.clone(),
    }));
    dispatcher.on_server_removed(Arc::new(UnwatchRemovedServers {
        monitor: log_monitor.clone(),
    }));

    // Player tracker collaborators.
    let directory = Arc::new(PlayerDirectory::new(pool.clone(), MojangClient::new()));
    IdentityTracker::new(directory.clone(), dispatcher.clone()).register(&dispatcher);
    SessionTracker::new(directory.clone()).register(&dispatcher);
    ChatTracker::new(directory.clone()).register(&dispatcher);
    SkinUpdater::new(pool.clone(), SkinFetcher::new(dynamic_config.clone())).register(&dispatcher);

    let reconciler = RconReconciler::new(
        pool.clone(),
        docker.clone(),
        dispatcher.clone(),
        dynamic_config.clone(),
    );
    reconciler.register(&dispatcher);

    // Cron engine: explicit registration, then recovery of stored jobs.
    let mut registry = CronRegistry::new();
    registry.register(
        BACKUP_IDENTIFIER,
        "Create a backup snapshot and prune old ones",
        Arc::new(BackupJob::new(settings.clone(), docker.clone())),
    );
    registry.register(
        RESTART_SERVER_IDENTIFIER,
        "Restart a running server",
        Arc::new(RestartServerJob::new(docker.clone())),
    );
    let cron = CronManager::new(pool.clone(), Arc::new(registry), settings.cron_timezone());
    cron.recover_from_database().await?;

    // DNS reconciler reacts to instance churn.
    let dns = DnsManager::new(docker.clone(), dynamic_config.clone());
    dispatcher.on_server_created(Arc::new(ReconcileOnServerCreated { dns: dns.clone() }));
    dispatcher.on_server_removed(Arc::new(ReconcileOnServerRemoved { dns: dns.clone() }));

    let restic = settings
        .restic
        .as_ref()
        .map(|r| Arc::new(ResticManager::new(r.repository.clone(), r.password.clone())));
    if restic.is_none() {
        info!("Restic is not configured; snapshot endpoints are disabled");
    }

    // First filesystem↔DB reconcile, then watch everything already on disk.
    let server_tracker = ServerTracker::new(pool.clone(), docker.clone(), dispatcher.clone());
    server_tracker.sync_once().await?;
    for name in docker.list_instance_ids().await? {
        let instance = docker.get_instance(&name);
        if instance.exists().await.unwrap_or(false) {
            log_monitor.watch_server(&name, instance.log_path());
        }
    }

    // Crash detection runs once, before the heartbeat loop starts
    // overwriting the stored timestamp.
    let heartbeat = HeartbeatTask::new(pool.clone(), dynamic_config.clone(), dispatcher.clone());
    if let Err(e) = heartbeat.check_crash_on_startup().await {
        warn!("Crash check failed: {e}");
    }

    let state = Arc::new(AppState {
        settings,
        db: pool,
        dispatcher,
        docker,
        dynamic_config,
        log_monitor,
        cron,
        dns,
        restic,
        log_reload_handle,
    });

    info!("Server state initialized.");

    Ok(ServerContext {
        state,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        heartbeat: Some(heartbeat),
        reconciler: Some(reconciler),
        server_tracker: Some(server_tracker),
    })
}
