// src/core/players/reconciler.rs

//! Periodically rectifies the DB notion of "online" against the in-game
//! player list, via synthetic join/leave events.
//!
//! Runs on a timer and once more after crash recovery. Each server is
//! validated independently; an RCON failure on one never blocks the others.

use super::crud;
use crate::core::dynamic_config::DynamicConfigManager;
use crate::core::errors::McAdminError;
use crate::core::events::{
    EventDispatcher, EventHandler, PlayerJoined, PlayerLeft, SystemCrashDetected,
};
use crate::core::instance::{DockerMcManager, McServerStatus};
use crate::core::server_tracker;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub struct RconReconciler {
    pool: SqlitePool,
    docker: Arc<DockerMcManager>,
    dispatcher: Arc<EventDispatcher>,
    config: Arc<DynamicConfigManager>,
}

impl RconReconciler {
    pub fn new(
        pool: SqlitePool,
        docker: Arc<DockerMcManager>,
        dispatcher: Arc<EventDispatcher>,
        config: Arc<DynamicConfigManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            docker,
            dispatcher,
            config,
        })
    }

    pub fn register(self: &Arc<Self>, dispatcher: &EventDispatcher) {
        dispatcher.on_system_crash_detected(self.clone());
    }

    /// The periodic reconcile loop. Validates once at start, then on every
    /// interval.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("RCON reconciler started");
        loop {
            if let Err(e) = self.reconcile_all_servers().await {
                error!("Error in RCON reconcile loop: {e}");
            }
            let interval = self.config.players().rcon_reconcile.interval_seconds;
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("RCON reconciler shutting down");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
            }
        }
    }

    pub async fn reconcile_all_servers(&self) -> Result<(), McAdminError> {
        let active_servers = server_tracker::get_active_servers_map(&self.pool).await?;
        for (server_id, server_db_id) in active_servers {
            // One server failing must not block the rest.
            if let Err(e) = self.reconcile_server(&server_id, server_db_id).await {
                error!("Error reconciling server {server_id}: {e}");
            }
        }
        Ok(())
    }

    async fn reconcile_server(
        &self,
        server_id: &str,
        server_db_id: i64,
    ) -> Result<(), McAdminError> {
        let instance = self.docker.get_instance(server_id);

        if instance.status().await? != McServerStatus::Healthy {
            debug!("Server {server_id} is not healthy, skipping reconcile");
            return Ok(());
        }

        let query_config = self.config.players().query.clone();
        let rcon_online: HashSet<String> = match instance.list_players(&query_config).await {
            Ok(players) => players.into_iter().collect(),
            Err(e) => {
                warn!("Failed to get player list from {server_id}: {e}");
                return Ok(());
            }
        };

        let db_online: HashSet<String> =
            crud::get_online_player_names_on_server(&self.pool, server_db_id)
                .await?
                .into_iter()
                .collect();

        let falsely_online: Vec<&String> = db_online.difference(&rcon_online).collect();
        let falsely_offline: Vec<&String> = rcon_online.difference(&db_online).collect();

        if !falsely_online.is_empty() {
            warn!(
                "Correcting {} falsely online players on {server_id}: {falsely_online:?}",
                falsely_online.len()
            );
            for player_name in &falsely_online {
                self.dispatcher
                    .dispatch_player_left(PlayerLeft::now(
                        server_id,
                        player_name.as_str(),
                        "Reconciled against in-game list",
                    ))
                    .await;
            }
        }

        if !falsely_offline.is_empty() {
            warn!(
                "Correcting {} falsely offline players on {server_id}: {falsely_offline:?}",
                falsely_offline.len()
            );
            for player_name in &falsely_offline {
                self.dispatcher
                    .dispatch_player_joined(PlayerJoined::now(server_id, player_name.as_str()))
                    .await;
            }
        }

        debug!(
            "Reconciled {server_id}: {} online, {} marked offline, {} marked online",
            rcon_online.len(),
            falsely_online.len(),
            falsely_offline.len()
        );
        Ok(())
    }
}

#[async_trait]
impl EventHandler<SystemCrashDetected> for RconReconciler {
    fn name(&self) -> &'static str {
        "reconciler.crash_detected"
    }

    async fn handle(&self, _event: SystemCrashDetected) -> Result<(), McAdminError> {
        info!("Running RCON reconcile after crash recovery");
        self.reconcile_all_servers().await
    }
}
