// src/core/players/heartbeat.rs

//! System heartbeat and crash recovery.
//!
//! A single row is refreshed every heartbeat interval. At boot, a stale
//! heartbeat means the previous process died without closing sessions; the
//! recovery pass synthesizes `PlayerLeft` events stamped with the last
//! heartbeat so durations stay honest, then announces the crash.

use super::crud;
use crate::core::dynamic_config::DynamicConfigManager;
use crate::core::errors::McAdminError;
use crate::core::events::{EventDispatcher, PlayerLeft, SystemCrashDetected};
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub struct HeartbeatTask {
    pool: SqlitePool,
    config: Arc<DynamicConfigManager>,
    dispatcher: Arc<EventDispatcher>,
}

impl HeartbeatTask {
    pub fn new(
        pool: SqlitePool,
        config: Arc<DynamicConfigManager>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            pool,
            config,
            dispatcher,
        }
    }

    /// Boot-time crash check. Runs once, before the heartbeat loop starts
    /// overwriting the previous timestamp.
    pub async fn check_crash_on_startup(&self) -> Result<(), McAdminError> {
        let Some(last_heartbeat) = crud::get_heartbeat(&self.pool).await? else {
            info!("No previous heartbeat found (first startup)");
            return Ok(());
        };

        let now = Utc::now();
        let elapsed = now - last_heartbeat;
        let threshold =
            ChronoDuration::minutes(self.config.players().heartbeat.crash_threshold_minutes as i64);

        if elapsed < threshold {
            info!(
                "Normal restart detected (last heartbeat {}s ago)",
                elapsed.num_seconds()
            );
            return Ok(());
        }

        warn!(
            "System crash detected! Last heartbeat was {}s ago",
            elapsed.num_seconds()
        );

        let players_by_server = crud::get_online_players_grouped_by_server(&self.pool).await?;
        let total: usize = players_by_server.values().map(Vec::len).sum();
        info!(
            "Found {total} online players across {} servers to process during crash recovery",
            players_by_server.len()
        );

        for (server_id, player_names) in players_by_server {
            for player_name in player_names {
                self.dispatcher
                    .dispatch_player_left(PlayerLeft {
                        server_id: server_id.clone(),
                        player_name,
                        reason: "System crash".to_string(),
                        timestamp: last_heartbeat,
                    })
                    .await;
            }
        }

        self.dispatcher
            .dispatch_system_crash_detected(SystemCrashDetected {
                crash_timestamp: last_heartbeat,
                elapsed_seconds: elapsed.num_milliseconds() as f64 / 1000.0,
                timestamp: now,
            })
            .await;

        info!("Crash recovery completed - dispatched {total} synthetic leave events");
        Ok(())
    }

    /// The periodic heartbeat loop. Writes immediately, then on every
    /// interval.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Heartbeat task started");
        loop {
            if let Err(e) = crud::upsert_heartbeat(&self.pool, Utc::now()).await {
                error!("Error updating heartbeat: {e}");
            }
            let interval = self.config.players().heartbeat.heartbeat_interval_seconds;
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Heartbeat task shutting down");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
            }
        }
    }
}
