// src/core/server_tracker.rs

//! Reconciles the on-disk instance set with the persisted server table.
//!
//! New compose projects get an ACTIVE row and a `ServerCreated` event;
//! projects that disappear get their ACTIVE row tombstoned (never deleted, so
//! sessions, chat and achievements keep resolving) and a `ServerRemoved`
//! event.

use crate::core::db::models::{ServerRow, ServerRowStatus};
use crate::core::errors::McAdminError;
use crate::core::events::{EventDispatcher, ServerCreated, ServerRemoved};
use crate::core::instance::DockerMcManager;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

pub async fn create_server(
    pool: &SqlitePool,
    server_id: &str,
    created_at: DateTime<Utc>,
) -> Result<i64, McAdminError> {
    let result = sqlx::query(
        "INSERT INTO servers (server_id, status, created_at, updated_at) VALUES (?, 'ACTIVE', ?, ?)",
    )
    .bind(server_id)
    .bind(created_at)
    .bind(created_at)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_active_servers(pool: &SqlitePool) -> Result<Vec<ServerRow>, McAdminError> {
    let rows = sqlx::query_as("SELECT * FROM servers WHERE status = 'ACTIVE'")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Active servers as a `server_id → db id` map.
pub async fn get_active_servers_map(
    pool: &SqlitePool,
) -> Result<HashMap<String, i64>, McAdminError> {
    Ok(get_active_servers(pool)
        .await?
        .into_iter()
        .map(|row| (row.server_id, row.id))
        .collect())
}

/// The db id events should attach to: the ACTIVE row if one exists, else the
/// newest tombstone.
pub async fn get_server_db_id(
    pool: &SqlitePool,
    server_id: &str,
) -> Result<Option<i64>, McAdminError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM servers WHERE server_id = ? \
         ORDER BY CASE status WHEN 'ACTIVE' THEN 0 ELSE 1 END, created_at DESC LIMIT 1",
    )
    .bind(server_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(id,)| id))
}

/// Tombstones the ACTIVE row for a server.
pub async fn mark_server_removed(
    pool: &SqlitePool,
    server_id: &str,
    updated_at: DateTime<Utc>,
) -> Result<(), McAdminError> {
    sqlx::query(
        "UPDATE servers SET status = ?, updated_at = ? WHERE server_id = ? AND status = 'ACTIVE'",
    )
    .bind(ServerRowStatus::Removed)
    .bind(updated_at)
    .bind(server_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// The periodic filesystem↔database reconcile task.
pub struct ServerTracker {
    pool: SqlitePool,
    docker: Arc<DockerMcManager>,
    dispatcher: Arc<EventDispatcher>,
    sync_interval: Duration,
}

impl ServerTracker {
    pub fn new(
        pool: SqlitePool,
        docker: Arc<DockerMcManager>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            pool,
            docker,
            dispatcher,
            sync_interval: Duration::from_secs(30),
        }
    }

    /// One reconcile pass. Also called once during startup, before the log
    /// monitor subscribes.
    pub async fn sync_once(&self) -> Result<(), McAdminError> {
        let mut current: HashSet<String> = HashSet::new();
        for name in self.docker.list_instance_ids().await? {
            // A directory without a compose file is not an instance.
            if self.docker.get_instance(&name).exists().await? {
                current.insert(name);
            }
        }

        let db_servers: HashSet<String> = get_active_servers(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.server_id)
            .collect();

        for server_id in current.difference(&db_servers) {
            let db_id = create_server(&self.pool, server_id, Utc::now()).await?;
            info!("Server created: {server_id} (db_id={db_id})");
            self.dispatcher
                .dispatch_server_created(ServerCreated {
                    server_id: server_id.clone(),
                    timestamp: Utc::now(),
                })
                .await;
        }

        for server_id in db_servers.difference(&current) {
            mark_server_removed(&self.pool, server_id, Utc::now()).await?;
            info!("Server removed: {server_id}");
            self.dispatcher
                .dispatch_server_removed(ServerRemoved {
                    server_id: server_id.clone(),
                    timestamp: Utc::now(),
                })
                .await;
        }

        Ok(())
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Server tracker started. Sync interval: {:?}", self.sync_interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Server tracker shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.sync_interval) => {
                    if let Err(e) = self.sync_once().await {
                        error!("Error syncing servers: {e}");
                    }
                }
            }
        }
    }
}
