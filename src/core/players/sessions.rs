// src/core/players/sessions.rs

//! Tracks player gaming sessions: one open row per join, closed on leave or
//! server stop with a whole-second duration.

use super::{PlayerDirectory, crud};
use crate::core::errors::McAdminError;
use crate::core::events::{EventDispatcher, EventHandler, PlayerJoined, PlayerLeft, ServerStopping};
use crate::core::server_tracker;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SessionTracker {
    directory: Arc<PlayerDirectory>,
}

impl SessionTracker {
    pub fn new(directory: Arc<PlayerDirectory>) -> Arc<Self> {
        Arc::new(Self { directory })
    }

    pub fn register(self: &Arc<Self>, dispatcher: &EventDispatcher) {
        dispatcher.on_player_joined(self.clone());
        dispatcher.on_player_left(self.clone());
        dispatcher.on_server_stopping(self.clone());
    }

    async fn close_session(
        &self,
        session_id: i64,
        joined_at: DateTime<Utc>,
        left_at: DateTime<Utc>,
    ) -> Result<i64, McAdminError> {
        let duration_seconds = (left_at - joined_at).num_seconds();
        crud::end_session(self.directory.pool(), session_id, left_at, duration_seconds).await?;
        Ok(duration_seconds)
    }
}

#[async_trait]
impl EventHandler<PlayerJoined> for SessionTracker {
    fn name(&self) -> &'static str {
        "sessions.player_joined"
    }

    async fn handle(&self, event: PlayerJoined) -> Result<(), McAdminError> {
        let pool = self.directory.pool();
        let Some(server_db_id) = server_tracker::get_server_db_id(pool, &event.server_id).await?
        else {
            warn!("Server not found in tracker: {}", event.server_id);
            return Ok(());
        };
        let Some(player) = self
            .directory
            .get_or_add_player_by_name(&event.player_name)
            .await?
        else {
            warn!("Player not found and could not be fetched: {}", event.player_name);
            return Ok(());
        };

        crud::create_session(pool, player.player_db_id, server_db_id, event.timestamp).await?;
        debug!("Created session for {} on {}", event.player_name, event.server_id);
        Ok(())
    }
}

#[async_trait]
impl EventHandler<PlayerLeft> for SessionTracker {
    fn name(&self) -> &'static str {
        "sessions.player_left"
    }

    async fn handle(&self, event: PlayerLeft) -> Result<(), McAdminError> {
        let pool = self.directory.pool();
        let Some(server_db_id) = server_tracker::get_server_db_id(pool, &event.server_id).await?
        else {
            warn!("Server not found in tracker: {}", event.server_id);
            return Ok(());
        };
        let Some(player) = self
            .directory
            .get_or_add_player_by_name(&event.player_name)
            .await?
        else {
            warn!("Player not found and could not be fetched: {}", event.player_name);
            return Ok(());
        };

        let open_session =
            crud::get_open_session(pool, player.player_db_id, server_db_id).await?;
        match open_session {
            Some(session) => {
                let duration = self
                    .close_session(session.session_id, session.joined_at, event.timestamp)
                    .await?;
                debug!(
                    "Ended session for {} on {} ({duration}s)",
                    event.player_name, event.server_id
                );
            }
            None => {
                warn!(
                    "No open session found for {} on {}",
                    event.player_name, event.server_id
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler<ServerStopping> for SessionTracker {
    fn name(&self) -> &'static str {
        "sessions.server_stopping"
    }

    async fn handle(&self, event: ServerStopping) -> Result<(), McAdminError> {
        let pool = self.directory.pool();
        let Some(server_db_id) = server_tracker::get_server_db_id(pool, &event.server_id).await?
        else {
            warn!("Server not found in tracker: {}", event.server_id);
            return Ok(());
        };

        let open_sessions = crud::get_all_open_sessions_on_server(pool, server_db_id).await?;
        let count = open_sessions.len();
        for session in open_sessions {
            self.close_session(session.session_id, session.joined_at, event.timestamp)
                .await?;
        }
        info!("Ended {count} sessions for server {}", event.server_id);
        Ok(())
    }
}
