// src/core/players/chat.rs

//! Persists chat messages and achievements.

use super::{PlayerDirectory, crud};
use crate::core::errors::McAdminError;
use crate::core::events::{EventDispatcher, EventHandler, PlayerAchievement, PlayerChatMessage};
use crate::core::server_tracker;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ChatTracker {
    directory: Arc<PlayerDirectory>,
}

impl ChatTracker {
    pub fn new(directory: Arc<PlayerDirectory>) -> Arc<Self> {
        Arc::new(Self { directory })
    }

    pub fn register(self: &Arc<Self>, dispatcher: &EventDispatcher) {
        dispatcher.on_player_chat_message(self.clone());
        dispatcher.on_player_achievement(self.clone());
    }
}

#[async_trait]
impl EventHandler<PlayerChatMessage> for ChatTracker {
    fn name(&self) -> &'static str {
        "chat.message"
    }

    async fn handle(&self, event: PlayerChatMessage) -> Result<(), McAdminError> {
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

        crud::create_chat_message(
            pool,
            player.player_db_id,
            server_db_id,
            &event.message,
            event.timestamp,
        )
        .await?;
        debug!("Saved chat message from {} on {}", event.player_name, event.server_id);
        Ok(())
    }
}

#[async_trait]
impl EventHandler<PlayerAchievement> for ChatTracker {
    fn name(&self) -> &'static str {
        "chat.achievement"
    }

    async fn handle(&self, event: PlayerAchievement) -> Result<(), McAdminError> {
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

        crud::upsert_achievement(
            pool,
            player.player_db_id,
            server_db_id,
            &event.achievement_name,
            event.timestamp,
        )
        .await?;
        debug!(
            "Saved achievement '{}' for {} on {}",
            event.achievement_name, event.player_name, event.server_id
        );
        Ok(())
    }
}
