// src/core/players/identity.rs

//! Keeps the name↔UUID mapping current and requests skin refreshes on join.

use super::{PlayerDirectory, crud};
use crate::core::errors::McAdminError;
use crate::core::events::{
    EventDispatcher, EventHandler, PlayerJoined, PlayerLeft, PlayerSkinUpdateRequested,
    PlayerUuidDiscovered,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

pub struct IdentityTracker {
    directory: Arc<PlayerDirectory>,
    dispatcher: Arc<EventDispatcher>,
}

impl IdentityTracker {
    pub fn new(directory: Arc<PlayerDirectory>, dispatcher: Arc<EventDispatcher>) -> Arc<Self> {
        Arc::new(Self {
            directory,
            dispatcher,
        })
    }

    /// Registers this tracker's handlers on the dispatcher.
    pub fn register(self: &Arc<Self>, dispatcher: &EventDispatcher) {
        dispatcher.on_player_uuid_discovered(self.clone());
        dispatcher.on_player_joined(self.clone());
        dispatcher.on_player_left(self.clone());
    }
}

#[async_trait]
impl EventHandler<PlayerUuidDiscovered> for IdentityTracker {
    fn name(&self) -> &'static str {
        "identity.uuid_discovered"
    }

    async fn handle(&self, event: PlayerUuidDiscovered) -> Result<(), McAdminError> {
        crud::upsert_player(self.directory.pool(), &event.uuid, &event.player_name).await?;
        info!("Updated player UUID: {} = {}", event.player_name, event.uuid);
        Ok(())
    }
}

#[async_trait]
impl EventHandler<PlayerJoined> for IdentityTracker {
    fn name(&self) -> &'static str {
        "identity.player_joined"
    }

    async fn handle(&self, event: PlayerJoined) -> Result<(), McAdminError> {
        let Some(player) = self
            .directory
            .get_or_add_player_by_name(&event.player_name)
            .await?
        else {
            warn!("Player not found and could not be fetched: {}", event.player_name);
            return Ok(());
        };

        info!("Player joined: {} on {}", event.player_name, event.server_id);

        // Fire-and-forget: the skin refresh must not hold up the log
        // pipeline, which awaits this handler.
        let dispatcher = self.dispatcher.clone();
        let request = PlayerSkinUpdateRequested {
            player_db_id: player.player_db_id,
            uuid: player.uuid,
            player_name: player.current_name,
            timestamp: Utc::now(),
        };
        tokio::spawn(async move {
            dispatcher.dispatch_player_skin_update_requested(request).await;
        });
        Ok(())
    }
}

#[async_trait]
impl EventHandler<PlayerLeft> for IdentityTracker {
    fn name(&self) -> &'static str {
        "identity.player_left"
    }

    async fn handle(&self, event: PlayerLeft) -> Result<(), McAdminError> {
        if self
            .directory
            .get_or_add_player_by_name(&event.player_name)
            .await?
            .is_none()
        {
            warn!("Player not found and could not be fetched: {}", event.player_name);
            return Ok(());
        }
        info!("Player left: {} from {}", event.player_name, event.server_id);
        Ok(())
    }
}
