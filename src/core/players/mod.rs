// src/core/players/mod.rs

//! The player tracker: identities, sessions, chat, achievements, skins,
//! heartbeat/crash recovery and the RCON reconciler.
//!
//! Each collaborator is a pure event handler; they never call each other
//! directly.

pub mod chat;
pub mod crud;
pub mod heartbeat;
pub mod identity;
pub mod mojang;
pub mod reconciler;
pub mod sessions;
pub mod skins;

use crate::core::db::models::PlayerRow;
use crate::core::errors::McAdminError;
use mojang::MojangClient;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Shared name→player resolution used by every tracker.
///
/// Unknown names are resolved through the Mojang profile service and stored;
/// resolution failures make the caller drop the event (the tracker is
/// best-effort by design).
pub struct PlayerDirectory {
    pool: SqlitePool,
    mojang: MojangClient,
}

impl PlayerDirectory {
    pub fn new(pool: SqlitePool, mojang: MojangClient) -> Self {
        Self { pool, mojang }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Gets a player by name, fetching and storing the UUID from Mojang if
    /// the name is unknown. `Ok(None)` means the player could not be
    /// resolved.
    pub async fn get_or_add_player_by_name(
        &self,
        player_name: &str,
    ) -> Result<Option<PlayerRow>, McAdminError> {
        if let Some(player) = crud::get_player_by_name(&self.pool, player_name).await? {
            return Ok(Some(player));
        }

        info!("Player {player_name} not found in database, fetching from Mojang API");
        let Some(uuid) = self.mojang.fetch_uuid(player_name).await? else {
            warn!("Could not fetch UUID for player {player_name}");
            return Ok(None);
        };

        crud::upsert_player(&self.pool, &uuid, player_name).await?;
        info!("Added player {player_name} ({uuid}) to database");
        crud::get_player_by_name(&self.pool, player_name).await
    }
}
