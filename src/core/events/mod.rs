// src/core/events/mod.rs

//! Typed events flowing between subsystems.
//!
//! Every cross-subsystem reaction in the control plane is driven by one of
//! these events on the [`dispatcher::EventDispatcher`]; components never call
//! back into their peers directly.

pub mod dispatcher;

pub use dispatcher::{EventDispatcher, EventHandler};

use chrono::{DateTime, Utc};

/// Fired when a player's UUID shows up in a server log.
#[derive(Debug, Clone)]
pub struct PlayerUuidDiscovered {
    pub server_id: String,
    pub player_name: String,
    /// 32 hex chars, dashes already stripped.
    pub uuid: String,
    pub timestamp: DateTime<Utc>,
}

/// Fired when a player logs in to a server.
#[derive(Debug, Clone)]
pub struct PlayerJoined {
    pub server_id: String,
    pub player_name: String,
    pub timestamp: DateTime<Utc>,
}

impl PlayerJoined {
    pub fn now(server_id: impl Into<String>, player_name: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            player_name: player_name.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Fired when a player disconnects from a server.
#[derive(Debug, Clone)]
pub struct PlayerLeft {
    pub server_id: String,
    pub player_name: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl PlayerLeft {
    pub fn now(
        server_id: impl Into<String>,
        player_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            player_name: player_name.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Fired for every chat line a player sends.
#[derive(Debug, Clone)]
pub struct PlayerChatMessage {
    pub server_id: String,
    pub player_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Fired when a player earns an advancement or achievement.
#[derive(Debug, Clone)]
pub struct PlayerAchievement {
    pub server_id: String,
    pub player_name: String,
    pub achievement_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Fired by the identity tracker after every join so the skin updater can
/// refresh the player's skin in the background.
#[derive(Debug, Clone)]
pub struct PlayerSkinUpdateRequested {
    pub player_db_id: i64,
    pub uuid: String,
    pub player_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Fired when a server's log announces shutdown.
#[derive(Debug, Clone)]
pub struct ServerStopping {
    pub server_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Fired by the server tracker when a new compose project appears on disk.
#[derive(Debug, Clone)]
pub struct ServerCreated {
    pub server_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Fired by the server tracker when a compose project disappears from disk.
#[derive(Debug, Clone)]
pub struct ServerRemoved {
    pub server_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Fired once at boot when the heartbeat indicates the previous process died
/// without a clean shutdown.
#[derive(Debug, Clone)]
pub struct SystemCrashDetected {
    /// Timestamp of the last heartbeat before the crash.
    pub crash_timestamp: DateTime<Utc>,
    /// Seconds elapsed between the crash and this boot.
    pub elapsed_seconds: f64,
    pub timestamp: DateTime<Utc>,
}
