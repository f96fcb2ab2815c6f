// src/core/players/crud.rs

//! SQL operations for players, sessions, chat, achievements and the
//! heartbeat. All writes are single short transactions.

use crate::core::db::models::{PlayerRow, PlayerSessionRow};
use crate::core::errors::McAdminError;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;

/// Inserts a player or updates the current name of an existing row with the
/// same UUID. Idempotent in content.
pub async fn upsert_player(
    pool: &SqlitePool,
    uuid: &str,
    player_name: &str,
) -> Result<(), McAdminError> {
    sqlx::query(
        "INSERT INTO players (uuid, current_name, created_at) VALUES (?, ?, ?) \
         ON CONFLICT (uuid) DO UPDATE SET current_name = excluded.current_name",
    )
    .bind(uuid)
    .bind(player_name)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_player_by_name(
    pool: &SqlitePool,
    player_name: &str,
) -> Result<Option<PlayerRow>, McAdminError> {
    let row = sqlx::query_as("SELECT * FROM players WHERE current_name = ? LIMIT 1")
        .bind(player_name)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_player_by_id(
    pool: &SqlitePool,
    player_db_id: i64,
) -> Result<Option<PlayerRow>, McAdminError> {
    let row = sqlx::query_as("SELECT * FROM players WHERE player_db_id = ?")
        .bind(player_db_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn update_player_skin(
    pool: &SqlitePool,
    player_db_id: i64,
    skin_data: &[u8],
    avatar_data: &[u8],
    timestamp: DateTime<Utc>,
) -> Result<(), McAdminError> {
    sqlx::query(
        "UPDATE players SET skin_data = ?, avatar_data = ?, last_skin_update = ? \
         WHERE player_db_id = ?",
    )
    .bind(skin_data)
    .bind(avatar_data)
    .bind(timestamp)
    .bind(player_db_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Opens a new session. Duplicate joins simply append another open session;
/// readers always pick the most recent.
pub async fn create_session(
    pool: &SqlitePool,
    player_db_id: i64,
    server_db_id: i64,
    joined_at: DateTime<Utc>,
) -> Result<(), McAdminError> {
    sqlx::query(
        "INSERT INTO player_sessions (player_db_id, server_db_id, joined_at) VALUES (?, ?, ?)",
    )
    .bind(player_db_id)
    .bind(server_db_id)
    .bind(joined_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// The most recent open session for a player on a server.
pub async fn get_open_session(
    pool: &SqlitePool,
    player_db_id: i64,
    server_db_id: i64,
) -> Result<Option<PlayerSessionRow>, McAdminError> {
    let row = sqlx::query_as(
        "SELECT * FROM player_sessions \
         WHERE player_db_id = ? AND server_db_id = ? AND left_at IS NULL \
         ORDER BY joined_at DESC LIMIT 1",
    )
    .bind(player_db_id)
    .bind(server_db_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Closes a session, recording the leave time and whole-second duration.
pub async fn end_session(
    pool: &SqlitePool,
    session_id: i64,
    left_at: DateTime<Utc>,
    duration_seconds: i64,
) -> Result<(), McAdminError> {
    sqlx::query("UPDATE player_sessions SET left_at = ?, duration_seconds = ? WHERE session_id = ?")
        .bind(left_at)
        .bind(duration_seconds)
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_all_open_sessions_on_server(
    pool: &SqlitePool,
    server_db_id: i64,
) -> Result<Vec<PlayerSessionRow>, McAdminError> {
    let rows = sqlx::query_as(
        "SELECT * FROM player_sessions WHERE server_db_id = ? AND left_at IS NULL",
    )
    .bind(server_db_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Names of players with an open session on the given server.
pub async fn get_online_player_names_on_server(
    pool: &SqlitePool,
    server_db_id: i64,
) -> Result<Vec<String>, McAdminError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT p.current_name FROM player_sessions s \
         JOIN players p ON p.player_db_id = s.player_db_id \
         WHERE s.server_db_id = ? AND s.left_at IS NULL",
    )
    .bind(server_db_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// All online players, grouped by the server id of the row their session
/// points at. Tombstoned servers are included so crash recovery can close
/// their sessions too.
pub async fn get_online_players_grouped_by_server(
    pool: &SqlitePool,
) -> Result<HashMap<String, Vec<String>>, McAdminError> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT srv.server_id, p.current_name FROM player_sessions s \
         JOIN players p ON p.player_db_id = s.player_db_id \
         JOIN servers srv ON srv.id = s.server_db_id \
         WHERE s.left_at IS NULL \
         ORDER BY srv.server_id, p.current_name",
    )
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for (server_id, player_name) in rows {
        grouped.entry(server_id).or_default().push(player_name);
    }
    Ok(grouped)
}

pub async fn create_chat_message(
    pool: &SqlitePool,
    player_db_id: i64,
    server_db_id: i64,
    message_text: &str,
    sent_at: DateTime<Utc>,
) -> Result<(), McAdminError> {
    sqlx::query(
        "INSERT INTO player_chat_messages (player_db_id, server_db_id, message_text, sent_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(player_db_id)
    .bind(server_db_id)
    .bind(message_text)
    .bind(sent_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Records an achievement; a player earns a named achievement on a server at
/// most once, so conflicts are silently ignored.
pub async fn upsert_achievement(
    pool: &SqlitePool,
    player_db_id: i64,
    server_db_id: i64,
    achievement_name: &str,
    earned_at: DateTime<Utc>,
) -> Result<(), McAdminError> {
    sqlx::query(
        "INSERT INTO player_achievements (player_db_id, server_db_id, achievement_name, earned_at) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT (player_db_id, server_db_id, achievement_name) DO NOTHING",
    )
    .bind(player_db_id)
    .bind(server_db_id)
    .bind(achievement_name)
    .bind(earned_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Timestamp of the single heartbeat row, if it exists.
pub async fn get_heartbeat(pool: &SqlitePool) -> Result<Option<DateTime<Utc>>, McAdminError> {
    let row: Option<(DateTime<Utc>,)> =
        sqlx::query_as("SELECT timestamp FROM system_heartbeat WHERE id = 1")
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(timestamp,)| timestamp))
}

/// Updates (or creates) the single heartbeat row.
pub async fn upsert_heartbeat(
    pool: &SqlitePool,
    timestamp: DateTime<Utc>,
) -> Result<(), McAdminError> {
    sqlx::query(
        "INSERT INTO system_heartbeat (id, timestamp) VALUES (1, ?) \
         ON CONFLICT (id) DO UPDATE SET timestamp = excluded.timestamp",
    )
    .bind(timestamp)
    .execute(pool)
    .await?;
    Ok(())
}
