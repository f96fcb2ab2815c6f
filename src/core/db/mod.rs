// src/core/db/mod.rs

//! Database bootstrap: connection pool and embedded schema.

pub mod models;

use crate::core::errors::McAdminError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

/// The embedded schema. Every statement is idempotent so the full script runs
/// on each startup.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS servers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_servers_server_id ON servers (server_id);

CREATE TABLE IF NOT EXISTS players (
    player_db_id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    current_name TEXT NOT NULL,
    skin_data BLOB,
    avatar_data BLOB,
    last_skin_update TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_players_current_name ON players (current_name);

CREATE TABLE IF NOT EXISTS player_sessions (
    session_id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_db_id INTEGER NOT NULL REFERENCES players (player_db_id),
    server_db_id INTEGER NOT NULL REFERENCES servers (id),
    joined_at TEXT NOT NULL,
    left_at TEXT,
    duration_seconds INTEGER
);
CREATE INDEX IF NOT EXISTS idx_sessions_open
    ON player_sessions (server_db_id, player_db_id) WHERE left_at IS NULL;

CREATE TABLE IF NOT EXISTS player_chat_messages (
    message_id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_db_id INTEGER NOT NULL REFERENCES players (player_db_id),
    server_db_id INTEGER NOT NULL REFERENCES servers (id),
    message_text TEXT NOT NULL,
    sent_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS player_achievements (
    achievement_id INTEGER PRIMARY KEY AUTOINCREMENT,
    player_db_id INTEGER NOT NULL REFERENCES players (player_db_id),
    server_db_id INTEGER NOT NULL REFERENCES servers (id),
    achievement_name TEXT NOT NULL,
    earned_at TEXT NOT NULL,
    UNIQUE (player_db_id, server_db_id, achievement_name)
);

CREATE TABLE IF NOT EXISTS system_heartbeat (
    id INTEGER PRIMARY KEY,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cronjobs (
    cronjob_id TEXT PRIMARY KEY,
    identifier TEXT NOT NULL,
    name TEXT NOT NULL,
    cron TEXT NOT NULL,
    second TEXT,
    params_json TEXT NOT NULL,
    execution_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cronjob_executions (
    execution_id TEXT PRIMARY KEY,
    cronjob_id TEXT NOT NULL REFERENCES cronjobs (cronjob_id),
    started_at TEXT NOT NULL,
    ended_at TEXT,
    duration_ms INTEGER,
    status TEXT NOT NULL,
    messages_json TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_executions_cronjob
    ON cronjob_executions (cronjob_id, started_at);

CREATE TABLE IF NOT EXISTS dynamic_config (
    module_name TEXT PRIMARY KEY,
    config_json TEXT NOT NULL,
    schema_version TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Opens the SQLite pool (creating the file if needed) and applies the schema.
pub async fn connect(database_url: &str) -> Result<SqlitePool, McAdminError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| McAdminError::Internal(format!("invalid database URL: {e}")))?
        .create_if_missing(true)
        .foreign_keys(true);

    // An in-memory database exists per connection; cap the pool so all
    // callers share the one that holds the schema.
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    for statement in SCHEMA.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement).execute(&pool).await?;
    }

    info!("Database initialized at {database_url}");
    Ok(pool)
}
