// src/core/db/models.rs

//! Row types shared by the persistence-backed subsystems.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{Display, EnumString};

/// Lifecycle status of a persisted server row. `Removed` rows are tombstones
/// kept so historical sessions, chat and achievements stay resolvable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, sqlx::Type,
)]
#[strum(serialize_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerRowStatus {
    Active,
    Removed,
}

#[derive(Debug, Clone, FromRow)]
pub struct ServerRow {
    pub id: i64,
    pub server_id: String,
    pub status: ServerRowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PlayerRow {
    pub player_db_id: i64,
    /// 32 hex chars, dashless.
    pub uuid: String,
    pub current_name: String,
    pub skin_data: Option<Vec<u8>>,
    pub avatar_data: Option<Vec<u8>>,
    pub last_skin_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PlayerSessionRow {
    pub session_id: i64,
    pub player_db_id: i64,
    pub server_db_id: i64,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PlayerChatMessageRow {
    pub message_id: i64,
    pub player_db_id: i64,
    pub server_db_id: i64,
    pub message_text: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PlayerAchievementRow {
    pub achievement_id: i64,
    pub player_db_id: i64,
    pub server_db_id: i64,
    pub achievement_name: String,
    pub earned_at: DateTime<Utc>,
}

/// Lifecycle status of a cron job row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, sqlx::Type,
)]
#[strum(serialize_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum CronJobStatus {
    Active,
    Paused,
    Cancelled,
}

/// Outcome of a single cron job execution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, sqlx::Type,
)]
#[strum(serialize_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, FromRow)]
pub struct CronJobRow {
    pub cronjob_id: String,
    pub identifier: String,
    pub name: String,
    pub cron: String,
    pub second: Option<String>,
    pub params_json: String,
    pub execution_count: i64,
    pub status: CronJobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CronJobExecutionRow {
    pub execution_id: String,
    pub cronjob_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: ExecutionStatus,
    pub messages_json: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct DynamicConfigRow {
    pub module_name: String,
    pub config_json: String,
    pub schema_version: String,
    pub updated_at: DateTime<Utc>,
}
