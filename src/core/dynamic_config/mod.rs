// src/core/dynamic_config/mod.rs

//! Hot-reloadable module configuration persisted in the database.
//!
//! Each module registers a typed config struct. The manager keeps the current
//! value of every module behind an atomically swapped `Arc`, so readers take a
//! consistent snapshot per operation and writers replace the whole value.
//! Stored rows carry a schema version hash; on mismatch the stored JSON is
//! re-validated against the current schema (serde fills new fields from
//! defaults, drops unknown ones) and re-saved.

pub mod modules;
pub mod schema;

pub use modules::{DnsConfig, LogParserConfig, PlayersConfig};
pub use schema::ConfigModule;

use crate::core::db::models::DynamicConfigRow;
use crate::core::errors::McAdminError;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

/// One atomically-swapped config value.
struct Slot<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Slot<T> {
    fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    fn snapshot(&self) -> Arc<T> {
        self.current.read().clone()
    }

    fn swap(&self, value: T) {
        *self.current.write() = Arc::new(value);
    }
}

/// Central manager for dynamic configuration.
///
/// Modules are registered explicitly by being fields of this struct; there is
/// no runtime registry of schemas.
pub struct DynamicConfigManager {
    pool: SqlitePool,
    log_parser: Slot<LogParserConfig>,
    players: Slot<PlayersConfig>,
    dns: Slot<DnsConfig>,
}

impl DynamicConfigManager {
    /// Loads (or creates) every module's config from the database.
    pub async fn initialize(pool: SqlitePool) -> Result<Self, McAdminError> {
        let log_parser = Self::load_module::<LogParserConfig>(&pool).await?;
        let players = Self::load_module::<PlayersConfig>(&pool).await?;
        let dns = Self::load_module::<DnsConfig>(&pool).await?;

        info!("Dynamic configuration initialized (3 modules)");

        Ok(Self {
            pool,
            log_parser: Slot::new(log_parser),
            players: Slot::new(players),
            dns: Slot::new(dns),
        })
    }

    /// Consistent snapshot of the log parser configuration.
    pub fn log_parser(&self) -> Arc<LogParserConfig> {
        self.log_parser.snapshot()
    }

    /// Consistent snapshot of the player system configuration.
    pub fn players(&self) -> Arc<PlayersConfig> {
        self.players.snapshot()
    }

    /// Consistent snapshot of the DNS/router configuration.
    pub fn dns(&self) -> Arc<DnsConfig> {
        self.dns.snapshot()
    }

    /// Validates and persists a new value for the named module, then swaps it
    /// into memory.
    pub async fn update_module(&self, module_name: &str, data: Value) -> Result<(), McAdminError> {
        match module_name {
            LogParserConfig::MODULE_NAME => {
                let value: LogParserConfig = parse_module(data)?;
                self.persist::<LogParserConfig>(&value).await?;
                self.log_parser.swap(value);
            }
            PlayersConfig::MODULE_NAME => {
                let value: PlayersConfig = parse_module(data)?;
                self.persist::<PlayersConfig>(&value).await?;
                self.players.swap(value);
            }
            DnsConfig::MODULE_NAME => {
                let value: DnsConfig = parse_module(data)?;
                self.persist::<DnsConfig>(&value).await?;
                self.dns.swap(value);
            }
            other => return Err(McAdminError::UnknownConfigModule(other.to_string())),
        }
        info!("Updated configuration for module '{module_name}'");
        Ok(())
    }

    /// Resets the named module to its default value.
    pub async fn reset_module(&self, module_name: &str) -> Result<(), McAdminError> {
        let default = match module_name {
            LogParserConfig::MODULE_NAME => serde_json::to_value(LogParserConfig::default())?,
            PlayersConfig::MODULE_NAME => serde_json::to_value(PlayersConfig::default())?,
            DnsConfig::MODULE_NAME => serde_json::to_value(DnsConfig::default())?,
            other => return Err(McAdminError::UnknownConfigModule(other.to_string())),
        };
        self.update_module(module_name, default).await
    }

    /// All module configs as JSON, keyed by module name (for the config API).
    pub fn all_modules(&self) -> Result<serde_json::Map<String, Value>, McAdminError> {
        let mut map = serde_json::Map::new();
        map.insert(
            LogParserConfig::MODULE_NAME.to_string(),
            serde_json::to_value(self.log_parser.snapshot().as_ref())?,
        );
        map.insert(
            PlayersConfig::MODULE_NAME.to_string(),
            serde_json::to_value(self.players.snapshot().as_ref())?,
        );
        map.insert(
            DnsConfig::MODULE_NAME.to_string(),
            serde_json::to_value(self.dns.snapshot().as_ref())?,
        );
        Ok(map)
    }

    async fn persist<T: ConfigModule>(&self, value: &T) -> Result<(), McAdminError> {
        let config_json = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO dynamic_config (module_name, config_json, schema_version, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (module_name) DO UPDATE SET \
             config_json = excluded.config_json, \
             schema_version = excluded.schema_version, \
             updated_at = excluded.updated_at",
        )
        .bind(T::MODULE_NAME)
        .bind(config_json)
        .bind(T::schema_version())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_module<T: ConfigModule>(pool: &SqlitePool) -> Result<T, McAdminError> {
        let row: Option<DynamicConfigRow> =
            sqlx::query_as("SELECT * FROM dynamic_config WHERE module_name = ?")
                .bind(T::MODULE_NAME)
                .fetch_optional(pool)
                .await?;

        let current_version = T::schema_version();

        let (value, needs_save) = match row {
            None => {
                info!(
                    "Creating default configuration for new module '{}'",
                    T::MODULE_NAME
                );
                (T::default(), true)
            }
            Some(row) if row.schema_version == current_version => {
                let value = serde_json::from_str(&row.config_json).map_err(|e| {
                    McAdminError::Internal(format!(
                        "stored config for '{}' no longer parses: {e}",
                        T::MODULE_NAME
                    ))
                })?;
                (value, false)
            }
            Some(row) => {
                // Schema changed since the row was written: re-validate the
                // stored JSON against the current struct and re-save.
                warn!(
                    "Schema version changed for module '{}' ({} -> {current_version}), migrating",
                    T::MODULE_NAME,
                    row.schema_version
                );
                match serde_json::from_str::<T>(&row.config_json) {
                    Ok(value) => (value, true),
                    Err(e) => {
                        warn!(
                            "Stored config for '{}' failed re-validation ({e}), resetting to defaults",
                            T::MODULE_NAME
                        );
                        (T::default(), true)
                    }
                }
            }
        };

        if needs_save {
            let config_json = serde_json::to_string(&value)?;
            sqlx::query(
                "INSERT INTO dynamic_config (module_name, config_json, schema_version, updated_at) \
                 VALUES (?, ?, ?, ?) \
                 ON CONFLICT (module_name) DO UPDATE SET \
                 config_json = excluded.config_json, \
                 schema_version = excluded.schema_version, \
                 updated_at = excluded.updated_at",
            )
            .bind(T::MODULE_NAME)
            .bind(config_json)
            .bind(&current_version)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        }

        Ok(value)
    }
}

fn parse_module<T: ConfigModule>(data: Value) -> Result<T, McAdminError> {
    let value: T = serde_json::from_value(data).map_err(|e| {
        McAdminError::Validation(format!(
            "invalid configuration for module '{}': {e}",
            T::MODULE_NAME
        ))
    })?;
    value.validate()?;
    Ok(value)
}
