// tests/unit_dynamic_config_test.rs

//! Dynamic config persistence, updates and schema versioning.

use mc_admin::core::db;
use mc_admin::core::dynamic_config::{ConfigModule, DynamicConfigManager, LogParserConfig, PlayersConfig};
use serde_json::json;

#[tokio::test]
async fn initialize_persists_defaults() {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let manager = DynamicConfigManager::initialize(pool.clone()).await.unwrap();

    assert_eq!(manager.players().heartbeat.heartbeat_interval_seconds, 60);
    assert_eq!(manager.players().heartbeat.crash_threshold_minutes, 5);
    assert!(!manager.dns().enabled);
    assert!(!manager.log_parser().uuid_patterns.is_empty());

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dynamic_config")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn update_swaps_snapshot_and_persists() {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let manager = DynamicConfigManager::initialize(pool.clone()).await.unwrap();

    let before = manager.players();
    let mut data = serde_json::to_value(before.as_ref()).unwrap();
    data["heartbeat"]["heartbeat_interval_seconds"] = json!(120);
    manager.update_module("players", data).await.unwrap();

    // Old snapshots are untouched; new reads see the update.
    assert_eq!(before.heartbeat.heartbeat_interval_seconds, 60);
    assert_eq!(manager.players().heartbeat.heartbeat_interval_seconds, 120);

    // A fresh manager on the same database sees the persisted value.
    let reloaded = DynamicConfigManager::initialize(pool).await.unwrap();
    assert_eq!(reloaded.players().heartbeat.heartbeat_interval_seconds, 120);
}

#[tokio::test]
async fn unknown_module_is_rejected() {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let manager = DynamicConfigManager::initialize(pool).await.unwrap();
    assert!(manager.update_module("nope", json!({})).await.is_err());
    assert!(manager.reset_module("nope").await.is_err());
}

#[tokio::test]
async fn reset_restores_defaults() {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let manager = DynamicConfigManager::initialize(pool).await.unwrap();

    let mut data = serde_json::to_value(manager.players().as_ref()).unwrap();
    data["heartbeat"]["crash_threshold_minutes"] = json!(30);
    manager.update_module("players", data).await.unwrap();
    assert_eq!(manager.players().heartbeat.crash_threshold_minutes, 30);

    manager.reset_module("players").await.unwrap();
    assert_eq!(manager.players().heartbeat.crash_threshold_minutes, 5);
}

#[tokio::test]
async fn schema_change_revalidates_stored_row() {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    {
        let manager = DynamicConfigManager::initialize(pool.clone()).await.unwrap();
        let mut data = serde_json::to_value(manager.players().as_ref()).unwrap();
        data["heartbeat"]["heartbeat_interval_seconds"] = json!(90);
        manager.update_module("players", data).await.unwrap();
    }

    // Simulate an old row written by a previous schema.
    sqlx::query("UPDATE dynamic_config SET schema_version = 'stale' WHERE module_name = 'players'")
        .execute(&pool)
        .await
        .unwrap();

    let manager = DynamicConfigManager::initialize(pool.clone()).await.unwrap();
    // The stored value survives re-validation...
    assert_eq!(manager.players().heartbeat.heartbeat_interval_seconds, 90);
    // ...and the row is stamped with the current schema version.
    let (version,): (String,) =
        sqlx::query_as("SELECT schema_version FROM dynamic_config WHERE module_name = 'players'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(version, PlayersConfig::schema_version());
}

#[tokio::test]
async fn all_modules_lists_every_registered_module() {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let manager = DynamicConfigManager::initialize(pool).await.unwrap();
    let modules = manager.all_modules().unwrap();
    assert!(modules.contains_key(LogParserConfig::MODULE_NAME));
    assert!(modules.contains_key("players"));
    assert!(modules.contains_key("dns"));
}
