// tests/unit_heartbeat_recovery_test.rs

//! Crash recovery: a stale heartbeat closes every open session with the last
//! heartbeat as the leave time.

use chrono::{Duration, Utc};
use mc_admin::core::db;
use mc_admin::core::dynamic_config::DynamicConfigManager;
use mc_admin::core::events::{EventDispatcher, PlayerJoined};
use mc_admin::core::players::crud;
use mc_admin::core::players::heartbeat::HeartbeatTask;
use mc_admin::core::players::mojang::MojangClient;
use mc_admin::core::players::sessions::SessionTracker;
use mc_admin::core::players::PlayerDirectory;
use mc_admin::core::server_tracker;
use sqlx::SqlitePool;
use std::sync::Arc;

async fn fixture() -> (SqlitePool, Arc<EventDispatcher>, HeartbeatTask) {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let dispatcher = Arc::new(EventDispatcher::new());
    let config = Arc::new(DynamicConfigManager::initialize(pool.clone()).await.unwrap());

    let directory = Arc::new(PlayerDirectory::new(pool.clone(), MojangClient::new()));
    SessionTracker::new(directory).register(&dispatcher);

    let heartbeat = HeartbeatTask::new(pool.clone(), config, dispatcher.clone());
    (pool, dispatcher, heartbeat)
}

#[tokio::test]
async fn first_boot_without_heartbeat_is_a_no_op() {
    let (pool, _dispatcher, heartbeat) = fixture().await;
    heartbeat.check_crash_on_startup().await.unwrap();
    assert!(crud::get_heartbeat(&pool).await.unwrap().is_none());
}

#[tokio::test]
async fn recent_heartbeat_means_normal_restart() {
    let (pool, dispatcher, heartbeat) = fixture().await;
    let server_db_id = server_tracker::create_server(&pool, "survival", Utc::now())
        .await
        .unwrap();
    crud::upsert_player(&pool, "11111111222233334444555555555555", "Alice")
        .await
        .unwrap();
    dispatcher
        .dispatch_player_joined(PlayerJoined::now("survival", "Alice"))
        .await;

    crud::upsert_heartbeat(&pool, Utc::now() - Duration::seconds(30))
        .await
        .unwrap();
    heartbeat.check_crash_on_startup().await.unwrap();

    // Below the crash threshold: the session stays open.
    let open = crud::get_all_open_sessions_on_server(&pool, server_db_id)
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn stale_heartbeat_closes_sessions_at_last_heartbeat() {
    let (pool, dispatcher, heartbeat) = fixture().await;
    let server_db_id = server_tracker::create_server(&pool, "survival", Utc::now())
        .await
        .unwrap();
    crud::upsert_player(&pool, "11111111222233334444555555555555", "Alice")
        .await
        .unwrap();

    let joined_at = Utc::now() - Duration::minutes(30);
    let last_heartbeat = Utc::now() - Duration::minutes(10);

    dispatcher
        .dispatch_player_joined(PlayerJoined {
            server_id: "survival".to_string(),
            player_name: "Alice".to_string(),
            timestamp: joined_at,
        })
        .await;
    crud::upsert_heartbeat(&pool, last_heartbeat).await.unwrap();

    heartbeat.check_crash_on_startup().await.unwrap();

    // Nobody is online anymore.
    let open = crud::get_all_open_sessions_on_server(&pool, server_db_id)
        .await
        .unwrap();
    assert!(open.is_empty());

    // The leave time is the pre-crash heartbeat, not "now".
    let (left_at, duration): (chrono::DateTime<Utc>, i64) = sqlx::query_as(
        "SELECT left_at, duration_seconds FROM player_sessions WHERE server_db_id = ?",
    )
    .bind(server_db_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(left_at, last_heartbeat);
    assert_eq!(duration, (last_heartbeat - joined_at).num_seconds());
}
