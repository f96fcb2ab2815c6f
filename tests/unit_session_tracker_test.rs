// tests/unit_session_tracker_test.rs

//! Session lifecycle tests against an in-memory database. Players are
//! pre-seeded so no identity resolution leaves the process.

use chrono::{Duration, Utc};
use mc_admin::core::db;
use mc_admin::core::events::{EventDispatcher, PlayerJoined, PlayerLeft, ServerStopping};
use mc_admin::core::players::crud;
use mc_admin::core::players::mojang::MojangClient;
use mc_admin::core::players::sessions::SessionTracker;
use mc_admin::core::players::PlayerDirectory;
use mc_admin::core::server_tracker;
use sqlx::SqlitePool;
use std::sync::Arc;

struct Fixture {
    pool: SqlitePool,
    dispatcher: Arc<EventDispatcher>,
    server_db_id: i64,
    player_db_id: i64,
}

async fn fixture() -> Fixture {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let dispatcher = Arc::new(EventDispatcher::new());

    let server_db_id = server_tracker::create_server(&pool, "survival", Utc::now())
        .await
        .unwrap();
    crud::upsert_player(&pool, "11111111222233334444555555555555", "Alice")
        .await
        .unwrap();
    let player_db_id = crud::get_player_by_name(&pool, "Alice")
        .await
        .unwrap()
        .unwrap()
        .player_db_id;

    let directory = Arc::new(PlayerDirectory::new(pool.clone(), MojangClient::new()));
    SessionTracker::new(directory).register(&dispatcher);

    Fixture {
        pool,
        dispatcher,
        server_db_id,
        player_db_id,
    }
}

#[tokio::test]
async fn join_then_leave_closes_session_with_truncated_duration() {
    let f = fixture().await;
    let joined_at = Utc::now();
    let left_at = joined_at + Duration::milliseconds(95_700);

    f.dispatcher
        .dispatch_player_joined(PlayerJoined {
            server_id: "survival".to_string(),
            player_name: "Alice".to_string(),
            timestamp: joined_at,
        })
        .await;

    let open = crud::get_open_session(&f.pool, f.player_db_id, f.server_db_id)
        .await
        .unwrap()
        .expect("session should be open after join");
    assert!(open.left_at.is_none());

    f.dispatcher
        .dispatch_player_left(PlayerLeft {
            server_id: "survival".to_string(),
            player_name: "Alice".to_string(),
            reason: "Disconnected".to_string(),
            timestamp: left_at,
        })
        .await;

    assert!(
        crud::get_open_session(&f.pool, f.player_db_id, f.server_db_id)
            .await
            .unwrap()
            .is_none()
    );
    let sessions = crud::get_all_open_sessions_on_server(&f.pool, f.server_db_id)
        .await
        .unwrap();
    assert!(sessions.is_empty());

    let (duration, recorded_left): (i64, chrono::DateTime<Utc>) = sqlx::query_as(
        "SELECT duration_seconds, left_at FROM player_sessions WHERE player_db_id = ?",
    )
    .bind(f.player_db_id)
    .fetch_one(&f.pool)
    .await
    .unwrap();
    // 95.7 seconds truncates to 95.
    assert_eq!(duration, 95);
    assert_eq!(recorded_left, left_at);
}

#[tokio::test]
async fn duplicate_join_appends_second_open_session() {
    let f = fixture().await;
    for _ in 0..2 {
        f.dispatcher
            .dispatch_player_joined(PlayerJoined::now("survival", "Alice"))
            .await;
    }

    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM player_sessions WHERE player_db_id = ? AND left_at IS NULL",
    )
    .bind(f.player_db_id)
    .fetch_one(&f.pool)
    .await
    .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn leave_without_open_session_is_dropped() {
    let f = fixture().await;
    f.dispatcher
        .dispatch_player_left(PlayerLeft::now("survival", "Alice", "Disconnected"))
        .await;

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM player_sessions WHERE player_db_id = ?")
            .bind(f.player_db_id)
            .fetch_one(&f.pool)
            .await
            .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn second_leave_is_a_no_op() {
    let f = fixture().await;
    let joined_at = Utc::now();
    let left_at = joined_at + Duration::seconds(10);

    f.dispatcher
        .dispatch_player_joined(PlayerJoined {
            server_id: "survival".to_string(),
            player_name: "Alice".to_string(),
            timestamp: joined_at,
        })
        .await;
    for _ in 0..2 {
        f.dispatcher
            .dispatch_player_left(PlayerLeft {
                server_id: "survival".to_string(),
                player_name: "Alice".to_string(),
                reason: "Disconnected".to_string(),
                timestamp: left_at,
            })
            .await;
    }

    let rows: Vec<(i64, Option<i64>)> =
        sqlx::query_as("SELECT session_id, duration_seconds FROM player_sessions WHERE player_db_id = ?")
            .bind(f.player_db_id)
            .fetch_all(&f.pool)
            .await
            .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, Some(10));
}

#[tokio::test]
async fn server_stopping_closes_all_open_sessions() {
    let f = fixture().await;
    crud::upsert_player(&f.pool, "99999999888877776666555544443333", "Bob")
        .await
        .unwrap();

    for name in ["Alice", "Bob"] {
        f.dispatcher
            .dispatch_player_joined(PlayerJoined::now("survival", name))
            .await;
    }

    f.dispatcher
        .dispatch_server_stopping(ServerStopping {
            server_id: "survival".to_string(),
            timestamp: Utc::now(),
        })
        .await;

    let open = crud::get_all_open_sessions_on_server(&f.pool, f.server_db_id)
        .await
        .unwrap();
    assert!(open.is_empty());
}

#[tokio::test]
async fn upsert_player_is_idempotent_and_renames() {
    let f = fixture().await;
    let uuid = "11111111222233334444555555555555";

    // Same content twice changes nothing.
    crud::upsert_player(&f.pool, uuid, "Alice").await.unwrap();
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM players")
        .fetch_one(&f.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    // Same UUID with a new name overwrites the name in place.
    crud::upsert_player(&f.pool, uuid, "AliceRenamed").await.unwrap();
    let player = crud::get_player_by_name(&f.pool, "AliceRenamed")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(player.player_db_id, f.player_db_id);
    assert!(crud::get_player_by_name(&f.pool, "Alice").await.unwrap().is_none());
}

#[tokio::test]
async fn online_players_group_by_server() {
    let f = fixture().await;
    server_tracker::create_server(&f.pool, "creative", Utc::now())
        .await
        .unwrap();
    crud::upsert_player(&f.pool, "99999999888877776666555544443333", "Bob")
        .await
        .unwrap();

    f.dispatcher
        .dispatch_player_joined(PlayerJoined::now("survival", "Alice"))
        .await;
    f.dispatcher
        .dispatch_player_joined(PlayerJoined::now("creative", "Bob"))
        .await;

    let grouped = crud::get_online_players_grouped_by_server(&f.pool)
        .await
        .unwrap();
    assert_eq!(grouped.get("survival"), Some(&vec!["Alice".to_string()]));
    assert_eq!(grouped.get("creative"), Some(&vec!["Bob".to_string()]));
}
