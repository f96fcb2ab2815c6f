// tests/unit_cron_manager_test.rs

//! Cron manager lifecycle and execution accounting against an in-memory
//! database. Jobs use the restart identifier with a nonexistent servers root
//! so executions finish quickly (and fail) without touching any engine.

use mc_admin::core::cron::jobs::RestartServerJob;
use mc_admin::core::cron::manager::CronJobFilter;
use mc_admin::core::cron::params::{JobParams, RESTART_SERVER_IDENTIFIER, RestartServerParams};
use mc_admin::core::cron::{CronManager, CronRegistry};
use mc_admin::core::db;
use mc_admin::core::db::models::{CronJobStatus, ExecutionStatus};
use mc_admin::core::instance::DockerMcManager;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

async fn manager() -> (SqlitePool, Arc<CronManager>) {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let docker = Arc::new(DockerMcManager::new("/nonexistent-servers-root"));
    let mut registry = CronRegistry::new();
    registry.register(
        RESTART_SERVER_IDENTIFIER,
        "Restart a running server",
        Arc::new(RestartServerJob::new(docker)),
    );
    let manager = CronManager::new(pool.clone(), Arc::new(registry), chrono_tz::Tz::UTC);
    (pool, manager)
}

fn restart_params() -> JobParams {
    JobParams::RestartServer(RestartServerParams {
        server_id: "survival".to_string(),
    })
}

#[tokio::test]
async fn create_generates_identifier_prefixed_id() {
    let (_pool, manager) = manager().await;
    let id = manager
        .create_cronjob(restart_params(), "0 6 * * *", None, None, None)
        .await
        .unwrap();
    assert!(id.starts_with("restart_server_"));

    let config = manager.get_cronjob_config(&id).await.unwrap();
    assert_eq!(config.status, CronJobStatus::Active);
    assert_eq!(config.cron, "0 6 * * *");
    assert_eq!(config.execution_count, 0);
    manager.shutdown();
}

#[tokio::test]
async fn invalid_cron_expression_is_rejected() {
    let (_pool, manager) = manager().await;
    assert!(
        manager
            .create_cronjob(restart_params(), "not a cron", None, None, None)
            .await
            .is_err()
    );
    assert!(
        manager
            .create_cronjob(restart_params(), "0 6 * *", None, None, None)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn pause_resume_cancel_state_machine() {
    let (_pool, manager) = manager().await;
    let id = manager
        .create_cronjob(restart_params(), "0 6 * * *", None, None, None)
        .await
        .unwrap();

    manager.pause_cronjob(&id).await.unwrap();
    // Pausing twice conflicts.
    assert!(manager.pause_cronjob(&id).await.is_err());

    manager.resume_cronjob(&id).await.unwrap();
    // Resuming an active job conflicts.
    assert!(manager.resume_cronjob(&id).await.is_err());

    manager.cancel_cronjob(&id).await.unwrap();
    assert!(manager.cancel_cronjob(&id).await.is_err());
    let config = manager.get_cronjob_config(&id).await.unwrap();
    assert_eq!(config.status, CronJobStatus::Cancelled);

    // A cancelled job can be resumed.
    manager.resume_cronjob(&id).await.unwrap();
    let config = manager.get_cronjob_config(&id).await.unwrap();
    assert_eq!(config.status, CronJobStatus::Active);
    manager.shutdown();
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let (_pool, manager) = manager().await;
    assert!(manager.get_cronjob_config("missing").await.is_err());
    assert!(manager.pause_cronjob("missing").await.is_err());
    assert!(manager.get_execution_history("missing", 10).await.is_err());
}

#[tokio::test]
async fn filters_apply_to_identifier_status_and_name() {
    let (_pool, manager) = manager().await;
    manager
        .create_cronjob(
            restart_params(),
            "0 6 * * *",
            Some("restart_a".to_string()),
            Some("Nightly survival restart".to_string()),
            None,
        )
        .await
        .unwrap();
    let paused_id = manager
        .create_cronjob(
            restart_params(),
            "30 6 * * *",
            Some("restart_b".to_string()),
            Some("Other restart".to_string()),
            None,
        )
        .await
        .unwrap();
    manager.pause_cronjob(&paused_id).await.unwrap();

    let all = manager
        .get_all_cronjobs(&CronJobFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let active_only = manager
        .get_all_cronjobs(&CronJobFilter {
            statuses: Some(vec![CronJobStatus::Active]),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(active_only.len(), 1);
    assert_eq!(active_only[0].cronjob_id, "restart_a");

    let by_name = manager
        .get_all_cronjobs(&CronJobFilter {
            name: Some("nightly".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_name.len(), 1);
    manager.shutdown();
}

#[tokio::test]
async fn execution_count_matches_history_rows() {
    let (pool, manager) = manager().await;
    // Fire every second so the trigger runs at least once quickly.
    let id = manager
        .create_cronjob(
            restart_params(),
            "* * * * *",
            None,
            None,
            Some("*".to_string()),
        )
        .await
        .unwrap();

    // Wait for at least one recorded execution.
    let mut waited = Duration::ZERO;
    loop {
        let history = manager.get_execution_history(&id, 50).await.unwrap();
        if !history.is_empty() {
            break;
        }
        if waited > Duration::from_secs(10) {
            panic!("no execution recorded within 10s");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        waited += Duration::from_millis(200);
    }
    manager.shutdown();
    // Let any in-flight execution record itself.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let history = manager.get_execution_history(&id, 50).await.unwrap();
    let config = manager.get_cronjob_config(&id).await.unwrap();
    assert_eq!(config.execution_count as usize, history.len());

    // The fixture server does not exist, so executions fail and carry the
    // failure message.
    let failed = history
        .iter()
        .find(|record| record.status == ExecutionStatus::Failed)
        .expect("at least one failed execution");
    assert!(failed.ended_at.is_some());
    assert!(failed.duration_ms.is_some());
    assert!(failed.messages.iter().any(|m| m.contains("failed")));

    let (row_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM cronjob_executions WHERE cronjob_id = ?")
            .bind(&id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(row_count as usize, history.len());
}

#[tokio::test]
async fn recovery_skips_rows_with_unknown_identifier() {
    let (pool, manager) = manager().await;
    // A row left behind by an older build with a since-removed identifier.
    sqlx::query(
        "INSERT INTO cronjobs (cronjob_id, identifier, name, cron, params_json, status, created_at, updated_at) \
         VALUES ('ghost_1', 'ghost', 'ghost', '0 6 * * *', '{}', 'ACTIVE', ?, ?)",
    )
    .bind(chrono::Utc::now())
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await
    .unwrap();
    manager
        .create_cronjob(restart_params(), "0 6 * * *", Some("ok_1".to_string()), None, None)
        .await
        .unwrap();

    // Recovery must not fail, and the ghost row must stay untouched.
    manager.recover_from_database().await.unwrap();
    let (status,): (String,) =
        sqlx::query_as("SELECT status FROM cronjobs WHERE cronjob_id = 'ghost_1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "ACTIVE");
    manager.shutdown();
}

#[tokio::test]
async fn next_run_time_requires_active_status() {
    let (_pool, manager) = manager().await;
    let id = manager
        .create_cronjob(restart_params(), "0 6 * * *", None, None, None)
        .await
        .unwrap();
    let next = manager.get_next_run_time(&id).await.unwrap();
    assert!(next > chrono::Utc::now());

    manager.pause_cronjob(&id).await.unwrap();
    assert!(manager.get_next_run_time(&id).await.is_err());
}
