// tests/unit_restart_schedule_test.rs

//! The conflict-aware restart slot finder against a live cron table.

use mc_admin::core::cron::jobs::RestartServerJob;
use mc_admin::core::cron::params::{
    BACKUP_IDENTIFIER, BackupJobParams, JobParams, RESTART_SERVER_IDENTIFIER, RestartServerParams,
};
use mc_admin::core::cron::registry::{CronJob, ExecutionContext};
use mc_admin::core::cron::{CronManager, CronRegistry, RestartScheduler};
use mc_admin::core::db;
use mc_admin::core::errors::McAdminError;
use mc_admin::core::instance::DockerMcManager;
use std::sync::Arc;

/// Test double: the slot finder only reads rows, never runs jobs.
struct NeverRuns;

#[async_trait::async_trait]
impl CronJob for NeverRuns {
    async fn execute(&self, _context: &ExecutionContext) -> Result<(), McAdminError> {
        Ok(())
    }
}

async fn manager() -> Arc<CronManager> {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let docker = Arc::new(DockerMcManager::new("/nonexistent-servers-root"));
    let mut registry = CronRegistry::new();
    registry.register(BACKUP_IDENTIFIER, "Backup", Arc::new(NeverRuns));
    registry.register(
        RESTART_SERVER_IDENTIFIER,
        "Restart",
        Arc::new(RestartServerJob::new(docker)),
    );
    CronManager::new(pool, Arc::new(registry), chrono_tz::Tz::UTC)
}

fn backup_params() -> JobParams {
    JobParams::Backup(BackupJobParams {
        enable_forget: true,
        keep_daily: Some(7),
        ..Default::default()
    })
}

#[tokio::test]
async fn restart_avoids_backup_minute() {
    let manager = manager().await;
    manager
        .create_cronjob(backup_params(), "15 3 * * *", None, None, None)
        .await
        .unwrap();

    let scheduler = RestartScheduler::new(manager.clone(), (6, 0));
    // 06:00 does not collide with minute 15.
    let cron = scheduler.generate_restart_cron("*", "*", "*").await.unwrap();
    assert_eq!(cron, "00 06 * * *");
    manager.shutdown();
}

#[tokio::test]
async fn restart_steps_past_blocked_slots() {
    let manager = manager().await;
    // Backups on every tenth minute block 0, 10, 20...; the next free
    // 5-minute slot from 06:00 is 06:05.
    manager
        .create_cronjob(backup_params(), "*/10 3 * * *", None, None, None)
        .await
        .unwrap();

    let scheduler = RestartScheduler::new(manager.clone(), (6, 0));
    let cron = scheduler.generate_restart_cron("*", "*", "*").await.unwrap();
    assert_eq!(cron, "05 06 * * *");
    manager.shutdown();
}

#[tokio::test]
async fn paused_backups_still_block_slots() {
    let manager = manager().await;
    let id = manager
        .create_cronjob(backup_params(), "0 3 * * *", None, None, None)
        .await
        .unwrap();
    manager.pause_cronjob(&id).await.unwrap();

    let scheduler = RestartScheduler::new(manager.clone(), (6, 0));
    let minutes = scheduler.get_backup_minutes().await.unwrap();
    assert!(minutes.contains(&0));
    let cron = scheduler.generate_restart_cron("*", "*", "*").await.unwrap();
    assert_eq!(cron, "05 06 * * *");
    manager.shutdown();
}

#[tokio::test]
async fn cancelled_backups_do_not_block_slots() {
    let manager = manager().await;
    let id = manager
        .create_cronjob(backup_params(), "0 3 * * *", None, None, None)
        .await
        .unwrap();
    manager.cancel_cronjob(&id).await.unwrap();

    let scheduler = RestartScheduler::new(manager.clone(), (6, 0));
    assert!(scheduler.get_backup_minutes().await.unwrap().is_empty());
    manager.shutdown();
}

#[tokio::test]
async fn generated_cron_schedules_restart_job() {
    let manager = manager().await;
    manager
        .create_cronjob(backup_params(), "15 3 * * *", None, None, None)
        .await
        .unwrap();

    let scheduler = RestartScheduler::new(manager.clone(), (6, 0));
    let cron = scheduler.generate_restart_cron("*", "*", "*").await.unwrap();
    let restart_id = manager
        .create_cronjob(
            JobParams::RestartServer(RestartServerParams {
                server_id: "survival".to_string(),
            }),
            &cron,
            None,
            None,
            None,
        )
        .await
        .unwrap();

    let config = manager.get_cronjob_config(&restart_id).await.unwrap();
    assert_eq!(config.cron, "00 06 * * *");
    // The restart fires at 06:00 UTC.
    let next = manager.get_next_run_time(&restart_id).await.unwrap();
    assert_eq!(next.format("%H:%M").to_string(), "06:00");
    manager.shutdown();
}
