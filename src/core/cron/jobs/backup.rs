// src/core/cron/jobs/backup.rs

//! The backup cron job: snapshot, optional retention cleanup, and an Uptime
//! Kuma push at the end of every run.

use crate::config::Settings;
use crate::core::cron::params::{BackupJobParams, JobParams};
use crate::core::cron::registry::{CronJob, ExecutionContext};
use crate::core::errors::McAdminError;
use crate::core::instance::DockerMcManager;
use crate::core::snapshots::{ResticManager, RetentionPolicy};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

pub struct BackupJob {
    settings: Arc<Settings>,
    docker: Arc<DockerMcManager>,
    http: reqwest::Client,
}

impl BackupJob {
    pub fn new(settings: Arc<Settings>, docker: Arc<DockerMcManager>) -> Self {
        Self {
            settings,
            docker,
            http: reqwest::Client::new(),
        }
    }

    fn restic_manager(&self) -> Result<ResticManager, McAdminError> {
        let restic = self.settings.restic.as_ref().ok_or_else(|| {
            McAdminError::Validation(
                "restic is not configured; add a [restic] section to config.toml".to_string(),
            )
        })?;
        Ok(ResticManager::new(
            restic.repository.clone(),
            restic.password.clone(),
        ))
    }

    /// Resolves what to back up: no server → the servers root, a server →
    /// its project dir, a server plus path → that path under its data dir.
    fn resolve_backup_path(&self, params: &BackupJobParams) -> Result<PathBuf, McAdminError> {
        match (&params.server_id, &params.path) {
            (None, None) => Ok(self.settings.servers_path.clone()),
            (Some(server_id), None) => {
                Ok(self.docker.get_instance(server_id).project_path().to_path_buf())
            }
            (Some(server_id), Some(path)) => {
                let data_path = self.docker.get_instance(server_id).data_path();
                Ok(data_path.join(path.trim_start_matches('/')))
            }
            (None, Some(_)) => Err(McAdminError::Validation(
                "path cannot be specified without server_id".to_string(),
            )),
        }
    }

    async fn notify_uptime_kuma(
        &self,
        context: &ExecutionContext,
        url: &str,
        ok: bool,
        msg: &str,
        elapsed: Duration,
    ) {
        context.log(format!("Sending Uptime Kuma notification to {url}"));
        let ping = elapsed.as_millis().to_string();
        let result = self
            .http
            .get(url)
            .query(&[
                ("status", if ok { "up" } else { "down" }),
                ("msg", msg),
                ("ping", ping.as_str()),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                context.log("Uptime Kuma notification sent");
            }
            Ok(response) => {
                context.log(format!(
                    "Uptime Kuma responded with status {}",
                    response.status()
                ));
            }
            Err(e) => {
                context.log(format!("Failed to send Uptime Kuma notification: {e}"));
            }
        }
    }

    async fn run_backup(
        &self,
        context: &ExecutionContext,
        params: &BackupJobParams,
    ) -> Result<(), McAdminError> {
        let restic = self.restic_manager()?;
        let backup_path = self.resolve_backup_path(params)?;

        match (&params.server_id, &params.path) {
            (Some(server_id), Some(path)) => {
                context.log(format!("Starting backup of server '{server_id}' path '{path}'"));
            }
            (Some(server_id), None) => {
                context.log(format!("Starting backup of server '{server_id}'"));
            }
            _ => context.log("Starting backup of all servers"),
        }

        if !tokio::fs::try_exists(&backup_path).await? {
            return Err(McAdminError::NotFound(format!(
                "backup path does not exist: {}",
                backup_path.display()
            )));
        }

        context.log(format!("Creating snapshot of {}", backup_path.display()));
        let result = restic.backup(&backup_path).await?;
        context.log(format!(
            "Snapshot created: {} ({})",
            result.snapshot.short_id, result.snapshot.id
        ));
        if let (Some(files), Some(bytes)) = (
            result.summary.total_files_processed,
            result.summary.total_bytes_processed,
        ) {
            context.log(format!("Backup stats: {files} files, {bytes} bytes"));
        }

        if params.enable_forget {
            context.log("Cleaning up old snapshots...");
            let policy = RetentionPolicy {
                keep_last: params.keep_last,
                keep_hourly: params.keep_hourly,
                keep_daily: params.keep_daily,
                keep_weekly: params.keep_weekly,
                keep_monthly: params.keep_monthly,
                keep_yearly: params.keep_yearly,
                keep_tag: params.keep_tag.clone(),
                keep_within: params.keep_within.clone(),
            };
            // A failed forget never fails the backup itself.
            match restic.forget(&policy, params.prune).await {
                Ok(_) => context.log("Old snapshot cleanup completed"),
                Err(e) => {
                    warn!("Snapshot retention cleanup failed: {e}");
                    context.log(format!("Warning: snapshot cleanup failed: {e}"));
                }
            }
        }

        context.log(format!(
            "Backup completed -> snapshot {}",
            result.snapshot.short_id
        ));
        Ok(())
    }
}

#[async_trait]
impl CronJob for BackupJob {
    async fn execute(&self, context: &ExecutionContext) -> Result<(), McAdminError> {
        let JobParams::Backup(params) = &context.params else {
            return Err(McAdminError::Internal(
                "backup job invoked with non-backup params".to_string(),
            ));
        };

        let started = Instant::now();
        let result = self.run_backup(context, params).await;

        if let Some(url) = params.uptimekuma_url.as_deref().filter(|u| !u.trim().is_empty()) {
            match &result {
                Ok(()) => {
                    self.notify_uptime_kuma(context, url, true, "OK", started.elapsed())
                        .await;
                }
                Err(e) => {
                    let msg = format!("Backup failed: {e}");
                    self.notify_uptime_kuma(context, url, false, &msg, started.elapsed())
                        .await;
                }
            }
        }

        result
    }
}
