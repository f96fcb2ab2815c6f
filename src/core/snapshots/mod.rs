// src/core/snapshots/mod.rs

//! Content-addressed snapshot management, shelling out to restic.
//!
//! This module knows nothing about Minecraft servers; callers resolve paths
//! before handing them in.

use crate::core::errors::McAdminError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// A snapshot as reported by `restic snapshots --json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResticSnapshot {
    pub time: DateTime<Utc>,
    pub paths: Vec<String>,
    pub hostname: String,
    pub username: String,
    #[serde(default)]
    pub program_version: Option<String>,
    pub id: String,
    pub short_id: String,
}

/// The summary block restic prints at the end of a backup.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResticBackupSummary {
    #[serde(default)]
    pub files_new: Option<u64>,
    #[serde(default)]
    pub files_changed: Option<u64>,
    #[serde(default)]
    pub files_unmodified: Option<u64>,
    #[serde(default)]
    pub dirs_new: Option<u64>,
    #[serde(default)]
    pub dirs_changed: Option<u64>,
    #[serde(default)]
    pub dirs_unmodified: Option<u64>,
    #[serde(default)]
    pub data_added: Option<u64>,
    #[serde(default)]
    pub data_added_packed: Option<u64>,
    #[serde(default)]
    pub total_files_processed: Option<u64>,
    #[serde(default)]
    pub total_bytes_processed: Option<u64>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
}

/// A freshly created snapshot together with its backup summary.
#[derive(Debug, Clone)]
pub struct ResticSnapshotWithSummary {
    pub snapshot: ResticSnapshot,
    pub summary: ResticBackupSummary,
}

/// One line of `restic restore --dry-run -vv --json` output.
#[derive(Debug, Clone, Deserialize)]
pub struct RestorePreviewAction {
    pub message_type: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Retention policy for `forget`.
#[derive(Debug, Clone, Default)]
pub struct RetentionPolicy {
    pub keep_last: Option<u32>,
    pub keep_hourly: Option<u32>,
    pub keep_daily: Option<u32>,
    pub keep_weekly: Option<u32>,
    pub keep_monthly: Option<u32>,
    pub keep_yearly: Option<u32>,
    pub keep_tag: Option<Vec<String>>,
    pub keep_within: Option<String>,
}

impl RetentionPolicy {
    pub fn is_empty(&self) -> bool {
        self.keep_last.is_none()
            && self.keep_hourly.is_none()
            && self.keep_daily.is_none()
            && self.keep_weekly.is_none()
            && self.keep_monthly.is_none()
            && self.keep_yearly.is_none()
            && self.keep_tag.as_ref().is_none_or(|tags| tags.is_empty())
            && self
                .keep_within
                .as_ref()
                .is_none_or(|within| within.trim().is_empty())
    }

    fn push_args(&self, args: &mut Vec<String>) {
        let mut push_count = |flag: &str, value: Option<u32>| {
            if let Some(value) = value {
                args_push_pair(args, flag, value.to_string());
            }
        };
        push_count("--keep-last", self.keep_last);
        push_count("--keep-hourly", self.keep_hourly);
        push_count("--keep-daily", self.keep_daily);
        push_count("--keep-weekly", self.keep_weekly);
        push_count("--keep-monthly", self.keep_monthly);
        push_count("--keep-yearly", self.keep_yearly);
        if let Some(tags) = &self.keep_tag {
            for tag in tags {
                args_push_pair(args, "--keep-tag", tag.clone());
            }
        }
        if let Some(within) = &self.keep_within
            && !within.trim().is_empty()
        {
            args_push_pair(args, "--keep-within", within.clone());
        }
    }
}

fn args_push_pair(args: &mut Vec<String>, flag: &str, value: String) {
    args.push(flag.to_string());
    args.push(value);
}

/// Core restic operations manager.
pub struct ResticManager {
    repository: String,
    password: Option<String>,
}

impl ResticManager {
    pub fn new(repository: impl Into<String>, password: Option<String>) -> Self {
        let password = password.filter(|p| !p.trim().is_empty());
        Self {
            repository: repository.into(),
            password,
        }
    }

    async fn exec(&self, args: &[String]) -> Result<String, McAdminError> {
        let mut command = Command::new("restic");
        command
            .args(args)
            .env("RESTIC_REPOSITORY", &self.repository)
            .stdin(Stdio::null());
        if let Some(password) = &self.password {
            command.env("RESTIC_PASSWORD", password);
        } else {
            command.arg("--insecure-no-password");
        }

        debug!("restic {:?}", args);
        let output = command
            .output()
            .await
            .map_err(|e| McAdminError::Restic(format!("failed to invoke restic: {e}")))?;

        if !output.status.success() {
            return Err(McAdminError::Restic(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Creates a snapshot of an absolute path and returns it with the backup
    /// summary.
    pub async fn backup(&self, path: &Path) -> Result<ResticSnapshotWithSummary, McAdminError> {
        if !path.is_absolute() {
            return Err(McAdminError::Validation(
                "backup path must be absolute".to_string(),
            ));
        }

        let args = vec![
            "backup".to_string(),
            path.to_string_lossy().into_owned(),
            "--json".to_string(),
        ];
        let output = self.exec(&args).await?;

        let summary = parse_backup_summary(&output).ok_or_else(|| {
            McAdminError::Restic("could not parse snapshot data from backup output".to_string())
        })?;
        let snapshot_id = summary.snapshot_id.clone().ok_or_else(|| {
            McAdminError::Restic("backup summary carried no snapshot id".to_string())
        })?;

        let snapshots = self.list_snapshot_by_id(&snapshot_id).await?;
        let snapshot = snapshots.into_iter().next().ok_or_else(|| {
            McAdminError::Restic(format!("snapshot {snapshot_id} not found after backup"))
        })?;

        Ok(ResticSnapshotWithSummary { snapshot, summary })
    }

    async fn list_snapshot_by_id(&self, id: &str) -> Result<Vec<ResticSnapshot>, McAdminError> {
        let args = vec!["snapshots".to_string(), id.to_string(), "--json".to_string()];
        let output = self.exec(&args).await?;
        serde_json::from_str(&output)
            .map_err(|e| McAdminError::Restic(format!("could not parse snapshots JSON: {e}")))
    }

    /// Lists snapshots, optionally restricted to those covering the given
    /// path.
    pub async fn list_snapshots(
        &self,
        path_filter: Option<&Path>,
    ) -> Result<Vec<ResticSnapshot>, McAdminError> {
        let args = vec!["snapshots".to_string(), "--json".to_string()];
        let output = self.exec(&args).await?;
        let snapshots: Vec<ResticSnapshot> = serde_json::from_str(&output)
            .map_err(|e| McAdminError::Restic(format!("could not parse snapshots JSON: {e}")))?;

        let Some(filter) = path_filter else {
            return Ok(snapshots);
        };
        Ok(snapshots
            .into_iter()
            .filter(|snapshot| {
                snapshot
                    .paths
                    .iter()
                    .any(|snapshot_path| filter.starts_with(snapshot_path))
            })
            .collect())
    }

    /// Dry-run restore, returning the actions that would be applied. Unsized
    /// "restored" entries (directories) are filtered out.
    pub async fn restore_preview(
        &self,
        snapshot_id: &str,
        target: &Path,
        include: Option<&Path>,
    ) -> Result<Vec<RestorePreviewAction>, McAdminError> {
        let mut args = vec![
            "restore".to_string(),
            snapshot_id.to_string(),
            "--target".to_string(),
            target.to_string_lossy().into_owned(),
            "--dry-run".to_string(),
            "-vv".to_string(),
            "--delete".to_string(),
            "--json".to_string(),
        ];
        if let Some(include) = include {
            args_push_pair(&mut args, "--include", include.to_string_lossy().into_owned());
        }

        let output = self.exec(&args).await?;
        let actions = output
            .lines()
            .filter_map(|line| serde_json::from_str::<RestorePreviewAction>(line).ok())
            .filter(|action| {
                matches!(action.action.as_deref(), Some("updated" | "deleted" | "restored"))
            })
            .filter(|action| {
                action.action.as_deref() != Some("restored") || action.size.unwrap_or(0) > 0
            })
            .collect();
        Ok(actions)
    }

    /// In-place restore of a snapshot.
    pub async fn restore(
        &self,
        snapshot_id: &str,
        target: &Path,
        include: Option<&Path>,
    ) -> Result<(), McAdminError> {
        let mut args = vec![
            "restore".to_string(),
            snapshot_id.to_string(),
            "--target".to_string(),
            target.to_string_lossy().into_owned(),
            "--delete".to_string(),
        ];
        if let Some(include) = include {
            args_push_pair(&mut args, "--include", include.to_string_lossy().into_owned());
        }
        self.exec(&args).await.map(|_| ())
    }

    /// Applies a retention policy. The policy must keep something.
    pub async fn forget(
        &self,
        policy: &RetentionPolicy,
        prune: bool,
    ) -> Result<String, McAdminError> {
        if policy.is_empty() {
            return Err(McAdminError::Validation(
                "at least one retention policy parameter must be specified".to_string(),
            ));
        }
        // Empty group-by applies the policy across all snapshots at once.
        let mut args = vec![
            "forget".to_string(),
            "--group-by".to_string(),
            String::new(),
        ];
        policy.push_args(&mut args);
        if prune {
            args.push("--prune".to_string());
        }
        self.exec(&args).await
    }

    /// Removes one snapshot by id.
    pub async fn forget_id(&self, snapshot_id: &str, prune: bool) -> Result<String, McAdminError> {
        let mut args = vec!["forget".to_string(), snapshot_id.to_string()];
        if prune {
            args.push("--prune".to_string());
        }
        self.exec(&args).await
    }
}

/// Finds the summary line in backup output (last JSON line with
/// `message_type == "summary"`).
fn parse_backup_summary(output: &str) -> Option<ResticBackupSummary> {
    output
        .lines()
        .rev()
        .filter_map(|line| serde_json::from_str::<ResticBackupSummary>(line).ok())
        .find(|summary| summary.message_type.as_deref() == Some("summary"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_summary_line_in_backup_output() {
        let output = r#"{"message_type":"status","percent_done":0.5}
{"message_type":"summary","files_new":10,"total_bytes_processed":2048,"snapshot_id":"abc123"}
"#;
        let summary = parse_backup_summary(output).unwrap();
        assert_eq!(summary.snapshot_id.as_deref(), Some("abc123"));
        assert_eq!(summary.files_new, Some(10));
        assert_eq!(summary.total_bytes_processed, Some(2048));
    }

    #[test]
    fn no_summary_means_none() {
        assert!(parse_backup_summary("{\"message_type\":\"status\"}\nnot json\n").is_none());
    }

    #[test]
    fn empty_retention_policy_is_rejected_shape() {
        assert!(RetentionPolicy::default().is_empty());
        let policy = RetentionPolicy {
            keep_tag: Some(vec![]),
            keep_within: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(policy.is_empty());
        let policy = RetentionPolicy {
            keep_daily: Some(7),
            ..Default::default()
        };
        assert!(!policy.is_empty());
    }
}
