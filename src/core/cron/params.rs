// src/core/cron/params.rs

//! Typed parameter structs for the built-in cron jobs.
//!
//! `JobParams` is a closed union dispatched on the registered identifier:
//! the stored `params_json` is the inner struct's JSON, and decoding picks
//! the right variant from the row's identifier column.

use crate::core::errors::McAdminError;
use serde::{Deserialize, Serialize};

pub const BACKUP_IDENTIFIER: &str = "backup";
pub const RESTART_SERVER_IDENTIFIER: &str = "restart_server";

/// Parameters for the backup job.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BackupJobParams {
    /// Server to back up; absent means the whole servers root.
    #[serde(default)]
    pub server_id: Option<String>,
    /// Path inside the server's data directory. Requires `server_id`.
    #[serde(default)]
    pub path: Option<String>,

    /// Whether to run forget after the backup.
    #[serde(default = "default_enable_forget")]
    pub enable_forget: bool,

    // Retention policy. At least one must be set when forget is enabled.
    #[serde(default)]
    pub keep_last: Option<u32>,
    #[serde(default)]
    pub keep_hourly: Option<u32>,
    #[serde(default)]
    pub keep_daily: Option<u32>,
    #[serde(default)]
    pub keep_weekly: Option<u32>,
    #[serde(default)]
    pub keep_monthly: Option<u32>,
    #[serde(default)]
    pub keep_yearly: Option<u32>,
    #[serde(default)]
    pub keep_tag: Option<Vec<String>>,
    /// Duration expression like `4d` or `2y5m7d3h`.
    #[serde(default)]
    pub keep_within: Option<String>,

    /// Whether to prune after forget.
    #[serde(default = "default_prune")]
    pub prune: bool,

    /// Uptime Kuma push monitor URL, pinged after every run.
    #[serde(default)]
    pub uptimekuma_url: Option<String>,
}

fn default_enable_forget() -> bool {
    true
}
fn default_prune() -> bool {
    true
}

impl BackupJobParams {
    pub fn has_retention_policy(&self) -> bool {
        self.keep_last.is_some()
            || self.keep_hourly.is_some()
            || self.keep_daily.is_some()
            || self.keep_weekly.is_some()
            || self.keep_monthly.is_some()
            || self.keep_yearly.is_some()
            || self
                .keep_tag
                .as_ref()
                .is_some_and(|tags| !tags.is_empty())
            || self
                .keep_within
                .as_ref()
                .is_some_and(|within| !within.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), McAdminError> {
        if self.path.is_some() && self.server_id.is_none() {
            return Err(McAdminError::Validation(
                "path cannot be specified without server_id".to_string(),
            ));
        }
        if self.enable_forget && !self.has_retention_policy() {
            return Err(McAdminError::Validation(
                "at least one retention policy is required when forget is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters for the server restart job.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RestartServerParams {
    pub server_id: String,
}

impl RestartServerParams {
    pub fn validate(&self) -> Result<(), McAdminError> {
        if self.server_id.is_empty() {
            return Err(McAdminError::Validation(
                "server_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The typed union of all job parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum JobParams {
    Backup(BackupJobParams),
    RestartServer(RestartServerParams),
}

impl JobParams {
    pub fn identifier(&self) -> &'static str {
        match self {
            JobParams::Backup(_) => BACKUP_IDENTIFIER,
            JobParams::RestartServer(_) => RESTART_SERVER_IDENTIFIER,
        }
    }

    pub fn validate(&self) -> Result<(), McAdminError> {
        match self {
            JobParams::Backup(params) => params.validate(),
            JobParams::RestartServer(params) => params.validate(),
        }
    }

    pub fn to_json(&self) -> Result<String, McAdminError> {
        let json = match self {
            JobParams::Backup(params) => serde_json::to_string(params)?,
            JobParams::RestartServer(params) => serde_json::to_string(params)?,
        };
        Ok(json)
    }

    /// Decodes stored params, dispatching on the row's identifier.
    pub fn from_json(identifier: &str, params_json: &str) -> Result<Self, McAdminError> {
        match identifier {
            BACKUP_IDENTIFIER => Ok(JobParams::Backup(serde_json::from_str(params_json)?)),
            RESTART_SERVER_IDENTIFIER => {
                Ok(JobParams::RestartServer(serde_json::from_str(params_json)?))
            }
            other => Err(McAdminError::UnknownCronIdentifier(other.to_string())),
        }
    }

    /// Decodes caller-provided params for the given identifier and validates
    /// them.
    pub fn from_value(identifier: &str, value: serde_json::Value) -> Result<Self, McAdminError> {
        let params = match identifier {
            BACKUP_IDENTIFIER => JobParams::Backup(
                serde_json::from_value(value)
                    .map_err(|e| McAdminError::Validation(format!("invalid backup params: {e}")))?,
            ),
            RESTART_SERVER_IDENTIFIER => JobParams::RestartServer(
                serde_json::from_value(value)
                    .map_err(|e| McAdminError::Validation(format!("invalid restart params: {e}")))?,
            ),
            other => return Err(McAdminError::UnknownCronIdentifier(other.to_string())),
        };
        params.validate()?;
        Ok(params)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, McAdminError> {
        let value = match self {
            JobParams::Backup(params) => serde_json::to_value(params)?,
            JobParams::RestartServer(params) => serde_json::to_value(params)?,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forget_requires_retention() {
        let params = BackupJobParams {
            enable_forget: true,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = BackupJobParams {
            enable_forget: true,
            keep_daily: Some(7),
            ..Default::default()
        };
        assert!(params.validate().is_ok());

        let params = BackupJobParams {
            enable_forget: false,
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn empty_tag_list_does_not_count_as_retention() {
        let params = BackupJobParams {
            enable_forget: true,
            keep_tag: Some(vec![]),
            keep_within: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn path_requires_server_id() {
        let params = BackupJobParams {
            path: Some("world".to_string()),
            enable_forget: false,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn params_round_trip_by_identifier() {
        let params = JobParams::RestartServer(RestartServerParams {
            server_id: "survival".to_string(),
        });
        let json = params.to_json().unwrap();
        let decoded = JobParams::from_json(RESTART_SERVER_IDENTIFIER, &json).unwrap();
        assert_eq!(params, decoded);
        assert!(JobParams::from_json("unknown_job", &json).is_err());
    }
}
