// src/config.rs

//! Manages static process configuration: loading from TOML and validation.
//!
//! Everything here is fixed for the lifetime of the process. Settings that can
//! change at runtime live in [`crate::core::dynamic_config`] instead.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Settings for the restic snapshot repository. Optional: without it the
/// snapshot manager and backup cron jobs refuse to run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResticSettings {
    pub repository: String,
    /// Empty or absent means the repository was initialized with
    /// `--insecure-no-password`.
    #[serde(default)]
    pub password: Option<String>,
}

/// The process-wide static configuration, loaded once at startup.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Root directory holding one compose project per managed server.
    pub servers_path: PathBuf,

    /// SQLite connection URL, e.g. `sqlite://mc-admin.db`.
    pub database_url: String,

    /// IANA timezone name used by the cron engine (e.g. `Asia/Shanghai`).
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Wall-clock start of the auto-scheduled restart window, `HH:MM`.
    #[serde(default = "default_restart_start_time")]
    pub restart_start_time: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub restic: Option<ResticSettings>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5678
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_restart_start_time() -> String {
    "06:00".to_string()
}

impl Settings {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.servers_path.as_os_str().is_empty() {
            return Err(anyhow!("servers_path must not be empty"));
        }
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| anyhow!("'{}' is not a valid IANA timezone", self.timezone))?;
        Self::parse_restart_start_time(&self.restart_start_time)?;
        Ok(())
    }

    /// The configured cron timezone. Validated in [`Settings::validate`], so
    /// this never fails after a successful load.
    pub fn cron_timezone(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::Tz::UTC)
    }

    /// The `(hour, minute)` the restart slot finder starts searching from.
    pub fn restart_start(&self) -> (u32, u32) {
        Self::parse_restart_start_time(&self.restart_start_time).unwrap_or((6, 0))
    }

    fn parse_restart_start_time(value: &str) -> Result<(u32, u32)> {
        let (hour, minute) = value
            .split_once(':')
            .ok_or_else(|| anyhow!("restart_start_time must be HH:MM, got '{value}'"))?;
        let hour: u32 = hour
            .parse()
            .with_context(|| format!("invalid hour in restart_start_time '{value}'"))?;
        let minute: u32 = minute
            .parse()
            .with_context(|| format!("invalid minute in restart_start_time '{value}'"))?;
        if hour > 23 || minute > 59 {
            return Err(anyhow!("restart_start_time out of range: '{value}'"));
        }
        Ok((hour, minute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let settings: Settings = toml::from_str(
            r#"
            servers_path = "/srv/minecraft"
            database_url = "sqlite://mc-admin.db"
            "#,
        )
        .unwrap();
        assert_eq!(settings.port, 5678);
        assert_eq!(settings.restart_start(), (6, 0));
        assert_eq!(settings.cron_timezone(), chrono_tz::Tz::UTC);
    }

    #[test]
    fn rejects_bad_restart_time() {
        assert!(Settings::parse_restart_start_time("24:00").is_err());
        assert!(Settings::parse_restart_start_time("6").is_err());
        assert_eq!(Settings::parse_restart_start_time("06:35").unwrap(), (6, 35));
    }
}
