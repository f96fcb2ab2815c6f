// src/core/instance/mod.rs

//! The instance supervisor: translates the on-disk set of compose projects
//! into a typed API over lifecycle, status, RCON and runtime stats.

pub mod compose;
pub mod compose_manager;
pub mod properties;
pub mod query;
pub mod stats;

use crate::core::dynamic_config::modules::QueryConfig;
use crate::core::errors::McAdminError;
use compose::{MC_SERVICE, McCompose, ServerType};
use compose_manager::ComposeManager;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{Display, EnumString};
use tokio::sync::Mutex;
use tracing::{debug, warn};

static ANSI_ESCAPE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").unwrap());

/// Hierarchical server status; a higher level implies all lower ones.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, serde::Serialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum McServerStatus {
    /// No compose file exists in the project directory.
    Removed,
    /// Compose exists but no container has been created.
    Exists,
    /// Container exists but is not running.
    Created,
    /// Container process is running (healthcheck failing or absent).
    Running,
    /// Running and the healthcheck reports "starting".
    Starting,
    /// Running and healthy.
    Healthy,
}

/// Phase notifications emitted by [`McInstance::rebuild`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildProgress {
    Down,
    ComposeUpdated,
    Up,
}

/// Static facts about a server, extracted from its compose file.
#[derive(Debug, Clone, serde::Serialize)]
pub struct McServerInfo {
    pub name: String,
    pub path: PathBuf,
    pub java_version: u32,
    pub max_memory_bytes: u64,
    #[serde(serialize_with = "serialize_server_type")]
    pub server_type: ServerType,
    pub game_version: String,
    pub game_port: u16,
    pub rcon_port: u16,
}

fn serialize_server_type<S: serde::Serializer>(
    value: &ServerType,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

/// Entry point to all managed instances under one servers root.
pub struct DockerMcManager {
    servers_path: PathBuf,
    /// Per-instance locks serializing writers of the compose project dir.
    project_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DockerMcManager {
    pub fn new(servers_path: impl Into<PathBuf>) -> Self {
        Self {
            servers_path: servers_path.into(),
            project_locks: DashMap::new(),
        }
    }

    pub fn servers_path(&self) -> &Path {
        &self.servers_path
    }

    /// All instance ids (directory names under the servers root), sorted.
    pub async fn list_instance_ids(&self) -> Result<Vec<String>, McAdminError> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.servers_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn get_instance(&self, name: &str) -> McInstance {
        let lock = self
            .project_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        McInstance::new(&self.servers_path, name, lock)
    }

    /// Server info for every instance with a valid compose file; instances
    /// that fail to parse are skipped with a warning.
    pub async fn get_all_server_info(&self) -> Result<Vec<McServerInfo>, McAdminError> {
        let mut infos = Vec::new();
        for name in self.list_instance_ids().await? {
            let instance = self.get_instance(&name);
            if !instance.exists().await? {
                continue;
            }
            match instance.get_server_info().await {
                Ok(info) => infos.push(info),
                Err(e) => warn!("Skipping instance '{name}': {e}"),
            }
        }
        Ok(infos)
    }

    /// Rejects a compose whose published ports collide with another
    /// instance's game or RCON port.
    pub async fn check_port_conflicts(
        &self,
        name: &str,
        compose: &McCompose,
    ) -> Result<(), McAdminError> {
        for info in self.get_all_server_info().await? {
            if info.name == name {
                continue;
            }
            for port in [compose.game_port(), compose.rcon_port()] {
                if port == info.game_port || port == info.rcon_port {
                    return Err(McAdminError::Conflict(format!(
                        "port {port} is already used by server '{}'",
                        info.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One managed server instance, identified by its directory name.
pub struct McInstance {
    servers_path: PathBuf,
    name: String,
    project_path: PathBuf,
    compose_manager: ComposeManager,
    project_lock: Arc<Mutex<()>>,
}

impl McInstance {
    fn new(servers_path: &Path, name: &str, project_lock: Arc<Mutex<()>>) -> Self {
        let project_path = servers_path.join(name);
        Self {
            servers_path: servers_path.to_path_buf(),
            name: name.to_string(),
            compose_manager: ComposeManager::new(&project_path),
            project_path,
            project_lock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn data_path(&self) -> PathBuf {
        self.project_path.join("data")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_path().join("logs").join("latest.log")
    }

    pub fn compose_manager(&self) -> &ComposeManager {
        &self.compose_manager
    }

    /// The first existing compose file among the four accepted names.
    pub async fn compose_file_path(&self) -> Option<PathBuf> {
        const CANDIDATES: [&str; 4] = [
            "docker-compose.yml",
            "docker-compose.yaml",
            "compose.yml",
            "compose.yaml",
        ];
        for candidate in CANDIDATES {
            let path = self.project_path.join(candidate);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }

    pub async fn get_compose_yaml(&self) -> Result<String, McAdminError> {
        let path = self
            .compose_file_path()
            .await
            .ok_or_else(|| McAdminError::ServerNotFound(self.name.clone()))?;
        Ok(tokio::fs::read_to_string(path).await?)
    }

    pub async fn get_compose(&self) -> Result<McCompose, McAdminError> {
        let compose = McCompose::parse(&self.get_compose_yaml().await?)?;
        if compose.server_name() != self.name {
            return Err(McAdminError::InvalidCompose(format!(
                "compose names server '{}' but lives in project '{}'",
                compose.server_name(),
                self.name
            )));
        }
        Ok(compose)
    }

    fn verify_compose_yaml(&self, compose_yaml: &str) -> Result<McCompose, McAdminError> {
        let compose = McCompose::parse(compose_yaml)?;
        if compose.server_name() != self.name {
            return Err(McAdminError::InvalidCompose(format!(
                "container_name must be 'mc-{}'",
                self.name
            )));
        }
        Ok(compose)
    }

    /// Creates the project: validates the compose, writes it, creates `data/`
    /// and copies ownership from the servers root.
    pub async fn create(&self, compose_yaml: &str) -> Result<(), McAdminError> {
        let _guard = self.project_lock.lock().await;

        self.verify_compose_yaml(compose_yaml)?;

        tokio::fs::create_dir_all(&self.project_path).await?;
        if self.compose_file_path().await.is_some() {
            return Err(McAdminError::Conflict(format!(
                "compose file already exists for server '{}'",
                self.name
            )));
        }

        let compose_file_path = self.project_path.join("docker-compose.yml");
        tokio::fs::write(&compose_file_path, compose_yaml).await?;
        tokio::fs::create_dir_all(self.data_path()).await?;

        self.copy_root_ownership(&[
            self.project_path.clone(),
            self.data_path(),
            compose_file_path,
        ])
        .await?;

        Ok(())
    }

    /// Applies the servers root's uid/gid to the given paths so the game
    /// server container can write its own files.
    async fn copy_root_ownership(&self, paths: &[PathBuf]) -> Result<(), McAdminError> {
        let metadata = match tokio::fs::metadata(&self.servers_path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Cannot stat servers root for ownership copy: {e}");
                return Ok(());
            }
        };
        let (uid, gid) = (metadata.uid(), metadata.gid());
        for path in paths {
            if let Err(e) = std::os::unix::fs::chown(path, Some(uid), Some(gid)) {
                warn!("Failed to chown {path:?} to {uid}:{gid}: {e}");
            }
        }
        Ok(())
    }

    /// Replaces the compose file. Only allowed while no container exists; a
    /// live edit requires the caller to go down → update → up.
    pub async fn update_compose(&self, compose_yaml: &str) -> Result<(), McAdminError> {
        let _guard = self.project_lock.lock().await;
        self.update_compose_locked(compose_yaml).await
    }

    async fn update_compose_locked(&self, compose_yaml: &str) -> Result<(), McAdminError> {
        if self.created().await? {
            return Err(McAdminError::InvalidStatus(format!(
                "cannot update compose for server '{}' while its container exists",
                self.name
            )));
        }
        self.verify_compose_yaml(compose_yaml)?;

        let path = self
            .compose_file_path()
            .await
            .ok_or_else(|| McAdminError::ServerNotFound(self.name.clone()))?;
        tokio::fs::write(path, compose_yaml).await?;
        Ok(())
    }

    /// Deletes the whole project directory. Forbidden while the container
    /// exists.
    pub async fn remove(&self) -> Result<(), McAdminError> {
        let _guard = self.project_lock.lock().await;

        if self.created().await? {
            return Err(McAdminError::InvalidStatus(format!(
                "cannot remove server '{}' while its container exists",
                self.name
            )));
        }
        if !tokio::fs::try_exists(&self.project_path).await? {
            return Err(McAdminError::ServerNotFound(self.name.clone()));
        }
        tokio::fs::remove_dir_all(&self.project_path).await?;
        Ok(())
    }

    pub async fn up(&self) -> Result<(), McAdminError> {
        self.compose_manager.up_detached().await
    }

    pub async fn down(&self) -> Result<(), McAdminError> {
        self.compose_manager.down().await
    }

    pub async fn start(&self) -> Result<(), McAdminError> {
        self.compose_manager.start().await
    }

    pub async fn stop(&self) -> Result<(), McAdminError> {
        self.compose_manager.stop().await
    }

    pub async fn restart(&self) -> Result<(), McAdminError> {
        self.compose_manager.restart().await
    }

    pub async fn exists(&self) -> Result<bool, McAdminError> {
        Ok(self.compose_file_path().await.is_some())
    }

    pub async fn created(&self) -> Result<bool, McAdminError> {
        self.compose_manager.created().await
    }

    pub async fn running(&self) -> Result<bool, McAdminError> {
        self.compose_manager.running().await
    }

    /// Derives the hierarchical status, checking from the bottom up so every
    /// level implies the ones below it.
    pub async fn status(&self) -> Result<McServerStatus, McAdminError> {
        if !self.exists().await? {
            return Ok(McServerStatus::Removed);
        }
        if !self.created().await? {
            return Ok(McServerStatus::Exists);
        }
        if !self.running().await? {
            return Ok(McServerStatus::Created);
        }
        if self.compose_manager.starting(MC_SERVICE).await? {
            return Ok(McServerStatus::Starting);
        }
        if !self.compose_manager.healthy(MC_SERVICE).await? {
            return Ok(McServerStatus::Running);
        }
        Ok(McServerStatus::Healthy)
    }

    pub async fn get_server_info(&self) -> Result<McServerInfo, McAdminError> {
        let compose = self.get_compose().await?;
        Ok(McServerInfo {
            name: compose.server_name().to_string(),
            path: self.project_path.clone(),
            java_version: compose.java_version(),
            max_memory_bytes: compose.max_memory_bytes(),
            server_type: compose.server_type(),
            game_version: compose.game_version().to_string(),
            game_port: compose.game_port(),
            rcon_port: compose.rcon_port(),
        })
    }

    pub async fn get_server_properties(&self) -> Result<properties::ServerProperties, McAdminError> {
        let path = self.data_path().join("server.properties");
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                McAdminError::NotFound(format!("server.properties for '{}'", self.name))
            } else {
                e.into()
            }
        })?;
        Ok(properties::ServerProperties::parse(&content))
    }

    /// Transparent compose edit for a live server: down, replace the compose
    /// file, up. Progress lands on the sink after each phase; cancellation is
    /// honored between phases, leaving the server down rather than half-up.
    pub async fn rebuild(
        &self,
        compose_yaml: &str,
        progress: &tokio::sync::mpsc::Sender<RebuildProgress>,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<(), McAdminError> {
        self.verify_compose_yaml(compose_yaml)?;

        // The whole sequence crosses a lifecycle boundary, so it holds the
        // project lock end to end.
        let _guard = self.project_lock.lock().await;

        self.down().await?;
        let _ = progress.send(RebuildProgress::Down).await;
        if cancel.is_cancelled() {
            return Err(McAdminError::Conflict("rebuild cancelled".to_string()));
        }

        self.update_compose_locked(compose_yaml).await?;
        let _ = progress.send(RebuildProgress::ComposeUpdated).await;
        if cancel.is_cancelled() {
            return Err(McAdminError::Conflict("rebuild cancelled".to_string()));
        }

        self.up().await?;
        let _ = progress.send(RebuildProgress::Up).await;
        Ok(())
    }

    /// Sends a command over RCON via the in-container `rcon-cli` helper and
    /// strips ANSI escapes from the response.
    pub async fn send_rcon_command(&self, command: &str) -> Result<String, McAdminError> {
        if !self.compose_manager.healthy(MC_SERVICE).await? {
            return Err(McAdminError::InvalidStatus(format!(
                "server '{}' is not healthy",
                self.name
            )));
        }
        let raw = self
            .compose_manager
            .exec(MC_SERVICE, &["rcon-cli", command])
            .await
            .map_err(|e| McAdminError::Rcon(e.to_string()))?;
        Ok(strip_ansi(&raw).trim().to_string())
    }

    /// Lists online players: UDP query first when enabled, RCON fallback.
    pub async fn list_players(&self, query_config: &QueryConfig) -> Result<Vec<String>, McAdminError> {
        match self.list_players_query(query_config).await {
            Ok(players) => Ok(players),
            Err(e) => {
                debug!("Query protocol failed for server '{}': {e}", self.name);
                self.list_players_rcon().await
            }
        }
    }

    async fn list_players_query(
        &self,
        query_config: &QueryConfig,
    ) -> Result<Vec<String>, McAdminError> {
        let props = self.get_server_properties().await?;
        if props.enable_query != Some(true) {
            return Err(McAdminError::InvalidStatus(
                "query protocol is not enabled in server.properties".to_string(),
            ));
        }
        let port = props.query_port.ok_or_else(|| {
            McAdminError::InvalidStatus("query port is not configured".to_string())
        })?;
        query::query_players(
            "127.0.0.1",
            port,
            Duration::from_millis(query_config.timeout_ms),
        )
        .await
    }

    async fn list_players_rcon(&self) -> Result<Vec<String>, McAdminError> {
        let response = self.send_rcon_command("list").await?;
        Ok(parse_rcon_player_list(&response))
    }

    /// The container id of the mc service; errors if no container exists.
    pub async fn container_id(&self) -> Result<String, McAdminError> {
        self.compose_manager
            .container_id(MC_SERVICE)
            .await?
            .ok_or_else(|| {
                McAdminError::InvalidStatus(format!("server '{}' is not created", self.name))
            })
    }

    /// Finds the Java process pid from `docker compose top` output.
    pub async fn java_pid(&self) -> Result<u32, McAdminError> {
        let output = self.compose_manager.top().await?;
        parse_java_pid_from_top(&output).ok_or_else(|| {
            McAdminError::Internal(format!(
                "could not find Java process for server '{}'",
                self.name
            ))
        })
    }

    pub async fn memory_usage(&self) -> Result<stats::MemoryStats, McAdminError> {
        let container_id = self.container_id().await?;
        stats::read_memory_stats(&container_id).await
    }

    pub async fn cpu_percent(&self) -> Result<f64, McAdminError> {
        let pid = self.java_pid().await?;
        stats::sample_process_cpu_percent(pid).await
    }

    pub async fn disk_io(&self) -> Result<stats::BlockIoStats, McAdminError> {
        let container_id = self.container_id().await?;
        stats::read_block_io_stats(&container_id).await
    }

    pub async fn network_io(&self) -> Result<stats::NetworkStats, McAdminError> {
        let pid = self.java_pid().await?;
        stats::read_network_stats(pid).await
    }

    pub async fn disk_space_info(&self) -> Result<stats::DiskSpaceInfo, McAdminError> {
        let data_path = self.data_path();
        if !tokio::fs::try_exists(&data_path).await? {
            return Err(McAdminError::NotFound(format!(
                "data directory for server '{}'",
                self.name
            )));
        }
        stats::read_disk_space(&data_path).await
    }
}

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE_PATTERN.replace_all(text, "").into_owned()
}

/// Parses the canonical `There are N of a max of M players online: a, b, c`
/// RCON response. Anything without a colon means nobody is online.
pub fn parse_rcon_player_list(response: &str) -> Vec<String> {
    let Some((_, names)) = response.split_once(':') else {
        return Vec::new();
    };
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Finds the Java process pid in `docker compose top` output. Newer engines
/// prefix a SERVICE column, older ones start directly with UID.
fn parse_java_pid_from_top(output: &str) -> Option<u32> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next()?;
    let (column_count, pid_column) = if header.trim_start().starts_with("SERVICE") {
        (10, 3)
    } else {
        (8, 1)
    };

    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < column_count {
            continue;
        }
        // The command column may contain spaces; its first token is enough to
        // recognize the Java process.
        if parts[column_count - 1].starts_with("java")
            && let Ok(pid) = parts[pid_column].parse()
        {
            return Some(pid);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ordering_is_hierarchical() {
        assert!(McServerStatus::Healthy > McServerStatus::Running);
        assert!(McServerStatus::Running > McServerStatus::Created);
        assert!(McServerStatus::Created > McServerStatus::Exists);
        assert!(McServerStatus::Exists > McServerStatus::Removed);
    }

    #[test]
    fn parses_rcon_player_list() {
        let players =
            parse_rcon_player_list("There are 3 of a max of 20 players online: Alice, Bob, carol");
        assert_eq!(players, vec!["Alice", "Bob", "carol"]);
        assert!(parse_rcon_player_list("There are 0 of a max of 20 players online:").is_empty());
        assert!(parse_rcon_player_list("no colon here").is_empty());
    }

    #[test]
    fn strips_ansi_escapes() {
        assert_eq!(strip_ansi("\x1b[32mhello\x1b[0m world"), "hello world");
    }
}
