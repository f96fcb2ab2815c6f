// src/core/instance/compose_manager.rs

//! Shell-out wrapper around the `docker compose` engine for one project.
//!
//! The engine owns container lifecycle; this type only issues commands and
//! interprets their output. Engine failures are surfaced unchanged in the
//! error message.

use crate::core::errors::McAdminError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::compose::MC_SERVICE;

/// Health states the engine reports for a container with a healthcheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    Healthy,
    Unhealthy,
    /// The container has no healthcheck configured.
    None,
}

pub struct ComposeManager {
    project_path: PathBuf,
}

impl ComposeManager {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
        }
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Runs `docker compose <args>` in the project directory and returns
    /// stdout. A non-zero exit bubbles the engine's stderr.
    pub async fn run_compose_command(&self, args: &[&str]) -> Result<String, McAdminError> {
        debug!("docker compose {:?} in {:?}", args, self.project_path);
        let output = Command::new("docker")
            .arg("compose")
            .args(args)
            .current_dir(&self.project_path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| McAdminError::Engine(format!("failed to invoke docker compose: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(McAdminError::Engine(format!(
                "docker compose {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_docker_command(&self, args: &[&str]) -> Result<String, McAdminError> {
        let output = Command::new("docker")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| McAdminError::Engine(format!("failed to invoke docker: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(McAdminError::Engine(format!(
                "docker {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn up_detached(&self) -> Result<(), McAdminError> {
        self.run_compose_command(&["up", "-d"]).await.map(|_| ())
    }

    pub async fn down(&self) -> Result<(), McAdminError> {
        self.run_compose_command(&["down"]).await.map(|_| ())
    }

    pub async fn start(&self) -> Result<(), McAdminError> {
        self.run_compose_command(&["start"]).await.map(|_| ())
    }

    pub async fn stop(&self) -> Result<(), McAdminError> {
        self.run_compose_command(&["stop"]).await.map(|_| ())
    }

    pub async fn restart(&self) -> Result<(), McAdminError> {
        self.run_compose_command(&["restart"]).await.map(|_| ())
    }

    /// Runs a command inside the running service container.
    pub async fn exec(&self, service: &str, cmd: &[&str]) -> Result<String, McAdminError> {
        let mut args = vec!["exec", "-T", service];
        args.extend_from_slice(cmd);
        self.run_compose_command(&args).await
    }

    /// `docker compose top` output for the project.
    pub async fn top(&self) -> Result<String, McAdminError> {
        self.run_compose_command(&["top"]).await
    }

    /// The container id of the given service, if the container exists in any
    /// state.
    pub async fn container_id(&self, service: &str) -> Result<Option<String>, McAdminError> {
        let output = self
            .run_compose_command(&["ps", "--all", "-q", service])
            .await?;
        let id = output.trim();
        Ok((!id.is_empty()).then(|| id.to_string()))
    }

    /// Whether the service's container has been created (in any state).
    pub async fn created(&self) -> Result<bool, McAdminError> {
        Ok(self.container_id(MC_SERVICE).await?.is_some())
    }

    /// Whether the service's container process is currently running.
    pub async fn running(&self) -> Result<bool, McAdminError> {
        let Some(id) = self.container_id(MC_SERVICE).await? else {
            return Ok(false);
        };
        let state = self
            .run_docker_command(&["inspect", "-f", "{{.State.Running}}", &id])
            .await?;
        Ok(state.trim() == "true")
    }

    async fn health_state(&self, service: &str) -> Result<HealthState, McAdminError> {
        let Some(id) = self.container_id(service).await? else {
            return Ok(HealthState::None);
        };
        let state = self
            .run_docker_command(&[
                "inspect",
                "-f",
                "{{if .State.Health}}{{.State.Health.Status}}{{end}}",
                &id,
            ])
            .await?;
        Ok(match state.trim() {
            "starting" => HealthState::Starting,
            "healthy" => HealthState::Healthy,
            "unhealthy" => HealthState::Unhealthy,
            _ => HealthState::None,
        })
    }

    /// Whether the engine reports the service's healthcheck as still starting.
    pub async fn starting(&self, service: &str) -> Result<bool, McAdminError> {
        Ok(self.health_state(service).await? == HealthState::Starting)
    }

    /// Whether the service counts as healthy. A running container without a
    /// healthcheck is treated as healthy, matching what the engine reports.
    pub async fn healthy(&self, service: &str) -> Result<bool, McAdminError> {
        match self.health_state(service).await? {
            HealthState::Healthy => Ok(true),
            HealthState::None => self.running().await,
            HealthState::Starting | HealthState::Unhealthy => Ok(false),
        }
    }
}
