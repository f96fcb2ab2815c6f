// src/core/cron/jobs/restart.rs

//! The scheduled server restart job.

use crate::core::cron::params::JobParams;
use crate::core::cron::registry::{CronJob, ExecutionContext};
use crate::core::errors::McAdminError;
use crate::core::instance::DockerMcManager;
use async_trait::async_trait;
use std::sync::Arc;

pub struct RestartServerJob {
    docker: Arc<DockerMcManager>,
}

impl RestartServerJob {
    pub fn new(docker: Arc<DockerMcManager>) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl CronJob for RestartServerJob {
    async fn execute(&self, context: &ExecutionContext) -> Result<(), McAdminError> {
        let JobParams::RestartServer(params) = &context.params else {
            return Err(McAdminError::Internal(
                "restart job invoked with non-restart params".to_string(),
            ));
        };

        let instance = self.docker.get_instance(&params.server_id);
        if !instance.exists().await? {
            return Err(McAdminError::ServerNotFound(params.server_id.clone()));
        }

        if !instance.running().await? {
            context.log(format!(
                "Server '{}' is not running, skipping restart",
                params.server_id
            ));
            return Ok(());
        }

        context.log(format!("Restarting server: {}", params.server_id));
        instance.restart().await?;
        context.log(format!("Server '{}' restart completed", params.server_id));
        Ok(())
    }
}
