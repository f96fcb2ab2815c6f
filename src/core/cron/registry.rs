// src/core/cron/registry.rs

//! The cron job registry and the per-execution context.
//!
//! The registry is a plain map built by explicit `register` calls at process
//! start; identifiers are compile-time constants in [`super::params`].

use super::params::{BACKUP_IDENTIFIER, JobParams, RESTART_SERVER_IDENTIFIER};
use crate::core::dynamic_config::schema::hash_value_schema;
use crate::core::errors::McAdminError;
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Execution state passed to a running job. The job appends progress lines
/// through [`ExecutionContext::log`]; the wrapper persists them with the
/// execution record.
pub struct ExecutionContext {
    pub cronjob_id: String,
    pub identifier: String,
    pub execution_id: String,
    pub params: JobParams,
    pub started_at: DateTime<Utc>,
    messages: Mutex<Vec<String>>,
}

impl ExecutionContext {
    pub fn new(
        cronjob_id: String,
        identifier: String,
        execution_id: String,
        params: JobParams,
    ) -> Self {
        Self {
            cronjob_id,
            identifier,
            execution_id,
            params,
            started_at: Utc::now(),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Appends a timestamped message to the execution log.
    pub fn log(&self, message: impl AsRef<str>) {
        let timestamp = Local::now().format("%H:%M:%S%.3f");
        self.messages
            .lock()
            .push(format!("[{timestamp}] {}", message.as_ref()));
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

/// A runnable cron job implementation.
#[async_trait]
pub trait CronJob: Send + Sync {
    async fn execute(&self, context: &ExecutionContext) -> Result<(), McAdminError>;
}

/// Registration metadata for one identifier.
pub struct CronJobRegistration {
    pub description: String,
    pub job: Arc<dyn CronJob>,
    /// Version hash of the parameter schema for this identifier.
    pub schema_version: String,
}

/// Maps identifiers to their registered job implementations.
#[derive(Default)]
pub struct CronRegistry {
    jobs: HashMap<&'static str, CronJobRegistration>,
}

impl CronRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        identifier: &'static str,
        description: impl Into<String>,
        job: Arc<dyn CronJob>,
    ) {
        let schema_version = params_schema_version(identifier);
        self.jobs.insert(
            identifier,
            CronJobRegistration {
                description: description.into(),
                job,
                schema_version,
            },
        );
    }

    pub fn get(&self, identifier: &str) -> Option<&CronJobRegistration> {
        self.jobs.get(identifier)
    }

    pub fn is_registered(&self, identifier: &str) -> bool {
        self.jobs.contains_key(identifier)
    }

    pub fn identifiers(&self) -> Vec<&'static str> {
        let mut identifiers: Vec<&'static str> = self.jobs.keys().copied().collect();
        identifiers.sort();
        identifiers
    }
}

/// The schema version of an identifier's parameter struct, hashed from its
/// default JSON shape.
pub fn params_schema_version(identifier: &str) -> String {
    let default_value = match identifier {
        BACKUP_IDENTIFIER => {
            serde_json::to_value(super::params::BackupJobParams::default()).ok()
        }
        RESTART_SERVER_IDENTIFIER => {
            serde_json::to_value(super::params::RestartServerParams::default()).ok()
        }
        _ => None,
    };
    hash_value_schema(&default_value.unwrap_or(serde_json::Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopJob;

    #[async_trait]
    impl CronJob for NoopJob {
        async fn execute(&self, context: &ExecutionContext) -> Result<(), McAdminError> {
            context.log("ran");
            Ok(())
        }
    }

    #[test]
    fn registry_lookups() {
        let mut registry = CronRegistry::new();
        registry.register(BACKUP_IDENTIFIER, "Create a backup snapshot", Arc::new(NoopJob));
        assert!(registry.is_registered(BACKUP_IDENTIFIER));
        assert!(!registry.is_registered("unknown"));
        assert_eq!(registry.identifiers(), vec![BACKUP_IDENTIFIER]);
    }

    #[test]
    fn schema_versions_differ_per_identifier() {
        assert_ne!(
            params_schema_version(BACKUP_IDENTIFIER),
            params_schema_version(RESTART_SERVER_IDENTIFIER)
        );
    }

    #[tokio::test]
    async fn context_log_prefixes_timestamp() {
        let context = ExecutionContext::new(
            "backup_abc".to_string(),
            BACKUP_IDENTIFIER.to_string(),
            "123_ab".to_string(),
            JobParams::Backup(Default::default()),
        );
        context.log("hello");
        let messages = context.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].ends_with("] hello"));
        assert!(messages[0].starts_with('['));
    }
}
