// src/core/cron/manager.rs

//! Core cron job management: persistence, triggers, execution wrapping and
//! startup recovery.
//!
//! Every job gets its own trigger task that computes the next fire time in
//! the configured timezone, sleeps, and runs the execution wrapper. The
//! wrapper awaits the job, so executions of the same job are serialized while
//! different jobs run concurrently.

use super::params::JobParams;
use super::registry::{CronRegistry, ExecutionContext};
use crate::core::db::models::{CronJobExecutionRow, CronJobRow, CronJobStatus, ExecutionStatus};
use crate::core::errors::McAdminError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use dashmap::DashMap;
use rand::Rng;
use rand::distributions::Alphanumeric;
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// In-memory view of a cron job row with decoded params.
#[derive(Debug, Clone)]
pub struct CronJobConfig {
    pub cronjob_id: String,
    pub identifier: String,
    pub name: String,
    pub cron: String,
    pub second: Option<String>,
    pub params: JobParams,
    pub execution_count: i64,
    pub status: CronJobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One persisted execution with its decoded message log.
#[derive(Debug, Clone)]
pub struct CronJobExecutionRecord {
    pub execution_id: String,
    pub cronjob_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: ExecutionStatus,
    pub messages: Vec<String>,
}

/// Filters for [`CronManager::get_all_cronjobs`].
#[derive(Debug, Clone, Default)]
pub struct CronJobFilter {
    pub identifier: Option<String>,
    pub statuses: Option<Vec<CronJobStatus>>,
    /// Case-insensitive substring match on the job name.
    pub name: Option<String>,
}

struct TriggerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct CronManager {
    pool: SqlitePool,
    registry: Arc<CronRegistry>,
    timezone: Tz,
    triggers: DashMap<String, TriggerHandle>,
}

impl CronManager {
    pub fn new(pool: SqlitePool, registry: Arc<CronRegistry>, timezone: Tz) -> Arc<Self> {
        Arc::new(Self {
            pool,
            registry,
            timezone,
            triggers: DashMap::new(),
        })
    }

    pub fn registry(&self) -> &CronRegistry {
        &self.registry
    }

    /// Recovers every ACTIVE row from the database and registers its
    /// trigger. Rows with unknown identifiers or invalid params stay in the
    /// DB untouched but are not scheduled.
    pub async fn recover_from_database(self: &Arc<Self>) -> Result<(), McAdminError> {
        let rows: Vec<CronJobRow> = sqlx::query_as("SELECT * FROM cronjobs WHERE status = 'ACTIVE'")
            .fetch_all(&self.pool)
            .await?;

        let mut recovered = 0usize;
        for row in rows {
            if !self.registry.is_registered(&row.identifier) {
                warn!(
                    "Skipping cron job {}: identifier '{}' is not registered",
                    row.cronjob_id, row.identifier
                );
                continue;
            }
            let params = match JobParams::from_json(&row.identifier, &row.params_json) {
                Ok(params) => params,
                Err(e) => {
                    warn!("Skipping cron job {}: invalid params: {e}", row.cronjob_id);
                    continue;
                }
            };
            if let Err(e) = params.validate() {
                warn!("Skipping cron job {}: {e}", row.cronjob_id);
                continue;
            }
            if let Err(e) = self.submit_trigger(&row.cronjob_id, params, &row.cron, row.second.as_deref())
            {
                warn!("Skipping cron job {}: {e}", row.cronjob_id);
                continue;
            }
            recovered += 1;
        }

        info!("Recovered {recovered} active cron jobs from database");
        Ok(())
    }

    /// Creates a new cron job, or re-activates an existing (possibly
    /// cancelled) row with the same id.
    pub async fn create_cronjob(
        self: &Arc<Self>,
        params: JobParams,
        cron: &str,
        cronjob_id: Option<String>,
        name: Option<String>,
        second: Option<String>,
    ) -> Result<String, McAdminError> {
        let identifier = params.identifier();
        if !self.registry.is_registered(identifier) {
            return Err(McAdminError::UnknownCronIdentifier(identifier.to_string()));
        }
        params.validate()?;
        build_schedule(cron, second.as_deref())?;

        let cronjob_id =
            cronjob_id.unwrap_or_else(|| format!("{identifier}_{}", random_suffix(8)));
        let name = name.unwrap_or_else(|| identifier.to_string());
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO cronjobs \
             (cronjob_id, identifier, name, cron, second, params_json, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, 'ACTIVE', ?, ?) \
             ON CONFLICT (cronjob_id) DO UPDATE SET \
             name = excluded.name, cron = excluded.cron, second = excluded.second, \
             params_json = excluded.params_json, status = 'ACTIVE', updated_at = excluded.updated_at",
        )
        .bind(&cronjob_id)
        .bind(identifier)
        .bind(&name)
        .bind(cron)
        .bind(&second)
        .bind(params.to_json()?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        // Replace any trigger left over from a previous life of this id.
        self.remove_trigger(&cronjob_id);
        self.submit_trigger(&cronjob_id, params, cron, second.as_deref())?;

        Ok(cronjob_id)
    }

    /// Rewrites a job's configuration; an ACTIVE job is atomically
    /// re-triggered with the new schedule.
    pub async fn update_cronjob(
        self: &Arc<Self>,
        cronjob_id: &str,
        params: JobParams,
        cron: &str,
        second: Option<String>,
    ) -> Result<(), McAdminError> {
        let identifier = params.identifier();
        if !self.registry.is_registered(identifier) {
            return Err(McAdminError::UnknownCronIdentifier(identifier.to_string()));
        }
        params.validate()?;
        build_schedule(cron, second.as_deref())?;

        let row = self.get_row(cronjob_id).await?;

        sqlx::query(
            "UPDATE cronjobs SET identifier = ?, cron = ?, second = ?, params_json = ?, updated_at = ? \
             WHERE cronjob_id = ?",
        )
        .bind(identifier)
        .bind(cron)
        .bind(&second)
        .bind(params.to_json()?)
        .bind(Utc::now())
        .bind(cronjob_id)
        .execute(&self.pool)
        .await?;

        if row.status == CronJobStatus::Active {
            self.remove_trigger(cronjob_id);
            self.submit_trigger(cronjob_id, params, cron, second.as_deref())?;
        }
        Ok(())
    }

    pub async fn pause_cronjob(&self, cronjob_id: &str) -> Result<(), McAdminError> {
        let row = self.get_row(cronjob_id).await?;
        if row.status != CronJobStatus::Active {
            return Err(McAdminError::Conflict(format!(
                "cron job {cronjob_id} is not active and cannot be paused"
            )));
        }
        self.set_status(cronjob_id, CronJobStatus::Paused).await?;
        self.remove_trigger(cronjob_id);
        Ok(())
    }

    pub async fn resume_cronjob(self: &Arc<Self>, cronjob_id: &str) -> Result<(), McAdminError> {
        let row = self.get_row(cronjob_id).await?;
        if row.status == CronJobStatus::Active {
            return Err(McAdminError::Conflict(format!(
                "cron job {cronjob_id} is already active"
            )));
        }

        let params = JobParams::from_json(&row.identifier, &row.params_json)?;
        params.validate()?;

        self.set_status(cronjob_id, CronJobStatus::Active).await?;
        self.submit_trigger(cronjob_id, params, &row.cron, row.second.as_deref())?;
        Ok(())
    }

    /// Soft delete: the row and its execution history stay.
    pub async fn cancel_cronjob(&self, cronjob_id: &str) -> Result<(), McAdminError> {
        let row = self.get_row(cronjob_id).await?;
        if row.status == CronJobStatus::Cancelled {
            return Err(McAdminError::Conflict(format!(
                "cron job {cronjob_id} is already cancelled"
            )));
        }
        self.set_status(cronjob_id, CronJobStatus::Cancelled).await?;
        self.remove_trigger(cronjob_id);
        Ok(())
    }

    pub async fn get_cronjob_config(
        &self,
        cronjob_id: &str,
    ) -> Result<CronJobConfig, McAdminError> {
        let row = self.get_row(cronjob_id).await?;
        decode_row(row)
    }

    /// All cron jobs matching the filter, newest first. Rows whose params no
    /// longer decode are skipped.
    pub async fn get_all_cronjobs(
        &self,
        filter: &CronJobFilter,
    ) -> Result<Vec<CronJobConfig>, McAdminError> {
        let rows: Vec<CronJobRow> =
            sqlx::query_as("SELECT * FROM cronjobs ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;

        let mut configs = Vec::new();
        for row in rows {
            if let Some(identifier) = &filter.identifier
                && &row.identifier != identifier
            {
                continue;
            }
            if let Some(statuses) = &filter.statuses
                && !statuses.contains(&row.status)
            {
                continue;
            }
            if let Some(name) = &filter.name
                && !row.name.to_lowercase().contains(&name.to_lowercase())
            {
                continue;
            }
            match decode_row(row) {
                Ok(config) => configs.push(config),
                Err(e) => warn!("Skipping undecodable cron job row: {e}"),
            }
        }
        Ok(configs)
    }

    pub async fn get_execution_history(
        &self,
        cronjob_id: &str,
        limit: u32,
    ) -> Result<Vec<CronJobExecutionRecord>, McAdminError> {
        // 404 for unknown ids rather than an empty history.
        self.get_row(cronjob_id).await?;

        let rows: Vec<CronJobExecutionRow> = sqlx::query_as(
            "SELECT * FROM cronjob_executions WHERE cronjob_id = ? \
             ORDER BY started_at DESC LIMIT ?",
        )
        .bind(cronjob_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CronJobExecutionRecord {
                messages: serde_json::from_str(&row.messages_json).unwrap_or_default(),
                execution_id: row.execution_id,
                cronjob_id: row.cronjob_id,
                started_at: row.started_at,
                ended_at: row.ended_at,
                duration_ms: row.duration_ms,
                status: row.status,
            })
            .collect())
    }

    /// Next fire time of an ACTIVE job in UTC.
    pub async fn get_next_run_time(
        &self,
        cronjob_id: &str,
    ) -> Result<DateTime<Utc>, McAdminError> {
        let row = self.get_row(cronjob_id).await?;
        if row.status != CronJobStatus::Active {
            return Err(McAdminError::Conflict(format!(
                "cron job {cronjob_id} is not in active state"
            )));
        }
        let schedule = build_schedule(&row.cron, row.second.as_deref())?;
        schedule
            .upcoming(self.timezone)
            .next()
            .map(|next| next.with_timezone(&Utc))
            .ok_or_else(|| {
                McAdminError::Conflict(format!("cron job {cronjob_id} has no upcoming run"))
            })
    }

    /// Cancels all triggers; in-flight executions observe the token and
    /// record CANCELLED.
    pub fn shutdown(&self) {
        for entry in self.triggers.iter() {
            entry.value().cancel.cancel();
        }
        info!("Cron manager shut down ({} triggers cancelled)", self.triggers.len());
    }

    async fn get_row(&self, cronjob_id: &str) -> Result<CronJobRow, McAdminError> {
        sqlx::query_as("SELECT * FROM cronjobs WHERE cronjob_id = ?")
            .bind(cronjob_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| McAdminError::CronJobNotFound(cronjob_id.to_string()))
    }

    async fn set_status(
        &self,
        cronjob_id: &str,
        status: CronJobStatus,
    ) -> Result<(), McAdminError> {
        sqlx::query("UPDATE cronjobs SET status = ?, updated_at = ? WHERE cronjob_id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(cronjob_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn remove_trigger(&self, cronjob_id: &str) {
        if let Some((_, handle)) = self.triggers.remove(cronjob_id) {
            handle.cancel.cancel();
            handle.task.abort();
        }
    }

    fn submit_trigger(
        self: &Arc<Self>,
        cronjob_id: &str,
        params: JobParams,
        cron: &str,
        second: Option<&str>,
    ) -> Result<(), McAdminError> {
        let schedule = build_schedule(cron, second)?;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(trigger_loop(
            self.clone(),
            cronjob_id.to_string(),
            params,
            schedule,
            cancel.clone(),
        ));
        self.triggers
            .insert(cronjob_id.to_string(), TriggerHandle { cancel, task });
        Ok(())
    }

    /// The execution wrapper: context creation, status accounting, history
    /// persistence and the execution counter.
    async fn run_execution(&self, cronjob_id: &str, params: JobParams, cancel: &CancellationToken) {
        let identifier = params.identifier().to_string();
        let Some(registration) = self.registry.get(&identifier) else {
            error!("Cron identifier '{identifier}' vanished from the registry");
            return;
        };
        let job = registration.job.clone();

        let execution_id = format!("{}_{}", Utc::now().timestamp_millis(), random_suffix(4));
        let context = ExecutionContext::new(
            cronjob_id.to_string(),
            identifier,
            execution_id,
            params,
        );

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                context.log("Cron job execution was cancelled");
                ExecutionStatus::Cancelled
            }
            result = job.execute(&context) => match result {
                Ok(()) => ExecutionStatus::Completed,
                Err(e) => {
                    context.log(format!("Cron job execution failed: {e}"));
                    ExecutionStatus::Failed
                }
            },
        };

        let ended_at = Utc::now();
        let duration_ms = (ended_at - context.started_at).num_milliseconds();

        if let Err(e) = self
            .record_execution(&context, status, ended_at, duration_ms)
            .await
        {
            error!("Failed to record execution for {cronjob_id}: {e}");
        }
    }

    async fn record_execution(
        &self,
        context: &ExecutionContext,
        status: ExecutionStatus,
        ended_at: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<(), McAdminError> {
        let messages_json = serde_json::to_string(&context.messages())?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO cronjob_executions \
             (execution_id, cronjob_id, started_at, ended_at, duration_ms, status, messages_json) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&context.execution_id)
        .bind(&context.cronjob_id)
        .bind(context.started_at)
        .bind(ended_at)
        .bind(duration_ms)
        .bind(status)
        .bind(messages_json)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE cronjobs SET execution_count = execution_count + 1 WHERE cronjob_id = ?",
        )
        .bind(&context.cronjob_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Sleeps until each upcoming fire time and runs the execution wrapper,
/// awaiting it so executions of this job never overlap.
async fn trigger_loop(
    manager: Arc<CronManager>,
    cronjob_id: String,
    params: JobParams,
    schedule: Schedule,
    cancel: CancellationToken,
) {
    loop {
        let Some(next) = schedule.upcoming(manager.timezone).next() else {
            info!("Cron job {cronjob_id} has no upcoming fire times, trigger exiting");
            return;
        };
        let delay = (next.with_timezone(&Utc) - Utc::now())
            .to_std()
            .unwrap_or_default();

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        manager
            .run_execution(&cronjob_id, params.clone(), &cancel)
            .await;

        if cancel.is_cancelled() {
            return;
        }
    }
}

/// Builds a [`Schedule`] from a 5-field cron expression plus the optional
/// seconds field.
pub fn build_schedule(cron: &str, second: Option<&str>) -> Result<Schedule, McAdminError> {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(McAdminError::InvalidCronExpression(format!(
            "expected 5 fields (minute hour day month weekday), got {}",
            fields.len()
        )));
    }
    let expression = format!("{} {}", second.unwrap_or("0"), fields.join(" "));
    Schedule::from_str(&expression)
        .map_err(|e| McAdminError::InvalidCronExpression(e.to_string()))
}

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn decode_row(row: CronJobRow) -> Result<CronJobConfig, McAdminError> {
    let params = JobParams::from_json(&row.identifier, &row.params_json)?;
    Ok(CronJobConfig {
        cronjob_id: row.cronjob_id,
        identifier: row.identifier,
        name: row.name,
        cron: row.cron,
        second: row.second,
        params,
        execution_count: row.execution_count,
        status: row.status,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_schedule_validates_field_count() {
        assert!(build_schedule("15 3 * * *", None).is_ok());
        assert!(build_schedule("15 3 * *", None).is_err());
        assert!(build_schedule("15 3 * * * *", None).is_err());
        assert!(build_schedule("61 3 * * *", None).is_err());
    }

    #[test]
    fn build_schedule_honors_seconds_field() {
        let schedule = build_schedule("0 6 * * *", Some("30")).unwrap();
        let next = schedule.upcoming(chrono_tz::Tz::UTC).next().unwrap();
        assert_eq!(next.format("%S").to_string(), "30");
    }
}
