// src/core/cron/mod.rs

//! The persistent, timezone-aware cron engine.

pub mod jobs;
pub mod manager;
pub mod params;
pub mod registry;
pub mod restart_slots;

pub use manager::{CronJobConfig, CronJobExecutionRecord, CronJobFilter, CronManager};
pub use params::JobParams;
pub use registry::{CronJob, CronRegistry, ExecutionContext};
pub use restart_slots::RestartScheduler;
