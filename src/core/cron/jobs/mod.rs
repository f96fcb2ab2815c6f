// src/core/cron/jobs/mod.rs

//! Built-in cron job implementations.

pub mod backup;
pub mod restart;

pub use backup::BackupJob;
pub use restart::RestartServerJob;
