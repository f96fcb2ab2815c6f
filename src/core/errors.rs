// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the control plane.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug, Clone)]
pub enum McAdminError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Database Error: {0}")]
    Database(Arc<sqlx::Error>),

    #[error("Invalid compose file: {0}")]
    InvalidCompose(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Server '{0}' not found")]
    ServerNotFound(String),

    #[error("Cron job '{0}' not found")]
    CronJobNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation not allowed in the current status: {0}")]
    InvalidStatus(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Container engine error: {0}")]
    Engine(String),

    #[error("RCON error: {0}")]
    Rcon(String),

    #[error("DNS provider error: {0}")]
    DnsProvider(String),

    #[error("Router error: {0}")]
    Router(String),

    #[error("Restic error: {0}")]
    Restic(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Cron job identifier '{0}' is not registered")]
    UnknownCronIdentifier(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCronExpression(String),

    #[error("Configuration module '{0}' is not registered")]
    UnknownConfigModule(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// The coarse failure class an error maps to at the operator-facing boundary.
/// HTTP handlers translate this to a status code; background handlers use it
/// to decide between bubbling and swallow-and-log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller mistake, nothing changed (400).
    Validation,
    /// The referenced entity does not exist (404).
    NotFound,
    /// The operation is legal but not in the current state (409).
    Conflict,
    /// An upstream system failed; the message is relayed (502).
    External,
    /// Unrecoverable internal failure (500).
    Internal,
}

impl McAdminError {
    pub fn class(&self) -> ErrorClass {
        match self {
            McAdminError::InvalidCompose(_)
            | McAdminError::Validation(_)
            | McAdminError::UnknownCronIdentifier(_)
            | McAdminError::InvalidCronExpression(_)
            | McAdminError::UnknownConfigModule(_) => ErrorClass::Validation,
            McAdminError::ServerNotFound(_)
            | McAdminError::CronJobNotFound(_)
            | McAdminError::NotFound(_) => ErrorClass::NotFound,
            McAdminError::InvalidStatus(_) | McAdminError::Conflict(_) => ErrorClass::Conflict,
            McAdminError::Engine(_)
            | McAdminError::Rcon(_)
            | McAdminError::DnsProvider(_)
            | McAdminError::Router(_)
            | McAdminError::Restic(_)
            | McAdminError::HttpClient(_) => ErrorClass::External,
            McAdminError::Io(_) | McAdminError::Database(_) | McAdminError::Internal(_) => {
                ErrorClass::Internal
            }
        }
    }
}

impl From<std::io::Error> for McAdminError {
    fn from(err: std::io::Error) -> Self {
        McAdminError::Io(Arc::new(err))
    }
}

impl From<sqlx::Error> for McAdminError {
    fn from(err: sqlx::Error) -> Self {
        McAdminError::Database(Arc::new(err))
    }
}

impl From<reqwest::Error> for McAdminError {
    fn from(err: reqwest::Error) -> Self {
        McAdminError::HttpClient(err.to_string())
    }
}

impl From<serde_json::Error> for McAdminError {
    fn from(err: serde_json::Error) -> Self {
        McAdminError::Validation(format!("invalid JSON: {err}"))
    }
}

impl From<serde_yaml::Error> for McAdminError {
    fn from(err: serde_yaml::Error) -> Self {
        McAdminError::InvalidCompose(err.to_string())
    }
}
