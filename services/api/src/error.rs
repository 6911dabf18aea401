//! services/api/src/error.rs
//!
//! Startup and shutdown failures of the server binary. Request-level failures
//! never reach this type; handlers map `PortError` to HTTP statuses directly.

use crate::config::ConfigError;
use onyx_core::ports::{PortError, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Loading or checking the subject and timer stores failed.
    #[error("Store error: {0}")]
    Port(#[from] PortError),

    /// The key-value backend could not be opened.
    #[error("Storage backend error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Binding the listener or serving connections failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
