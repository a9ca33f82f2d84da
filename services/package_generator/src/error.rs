//! services/package_generator/src/error.rs
//!
//! Defines the primary error type for the package generation service.

use crate::config::ConfigError;

/// The primary error type for the `package_generator` service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
