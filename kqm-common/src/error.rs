//! Common error types for KQM

use thiserror::Error;

/// Common result type for KQM operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the supervisor and the workers
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied incomplete or malformed data
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Artist resolution lost a race with a concurrent writer
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or undeliverable IPC message
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
