//! Error types for ingestion, storage and queries.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort an operation or be reported for a single row.
///
/// Field-level problems during ingestion never surface here; they are
/// recorded as [`crate::ingest::FieldIssue`] and the batch continues.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller key did not match the provisioned key.
    #[error("Api key is not valid.")]
    Unauthorized,

    /// Submitted batch exceeds the configured size bound.
    #[error("Batch of {size} entries exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    /// Caller did not prepare the batch it asked to persist.
    #[error("Precondition violated: {0}")]
    Precondition(&'static str),

    /// A row with the same timestamp already exists.
    #[error("Duplicate {table} row at {timestamp}")]
    DuplicateKey { table: &'static str, timestamp: i64 },

    /// PostgreSQL error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// OpenSSL setup error.
    #[error("TLS error: {0}")]
    Tls(#[from] openssl::error::ErrorStack),

    /// Connection string could not be parsed.
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage read did not finish in time.
    #[error("Storage scan timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
