//! Error types for migration and backup.

use switchyard_dal::DalError;
use thiserror::Error;

/// Result type for migration and backup operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Failures that abort a whole table or a whole run.
///
/// Per-row problems never surface here; they are collected into the
/// operation's result instead.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data access error: {0}")]
    Dal(#[from] DalError),

    #[error("missing archive entry: {0}")]
    MissingEntry(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}
