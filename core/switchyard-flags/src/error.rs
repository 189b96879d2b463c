//! Error types for the flag store.

use thiserror::Error;

/// Result type for flag store operations.
pub type FlagResult<T> = Result<T, FlagError>;

/// Errors that can occur reading or persisting flags.
#[derive(Debug, Error)]
pub enum FlagError {
    /// Flag file could not be read or written.
    #[error("flag file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Flag file is not a flat JSON object of booleans.
    #[error("flag file is malformed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Empty or otherwise unusable flag key.
    #[error("invalid flag key: {0:?}")]
    InvalidKey(String),
}
