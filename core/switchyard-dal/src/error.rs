//! Error types for the data access layer.

use thiserror::Error;

/// Result type for data access operations.
pub type DalResult<T> = Result<T, DalError>;

/// Errors raised by adapters, the facade and the factory.
///
/// Cloneable so a single upstream failure can be handed to every caller that
/// was waiting on the same coalesced fetch.
#[derive(Debug, Clone, Error)]
pub enum DalError {
    /// Missing credentials or an unusable setting. Raised while building an
    /// adapter; the factory treats that adapter as unavailable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing sheet, table, row or identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Record rejected by validation rules.
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation not offered by the bound adapter.
    #[error("{operation} is not supported by the {backend} adapter")]
    Capability { backend: String, operation: String },

    /// Authorization check failed inside a guarded write.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Failure reported by the spreadsheet service or the database.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// Neither adapter could be constructed for the requested key.
    #[error("no data access implementation available for {0:?}")]
    NoImplementationAvailable(String),

    /// Caller passed an empty entity, empty id or a non-object record.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A bulk insert stopped part way. The first `committed` records of the
    /// batch are stored; the rest are not.
    #[error("batch stopped after {committed} stored records: {cause}")]
    PartialWrite { committed: usize, cause: Box<DalError> },
}

impl DalError {
    /// Records of the failed batch that were stored anyway.
    pub fn committed(&self) -> usize {
        match self {
            DalError::PartialWrite { committed, .. } => *committed,
            _ => 0,
        }
    }

    pub(crate) fn capability(backend: &str, operation: &str) -> Self {
        DalError::Capability {
            backend: backend.to_string(),
            operation: operation.to_string(),
        }
    }
}

impl From<serde_json::Error> for DalError {
    fn from(e: serde_json::Error) -> Self {
        DalError::Serialization(e.to_string())
    }
}

impl From<rusqlite::Error> for DalError {
    fn from(e: rusqlite::Error) -> Self {
        DalError::ExternalService(format!("database error: {e}"))
    }
}

impl From<switchyard_flags::FlagError> for DalError {
    fn from(e: switchyard_flags::FlagError) -> Self {
        DalError::Configuration(e.to_string())
    }
}
