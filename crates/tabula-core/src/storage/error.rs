//! Storage error types

use thiserror::Error;

/// Errors reported by a storage backend during open, upgrade or a single
/// request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A record with this key already exists (add on an existing key)
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    /// Table, index or database not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Record can't be stored (no usable key, not an object, ...)
    #[error("invalid record data: {0}")]
    InvalidData(String),

    /// Requested version is older than the stored one
    #[error("version error: requested {requested} but database is at {current}")]
    Version { requested: u32, current: u32 },

    /// Storage backend error (browser engine, transaction state, ...)
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
