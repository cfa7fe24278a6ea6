//! Error types for Tabula operations

use thiserror::Error;

use crate::storage::StoreError;

/// Errors surfaced by the setup surface and the record operations engine.
///
/// `Schema`, `Config`, `Argument` and `CallbackType` are raised synchronously,
/// before any asynchronous work starts. `Connection` and `Operation` come back
/// from the store.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed table or field declarations
    #[error("schema error: {0}")]
    Schema(String),

    /// Invalid setup argument (database name, version)
    #[error("configuration error: {0}")]
    Config(String),

    /// The store could not be opened. Never retried.
    #[error("unable to open connection to database: {0}")]
    Connection(String),

    /// Missing or malformed operation argument
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A supplied callback is not invocable
    #[error("callback type error: {0}")]
    CallbackType(String),

    /// Store-level failure during get/put/delete/cursor
    #[error("operation failed: {0}")]
    Operation(#[from] StoreError),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using Tabula Error.
pub type Result<T> = std::result::Result<T, Error>;
