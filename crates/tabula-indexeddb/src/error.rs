//! Error types for the IndexedDB storage backend

use tabula_core::StoreError;
use thiserror::Error;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::DomException;

/// Result type for IndexedDB operations
pub type Result<T> = std::result::Result<T, IndexedDbError>;

/// Errors that can occur during IndexedDB storage operations
#[derive(Debug, Error)]
pub enum IndexedDbError {
    /// IndexedDB is not available in this environment
    #[error("IndexedDB not available: {0}")]
    NotAvailable(String),

    /// Database open/upgrade error
    #[error("IndexedDB open error: {0}")]
    Open(String),

    /// Transaction error
    #[error("IndexedDB transaction error: {0}")]
    Transaction(String),

    /// Request error from IDB operation
    #[error("IndexedDB request error: {0}")]
    Request(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key already present (ConstraintError)
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    /// Missing object store or index (NotFoundError)
    #[error("not found: {0}")]
    NotFound(String),

    /// Record or key the store cannot hold (DataError)
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// JavaScript value conversion error
    #[error("JS conversion error: {0}")]
    JsValue(String),
}

impl IndexedDbError {
    /// Classify a thrown JS value by its `DOMException` name.
    ///
    /// Values that are not DOM exceptions become `Request` errors prefixed
    /// with `context`.
    pub fn from_js(context: &str, val: &JsValue) -> Self {
        match val.dyn_ref::<DomException>() {
            Some(exc) => Self::from_dom_name(context, &exc.name(), &exc.message()),
            None => Self::Request(format!("{}: {}", context, describe(val))),
        }
    }

    /// Classify by exception name. Rejected request promises carry
    /// `"<name>: <message>"` strings, which land here too.
    pub(crate) fn from_dom_name(context: &str, name: &str, message: &str) -> Self {
        let msg = format!("{}: {}", context, message);
        match name {
            "ConstraintError" => Self::AlreadyExists(msg),
            "NotFoundError" => Self::NotFound(msg),
            "DataError" => Self::InvalidData(msg),
            "TransactionInactiveError" | "ReadOnlyError" | "AbortError" => Self::Transaction(msg),
            "VersionError" | "InvalidStateError" => Self::Open(msg),
            _ => Self::Request(format!("{} ({})", msg, name)),
        }
    }
}

impl From<JsValue> for IndexedDbError {
    fn from(val: JsValue) -> Self {
        if let Some(text) = val.as_string() {
            if let Some((name, message)) = text.split_once(": ") {
                return Self::from_dom_name("request", name, message);
            }
            return IndexedDbError::Request(text);
        }
        IndexedDbError::from_js("request", &val)
    }
}

fn describe(val: &JsValue) -> String {
    js_sys::JSON::stringify(val)
        .map(String::from)
        .unwrap_or_else(|_| format!("{:?}", val))
}

/// Convert IndexedDbError to StoreError for the storage trait
impl From<IndexedDbError> for StoreError {
    fn from(err: IndexedDbError) -> Self {
        match err {
            IndexedDbError::AlreadyExists(msg) => StoreError::AlreadyExists(msg),
            IndexedDbError::NotFound(msg) => StoreError::NotFound(msg),
            IndexedDbError::InvalidData(msg) => StoreError::InvalidData(msg),
            IndexedDbError::Json(e) => StoreError::Serialization(e.to_string()),
            IndexedDbError::NotAvailable(msg) => {
                StoreError::Backend(format!("IndexedDB not available: {}", msg))
            }
            IndexedDbError::Open(msg) => StoreError::Backend(format!("IndexedDB open: {}", msg)),
            IndexedDbError::Transaction(msg) => {
                StoreError::Backend(format!("IndexedDB transaction: {}", msg))
            }
            IndexedDbError::Request(msg) => {
                StoreError::Backend(format!("IndexedDB request: {}", msg))
            }
            IndexedDbError::JsValue(msg) => StoreError::Backend(format!("IndexedDB JS: {}", msg)),
        }
    }
}
