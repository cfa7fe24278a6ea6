//! Tabula core: declarative tables over an asynchronous object store
//!
//! Hosts declare their tables once, open a versioned database and get back
//! one record handle per table exposing create/find/update/delete and
//! index range scans.
//!
//! # Architecture
//!
//! - [`schema`]: validates table declarations and derives key path and indexes
//! - [`config`]: immutable database configuration with a validating builder
//! - [`connection`]: opens `(name, version)` and creates missing tables on upgrade
//! - [`registry`]: one [`RecordHandle`] per declared table
//! - [`record`]: per-operation transactions, async and callback forms
//! - [`range`]: bound descriptors and key ranges
//! - [`storage`]: backend traits plus the in-memory backend
//!
//! The browser IndexedDB backend lives in `tabula-indexeddb`.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tabula_core::{
//!     BoundDescriptor, ConnectionManager, DatabaseConfig, FieldDefinition, MemoryBackend,
//!     TableDefinition,
//! };
//!
//! # fn block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! # block_on(async {
//! let config = DatabaseConfig::builder()
//!     .database_name("shop")?
//!     .version(1)?
//!     .tables(&[TableDefinition::new("items")
//!         .field(FieldDefinition::new("sku"))
//!         .field(FieldDefinition::new("qty"))])?
//!     .build();
//!
//! let db = ConnectionManager::new(MemoryBackend::new(), config)
//!     .initialize()
//!     .await?;
//! let items = db.handle("items").unwrap();
//!
//! let created = items.create(json!({"sku": "A1", "qty": 3})).await?;
//! assert_eq!(created, json!({"id": 1, "sku": "A1", "qty": 3}));
//!
//! let a1 = items.get_by_index("sku", &BoundDescriptor::only("A1")).await?;
//! assert_eq!(a1.len(), 1);
//! # Ok::<(), tabula_core::Error>(())
//! # }).unwrap();
//! ```

pub mod callback;
pub mod config;
pub mod connection;
pub mod error;
pub mod key;
pub mod logging;
pub mod range;
pub mod record;
pub mod registry;
pub mod schema;
pub mod storage;

pub use callback::{Callbacks, HostScheduler, Immediate};
pub use config::{DatabaseConfig, DatabaseConfigBuilder};
pub use connection::{ConnectionManager, Database};
pub use error::{Error, Result};
pub use key::Key;
pub use range::{translate, translate_with, Bound, BoundDescriptor, BoundMode, KeyRange};
pub use record::RecordHandle;
pub use registry::TableRegistry;
pub use schema::{
    normalize_tables, normalize_tables_with, FieldDefinition, IdFieldPolicy, NormalizedFields,
    NormalizedSchema, TableDefinition,
};
pub use storage::{MemoryBackend, StoreError};
