//! IndexedDB storage backend for tabula (browser WASM)
//!
//! Implements the `tabula-core` storage traits on top of the browser's
//! IndexedDB through web-sys, so the same record operations engine that runs
//! over the memory backend in tests runs against real browser storage.
//!
//! # Schema
//!
//! Tables map to object stores created with `keyPath` set to the table's key
//! field and `autoIncrement` enabled. Every secondary field gets a plain
//! (non-unique, single-entry) index named after the field.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabula_core::{ConnectionManager, DatabaseConfig, TableDefinition, FieldDefinition};
//! use tabula_indexeddb::IndexedDbBackend;
//!
//! let config = DatabaseConfig::builder()
//!     .database_name("shop")?
//!     .tables(&[TableDefinition::new("items").field(FieldDefinition::new("sku"))])?
//!     .build();
//!
//! let db = ConnectionManager::new(IndexedDbBackend::new(), config)
//!     .initialize()
//!     .await?;
//! let created = db.handle("items").unwrap().create(json!({"sku": "A1"})).await?;
//! ```

pub mod backend;
pub mod convert;
pub mod error;
pub mod idb;

pub use backend::{IndexedDbBackend, IndexedDbConnection, IndexedDbCursor, IndexedDbTransaction};
pub use error::{IndexedDbError, Result};
