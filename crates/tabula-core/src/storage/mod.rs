//! Storage abstraction over an asynchronous, versioned object store
//!
//! The record operations engine talks to the store exclusively through the
//! traits in this module. Implementations exist for:
//!
//! - **Memory**: In-process ordered store for tests and native hosts (`MemoryBackend`)
//! - **IndexedDB**: Browser storage via web-sys (separate crate, WASM only)
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use serde_json::json;
//! use tabula_core::Key;
//! use tabula_core::storage::{
//!     Backend, Connection, MemoryBackend, SchemaUpgrade, Transaction, TransactionMode, UpgradeFn,
//! };
//!
//! # tokio_test_block_on(async {
//! let backend = MemoryBackend::new();
//! let upgrade: UpgradeFn = Rc::new(|up: &mut dyn SchemaUpgrade| {
//!     up.create_table("items", "id", true)
//! });
//!
//! let opened = backend.open("shop", 1, upgrade).await.unwrap();
//! let tx = opened
//!     .connection
//!     .transaction(&["items"], TransactionMode::ReadWrite)
//!     .unwrap();
//! let key = tx.add("items", json!({"sku": "A1"})).await.unwrap();
//! assert_eq!(key, Key::from(1));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod error;
mod memory;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryBackend, MemoryConnection, MemoryCursor, MemoryTransaction};
pub use traits::{
    Backend, Connection, Cursor, Opened, SchemaUpgrade, Transaction, TransactionMode, UpgradeFn,
};
