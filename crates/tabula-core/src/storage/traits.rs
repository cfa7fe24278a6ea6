//! Storage trait definitions
//!
//! These traits describe the underlying store as a black box: a versioned,
//! transactional, asynchronous object store with named tables, secondary
//! indexes and forward-only cursors. Futures carry no `Send` bound because
//! browser handles are bound to the JS thread.

use std::rc::Rc;

use serde_json::Value;

use crate::key::Key;
use crate::range::KeyRange;
use crate::storage::error::StoreResult;

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

/// Callback run inside the upgrade phase of an open request.
pub type UpgradeFn = Rc<dyn Fn(&mut dyn SchemaUpgrade) -> StoreResult<()>>;

/// Result of a successful open request.
#[derive(Debug)]
pub struct Opened<C> {
    pub connection: C,
    /// Whether the upgrade phase ran (new database or version bump)
    pub upgraded: bool,
}

/// Schema operations available while a version upgrade is in progress.
pub trait SchemaUpgrade {
    /// Check if a table already exists.
    fn has_table(&self, name: &str) -> bool;

    /// Create a table whose primary key lives at `key_path`.
    fn create_table(&mut self, name: &str, key_path: &str, auto_increment: bool)
        -> StoreResult<()>;

    /// Create a non-unique index on `table` keyed by the value at `key_path`.
    fn create_index(&mut self, table: &str, index: &str, key_path: &str) -> StoreResult<()>;
}

/// Entry point to a store engine.
#[allow(async_fn_in_trait)]
pub trait Backend {
    type Connection: Connection;

    /// Open (or create) a named database at `version`.
    ///
    /// If the database is new or `version` is newer than the stored one, the
    /// backend runs `upgrade` before resolving. An older `version` fails.
    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeFn,
    ) -> StoreResult<Opened<Self::Connection>>;

    /// Delete a database by name. Deleting a missing database succeeds.
    async fn delete_database(&self, name: &str) -> StoreResult<()>;
}

/// An open database.
pub trait Connection {
    type Transaction: Transaction;

    /// Start a transaction scoped to `tables`.
    fn transaction(&self, tables: &[&str], mode: TransactionMode)
        -> StoreResult<Self::Transaction>;

    /// Close the connection once pending transactions finish.
    fn close(&self);
}

/// A transaction over one or more tables.
#[allow(async_fn_in_trait)]
pub trait Transaction {
    type Cursor: Cursor;

    /// Insert a new record. Fails with `AlreadyExists` if the key is taken.
    ///
    /// Returns the record's key (generated if the table auto-increments and
    /// the record carries none).
    async fn add(&self, table: &str, record: Value) -> StoreResult<Key>;

    /// Insert or overwrite a record by its key.
    async fn put(&self, table: &str, record: Value) -> StoreResult<Key>;

    /// Retrieve a record by primary key. Returns `None` if not found.
    async fn get(&self, table: &str, key: &Key) -> StoreResult<Option<Value>>;

    /// Retrieve the first record (in index order) whose index value equals `key`.
    async fn get_by_index(&self, table: &str, index: &str, key: &Key)
        -> StoreResult<Option<Value>>;

    /// Delete a record by primary key. Deleting a missing key succeeds.
    async fn delete(&self, table: &str, key: &Key) -> StoreResult<()>;

    /// Count the records in a table.
    async fn count(&self, table: &str) -> StoreResult<usize>;

    /// Open a forward cursor over a table (`index == None`) or one of its
    /// indexes, optionally restricted to `range`.
    fn open_cursor(
        &self,
        table: &str,
        index: Option<&str>,
        range: Option<&KeyRange>,
    ) -> StoreResult<Self::Cursor>;

    /// Wait for the transaction to complete.
    async fn done(self) -> StoreResult<()>;
}

/// Forward-only cursor yielding record values.
#[allow(async_fn_in_trait)]
pub trait Cursor {
    /// Advance and return the next record, or `None` once exhausted.
    async fn next(&mut self) -> StoreResult<Option<Value>>;
}
