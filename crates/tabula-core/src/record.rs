//! Record operations engine
//!
//! A [`RecordHandle`] exposes create/read/update/delete and scan operations
//! for one table. Every operation opens its own connection, starts a
//! transaction scoped to that table, performs one store action and resolves.
//! Concurrent operations race freely; the store is the only serialization
//! point.
//!
//! Each operation comes in two forms:
//!
//! - `async fn op(..) -> Result<T>` for Rust callers
//! - `fn op_with(.., Callbacks<T>) -> Result<impl Future>` which validates its
//!   arguments synchronously and returns a future that reports through the
//!   callbacks on the host's update cycle

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::callback::Callbacks;
use crate::connection::ConnectionManager;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::logging::prefix;
use crate::range::{translate_with, BoundDescriptor, KeyRange};
use crate::schema::NormalizedSchema;
use crate::storage::{Backend, Connection, Cursor, StoreError, Transaction, TransactionMode};

type Tx<B> = <<B as Backend>::Connection as Connection>::Transaction;

/// Closes the per-operation connection when the operation ends.
struct Session<C: Connection> {
    connection: C,
}

impl<C: Connection> Drop for Session<C> {
    fn drop(&mut self) {
        self.connection.close();
    }
}

/// Record operations for one table.
pub struct RecordHandle<B: Backend> {
    table: Rc<str>,
    manager: Rc<ConnectionManager<B>>,
}

impl<B: Backend> Clone for RecordHandle<B> {
    fn clone(&self) -> Self {
        Self {
            table: Rc::clone(&self.table),
            manager: Rc::clone(&self.manager),
        }
    }
}

impl<B: Backend> fmt::Debug for RecordHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordHandle")
            .field("table", &self.table)
            .finish()
    }
}

impl<B: Backend + 'static> RecordHandle<B> {
    pub(crate) fn new(table: &str, manager: Rc<ConnectionManager<B>>) -> Self {
        Self {
            table: Rc::from(table),
            manager,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Normalized definition of this table.
    pub fn schema(&self) -> Option<&NormalizedSchema> {
        self.manager.config().table(&self.table)
    }

    async fn begin(&self, mode: TransactionMode) -> Result<(Session<B::Connection>, Tx<B>)> {
        let session = Session {
            connection: self.manager.connect().await?,
        };
        let tx = session.connection.transaction(&[&*self.table], mode)?;
        Ok((session, tx))
    }

    // ========================================================================
    // Async operations
    // ========================================================================

    /// Insert `data` as a new record and return the full stored record.
    ///
    /// The key is generated when `data` has none at the table's key path.
    pub async fn create(&self, data: Value) -> Result<Value> {
        let key = {
            let (_session, tx) = self.begin(TransactionMode::ReadWrite).await?;
            let key = tx.add(&self.table, data).await?;
            tx.done().await?;
            key
        };
        debug!("{} create '{}' -> {}", prefix::DB, self.table, key);

        self.find(key.clone()).await?.ok_or_else(|| {
            Error::Operation(StoreError::NotFound(format!(
                "record {} in table '{}'",
                key, self.table
            )))
        })
    }

    /// Look up a record by primary key. `None` means not found.
    pub async fn find(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        let (_session, tx) = self.begin(TransactionMode::ReadOnly).await?;
        let record = tx.get(&self.table, &key).await?;
        tx.done().await?;
        debug!("{} find '{}' {} (found: {})", prefix::DB, self.table, key, record.is_some());
        Ok(record)
    }

    /// Look up the first record whose `index` value equals `key`.
    pub async fn find_by_index(&self, index: &str, key: impl Into<Key>) -> Result<Option<Value>> {
        check_index(index)?;
        let key = key.into();
        let (_session, tx) = self.begin(TransactionMode::ReadOnly).await?;
        let record = tx.get_by_index(&self.table, index, &key).await?;
        tx.done().await?;
        debug!(
            "{} findByIndex '{}'.{} {} (found: {})",
            prefix::DB,
            self.table,
            index,
            key,
            record.is_some()
        );
        Ok(record)
    }

    /// Every record in primary-key order. An empty table yields an empty vec.
    pub async fn get_all(&self) -> Result<Vec<Value>> {
        self.scan(None, None).await
    }

    /// Records whose `index` value falls within `bounds`, in index order.
    pub async fn get_by_index(&self, index: &str, bounds: &BoundDescriptor) -> Result<Vec<Value>> {
        let range = self.index_range(index, bounds)?;
        self.scan(Some(index), range).await
    }

    /// Insert or overwrite `data` by its key. Returns the stored key.
    pub async fn update(&self, data: Value) -> Result<Key> {
        let (_session, tx) = self.begin(TransactionMode::ReadWrite).await?;
        let key = tx.put(&self.table, data).await?;
        tx.done().await?;
        debug!("{} update '{}' {}", prefix::DB, self.table, key);
        Ok(key)
    }

    /// Delete the record with `key`. A missing key is not an error.
    pub async fn delete_id(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let (_session, tx) = self.begin(TransactionMode::ReadWrite).await?;
        tx.delete(&self.table, &key).await?;
        tx.done().await?;
        debug!("{} deleteId '{}' {}", prefix::DB, self.table, key);
        Ok(())
    }

    /// Number of records in the table.
    pub async fn count(&self) -> Result<usize> {
        let (_session, tx) = self.begin(TransactionMode::ReadOnly).await?;
        let count = tx.count(&self.table).await?;
        tx.done().await?;
        Ok(count)
    }

    fn index_range(&self, index: &str, bounds: &BoundDescriptor) -> Result<Option<KeyRange>> {
        check_index(index)?;
        translate_with(bounds, self.manager.config().bound_mode())
    }

    /// Drive a cursor to exhaustion, collecting every record.
    async fn scan(&self, index: Option<&str>, range: Option<KeyRange>) -> Result<Vec<Value>> {
        let (_session, tx) = self.begin(TransactionMode::ReadOnly).await?;
        let mut cursor = tx.open_cursor(&self.table, index, range.as_ref())?;
        let mut records = Vec::new();
        while let Some(record) = cursor.next().await? {
            records.push(record);
        }
        drop(cursor);
        tx.done().await?;
        debug!(
            "{} scan '{}' index {:?} -> {} records",
            prefix::DB,
            self.table,
            index,
            records.len()
        );
        Ok(records)
    }

    // ========================================================================
    // Callback operations
    // ========================================================================

    fn deliver<T: 'static>(&self, callbacks: Callbacks<T>, outcome: Result<T>, op: &str) {
        callbacks.deliver(self.manager.scheduler(), outcome, &self.table, op);
    }

    /// Callback form of [`create`](Self::create).
    pub fn create_with(
        &self,
        data: Value,
        callbacks: Callbacks<Value>,
    ) -> Result<impl Future<Output = ()> + 'static> {
        let handle = self.clone();
        Ok(async move {
            let outcome = handle.create(data).await;
            handle.deliver(callbacks, outcome, "create");
        })
    }

    /// Callback form of [`find`](Self::find); success receives the record
    /// (or `None`) and the key that was looked up.
    pub fn find_with(
        &self,
        key: Key,
        callbacks: Callbacks<(Option<Value>, Key)>,
    ) -> Result<impl Future<Output = ()> + 'static> {
        let handle = self.clone();
        Ok(async move {
            let outcome = handle.find(key.clone()).await.map(|record| (record, key));
            handle.deliver(callbacks, outcome, "find");
        })
    }

    /// Callback form of [`find_by_index`](Self::find_by_index).
    pub fn find_by_index_with(
        &self,
        index: &str,
        key: Key,
        callbacks: Callbacks<(Option<Value>, Key)>,
    ) -> Result<impl Future<Output = ()> + 'static> {
        check_index(index)?;
        let handle = self.clone();
        let index = index.to_string();
        Ok(async move {
            let outcome = handle
                .find_by_index(&index, key.clone())
                .await
                .map(|record| (record, key));
            handle.deliver(callbacks, outcome, "findByIndex");
        })
    }

    /// Callback form of [`get_all`](Self::get_all).
    pub fn get_all_with(
        &self,
        callbacks: Callbacks<Vec<Value>>,
    ) -> Result<impl Future<Output = ()> + 'static> {
        let handle = self.clone();
        Ok(async move {
            let outcome = handle.get_all().await;
            handle.deliver(callbacks, outcome, "getAll");
        })
    }

    /// Callback form of [`get_by_index`](Self::get_by_index). Bounds are
    /// translated before the future is returned.
    pub fn get_by_index_with(
        &self,
        index: &str,
        bounds: &BoundDescriptor,
        callbacks: Callbacks<Vec<Value>>,
    ) -> Result<impl Future<Output = ()> + 'static> {
        let range = self.index_range(index, bounds)?;
        let handle = self.clone();
        let index = index.to_string();
        Ok(async move {
            let outcome = handle.scan(Some(&index), range).await;
            handle.deliver(callbacks, outcome, "getByIndex");
        })
    }

    /// Callback form of [`update`](Self::update).
    pub fn update_with(
        &self,
        data: Value,
        callbacks: Callbacks<Key>,
    ) -> Result<impl Future<Output = ()> + 'static> {
        let handle = self.clone();
        Ok(async move {
            let outcome = handle.update(data).await;
            handle.deliver(callbacks, outcome, "update");
        })
    }

    /// Callback form of [`delete_id`](Self::delete_id).
    pub fn delete_id_with(
        &self,
        key: Key,
        callbacks: Callbacks<()>,
    ) -> Result<impl Future<Output = ()> + 'static> {
        let handle = self.clone();
        Ok(async move {
            let outcome = handle.delete_id(key).await;
            handle.deliver(callbacks, outcome, "deleteId");
        })
    }
}

fn check_index(index: &str) -> Result<()> {
    if index.is_empty() {
        return Err(Error::Argument("Index must be a non-empty string".into()));
    }
    Ok(())
}
