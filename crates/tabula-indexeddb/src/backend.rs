//! IndexedDB implementation of the tabula storage traits
//!
//! Every request goes through [`idb::await_request`], and transactions are
//! awaited to completion in [`Transaction::done`]. Work queued on a
//! transaction must be issued before control returns to the event loop, which
//! holds as long as callers await each request directly.

use serde_json::Value;
use tabula_core::storage::{
    Backend, Connection, Cursor, Opened, StoreError, StoreResult, Transaction, TransactionMode,
    UpgradeFn,
};
use tabula_core::{Key, KeyRange};
use tracing::debug;
use wasm_bindgen::JsCast;
use web_sys::{
    IdbCursorWithValue, IdbDatabase, IdbObjectStore, IdbRequest, IdbTransaction,
    IdbTransactionMode,
};

use crate::convert::{js_to_key, js_to_value, key_range_to_js, key_to_js, value_to_js};
use crate::error::IndexedDbError;
use crate::idb;

/// Browser IndexedDB store engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexedDbBackend;

impl IndexedDbBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for IndexedDbBackend {
    type Connection = IndexedDbConnection;

    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeFn,
    ) -> StoreResult<Opened<IndexedDbConnection>> {
        let (db, upgraded) = idb::open_database(name, version, upgrade).await?;
        debug!("IndexedDB '{}' v{} open (upgraded: {})", name, version, upgraded);
        Ok(Opened {
            connection: IndexedDbConnection { db },
            upgraded,
        })
    }

    async fn delete_database(&self, name: &str) -> StoreResult<()> {
        idb::delete_database(name).await.map_err(StoreError::from)
    }
}

/// An open IndexedDB connection.
#[derive(Debug, Clone)]
pub struct IndexedDbConnection {
    db: IdbDatabase,
}

impl IndexedDbConnection {
    pub fn database(&self) -> &IdbDatabase {
        &self.db
    }
}

impl Connection for IndexedDbConnection {
    type Transaction = IndexedDbTransaction;

    fn transaction(
        &self,
        tables: &[&str],
        mode: TransactionMode,
    ) -> StoreResult<IndexedDbTransaction> {
        let names: js_sys::Array = tables.iter().map(|t| wasm_bindgen::JsValue::from_str(t)).collect();
        let mode = match mode {
            TransactionMode::ReadOnly => IdbTransactionMode::Readonly,
            TransactionMode::ReadWrite => IdbTransactionMode::Readwrite,
        };
        let tx = self
            .db
            .transaction_with_str_sequence_and_mode(&names, mode)
            .map_err(|e| IndexedDbError::from_js("transaction", &e))?;
        Ok(IndexedDbTransaction { tx })
    }

    fn close(&self) {
        self.db.close();
    }
}

/// A live IndexedDB transaction.
#[derive(Debug)]
pub struct IndexedDbTransaction {
    tx: IdbTransaction,
}

impl IndexedDbTransaction {
    fn store(&self, table: &str) -> StoreResult<IdbObjectStore> {
        self.tx
            .object_store(table)
            .map_err(|e| IndexedDbError::from_js(&format!("table '{}'", table), &e).into())
    }

    async fn write(&self, table: &str, record: Value, overwrite: bool) -> StoreResult<Key> {
        let js_val = value_to_js(&record)?;
        let store = self.store(table)?;
        let req = if overwrite {
            store.put(&js_val)
        } else {
            store.add(&js_val)
        }
        .map_err(|e| IndexedDbError::from_js(&format!("write to '{}'", table), &e))?;
        let key = idb::await_request(&req).await?;
        Ok(js_to_key(&key)?)
    }
}

impl Transaction for IndexedDbTransaction {
    type Cursor = IndexedDbCursor;

    async fn add(&self, table: &str, record: Value) -> StoreResult<Key> {
        self.write(table, record, false).await
    }

    async fn put(&self, table: &str, record: Value) -> StoreResult<Key> {
        self.write(table, record, true).await
    }

    async fn get(&self, table: &str, key: &Key) -> StoreResult<Option<Value>> {
        let req = self
            .store(table)?
            .get(&key_to_js(key))
            .map_err(|e| IndexedDbError::from_js("get", &e))?;
        let result = idb::await_request(&req).await?;
        Ok(js_to_value(&result)?)
    }

    async fn get_by_index(
        &self,
        table: &str,
        index: &str,
        key: &Key,
    ) -> StoreResult<Option<Value>> {
        let index = self
            .store(table)?
            .index(index)
            .map_err(|e| IndexedDbError::from_js(&format!("index '{}' on '{}'", index, table), &e))?;
        let req = index
            .get(&key_to_js(key))
            .map_err(|e| IndexedDbError::from_js("index get", &e))?;
        let result = idb::await_request(&req).await?;
        Ok(js_to_value(&result)?)
    }

    async fn delete(&self, table: &str, key: &Key) -> StoreResult<()> {
        let req = self
            .store(table)?
            .delete(&key_to_js(key))
            .map_err(|e| IndexedDbError::from_js("delete", &e))?;
        idb::await_request(&req).await?;
        Ok(())
    }

    async fn count(&self, table: &str) -> StoreResult<usize> {
        let req = self
            .store(table)?
            .count()
            .map_err(|e| IndexedDbError::from_js("count", &e))?;
        let result = idb::await_request(&req).await?;
        Ok(result.as_f64().unwrap_or(0.0) as usize)
    }

    fn open_cursor(
        &self,
        table: &str,
        index: Option<&str>,
        range: Option<&KeyRange>,
    ) -> StoreResult<IndexedDbCursor> {
        let store = self.store(table)?;
        let range = range.map(key_range_to_js).transpose()?;

        let req = match index {
            Some(name) => {
                let index = store.index(name).map_err(|e| {
                    IndexedDbError::from_js(&format!("index '{}' on '{}'", name, table), &e)
                })?;
                match &range {
                    Some(r) => index.open_cursor_with_range(r),
                    None => index.open_cursor(),
                }
            }
            None => match &range {
                Some(r) => store.open_cursor_with_range(r),
                None => store.open_cursor(),
            },
        }
        .map_err(|e| IndexedDbError::from_js("open cursor", &e))?;

        Ok(IndexedDbCursor {
            req,
            current: None,
            exhausted: false,
        })
    }

    async fn done(self) -> StoreResult<()> {
        idb::await_transaction(&self.tx).await?;
        Ok(())
    }
}

/// Forward cursor over an object store or index.
///
/// The same request fires `success` once per position; `continue()` on the
/// current cursor re-arms it.
#[derive(Debug)]
pub struct IndexedDbCursor {
    req: IdbRequest,
    current: Option<IdbCursorWithValue>,
    exhausted: bool,
}

impl Cursor for IndexedDbCursor {
    async fn next(&mut self) -> StoreResult<Option<Value>> {
        if self.exhausted {
            return Ok(None);
        }
        if let Some(cursor) = self.current.take() {
            cursor
                .continue_()
                .map_err(|e| IndexedDbError::from_js("cursor continue", &e))?;
        }

        let result = idb::await_request(&self.req).await?;
        if result.is_null() || result.is_undefined() {
            self.exhausted = true;
            return Ok(None);
        }

        let cursor: IdbCursorWithValue = result
            .dyn_into()
            .map_err(|_| IndexedDbError::JsValue("cursor result is not IdbCursorWithValue".into()))?;
        let value = cursor
            .value()
            .map_err(|e| IndexedDbError::from_js("cursor value", &e))?;
        self.current = Some(cursor);
        Ok(js_to_value(&value)?)
    }
}
