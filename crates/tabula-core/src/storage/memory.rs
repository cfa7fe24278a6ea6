//! In-memory storage backend
//!
//! An ordered, versioned object store kept in process memory. It honours the
//! same contract as the browser backend (upgrade phase, key generators,
//! index ordering, cursor exhaustion) and is used for tests and native hosts.
//! Writes apply immediately; there is no rollback.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde_json::Value;

use crate::key::{self, Key};
use crate::range::KeyRange;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::traits::{
    Backend, Connection, Cursor, Opened, SchemaUpgrade, Transaction, TransactionMode, UpgradeFn,
};

type Databases = Rc<RefCell<HashMap<String, MemoryDatabase>>>;

/// In-memory store engine.
///
/// Cloning shares the underlying databases, so a clone observes every write
/// made through the original.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    databases: Databases,
}

/// Largest key the generator hands out (2^53, as in IndexedDB).
const MAX_GENERATED_KEY: u64 = 1 << 53;

#[derive(Debug, Clone, Default)]
struct MemoryDatabase {
    version: u32,
    tables: BTreeMap<String, MemoryTable>,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    key_path: String,
    auto_increment: bool,
    next_key: u64,
    records: BTreeMap<Key, Value>,
    /// index name -> key path
    indexes: BTreeMap<String, String>,
}

impl MemoryTable {
    fn new(key_path: &str, auto_increment: bool) -> Self {
        Self {
            key_path: key_path.to_string(),
            auto_increment,
            next_key: 1,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    fn write(&mut self, table: &str, mut record: Value, overwrite: bool) -> StoreResult<Key> {
        let key = match key::value_at(&record, &self.key_path) {
            Some(value) => Key::from_value(value).ok_or_else(|| {
                StoreError::InvalidData(format!(
                    "value at key path '{}' in table '{}' is not a valid key",
                    self.key_path, table
                ))
            })?,
            None if self.auto_increment => {
                if self.next_key > MAX_GENERATED_KEY {
                    return Err(StoreError::AlreadyExists(format!(
                        "key generator exhausted in table '{}'",
                        table
                    )));
                }
                let generated = Key::from(self.next_key);
                if !key::inject_key(&mut record, &self.key_path, &generated) {
                    return Err(StoreError::InvalidData(format!(
                        "cannot assign generated key to a non-object record in table '{}'",
                        table
                    )));
                }
                generated
            }
            None => {
                return Err(StoreError::InvalidData(format!(
                    "record has no value at key path '{}' in table '{}'",
                    self.key_path, table
                )))
            }
        };

        if !overwrite && self.records.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("{} in table '{}'", key, table)));
        }

        // Explicit numeric keys push the generator past them
        if let Key::Number(n) = &key {
            let n = *n;
            if self.auto_increment && n >= self.next_key as f64 {
                self.next_key = if n >= MAX_GENERATED_KEY as f64 {
                    MAX_GENERATED_KEY + 1
                } else {
                    n.floor() as u64 + 1
                };
            }
        }

        self.records.insert(key.clone(), record);
        Ok(key)
    }

    /// Records visible through `index`, in (index key, primary key) order.
    fn index_scan(&self, table: &str, index: &str, range: Option<&KeyRange>) -> StoreResult<Vec<Value>> {
        let key_path = self.indexes.get(index).ok_or_else(|| {
            StoreError::NotFound(format!("index '{}' on table '{}'", index, table))
        })?;

        let mut entries: Vec<(Key, &Value)> = self
            .records
            .values()
            .filter_map(|record| {
                let index_key = key::value_at(record, key_path).and_then(Key::from_value)?;
                range
                    .map_or(true, |r| r.contains(&index_key))
                    .then_some((index_key, record))
            })
            .collect();

        // Stable sort keeps primary-key order among equal index keys
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries.into_iter().map(|(_, record)| record.clone()).collect())
    }
}

impl MemoryBackend {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version of a database, if it exists.
    pub fn version_of(&self, name: &str) -> Option<u32> {
        self.databases.borrow().get(name).map(|db| db.version)
    }

    /// Table names of a database, sorted.
    pub fn table_names(&self, name: &str) -> Vec<String> {
        self.databases
            .borrow()
            .get(name)
            .map(|db| db.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Index names of a table, sorted.
    pub fn index_names(&self, name: &str, table: &str) -> Vec<String> {
        self.databases
            .borrow()
            .get(name)
            .and_then(|db| db.tables.get(table))
            .map(|t| t.indexes.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Backend for MemoryBackend {
    type Connection = MemoryConnection;

    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeFn,
    ) -> StoreResult<Opened<MemoryConnection>> {
        if version == 0 {
            return Err(StoreError::Backend("version must be at least 1".into()));
        }

        let mut databases = self.databases.borrow_mut();
        let current = databases.get(name).map(|db| db.version).unwrap_or(0);

        if version < current {
            return Err(StoreError::Version {
                requested: version,
                current,
            });
        }

        let upgraded = version > current;
        if upgraded {
            // Upgrade works on a copy so a failing callback leaves the stored
            // database (and its version) untouched.
            let mut staged = databases.get(name).cloned().unwrap_or_default();
            upgrade(&mut MemoryUpgrade { db: &mut staged })?;
            staged.version = version;
            databases.insert(name.to_string(), staged);
        }

        Ok(Opened {
            connection: MemoryConnection {
                databases: Rc::clone(&self.databases),
                name: name.to_string(),
            },
            upgraded,
        })
    }

    async fn delete_database(&self, name: &str) -> StoreResult<()> {
        self.databases.borrow_mut().remove(name);
        Ok(())
    }
}

struct MemoryUpgrade<'a> {
    db: &'a mut MemoryDatabase,
}

impl SchemaUpgrade for MemoryUpgrade<'_> {
    fn has_table(&self, name: &str) -> bool {
        self.db.tables.contains_key(name)
    }

    fn create_table(&mut self, name: &str, key_path: &str, auto_increment: bool) -> StoreResult<()> {
        if self.db.tables.contains_key(name) {
            return Err(StoreError::AlreadyExists(format!("table '{}'", name)));
        }
        self.db
            .tables
            .insert(name.to_string(), MemoryTable::new(key_path, auto_increment));
        Ok(())
    }

    fn create_index(&mut self, table: &str, index: &str, key_path: &str) -> StoreResult<()> {
        let t = self
            .db
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::NotFound(format!("table '{}'", table)))?;
        if t.indexes.contains_key(index) {
            return Err(StoreError::AlreadyExists(format!(
                "index '{}' on table '{}'",
                index, table
            )));
        }
        t.indexes.insert(index.to_string(), key_path.to_string());
        Ok(())
    }
}

/// Connection to an in-memory database.
#[derive(Debug)]
pub struct MemoryConnection {
    databases: Databases,
    name: String,
}

impl Connection for MemoryConnection {
    type Transaction = MemoryTransaction;

    fn transaction(&self, tables: &[&str], mode: TransactionMode) -> StoreResult<MemoryTransaction> {
        let databases = self.databases.borrow();
        let db = databases
            .get(&self.name)
            .ok_or_else(|| StoreError::NotFound(format!("database '{}'", self.name)))?;
        for table in tables {
            if !db.tables.contains_key(*table) {
                return Err(StoreError::NotFound(format!("table '{}'", table)));
            }
        }
        Ok(MemoryTransaction {
            databases: Rc::clone(&self.databases),
            name: self.name.clone(),
            scope: tables.iter().map(|t| t.to_string()).collect(),
            mode,
        })
    }

    fn close(&self) {}
}

/// Transaction over an in-memory database.
#[derive(Debug)]
pub struct MemoryTransaction {
    databases: Databases,
    name: String,
    scope: Vec<String>,
    mode: TransactionMode,
}

impl MemoryTransaction {
    fn check_scope(&self, table: &str) -> StoreResult<()> {
        if self.scope.iter().any(|t| t == table) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!(
                "table '{}' is not in the transaction scope",
                table
            )))
        }
    }

    fn read<T>(&self, table: &str, f: impl FnOnce(&MemoryTable) -> StoreResult<T>) -> StoreResult<T> {
        self.check_scope(table)?;
        let databases = self.databases.borrow();
        let t = databases
            .get(&self.name)
            .and_then(|db| db.tables.get(table))
            .ok_or_else(|| StoreError::NotFound(format!("table '{}'", table)))?;
        f(t)
    }

    fn write<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut MemoryTable) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.check_scope(table)?;
        if self.mode == TransactionMode::ReadOnly {
            return Err(StoreError::Backend(format!(
                "write to '{}' in a read-only transaction",
                table
            )));
        }
        let mut databases = self.databases.borrow_mut();
        let t = databases
            .get_mut(&self.name)
            .and_then(|db| db.tables.get_mut(table))
            .ok_or_else(|| StoreError::NotFound(format!("table '{}'", table)))?;
        f(t)
    }
}

impl Transaction for MemoryTransaction {
    type Cursor = MemoryCursor;

    async fn add(&self, table: &str, record: Value) -> StoreResult<Key> {
        self.write(table, |t| t.write(table, record, false))
    }

    async fn put(&self, table: &str, record: Value) -> StoreResult<Key> {
        self.write(table, |t| t.write(table, record, true))
    }

    async fn get(&self, table: &str, key: &Key) -> StoreResult<Option<Value>> {
        self.read(table, |t| Ok(t.records.get(key).cloned()))
    }

    async fn get_by_index(&self, table: &str, index: &str, key: &Key) -> StoreResult<Option<Value>> {
        let range = KeyRange::only(key.clone());
        self.read(table, |t| {
            Ok(t.index_scan(table, index, Some(&range))?.into_iter().next())
        })
    }

    async fn delete(&self, table: &str, key: &Key) -> StoreResult<()> {
        self.write(table, |t| {
            t.records.remove(key);
            Ok(())
        })
    }

    async fn count(&self, table: &str) -> StoreResult<usize> {
        self.read(table, |t| Ok(t.records.len()))
    }

    fn open_cursor(
        &self,
        table: &str,
        index: Option<&str>,
        range: Option<&KeyRange>,
    ) -> StoreResult<MemoryCursor> {
        let records = self.read(table, |t| match index {
            Some(index) => t.index_scan(table, index, range),
            None => Ok(t
                .records
                .iter()
                .filter(|(k, _)| range.map_or(true, |r| r.contains(k)))
                .map(|(_, v)| v.clone())
                .collect()),
        })?;
        Ok(MemoryCursor {
            records: records.into_iter(),
        })
    }

    async fn done(self) -> StoreResult<()> {
        Ok(())
    }
}

/// Cursor over a snapshot taken when the cursor was opened.
#[derive(Debug)]
pub struct MemoryCursor {
    records: std::vec::IntoIter<Value>,
}

impl Cursor for MemoryCursor {
    async fn next(&mut self) -> StoreResult<Option<Value>> {
        Ok(self.records.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items_schema() -> UpgradeFn {
        Rc::new(|up: &mut dyn SchemaUpgrade| {
            if !up.has_table("items") {
                up.create_table("items", "id", true)?;
                up.create_index("items", "sku", "sku")?;
            }
            Ok(())
        })
    }

    async fn open_items(backend: &MemoryBackend) -> MemoryConnection {
        backend
            .open("test", 1, items_schema())
            .await
            .unwrap()
            .connection
    }

    #[tokio::test]
    async fn test_open_runs_upgrade_once() {
        let backend = MemoryBackend::new();
        let first = backend.open("test", 1, items_schema()).await.unwrap();
        assert!(first.upgraded);
        let second = backend.open("test", 1, items_schema()).await.unwrap();
        assert!(!second.upgraded);
        assert_eq!(backend.version_of("test"), Some(1));
        assert_eq!(backend.table_names("test"), vec!["items"]);
        assert_eq!(backend.index_names("test", "items"), vec!["sku"]);
    }

    #[tokio::test]
    async fn test_open_older_version_fails() {
        let backend = MemoryBackend::new();
        backend.open("test", 3, items_schema()).await.unwrap();
        let err = backend.open("test", 2, items_schema()).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Version {
                requested: 2,
                current: 3
            }
        );
    }

    #[tokio::test]
    async fn test_failed_upgrade_leaves_database_untouched() {
        let backend = MemoryBackend::new();
        backend.open("test", 1, items_schema()).await.unwrap();

        let failing: UpgradeFn = Rc::new(|up: &mut dyn SchemaUpgrade| {
            up.create_table("orders", "id", true)?;
            up.create_index("missing", "x", "x")
        });
        assert!(backend.open("test", 2, failing).await.is_err());
        assert_eq!(backend.version_of("test"), Some(1));
        assert_eq!(backend.table_names("test"), vec!["items"]);
    }

    #[tokio::test]
    async fn test_key_generator_skips_explicit_keys() {
        let backend = MemoryBackend::new();
        let conn = open_items(&backend).await;
        let tx = conn
            .transaction(&["items"], TransactionMode::ReadWrite)
            .unwrap();

        assert_eq!(tx.add("items", json!({"sku": "a"})).await.unwrap(), Key::from(1));
        assert_eq!(tx.add("items", json!({"id": 10, "sku": "b"})).await.unwrap(), Key::from(10));
        assert_eq!(tx.add("items", json!({"sku": "c"})).await.unwrap(), Key::from(11));
        // String keys leave the generator alone
        assert_eq!(tx.add("items", json!({"id": "k", "sku": "d"})).await.unwrap(), Key::from("k"));
        assert_eq!(tx.add("items", json!({"sku": "e"})).await.unwrap(), Key::from(12));
    }

    #[tokio::test]
    async fn test_large_explicit_key_exhausts_generator() {
        let backend = MemoryBackend::new();
        let conn = open_items(&backend).await;
        let tx = conn
            .transaction(&["items"], TransactionMode::ReadWrite)
            .unwrap();

        assert_eq!(
            tx.put("items", json!({"id": 1e20, "sku": "big"})).await.unwrap(),
            Key::from(1e20)
        );
        let err = tx.add("items", json!({"sku": "next"})).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        // Explicit keys still work once the generator is spent
        assert_eq!(tx.add("items", json!({"id": 5, "sku": "x"})).await.unwrap(), Key::from(5));
    }

    #[tokio::test]
    async fn test_generator_reaches_max_safe_key() {
        let backend = MemoryBackend::new();
        let conn = open_items(&backend).await;
        let tx = conn
            .transaction(&["items"], TransactionMode::ReadWrite)
            .unwrap();

        let max = (1u64 << 53) as f64;
        tx.add("items", json!({"id": max - 1.0})).await.unwrap();
        assert_eq!(tx.add("items", json!({"sku": "last"})).await.unwrap(), Key::from(max));
        let err = tx.add("items", json!({"sku": "over"})).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_add_duplicate_key_fails() {
        let backend = MemoryBackend::new();
        let conn = open_items(&backend).await;
        let tx = conn
            .transaction(&["items"], TransactionMode::ReadWrite)
            .unwrap();

        tx.add("items", json!({"id": 1})).await.unwrap();
        let err = tx.add("items", json!({"id": 1})).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_key_and_non_objects() {
        let backend = MemoryBackend::new();
        let conn = open_items(&backend).await;
        let tx = conn
            .transaction(&["items"], TransactionMode::ReadWrite)
            .unwrap();

        let err = tx.add("items", json!({"id": true})).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
        let err = tx.add("items", json!(42)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_read_only_transaction_rejects_writes() {
        let backend = MemoryBackend::new();
        let conn = open_items(&backend).await;
        let tx = conn
            .transaction(&["items"], TransactionMode::ReadOnly)
            .unwrap();

        let err = tx.put("items", json!({"sku": "a"})).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn test_transaction_scope_is_enforced() {
        let backend = MemoryBackend::new();
        let conn = open_items(&backend).await;

        assert!(matches!(
            conn.transaction(&["orders"], TransactionMode::ReadOnly),
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_index_cursor_orders_by_index_then_primary_key() {
        let backend = MemoryBackend::new();
        let conn = open_items(&backend).await;
        let tx = conn
            .transaction(&["items"], TransactionMode::ReadWrite)
            .unwrap();

        tx.add("items", json!({"sku": "b"})).await.unwrap();
        tx.add("items", json!({"sku": "a"})).await.unwrap();
        tx.add("items", json!({"sku": "b"})).await.unwrap();
        tx.add("items", json!({"sku": null})).await.unwrap();

        let mut cursor = tx.open_cursor("items", Some("sku"), None).unwrap();
        let mut ids = Vec::new();
        while let Some(record) = cursor.next().await.unwrap() {
            ids.push(record["id"].clone());
        }
        // The null sku is not indexed
        assert_eq!(ids, vec![json!(2), json!(1), json!(3)]);
    }

    #[tokio::test]
    async fn test_unknown_index_is_not_found() {
        let backend = MemoryBackend::new();
        let conn = open_items(&backend).await;
        let tx = conn
            .transaction(&["items"], TransactionMode::ReadOnly)
            .unwrap();

        assert!(matches!(
            tx.open_cursor("items", Some("qty"), None),
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_database() {
        let backend = MemoryBackend::new();
        open_items(&backend).await;
        backend.delete_database("test").await.unwrap();
        assert_eq!(backend.version_of("test"), None);
        backend.delete_database("test").await.unwrap();
    }
}
