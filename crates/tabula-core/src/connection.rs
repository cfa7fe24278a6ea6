//! Connection manager and the runtime database surface
//!
//! The manager opens the configured `(name, version)` on a backend. When the
//! backend reports an upgrade (new database or version bump) the manager
//! creates every declared table that does not exist yet, with one index per
//! secondary field. Existing tables are never altered.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error, info};

use crate::callback::{HostScheduler, Immediate};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::logging::prefix;
use crate::record::RecordHandle;
use crate::registry::TableRegistry;
use crate::schema::NormalizedSchema;
use crate::storage::{Backend, Connection, Opened, SchemaUpgrade, StoreResult, UpgradeFn};

/// Opens versioned connections for one configured database.
pub struct ConnectionManager<B: Backend> {
    backend: B,
    config: Rc<DatabaseConfig>,
    scheduler: Rc<dyn HostScheduler>,
}

impl<B: Backend + 'static> ConnectionManager<B> {
    /// Create a manager delivering callbacks immediately.
    pub fn new(backend: B, config: DatabaseConfig) -> Self {
        Self {
            backend,
            config: Rc::new(config),
            scheduler: Rc::new(Immediate),
        }
    }

    /// Deliver callbacks through the host's update cycle.
    pub fn with_scheduler(mut self, scheduler: impl HostScheduler + 'static) -> Self {
        self.scheduler = Rc::new(scheduler);
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn scheduler(&self) -> &dyn HostScheduler {
        self.scheduler.as_ref()
    }

    /// Open the configured database, running the upgrade phase if needed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the backend refuses the open request.
    pub async fn open(&self) -> Result<Opened<B::Connection>> {
        let config = Rc::clone(&self.config);
        let upgrade: UpgradeFn = Rc::new(move |schema: &mut dyn SchemaUpgrade| {
            create_missing_tables(schema, config.tables())
        });

        match self
            .backend
            .open(self.config.name(), self.config.version(), upgrade)
            .await
        {
            Ok(opened) => {
                debug!(
                    "{} opened '{}' v{} (upgraded: {})",
                    prefix::OPEN,
                    self.config.name(),
                    self.config.version(),
                    opened.upgraded
                );
                Ok(opened)
            }
            Err(err) => {
                error!(
                    "{} unable to open '{}' v{}: {}",
                    prefix::DB,
                    self.config.name(),
                    self.config.version(),
                    err
                );
                Err(Error::Connection(err.to_string()))
            }
        }
    }

    /// Open a connection for a single operation.
    pub async fn connect(&self) -> Result<B::Connection> {
        Ok(self.open().await?.connection)
    }

    /// Open the database once and register a record handle for every
    /// declared table.
    pub async fn initialize(self) -> Result<Database<B>> {
        let opened = self.open().await?;
        opened.connection.close();

        let manager = Rc::new(self);
        let registry = TableRegistry::new(Rc::clone(&manager));

        if opened.upgraded {
            let registered = registry.register_all();
            info!(
                "{} '{}' upgraded to v{}, {} table handles registered",
                prefix::DB,
                manager.config.name(),
                manager.config.version(),
                registered
            );
        } else {
            let registered = registry.register_missing();
            debug!(
                "{} '{}' ready, {} table handles created",
                prefix::DB,
                manager.config.name(),
                registered
            );
        }

        Ok(Database { manager, registry })
    }

    /// Delete the configured database from the backend.
    pub async fn delete_database(&self) -> Result<()> {
        self.backend
            .delete_database(self.config.name())
            .await
            .map_err(Error::from)
    }
}

impl<B: Backend> fmt::Debug for ConnectionManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Create every table in `tables` that the store does not have yet.
///
/// Each new table auto-increments its key at `key_path_field` and gets one
/// non-unique index per secondary field, keyed by the field's own value.
pub fn create_missing_tables(
    schema: &mut dyn SchemaUpgrade,
    tables: &[NormalizedSchema],
) -> StoreResult<()> {
    for table in tables {
        if schema.has_table(&table.name) {
            continue;
        }
        schema.create_table(&table.name, &table.fields.key_path_field, true)?;
        for index in table.index_names() {
            schema.create_index(&table.name, index, index)?;
        }
        info!(
            "{} created table '{}' (key: {}, indexes: {})",
            prefix::DB,
            table.name,
            table.fields.key_path_field,
            table.fields.other.len()
        );
    }
    Ok(())
}

/// Runtime surface of an initialized database.
///
/// [`handle`](Database::handle) is the entry point for record operations.
pub struct Database<B: Backend> {
    manager: Rc<ConnectionManager<B>>,
    registry: TableRegistry<B>,
}

impl<B: Backend + 'static> Database<B> {
    pub fn name(&self) -> &str {
        self.manager.config().name()
    }

    pub fn version(&self) -> u32 {
        self.manager.config().version()
    }

    /// Normalized table definitions.
    pub fn tables(&self) -> &[NormalizedSchema] {
        self.manager.config().tables()
    }

    pub fn config(&self) -> &DatabaseConfig {
        self.manager.config()
    }

    pub fn backend(&self) -> &B {
        self.manager.backend()
    }

    /// Record handle for a declared table, created on first use if missing.
    pub fn handle(&self, table: &str) -> Option<RecordHandle<B>> {
        self.registry.get(table)
    }

    /// Every registered handle by table name.
    pub fn handles(&self) -> BTreeMap<String, RecordHandle<B>> {
        self.registry.snapshot()
    }

    pub fn registry(&self) -> &TableRegistry<B> {
        &self.registry
    }

    /// Delete the underlying database. The next operation through a handle
    /// reopens it and recreates the declared tables empty.
    pub async fn delete_database(&self) -> Result<()> {
        self.manager.delete_database().await
    }
}

impl<B: Backend> fmt::Debug for Database<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.manager.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefinition, TableDefinition};
    use crate::storage::{MemoryBackend, StoreError};

    fn config(version: u32, tables: &[TableDefinition]) -> DatabaseConfig {
        DatabaseConfig::builder()
            .database_name("shop")
            .unwrap()
            .version(version)
            .unwrap()
            .tables(tables)
            .unwrap()
            .build()
    }

    fn items() -> TableDefinition {
        TableDefinition::new("items")
            .field(FieldDefinition::new("sku"))
            .field(FieldDefinition::new("qty"))
    }

    #[tokio::test]
    async fn test_initialize_creates_tables_and_indexes() {
        let backend = MemoryBackend::new();
        let db = ConnectionManager::new(backend.clone(), config(1, &[items()]))
            .initialize()
            .await
            .unwrap();

        assert_eq!(backend.table_names("shop"), vec!["items"]);
        assert_eq!(backend.index_names("shop", "items"), vec!["qty", "sku"]);
        assert_eq!(db.handles().len(), 1);
        assert!(db.handle("items").is_some());
        assert!(db.handle("orders").is_none());
    }

    #[tokio::test]
    async fn test_version_bump_adds_missing_tables_only() {
        let backend = MemoryBackend::new();
        ConnectionManager::new(backend.clone(), config(1, &[items()]))
            .initialize()
            .await
            .unwrap();

        // "items" gains a field, but existing tables are left alone
        let items_v2 = items().field(FieldDefinition::new("price"));
        let orders = TableDefinition::new("orders").field(FieldDefinition::key("ref"));
        let db = ConnectionManager::new(backend.clone(), config(2, &[items_v2, orders]))
            .initialize()
            .await
            .unwrap();

        assert_eq!(backend.version_of("shop"), Some(2));
        assert_eq!(backend.table_names("shop"), vec!["items", "orders"]);
        assert_eq!(backend.index_names("shop", "items"), vec!["qty", "sku"]);
        assert_eq!(db.handles().len(), 2);
    }

    #[tokio::test]
    async fn test_tables_declared_without_version_bump_get_handles() {
        let backend = MemoryBackend::new();
        ConnectionManager::new(backend.clone(), config(1, &[items()]))
            .initialize()
            .await
            .unwrap();

        let orders = TableDefinition::new("orders");
        let db = ConnectionManager::new(backend.clone(), config(1, &[items(), orders]))
            .initialize()
            .await
            .unwrap();

        // Handle exists, the physical table does not
        assert!(db.handle("orders").is_some());
        assert_eq!(backend.table_names("shop"), vec!["items"]);
        let err = db.handle("orders").unwrap().get_all().await.unwrap_err();
        assert!(matches!(err, Error::Operation(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_open_failure_is_connection_error() {
        let backend = MemoryBackend::new();
        ConnectionManager::new(backend.clone(), config(5, &[items()]))
            .initialize()
            .await
            .unwrap();

        let err = ConnectionManager::new(backend, config(4, &[items()]))
            .initialize()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[tokio::test]
    async fn test_delete_database() {
        let backend = MemoryBackend::new();
        let manager = ConnectionManager::new(backend.clone(), config(1, &[items()]));
        manager.open().await.unwrap();
        manager.delete_database().await.unwrap();
        assert_eq!(backend.version_of("shop"), None);
    }

    #[tokio::test]
    async fn test_database_delete_then_reinitialize() {
        let backend = MemoryBackend::new();
        let db = ConnectionManager::new(backend.clone(), config(1, &[items()]))
            .initialize()
            .await
            .unwrap();
        db.delete_database().await.unwrap();
        assert_eq!(backend.version_of("shop"), None);

        ConnectionManager::new(backend.clone(), config(1, &[items()]))
            .initialize()
            .await
            .unwrap();
        assert_eq!(backend.table_names("shop"), vec!["items"]);
    }

    #[tokio::test]
    async fn test_runtime_surface() {
        let db = ConnectionManager::new(MemoryBackend::new(), config(3, &[items()]))
            .initialize()
            .await
            .unwrap();

        assert_eq!(db.name(), "shop");
        assert_eq!(db.version(), 3);
        assert_eq!(db.tables().len(), 1);
        assert_eq!(db.tables()[0].fields.key_path_field, "id");
    }
}
