//! Table registry: table name -> record handle

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::connection::ConnectionManager;
use crate::record::RecordHandle;
use crate::storage::Backend;

/// Holds one [`RecordHandle`] per declared table.
///
/// Handles for declared tables that were never registered are created the
/// first time they are asked for. Names outside the configuration have no
/// handle.
pub struct TableRegistry<B: Backend> {
    manager: Rc<ConnectionManager<B>>,
    handles: RefCell<BTreeMap<String, RecordHandle<B>>>,
}

impl<B: Backend + 'static> TableRegistry<B> {
    pub(crate) fn new(manager: Rc<ConnectionManager<B>>) -> Self {
        Self {
            manager,
            handles: RefCell::new(BTreeMap::new()),
        }
    }

    /// (Re)create a handle for every declared table. Returns how many were
    /// registered.
    pub fn register_all(&self) -> usize {
        let mut handles = self.handles.borrow_mut();
        for table in self.manager.config().tables() {
            handles.insert(
                table.name.clone(),
                RecordHandle::new(&table.name, Rc::clone(&self.manager)),
            );
        }
        self.manager.config().tables().len()
    }

    /// Create handles for declared tables that lack one. Returns how many
    /// were created.
    pub fn register_missing(&self) -> usize {
        let mut handles = self.handles.borrow_mut();
        let mut created = 0;
        for table in self.manager.config().tables() {
            if !handles.contains_key(&table.name) {
                handles.insert(
                    table.name.clone(),
                    RecordHandle::new(&table.name, Rc::clone(&self.manager)),
                );
                created += 1;
            }
        }
        created
    }

    /// Handle for a declared table.
    pub fn get(&self, table: &str) -> Option<RecordHandle<B>> {
        if let Some(handle) = self.handles.borrow().get(table) {
            return Some(handle.clone());
        }

        self.manager.config().table(table)?;
        let handle = RecordHandle::new(table, Rc::clone(&self.manager));
        self.handles
            .borrow_mut()
            .insert(table.to_string(), handle.clone());
        Some(handle)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.handles.borrow().contains_key(table)
    }

    pub fn len(&self) -> usize {
        self.handles.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.borrow().is_empty()
    }

    /// Copy of every registered handle.
    pub fn snapshot(&self) -> BTreeMap<String, RecordHandle<B>> {
        self.handles.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::schema::TableDefinition;
    use crate::storage::MemoryBackend;

    fn registry(tables: &[&str]) -> TableRegistry<MemoryBackend> {
        let defs: Vec<TableDefinition> = tables.iter().map(|t| TableDefinition::new(*t)).collect();
        let config = DatabaseConfig::builder().tables(&defs).unwrap().build();
        TableRegistry::new(Rc::new(ConnectionManager::new(MemoryBackend::new(), config)))
    }

    #[test]
    fn test_register_missing_fills_gaps_once() {
        let registry = registry(&["a", "b"]);
        assert!(registry.is_empty());
        assert_eq!(registry.register_missing(), 2);
        assert_eq!(registry.register_missing(), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_get_creates_declared_handles_lazily() {
        let registry = registry(&["a"]);
        assert!(!registry.contains("a"));
        assert_eq!(registry.get("a").unwrap().table(), "a");
        assert!(registry.contains("a"));
        assert!(registry.get("zzz").is_none());
        assert!(!registry.contains("zzz"));
    }

    #[test]
    fn test_register_all_counts_declared_tables() {
        let registry = registry(&["a", "b", "c"]);
        registry.get("b");
        assert_eq!(registry.register_all(), 3);
        assert_eq!(registry.snapshot().keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
