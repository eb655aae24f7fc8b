//! In-memory catalog.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::descriptor::{Catalog, TableDescriptor, ViewDescriptor};
use super::error::{CatalogError, CatalogResult};
use super::types::{IndexStatistics, TableStatistics};

type Key = (String, String);

fn key(schema: &str, name: &str) -> Key {
    (schema.to_ascii_uppercase(), name.to_ascii_uppercase())
}

/// JSON document accepted by [`InMemoryCatalog::from_json`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub tables: Vec<TableDescriptor>,
    #[serde(default)]
    pub views: Vec<ViewDescriptor>,
}

/// Catalog held in memory, shareable between threads.
pub struct InMemoryCatalog {
    tables: RwLock<BTreeMap<Key, Arc<TableDescriptor>>>,
    views: RwLock<BTreeMap<Key, Arc<ViewDescriptor>>>,
    statistics_available: AtomicBool,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            views: RwLock::new(BTreeMap::new()),
            statistics_available: AtomicBool::new(true),
        }
    }

    /// Parse a catalog document.
    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        let catalog = Self::new();
        for table in document.tables {
            catalog.add_table(table)?;
        }
        for view in document.views {
            catalog.add_view(view)?;
        }
        Ok(catalog)
    }

    /// Load a catalog document from a file.
    pub fn load(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        debug!("loading catalog from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Snapshot of the catalog as a document.
    pub fn to_document(&self) -> CatalogDocument {
        CatalogDocument {
            tables: self.tables.read().values().map(|t| t.as_ref().clone()).collect(),
            views: self.views.read().values().map(|v| v.as_ref().clone()).collect(),
        }
    }

    pub fn add_table(&self, table: TableDescriptor) -> CatalogResult<()> {
        table.validate()?;
        let key = key(&table.schema, &table.name);
        if self.views.read().contains_key(&key) {
            return Err(CatalogError::DuplicateTable(table.name));
        }
        let mut tables = self.tables.write();
        if tables.contains_key(&key) {
            return Err(CatalogError::DuplicateTable(table.name));
        }
        tables.insert(key, Arc::new(table));
        Ok(())
    }

    pub fn add_view(&self, view: ViewDescriptor) -> CatalogResult<()> {
        let key = key(&view.schema, &view.name);
        if self.tables.read().contains_key(&key) {
            return Err(CatalogError::DuplicateTable(view.name));
        }
        let mut views = self.views.write();
        if views.contains_key(&key) {
            return Err(CatalogError::DuplicateTable(view.name));
        }
        views.insert(key, Arc::new(view));
        Ok(())
    }

    /// Replace the row count of a table. Descriptors already handed out keep
    /// the old value.
    pub fn set_row_count(&self, schema: &str, name: &str, row_count: u64) -> bool {
        let mut tables = self.tables.write();
        match tables.get_mut(&key(schema, name)) {
            Some(table) => {
                Arc::make_mut(table).statistics = Some(TableStatistics { row_count });
                true
            }
            None => false,
        }
    }

    /// Simulate an unreachable statistics store.
    pub fn set_statistics_available(&self, available: bool) {
        self.statistics_available.store(available, Ordering::Relaxed);
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .read()
            .values()
            .map(|t| format!("{}.{}", t.schema, t.name))
            .collect()
    }
}

impl Catalog for InMemoryCatalog {
    fn table(&self, schema: &str, name: &str) -> CatalogResult<Option<Arc<TableDescriptor>>> {
        Ok(self.tables.read().get(&key(schema, name)).cloned())
    }

    fn view(&self, schema: &str, name: &str) -> CatalogResult<Option<Arc<ViewDescriptor>>> {
        Ok(self.views.read().get(&key(schema, name)).cloned())
    }

    fn table_statistics(&self, table: &TableDescriptor) -> Option<TableStatistics> {
        if !self.statistics_available.load(Ordering::Relaxed) {
            return None;
        }
        table.statistics
    }

    fn index_statistics(&self, table: &TableDescriptor, index: &str) -> Option<IndexStatistics> {
        if !self.statistics_available.load(Ordering::Relaxed) {
            return None;
        }
        table.index(index).and_then(|i| i.statistics.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::catalog::TableBuilder;
    use crate::tree::DataType;

    const DOCUMENT: &str = r#"{
        "tables": [
            {
                "name": "EMP",
                "columns": [
                    {"name": "ID", "type": "INTEGER", "nullable": false},
                    {"name": "NAME", "type": "VARCHAR(30)"},
                    {"name": "DEPT", "type": "INTEGER"}
                ],
                "indexes": [{"name": "EMP_PK", "columns": ["ID"], "unique": true}],
                "statistics": {"row_count": 250}
            }
        ],
        "views": [
            {"name": "EMP_NAMES", "query": "SELECT name FROM emp"}
        ]
    }"#;

    #[test]
    fn test_from_json() {
        let catalog = InMemoryCatalog::from_json(DOCUMENT).unwrap();
        let emp = catalog.table("app", "emp").unwrap().unwrap();
        assert_eq!(emp.columns.len(), 3);
        assert!(emp.indexes[0].unique);
        assert_eq!(catalog.table_statistics(&emp).unwrap().row_count, 250);
        assert!(catalog.view("APP", "EMP_NAMES").unwrap().is_some());
        assert!(catalog.table("APP", "MISSING").unwrap().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOCUMENT.as_bytes()).unwrap();
        let catalog = InMemoryCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.table_names(), vec!["APP.EMP".to_string()]);
    }

    #[test]
    fn test_bad_document() {
        assert!(matches!(InMemoryCatalog::from_json("{\"tables\": 3}"), Err(CatalogError::Json(_))));
    }

    #[test]
    fn test_duplicate_names() {
        let catalog = InMemoryCatalog::new();
        let table = TableBuilder::new("T").column("A", DataType::integer()).build().unwrap();
        catalog.add_table(table.clone()).unwrap();
        assert!(matches!(catalog.add_table(table), Err(CatalogError::DuplicateTable(_))));
        assert!(catalog.add_view(ViewDescriptor::new("t", "SELECT 1")).is_err());
    }

    #[test]
    fn test_statistics_unavailable() {
        let catalog = InMemoryCatalog::from_json(DOCUMENT).unwrap();
        let emp = catalog.table("APP", "EMP").unwrap().unwrap();
        catalog.set_statistics_available(false);
        assert!(catalog.table_statistics(&emp).is_none());
        assert!(catalog.set_row_count("APP", "EMP", 10));
        catalog.set_statistics_available(true);
        let emp = catalog.table("APP", "EMP").unwrap().unwrap();
        assert_eq!(catalog.table_statistics(&emp).unwrap().row_count, 10);
    }
}
