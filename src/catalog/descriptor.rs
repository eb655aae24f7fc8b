//! Table and view descriptors, and the catalog interface the compiler reads.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::{CatalogError, CatalogResult};
use super::types::{ColumnDescriptor, IndexDescriptor, IndexStatistics, TableStatistics};
use crate::tree::DataType;

/// Schema used when a name is not qualified.
pub const DEFAULT_SCHEMA: &str = "APP";

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<TableStatistics>,
}

impl TableDescriptor {
    /// Find a column by name, case-insensitively.
    pub fn column(&self, name: &str) -> Option<(usize, &ColumnDescriptor)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.column(name).map(|(i, _)| i)
    }

    pub fn index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// Key column positions of an index, in key order.
    pub fn index_key_positions(&self, index: &IndexDescriptor) -> Vec<usize> {
        index
            .columns
            .iter()
            .filter_map(|c| self.column_position(c))
            .collect()
    }

    /// Check column names are unique and index keys exist.
    pub fn validate(&self) -> CatalogResult<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.to_ascii_uppercase()) {
                return Err(CatalogError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        for index in &self.indexes {
            if index.columns.is_empty() {
                return Err(CatalogError::InvalidIndex {
                    table: self.name.clone(),
                    index: index.name.clone(),
                    reason: "no key columns".into(),
                });
            }
            if let Some(missing) = index.columns.iter().find(|c| self.column(c).is_none()) {
                return Err(CatalogError::InvalidIndex {
                    table: self.name.clone(),
                    index: index.name.clone(),
                    reason: format!("unknown column {}", missing),
                });
            }
        }
        Ok(())
    }
}

/// A stored view: a name plus the query text it expands to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDescriptor {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
    /// Column names exposed by the view; empty means the query's own names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    pub query: String,
}

impl ViewDescriptor {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            schema: default_schema(),
            name: name.into(),
            columns: Vec::new(),
            query: query.into(),
        }
    }
}

/// Name and statistics lookups.
///
/// Implementations are shared by concurrent compilations and must not change
/// a descriptor while a statement compiles against it. Statistics are
/// optional: `None` makes the optimizer fall back to heuristics.
pub trait Catalog: Send + Sync {
    fn table(&self, schema: &str, name: &str) -> CatalogResult<Option<Arc<TableDescriptor>>>;

    fn view(&self, schema: &str, name: &str) -> CatalogResult<Option<Arc<ViewDescriptor>>>;

    fn table_statistics(&self, table: &TableDescriptor) -> Option<TableStatistics> {
        table.statistics
    }

    fn index_statistics(&self, table: &TableDescriptor, index: &str) -> Option<IndexStatistics> {
        table.index(index).and_then(|i| i.statistics.clone())
    }
}

/// Builder for table descriptors.
pub struct TableBuilder {
    schema: String,
    name: String,
    columns: Vec<ColumnDescriptor>,
    indexes: Vec<IndexDescriptor>,
    statistics: Option<TableStatistics>,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: default_schema(),
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            statistics: None,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Add a nullable column.
    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(ColumnDescriptor::new(name, data_type));
        self
    }

    /// Add a non-nullable column.
    pub fn required_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(ColumnDescriptor::new(name, data_type).not_null());
        self
    }

    pub fn add_column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, name: impl Into<String>, columns: &[&str], unique: bool) -> Self {
        self.indexes.push(IndexDescriptor::new(name, columns, unique));
        self
    }

    /// Add an index with distinct-key statistics.
    pub fn index_with_statistics(
        mut self,
        name: impl Into<String>,
        columns: &[&str],
        unique: bool,
        unique_values: Vec<u64>,
    ) -> Self {
        let mut index = IndexDescriptor::new(name, columns, unique);
        index.statistics = Some(IndexStatistics { unique_values });
        self.indexes.push(index);
        self
    }

    pub fn row_count(mut self, row_count: u64) -> Self {
        self.statistics = Some(TableStatistics { row_count });
        self
    }

    pub fn build(self) -> CatalogResult<TableDescriptor> {
        let table = TableDescriptor {
            schema: self.schema,
            name: self.name,
            columns: self.columns,
            indexes: self.indexes,
            statistics: self.statistics,
        };
        table.validate()?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> TableDescriptor {
        TableBuilder::new("ORDERS")
            .required_column("ID", DataType::integer())
            .column("CUSTOMER", DataType::varchar(40))
            .column("TOTAL", DataType::decimal(10, 2))
            .index("ORDERS_PK", &["ID"], true)
            .index("ORDERS_CUST", &["customer", "total"], false)
            .row_count(500)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_and_lookup() {
        let table = orders();
        assert_eq!(table.schema, DEFAULT_SCHEMA);
        assert_eq!(table.column_position("customer"), Some(1));
        let index = table.index("orders_cust").unwrap();
        assert_eq!(table.index_key_positions(index), vec![1, 2]);
        assert_eq!(table.statistics.unwrap().row_count, 500);
    }

    #[test]
    fn test_duplicate_column() {
        let result = TableBuilder::new("T")
            .column("A", DataType::integer())
            .column("a", DataType::integer())
            .build();
        assert!(matches!(result, Err(CatalogError::DuplicateColumn { .. })));
    }

    #[test]
    fn test_index_on_unknown_column() {
        let result = TableBuilder::new("T")
            .column("A", DataType::integer())
            .index("T_B", &["B"], false)
            .build();
        assert!(matches!(result, Err(CatalogError::InvalidIndex { .. })));
    }
}
