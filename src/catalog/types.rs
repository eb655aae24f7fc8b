//! Column, index and statistics descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tree::{Collation, CollationKind, DataType};

/// Serde adapter storing a [`DataType`] as its SQL spelling.
mod sql_type {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::tree::DataType;

    pub fn serialize<S: Serializer>(data_type: &DataType, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&data_type.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DataType, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

fn default_true() -> bool {
    true
}

/// A column of a catalog table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type", with = "sql_type")]
    pub sql_type: DataType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Declared collation of a string column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<CollationKind>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, sql_type: DataType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            collation: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_collation(mut self, collation: CollationKind) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Type of a reference to this column, with nullability and collation applied.
    pub fn data_type(&self) -> DataType {
        let mut data_type = self.sql_type.clone().with_nullable(self.nullable);
        if let Some(kind) = self.collation {
            data_type = data_type.with_collation(Collation::implicit(kind));
        }
        data_type
    }
}

impl fmt::Display for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.sql_type)?;
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        if let Some(kind) = self.collation {
            write!(f, " COLLATE {}", kind.sql_name())?;
        }
        Ok(())
    }
}

/// Row count of a table as recorded by the statistics store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStatistics {
    pub row_count: u64,
}

/// Distinct key counts of an index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexStatistics {
    /// `unique_values[n - 1]` is the number of distinct values of the first
    /// `n` key columns.
    pub unique_values: Vec<u64>,
}

impl IndexStatistics {
    /// Selectivity of an equality match on the first `columns` key columns.
    pub fn selectivity(&self, columns: usize) -> Option<f64> {
        if columns == 0 {
            return None;
        }
        let distinct = *self.unique_values.get(columns - 1)?;
        (distinct > 0).then(|| 1.0 / distinct as f64)
    }
}

/// A B-tree index on a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    /// Key columns in key order.
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<IndexStatistics>,
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>, columns: &[&str], unique: bool) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique,
            statistics: None,
        }
    }
}

impl fmt::Display for IndexDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique {
            write!(f, "UNIQUE ")?;
        }
        write!(f, "INDEX {} ({})", self.name, self.columns.join(", "))
    }
}
