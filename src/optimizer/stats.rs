//! Row counts and index selectivities from the catalog, with heuristic
//! fallbacks when statistics are missing or switched off.

use crate::catalog::{Catalog, IndexDescriptor, TableDescriptor};

use super::config::OptimizerConfig;

/// Row count of a table and whether it came from statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowEstimate {
    pub rows: f64,
    pub from_statistics: bool,
}

pub struct StatisticsAdapter<'a> {
    catalog: &'a dyn Catalog,
    config: &'a OptimizerConfig,
}

impl<'a> StatisticsAdapter<'a> {
    pub fn new(catalog: &'a dyn Catalog, config: &'a OptimizerConfig) -> Self {
        Self { catalog, config }
    }

    pub fn row_count(&self, table: &TableDescriptor) -> RowEstimate {
        let stats = self
            .config
            .use_statistics
            .then(|| self.catalog.table_statistics(table))
            .flatten();
        match stats {
            Some(stats) => RowEstimate {
                rows: stats.row_count.max(1) as f64,
                from_statistics: true,
            },
            None => RowEstimate {
                rows: self.config.default_row_count.max(1) as f64,
                from_statistics: false,
            },
        }
    }

    /// Selectivity of equality on the first `columns` key columns of an
    /// index, if the catalog has statistics for it.
    pub fn index_selectivity(&self, table: &TableDescriptor, index: &IndexDescriptor, columns: usize) -> Option<f64> {
        if !self.config.use_statistics {
            return None;
        }
        self.catalog
            .index_statistics(table, &index.name)
            .and_then(|stats| stats.selectivity(columns))
    }
}
