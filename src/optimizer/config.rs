//! Optimizer settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How join orders are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinOrderMode {
    /// Cost every admissible permutation.
    #[default]
    Search,
    /// Use the FROM list order as written.
    Fixed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid optimizer configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub join_order: JoinOrderMode,
    /// Pick conglomerates by a fixed preference instead of by cost.
    pub rule_based: bool,
    /// Never stop the join-order search early because of the cost heuristic.
    pub no_timeout: bool,
    /// Hard limit on search time; none means unbounded.
    pub time_budget_ms: Option<u64>,
    /// The cost-based timeout only applies to blocks with more operands.
    pub timeout_min_tables: usize,
    /// Memory a hash join may use for one inner table, in bytes.
    pub max_memory_per_table: u64,
    /// Scans expected to read more rows than this lock the whole table.
    pub table_lock_threshold: u64,
    /// Consult catalog statistics; heuristics otherwise.
    pub use_statistics: bool,
    /// Row count assumed for a table without statistics.
    pub default_row_count: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            join_order: JoinOrderMode::Search,
            rule_based: false,
            no_timeout: false,
            time_budget_ms: None,
            timeout_min_tables: 6,
            max_memory_per_table: 1024 * 1024,
            table_lock_threshold: 5000,
            use_statistics: true,
            default_row_count: 1000,
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn join_order(mut self, mode: JoinOrderMode) -> Self {
        self.join_order = mode;
        self
    }

    pub fn rule_based(mut self, value: bool) -> Self {
        self.rule_based = value;
        self
    }

    pub fn no_timeout(mut self, value: bool) -> Self {
        self.no_timeout = value;
        self
    }

    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.time_budget_ms = Some(budget.as_millis() as u64);
        self
    }

    pub fn max_memory_per_table(mut self, bytes: u64) -> Self {
        self.max_memory_per_table = bytes;
        self
    }

    pub fn table_lock_threshold(mut self, rows: u64) -> Self {
        self.table_lock_threshold = rows;
        self
    }

    pub fn use_statistics(mut self, value: bool) -> Self {
        self.use_statistics = value;
        self
    }

    pub fn default_row_count(mut self, rows: u64) -> Self {
        self.default_row_count = rows;
        self
    }

    pub fn time_budget_duration(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_toml_keeps_defaults() {
        let config = OptimizerConfig::from_toml("join_order = \"fixed\"\ntable_lock_threshold = 10\n").unwrap();
        assert_eq!(config.join_order, JoinOrderMode::Fixed);
        assert_eq!(config.table_lock_threshold, 10);
        assert_eq!(config.timeout_min_tables, 6);
        assert_eq!(config.default_row_count, 1000);
        assert!(config.use_statistics);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            OptimizerConfig::from_toml("join_order = \"random\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rule_based = true\ntime_budget_ms = 50").unwrap();
        let config = OptimizerConfig::load(file.path()).unwrap();
        assert!(config.rule_based);
        assert_eq!(config.time_budget_duration(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_builder() {
        let config = OptimizerConfig::new().no_timeout(true).max_memory_per_table(64).use_statistics(false);
        assert!(config.no_timeout);
        assert_eq!(config.max_memory_per_table, 64);
        assert!(!config.use_statistics);
    }
}
