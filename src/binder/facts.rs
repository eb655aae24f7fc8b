//! Side facts produced by compilation: required privileges, schema-object
//! dependencies and advisory warnings.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrivilegeKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for PrivilegeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrivilegeKind::Select => "SELECT",
            PrivilegeKind::Insert => "INSERT",
            PrivilegeKind::Update => "UPDATE",
            PrivilegeKind::Delete => "DELETE",
        };
        write!(f, "{}", name)
    }
}

/// A privilege the executing user must hold. Enforcement is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredPrivilege {
    pub kind: PrivilegeKind,
    pub schema: String,
    pub object: String,
    /// Columns the privilege covers; empty for a whole-object privilege.
    pub columns: Vec<String>,
}

impl fmt::Display for RequiredPrivilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ON {}.{}", self.kind, self.schema, self.object)?;
        if !self.columns.is_empty() {
            write!(f, " ({})", self.columns.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Table,
    View,
    Index,
}

/// A schema object the compiled plan depends on; DDL on it invalidates the plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub schema: String,
    pub name: String,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DependencyKind::Table => "table",
            DependencyKind::View => "view",
            DependencyKind::Index => "index",
        };
        write!(f, "{} {}.{}", kind, self.schema, self.name)
    }
}

/// Non-fatal conditions reported next to a successful compilation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CompileWarning {
    /// Join-order search stopped early and kept the best plan found.
    OptimizerTimeout { elapsed_ms: u64, permutations: usize },
    /// Statistics were missing for a table; heuristics were used.
    StatisticsUnavailable { table: String },
    /// An ORDER BY column added to the select list duplicated another and was removed.
    RedundantOrderByColumn { column: String },
    /// A value of this type is used as a grouping or DISTINCT key.
    TypeNotSerializable { expression: String, type_name: String },
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileWarning::OptimizerTimeout { elapsed_ms, permutations } => write!(
                f,
                "optimizer timed out after {} ms and {} join orders; using the best plan found",
                elapsed_ms, permutations
            ),
            CompileWarning::StatisticsUnavailable { table } => {
                write!(f, "no statistics for {}; using heuristic estimates", table)
            }
            CompileWarning::RedundantOrderByColumn { column } => {
                write!(f, "ORDER BY column {} repeats a select list column", column)
            }
            CompileWarning::TypeNotSerializable { expression, type_name } => {
                write!(f, "{} of type {} is used as a sort or grouping key", expression, type_name)
            }
        }
    }
}

/// Accumulates facts during one compilation.
#[derive(Debug, Default)]
pub struct CompileFacts {
    privileges: BTreeMap<(PrivilegeKind, String, String), BTreeSet<String>>,
    dependencies: BTreeSet<Dependency>,
    warnings: Vec<CompileWarning>,
}

impl CompileFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a privilege on an object, optionally on one column of it.
    pub fn require(&mut self, kind: PrivilegeKind, schema: &str, object: &str, column: Option<&str>) {
        let columns = self
            .privileges
            .entry((kind, schema.to_string(), object.to_string()))
            .or_default();
        if let Some(column) = column {
            columns.insert(column.to_string());
        }
    }

    pub fn depend(&mut self, kind: DependencyKind, schema: &str, name: &str) {
        self.dependencies.insert(Dependency {
            kind,
            schema: schema.to_string(),
            name: name.to_string(),
        });
    }

    pub fn warn(&mut self, warning: CompileWarning) {
        log::warn!("{}", warning);
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    pub fn privileges(&self) -> Vec<RequiredPrivilege> {
        self.privileges
            .iter()
            .map(|((kind, schema, object), columns)| RequiredPrivilege {
                kind: *kind,
                schema: schema.clone(),
                object: object.clone(),
                columns: columns.iter().cloned().collect(),
            })
            .collect()
    }

    pub fn dependencies(&self) -> Vec<Dependency> {
        self.dependencies.iter().cloned().collect()
    }

    pub fn warnings(&self) -> &[CompileWarning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<CompileWarning> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileges_merge_columns() {
        let mut facts = CompileFacts::new();
        facts.require(PrivilegeKind::Select, "APP", "T", Some("B"));
        facts.require(PrivilegeKind::Select, "APP", "T", Some("A"));
        facts.require(PrivilegeKind::Select, "APP", "T", Some("A"));
        facts.require(PrivilegeKind::Delete, "APP", "T", None);

        let privileges = facts.privileges();
        assert_eq!(privileges.len(), 2);
        assert_eq!(privileges[0].columns, vec!["A", "B"]);
        assert_eq!(privileges[0].to_string(), "SELECT ON APP.T (A, B)");
        assert_eq!(privileges[1].to_string(), "DELETE ON APP.T");
    }

    #[test]
    fn test_dependencies_are_unique_and_ordered() {
        let mut facts = CompileFacts::new();
        facts.depend(DependencyKind::Index, "APP", "T_IDX");
        facts.depend(DependencyKind::Table, "APP", "T");
        facts.depend(DependencyKind::Table, "APP", "T");
        let deps: Vec<String> = facts.dependencies().iter().map(|d| d.to_string()).collect();
        assert_eq!(deps, vec!["table APP.T", "index APP.T_IDX"]);
    }

    #[test]
    fn test_repeated_warning_kept_once() {
        let mut facts = CompileFacts::new();
        let warning = CompileWarning::StatisticsUnavailable { table: "APP.T".into() };
        facts.warn(warning.clone());
        facts.warn(warning);
        assert_eq!(facts.warnings().len(), 1);
    }
}
