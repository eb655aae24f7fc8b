//! Per-compilation settings the binder reads.

use serde::{Deserialize, Serialize};

use crate::catalog::DEFAULT_SCHEMA;
use crate::tree::{Collation, CollationKind, DataType, PredicateId};

/// Immutable settings of one compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerContext {
    /// Schema for unqualified table names.
    pub current_schema: String,
    /// Collation given to string literals and string parameters.
    pub default_collation: CollationKind,
    /// Record required privileges. Turned off while expanding a view body,
    /// whose privileges belong to the view owner.
    pub check_privileges: bool,
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self {
            current_schema: DEFAULT_SCHEMA.to_string(),
            default_collation: CollationKind::UcsBasic,
            check_privileges: true,
        }
    }
}

impl CompilerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.current_schema = schema.into().to_ascii_uppercase();
        self
    }

    pub fn with_default_collation(mut self, collation: CollationKind) -> Self {
        self.default_collation = collation;
        self
    }

    /// Copy of this context that records no privileges.
    pub fn without_privilege_checks(&self) -> Self {
        Self {
            check_privileges: false,
            ..self.clone()
        }
    }

    /// Collation of literals and parameters in this context.
    pub fn literal_collation(&self) -> Collation {
        Collation::implicit(self.default_collation)
    }

    /// Type an untyped string marker takes when nothing narrower is known.
    pub fn default_string_type(&self) -> DataType {
        DataType::varchar(crate::tree::VARCHAR_MAX_WIDTH).with_collation(self.literal_collation())
    }
}

/// Table-number and predicate-id counters for one compilation. Table
/// numbers are dense from zero and size every table map.
#[derive(Debug, Clone, Default)]
pub struct Numbering {
    tables: usize,
    predicates: usize,
}

impl Numbering {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_table(&mut self) -> usize {
        self.tables += 1;
        self.tables - 1
    }

    pub fn next_predicate(&mut self) -> PredicateId {
        self.predicates += 1;
        PredicateId(self.predicates - 1)
    }

    pub fn table_count(&self) -> usize {
        self.tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_privilege_checks_keeps_other_settings() {
        let context = CompilerContext::new()
            .with_schema("hr")
            .with_default_collation(CollationKind::TerritoryBased);
        let view_context = context.without_privilege_checks();

        assert!(context.check_privileges);
        assert!(!view_context.check_privileges);
        assert_eq!(view_context.current_schema, "HR");
        assert_eq!(view_context.default_string_type().collation, Some(context.literal_collation()));
    }

    #[test]
    fn test_numbering_is_dense() {
        let mut numbering = Numbering::new();
        assert_eq!(numbering.next_table(), 0);
        assert_eq!(numbering.next_table(), 1);
        assert_eq!(numbering.next_predicate(), PredicateId(0));
        assert_eq!(numbering.table_count(), 2);
    }
}
