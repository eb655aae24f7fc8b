//! Name resolution scopes.
//!
//! Each query block gets a scope holding the tables of its FROM list. A scope
//! borrows the scope of the enclosing block, so a column that is not found
//! locally resolves as a correlated reference to an outer level.

use super::error::{BindError, BindResult};
use crate::tree::{ColumnSource, DataType, Position};

#[derive(Debug, Clone)]
pub struct ScopeColumn {
    pub name: String,
    pub data_type: DataType,
}

/// A FROM list entry as seen by name resolution.
#[derive(Debug, Clone)]
pub struct ScopeTable {
    pub exposed_name: String,
    pub table_number: usize,
    pub columns: Vec<ScopeColumn>,
    /// Schema and name of the base table, for column-level privileges.
    pub privilege_target: Option<(String, String)>,
}

impl ScopeTable {
    pub fn new(exposed_name: impl Into<String>, table_number: usize, columns: Vec<ScopeColumn>) -> Self {
        Self {
            exposed_name: exposed_name.into(),
            table_number,
            columns,
            privilege_target: None,
        }
    }

    fn column(&self, name: &str) -> Option<(usize, &ScopeColumn)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.name.eq_ignore_ascii_case(name))
    }

    /// Every column becomes nullable; used for the inner side of an outer join.
    pub fn make_nullable(&mut self) {
        for column in &mut self.columns {
            column.data_type.nullable = true;
        }
    }
}

/// Outcome of a successful lookup.
#[derive(Debug, Clone)]
pub struct ResolvedColumn {
    pub source: ColumnSource,
    pub data_type: DataType,
    pub exposed_name: String,
    pub column_name: String,
    pub privilege_target: Option<(String, String)>,
}

#[derive(Debug)]
pub struct Scope<'a> {
    parent: Option<&'a Scope<'a>>,
    level: usize,
    tables: Vec<ScopeTable>,
}

impl<'a> Scope<'a> {
    pub fn new(parent: Option<&'a Scope<'a>>, level: usize) -> Self {
        Self {
            parent,
            level,
            tables: Vec::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn parent(&self) -> Option<&'a Scope<'a>> {
        self.parent
    }

    pub fn add(&mut self, table: ScopeTable) {
        self.tables.push(table);
    }

    pub fn extend(&mut self, tables: Vec<ScopeTable>) {
        self.tables.extend(tables);
    }

    pub fn into_tables(self) -> Vec<ScopeTable> {
        self.tables
    }

    pub fn tables(&self) -> &[ScopeTable] {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut [ScopeTable] {
        &mut self.tables
    }

    /// Local table with this exposed name.
    pub fn table(&self, exposed_name: &str) -> Option<&ScopeTable> {
        self.tables
            .iter()
            .find(|t| t.exposed_name.eq_ignore_ascii_case(exposed_name))
    }

    /// Resolve a possibly qualified column name, innermost scope first.
    pub fn lookup(&self, qualifier: Option<&str>, column: &str, position: Position) -> BindResult<Option<ResolvedColumn>> {
        let mut found: Option<ResolvedColumn> = None;
        for table in &self.tables {
            if let Some(q) = qualifier {
                if !table.exposed_name.eq_ignore_ascii_case(q) {
                    continue;
                }
            }
            let Some((column_position, scope_column)) = table.column(column) else {
                continue;
            };
            if found.is_some() {
                return Err(BindError::AmbiguousColumn {
                    name: column.to_string(),
                    position,
                });
            }
            found = Some(ResolvedColumn {
                source: ColumnSource {
                    table_number: table.table_number,
                    column_position,
                    level: self.level,
                },
                data_type: scope_column.data_type.clone(),
                exposed_name: table.exposed_name.clone(),
                column_name: scope_column.name.clone(),
                privilege_target: table.privilege_target.clone(),
            });
        }

        match (found, self.parent) {
            (Some(resolved), _) => Ok(Some(resolved)),
            (None, Some(parent)) => parent.lookup(qualifier, column, position),
            (None, None) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, number: usize, columns: &[&str]) -> ScopeTable {
        ScopeTable::new(
            name,
            number,
            columns
                .iter()
                .map(|c| ScopeColumn {
                    name: c.to_string(),
                    data_type: DataType::integer().with_nullable(false),
                })
                .collect(),
        )
    }

    #[test]
    fn test_lookup_local_and_qualified() {
        let mut scope = Scope::new(None, 0);
        scope.add(table("T1", 0, &["A", "B"]));
        scope.add(table("T2", 1, &["B", "C"]));

        let a = scope.lookup(None, "a", Position::default()).unwrap().unwrap();
        assert_eq!(a.source, ColumnSource { table_number: 0, column_position: 0, level: 0 });
        assert_eq!(a.exposed_name, "T1");

        let b = scope.lookup(Some("t2"), "B", Position::default()).unwrap().unwrap();
        assert_eq!(b.source.table_number, 1);

        assert!(matches!(
            scope.lookup(None, "B", Position::new(1, 8)),
            Err(BindError::AmbiguousColumn { .. })
        ));
        assert!(scope.lookup(None, "Z", Position::default()).unwrap().is_none());
    }

    #[test]
    fn test_lookup_falls_back_to_outer_level() {
        let mut outer = Scope::new(None, 0);
        outer.add(table("O", 0, &["X"]));
        let mut inner = Scope::new(Some(&outer), 1);
        inner.add(table("I", 1, &["Y"]));

        let x = inner.lookup(None, "X", Position::default()).unwrap().unwrap();
        assert_eq!(x.source.level, 0);
        let y = inner.lookup(None, "Y", Position::default()).unwrap().unwrap();
        assert_eq!(y.source.level, 1);
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let mut outer = Scope::new(None, 0);
        outer.add(table("T", 0, &["A"]));
        let mut inner = Scope::new(Some(&outer), 1);
        inner.add(table("T", 1, &["A"]));

        let a = inner.lookup(Some("T"), "A", Position::default()).unwrap().unwrap();
        assert_eq!(a.source.table_number, 1);
    }

    #[test]
    fn test_make_nullable() {
        let mut t = table("T", 0, &["A"]);
        t.make_nullable();
        assert!(t.columns[0].data_type.nullable);
    }
}
