//! Restrictions and their classification.
//!
//! A predicate is one conjunct of a normalized WHERE, ON or HAVING clause.
//! Predicates move between nodes while the optimizer places them; each one
//! ends attached to exactly one node.

use std::fmt;

use super::table_map::TableMap;
use super::value::{BinaryNode, BinaryOp, ValueNode};

/// Identity of a predicate within one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredicateId(pub usize);

impl fmt::Display for PredicateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// How the chosen access path uses a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredicateRole {
    /// Evaluated against each row after it is read.
    #[default]
    Residual,
    /// Positions an index scan (start and/or stop key).
    IndexKey,
    /// Equijoin column of a hash join.
    HashKey,
}

/// A comparison of a column of one table against an expression that does
/// not reference that table, oriented so the column is on the left.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnComparison {
    pub column_position: usize,
    pub op: BinaryOp,
    /// Tables of the same query block referenced by the other operand.
    pub other_tables: TableMap,
    /// The other operand is a plain column.
    pub other_is_column: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub id: PredicateId,
    pub expr: ValueNode,
    pub referenced_tables: TableMap,
    pub role: PredicateRole,
}

impl Predicate {
    /// Wrap a conjunct owned by query block `level`.
    pub fn new(id: PredicateId, expr: ValueNode, level: usize) -> Self {
        let referenced_tables = expr.referenced_tables(level);
        Self {
            id,
            expr,
            referenced_tables,
            role: PredicateRole::Residual,
        }
    }

    /// References more than one table.
    pub fn is_join(&self) -> bool {
        self.referenced_tables.count() > 1
    }

    /// References no table of its query block.
    pub fn is_constant(&self) -> bool {
        self.referenced_tables.is_empty()
    }

    /// Describe this predicate as a column comparison for `table_number`.
    pub fn column_comparison(&self, table_number: usize, level: usize) -> Option<ColumnComparison> {
        let ValueNode::Binary(BinaryNode { op, left, right, .. }) = &self.expr else {
            return None;
        };
        if !op.is_comparison() {
            return None;
        }
        let own_column = |node: &ValueNode| {
            node.as_column()
                .and_then(|c| c.source)
                .filter(|s| s.table_number == table_number && s.level == level)
                .map(|s| s.column_position)
        };

        let oriented = if let Some(position) = own_column(left.as_ref()) {
            Some((position, *op, right.as_ref()))
        } else {
            own_column(right.as_ref()).map(|position| (position, op.flip(), left.as_ref()))
        };
        let (column_position, op, other) = oriented?;

        let other_tables = other.referenced_tables(level);
        if other_tables.contains(table_number) || other.contains_subquery() {
            return None;
        }
        Some(ColumnComparison {
            column_position,
            op,
            other_tables,
            other_is_column: other.as_column().is_some(),
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.expr)?;
        match self.role {
            PredicateRole::Residual => Ok(()),
            PredicateRole::IndexKey => write!(f, " [index key]"),
            PredicateRole::HashKey => write!(f, " [hash key]"),
        }
    }
}

/// Predicates attached to one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateList {
    predicates: Vec<Predicate>,
}

impl PredicateList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn extend(&mut self, other: PredicateList) {
        self.predicates.extend(other.predicates);
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Predicate> {
        self.predicates.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Predicate> {
        self.predicates.iter_mut()
    }

    pub fn ids(&self) -> Vec<PredicateId> {
        self.predicates.iter().map(|p| p.id).collect()
    }

    /// Move out every predicate matching `f`, keeping the rest in order.
    pub fn take_where(&mut self, mut f: impl FnMut(&Predicate) -> bool) -> PredicateList {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.predicates)
            .into_iter()
            .partition(|p| f(p));
        self.predicates = kept;
        PredicateList { predicates: taken }
    }

    /// Move out every predicate.
    pub fn take_all(&mut self) -> PredicateList {
        PredicateList {
            predicates: std::mem::take(&mut self.predicates),
        }
    }
}

impl IntoIterator for PredicateList {
    type Item = Predicate;
    type IntoIter = std::vec::IntoIter<Predicate>;

    fn into_iter(self) -> Self::IntoIter {
        self.predicates.into_iter()
    }
}

impl<'a> IntoIterator for &'a PredicateList {
    type Item = &'a Predicate;
    type IntoIter = std::slice::Iter<'a, Predicate>;

    fn into_iter(self) -> Self::IntoIter {
        self.predicates.iter()
    }
}

impl FromIterator<Predicate> for PredicateList {
    fn from_iter<I: IntoIterator<Item = Predicate>>(iter: I) -> Self {
        Self {
            predicates: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ColumnReference, ColumnSource, DataType, Literal, Position};

    fn col(table_number: usize, column_position: usize) -> ValueNode {
        ValueNode::Column(ColumnReference {
            table: None,
            column: "C".into(),
            position: Position::default(),
            source: Some(ColumnSource { table_number, column_position, level: 0 }),
            data_type: Some(DataType::integer()),
        })
    }

    #[test]
    fn test_column_comparison_orients_column_left() {
        let p = Predicate::new(
            PredicateId(0),
            ValueNode::binary(BinaryOp::Lt, ValueNode::literal(Literal::Integer(5)), col(1, 2)),
            0,
        );
        let cmp = p.column_comparison(1, 0).unwrap();
        assert_eq!(cmp.column_position, 2);
        assert_eq!(cmp.op, BinaryOp::Gt);
        assert!(cmp.other_tables.is_empty());
        assert!(!p.is_join());
    }

    #[test]
    fn test_join_predicate() {
        let p = Predicate::new(PredicateId(1), ValueNode::binary(BinaryOp::Eq, col(0, 0), col(1, 0)), 0);
        assert!(p.is_join());
        let cmp = p.column_comparison(1, 0).unwrap();
        assert_eq!(cmp.other_tables, TableMap::single(0));
        assert!(cmp.other_is_column);
        assert!(p.column_comparison(2, 0).is_none());
    }

    #[test]
    fn test_take_where_moves_predicates() {
        let mut list: PredicateList = (0..4)
            .map(|i| Predicate::new(PredicateId(i), col(i, 0), 0))
            .collect();
        let even = list.take_where(|p| p.id.0 % 2 == 0);
        assert_eq!(even.ids(), vec![PredicateId(0), PredicateId(2)]);
        assert_eq!(list.ids(), vec![PredicateId(1), PredicateId(3)]);
    }
}
