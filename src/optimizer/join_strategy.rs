//! Join strategies: how an operand is combined with the rows placed before it.

use std::fmt;

use serde::Serialize;

use crate::tree::{BinaryOp, JoinRole, Predicate, PredicateId, TableMap};

use super::access_path::ScanEstimate;
use super::cost::{constants, selectivity, CostEstimate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JoinStrategyKind {
    /// Scan the operand once per outer row.
    NestedLoop,
    /// Build a hash table on the operand once and probe it per outer row.
    Hash,
}

impl fmt::Display for JoinStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinStrategyKind::NestedLoop => write!(f, "nested loop"),
            JoinStrategyKind::Hash => write!(f, "hash join"),
        }
    }
}

/// Equijoin predicates between a column of `table_number` and a column of
/// the tables already placed.
pub(crate) fn hash_keys(
    predicates: &[&Predicate],
    table_number: usize,
    level: usize,
    placed: &TableMap,
) -> Vec<(PredicateId, usize)> {
    predicates
        .iter()
        .filter_map(|p| {
            let cmp = p.column_comparison(table_number, level)?;
            (cmp.op == BinaryOp::Eq
                && cmp.other_is_column
                && !cmp.other_tables.is_empty()
                && cmp.other_tables.is_subset_of(placed))
            .then_some((p.id, cmp.column_position))
        })
        .collect()
}

pub(crate) fn fits_in_memory(rows: f64, row_width: u64, max_memory: u64) -> bool {
    rows * row_width as f64 <= max_memory as f64
}

/// Every scan of the operand runs once per outer row.
pub(crate) fn nested_loop(outer_rows: f64, scan: &ScanEstimate) -> CostEstimate {
    CostEstimate::new(outer_rows * scan.cost, outer_rows * scan.rows, scan.rows)
}

/// The operand is read once into a hash table and probed per outer row.
/// `join_selectivity` is the fraction of build rows an outer row matches.
pub(crate) fn hash_join(outer_rows: f64, build: &ScanEstimate, join_selectivity: f64) -> CostEstimate {
    let cost = build.cost + build.rows * constants::HASH_BUILD_ROW + outer_rows * constants::HASH_PROBE_ROW;
    let per_outer = build.rows * join_selectivity;
    CostEstimate::new(cost, outer_rows * per_outer, per_outer)
}

/// Selectivity of one hash key: a unique key column matches one row.
pub(crate) fn key_selectivity(unique: bool, rows: f64) -> f64 {
    if unique {
        1.0 / rows.max(1.0)
    } else {
        selectivity::EQUALS
    }
}

/// Rows after an exists or not-exists join: at most one output row per
/// outer row, whatever the number of matches.
pub(crate) fn semi_join_rows(role: JoinRole, outer_rows: f64, joined_rows: f64) -> f64 {
    let matches = if outer_rows > 0.0 { (joined_rows / outer_rows).min(1.0) } else { 0.0 };
    match role {
        JoinRole::Plain => joined_rows,
        JoinRole::Exists => outer_rows * matches,
        JoinRole::NotExists => outer_rows * (1.0 - matches).max(0.1),
    }
}

/// Apply [`semi_join_rows`] to a step estimate.
pub(crate) fn adjust_for_role(role: JoinRole, outer_rows: f64, step: CostEstimate) -> CostEstimate {
    if role == JoinRole::Plain {
        return step;
    }
    let rows = semi_join_rows(role, outer_rows, step.row_count);
    CostEstimate::new(step.cost, rows, if outer_rows > 0.0 { rows / outer_rows } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ColumnReference, ColumnSource, DataType, Literal, Position, ValueNode};

    fn col(table_number: usize, column_position: usize) -> ValueNode {
        ValueNode::Column(ColumnReference {
            table: None,
            column: "C".into(),
            position: Position::default(),
            source: Some(ColumnSource { table_number, column_position, level: 0 }),
            data_type: Some(DataType::integer()),
        })
    }

    fn scan(cost: f64, rows: f64) -> ScanEstimate {
        ScanEstimate { cost, rows, rows_read: rows, key_predicates: Vec::new(), covering: false }
    }

    #[test]
    fn test_hash_keys_need_placed_column() {
        let join = Predicate::new(PredicateId(0), ValueNode::binary(BinaryOp::Eq, col(0, 1), col(1, 0)), 0);
        let constant = Predicate::new(
            PredicateId(1),
            ValueNode::binary(BinaryOp::Eq, col(1, 0), ValueNode::literal(Literal::Integer(3))),
            0,
        );
        let preds = [&join, &constant];
        assert!(hash_keys(&preds, 1, 0, &TableMap::new()).is_empty());
        assert_eq!(hash_keys(&preds, 1, 0, &TableMap::single(0)), vec![(PredicateId(0), 0)]);
    }

    #[test]
    fn test_strategy_costs() {
        let nl = nested_loop(10.0, &scan(3.5, 1.0));
        assert_eq!(nl, CostEstimate::new(35.0, 10.0, 1.0));

        let hash = hash_join(10.0, &scan(2.5, 2.0), key_selectivity(true, 2.0));
        assert!((hash.cost - 6.5).abs() < 1e-9);
        assert_eq!(hash.row_count, 10.0);
        assert!(fits_in_memory(2.0, 16, 1024));
        assert!(!fits_in_memory(1000.0, 2048, 1024 * 1024));
    }

    #[test]
    fn test_semi_join_rows() {
        assert_eq!(semi_join_rows(JoinRole::Exists, 10.0, 40.0), 10.0);
        assert_eq!(semi_join_rows(JoinRole::Exists, 10.0, 5.0), 5.0);
        assert_eq!(semi_join_rows(JoinRole::NotExists, 10.0, 40.0), 1.0);
        assert_eq!(semi_join_rows(JoinRole::NotExists, 10.0, 5.0), 5.0);
        assert_eq!(semi_join_rows(JoinRole::Plain, 10.0, 40.0), 40.0);
    }
}
