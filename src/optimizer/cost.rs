//! Cost estimates and the constants of the cost model.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use crate::tree::{BinaryNode, BinaryOp, TernaryOp, UnaryOp, ValueNode};

/// Cost model constants.
pub(crate) mod constants {
    /// Opening a heap scan.
    pub const HEAP_SCAN_OPEN: f64 = 0.5;
    /// Reading one heap row.
    pub const HEAP_ROW: f64 = 1.0;
    /// Positioning an index scan.
    pub const INDEX_POSITION: f64 = 2.0;
    /// Reading one index row.
    pub const INDEX_ROW: f64 = 0.5;
    /// Fetching the base row behind a non-covering index row.
    pub const BASE_ROW_FETCH: f64 = 1.0;
    /// Per-comparison factor of a sort.
    pub const SORT_FACTOR: f64 = 0.2;
    /// Inserting one row into a hash table.
    pub const HASH_BUILD_ROW: f64 = 1.5;
    /// Probing the hash table with one outer row.
    pub const HASH_PROBE_ROW: f64 = 0.1;
    /// Producing one row of a materialized operand or VALUES list.
    pub const MATERIALIZED_ROW: f64 = 1.0;
}

/// Heuristic selectivities used when no statistics apply.
pub(crate) mod selectivity {
    pub const EQUALS: f64 = 0.1;
    pub const NOT_EQUALS: f64 = 0.9;
    pub const RANGE: f64 = 0.33;
    pub const IS_NULL: f64 = 0.1;
    pub const IS_NOT_NULL: f64 = 0.9;
    pub const LIKE: f64 = 0.9;
    pub const OTHER: f64 = 0.5;
}

/// Estimated cost of producing a result.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CostEstimate {
    pub cost: f64,
    /// Rows produced in total.
    pub row_count: f64,
    /// Rows produced by one scan, for an operand scanned once per outer row.
    pub single_scan_row_count: f64,
}

impl CostEstimate {
    pub fn new(cost: f64, row_count: f64, single_scan_row_count: f64) -> Self {
        Self {
            cost,
            row_count,
            single_scan_row_count,
        }
    }

    /// Cost of a result with one row and no work; the starting point of a join.
    pub fn unit() -> Self {
        Self::new(0.0, 1.0, 1.0)
    }

    /// Compose with an operand joined after this result: costs add up and
    /// the row counts are the joined operand's.
    pub fn add(&self, next: &CostEstimate) -> CostEstimate {
        CostEstimate {
            cost: self.cost + next.cost,
            row_count: next.row_count,
            single_scan_row_count: next.single_scan_row_count,
        }
    }

    /// Order by cost, then row count, then single-scan row count.
    pub fn compare(&self, other: &CostEstimate) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then(self.row_count.total_cmp(&other.row_count))
            .then(self.single_scan_row_count.total_cmp(&other.single_scan_row_count))
    }

    pub fn is_cheaper_than(&self, other: &CostEstimate) -> bool {
        self.compare(other) == Ordering::Less
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cost={:.2} rows={:.0}", self.cost, self.row_count)
    }
}

/// Cost of sorting `rows` rows.
pub fn sort_cost(rows: f64) -> f64 {
    if rows < 2.0 {
        0.0
    } else {
        rows * rows.log2() * constants::SORT_FACTOR
    }
}

/// Heuristic selectivity of one conjunct.
pub fn heuristic_selectivity(expr: &ValueNode) -> f64 {
    match expr {
        ValueNode::Binary(BinaryNode { op: BinaryOp::Or, .. }) => {
            let mut miss = 1.0;
            let mut node = expr;
            while let ValueNode::Binary(BinaryNode { op: BinaryOp::Or, left, right, .. }) = node {
                miss *= 1.0 - heuristic_selectivity(left);
                node = right.as_ref();
            }
            if !node.is_false() {
                miss *= 1.0 - heuristic_selectivity(node);
            }
            1.0 - miss
        }
        ValueNode::Binary(BinaryNode { op: BinaryOp::And, left, right, .. }) => {
            heuristic_selectivity(left) * heuristic_selectivity(right)
        }
        ValueNode::Binary(b) => op_selectivity(b.op),
        ValueNode::Unary(u) => match u.op {
            UnaryOp::IsNull => selectivity::IS_NULL,
            UnaryOp::IsNotNull => selectivity::IS_NOT_NULL,
            _ => selectivity::OTHER,
        },
        ValueNode::Ternary(t) if t.op == TernaryOp::Like => selectivity::LIKE,
        ValueNode::Constant(_) if expr.is_true() => 1.0,
        ValueNode::Constant(_) if expr.is_false() => 0.0,
        _ => selectivity::OTHER,
    }
}

/// Heuristic selectivity of a comparison operator.
pub fn op_selectivity(op: BinaryOp) -> f64 {
    match op {
        BinaryOp::Eq => selectivity::EQUALS,
        BinaryOp::NotEq => selectivity::NOT_EQUALS,
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => selectivity::RANGE,
        _ => selectivity::OTHER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ColumnReference, ColumnSource, DataType, Literal, Position};

    fn column() -> ValueNode {
        ValueNode::Column(ColumnReference {
            table: Some("T".into()),
            column: "A".into(),
            position: Position::default(),
            source: Some(ColumnSource { table_number: 0, column_position: 0, level: 0 }),
            data_type: Some(DataType::integer()),
        })
    }

    fn compare(op: BinaryOp) -> ValueNode {
        ValueNode::typed_binary(op, column(), ValueNode::literal(Literal::Integer(1)), DataType::boolean())
    }

    #[test]
    fn test_compare_breaks_ties_on_rows() {
        let a = CostEstimate::new(10.0, 5.0, 5.0);
        let b = CostEstimate::new(10.0, 6.0, 1.0);
        assert!(a.is_cheaper_than(&b));
        assert!(!a.is_cheaper_than(&a));
        assert_eq!(a.add(&b), CostEstimate::new(20.0, 6.0, 1.0));
    }

    #[test]
    fn test_sort_cost() {
        assert_eq!(sort_cost(1.0), 0.0);
        assert!((sort_cost(8.0) - 4.8).abs() < 1e-9);
    }

    #[test]
    fn test_heuristic_selectivities() {
        assert_eq!(heuristic_selectivity(&compare(BinaryOp::Eq)), 0.1);
        assert_eq!(heuristic_selectivity(&compare(BinaryOp::GtEq)), 0.33);
        let or = ValueNode::typed_binary(
            BinaryOp::Or,
            compare(BinaryOp::Eq),
            ValueNode::typed_binary(BinaryOp::Or, compare(BinaryOp::Eq), ValueNode::boolean(false), DataType::boolean()),
            DataType::boolean(),
        );
        assert!((heuristic_selectivity(&or) - 0.19).abs() < 1e-9);
        let is_null = ValueNode::unary(UnaryOp::IsNull, column());
        assert_eq!(heuristic_selectivity(&is_null), 0.1);
    }
}
