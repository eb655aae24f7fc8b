//! Conglomerates and the cost of scanning one of them.
//!
//! A base table can be read through its heap or through any of its
//! indexes. Derived tables, VALUES lists and outer-join operands are
//! materialized once and read as a whole.

use std::fmt;

use crate::catalog::{IndexDescriptor, TableDescriptor};
use crate::tree::{BinaryOp, Predicate, PredicateId, TableMap};

use super::cost::{constants, heuristic_selectivity, op_selectivity, selectivity, CostEstimate};
use super::join_strategy::JoinStrategyKind;
use super::stats::StatisticsAdapter;

#[derive(Debug, Clone, PartialEq)]
pub enum ConglomerateKind {
    Heap,
    Index { columns: Vec<String>, unique: bool },
    /// Rows produced once by a nested plan and read back.
    Materialized,
}

/// A physical structure rows can be read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Conglomerate {
    pub name: String,
    pub kind: ConglomerateKind,
}

impl Conglomerate {
    pub fn heap(table: &str) -> Self {
        Self {
            name: table.to_string(),
            kind: ConglomerateKind::Heap,
        }
    }

    pub fn index(index: &IndexDescriptor) -> Self {
        Self {
            name: index.name.clone(),
            kind: ConglomerateKind::Index {
                columns: index.columns.clone(),
                unique: index.unique,
            },
        }
    }

    pub fn materialized(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ConglomerateKind::Materialized,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self.kind, ConglomerateKind::Index { .. })
    }
}

impl fmt::Display for Conglomerate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConglomerateKind::Heap => write!(f, "heap"),
            ConglomerateKind::Index { columns, unique } => write!(
                f,
                "{}index {} ({})",
                if *unique { "unique " } else { "" },
                self.name,
                columns.join(", ")
            ),
            ConglomerateKind::Materialized => write!(f, "materialized {}", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Row,
    Table,
}

impl LockMode {
    /// Scans without start/stop keys, and scans touching many rows, lock
    /// the whole table.
    pub fn for_scan(has_keys: bool, rows_touched: f64, threshold: u64) -> Self {
        if !has_keys || rows_touched > threshold as f64 {
            LockMode::Table
        } else {
            LockMode::Row
        }
    }
}

/// Access path chosen for one optimizable.
#[derive(Debug, Clone, PartialEq)]
pub struct ChosenAccess {
    pub conglomerate: Conglomerate,
    pub strategy: JoinStrategyKind,
    pub lock_mode: LockMode,
    /// The index holds every column the query reads.
    pub covering: bool,
    /// Cost of this step of the join: every scan of the operand for the
    /// rows placed before it, and the rows produced after joining.
    pub cost: CostEstimate,
    /// Predicates used as index start/stop keys or hash keys.
    pub key_predicates: Vec<PredicateId>,
}

impl fmt::Display for ChosenAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "via {}, {}", self.conglomerate, self.strategy)?;
        if self.lock_mode == LockMode::Table {
            write!(f, ", table lock")?;
        }
        if self.covering && self.conglomerate.is_index() {
            write!(f, ", covering")?;
        }
        Ok(())
    }
}

/// Estimate for one scan of a conglomerate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScanEstimate {
    pub cost: f64,
    /// Rows produced after every applicable predicate.
    pub rows: f64,
    /// Rows the scan reads.
    pub rows_read: f64,
    pub key_predicates: Vec<PredicateId>,
    pub covering: bool,
}

impl ScanEstimate {
    pub fn has_keys(&self) -> bool {
        !self.key_predicates.is_empty()
    }
}

/// Predicates an index can use as start/stop keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct KeyMatch {
    pub predicates: Vec<PredicateId>,
    /// Leading key columns bound by equality.
    pub equality_columns: usize,
    /// Heuristic selectivity of the matched predicates.
    pub selectivity: f64,
}

/// Match key columns in order: an equality moves on to the next key
/// column, a range bound ends the match after its column.
pub(crate) fn match_index_keys(
    key_positions: &[usize],
    table_number: usize,
    level: usize,
    predicates: &[&Predicate],
    placed: &TableMap,
) -> KeyMatch {
    let mut matched = KeyMatch {
        selectivity: 1.0,
        ..KeyMatch::default()
    };
    for &key in key_positions {
        let comparisons: Vec<(PredicateId, BinaryOp)> = predicates
            .iter()
            .filter_map(|p| {
                let cmp = p.column_comparison(table_number, level)?;
                (cmp.column_position == key && cmp.op != BinaryOp::NotEq && cmp.other_tables.is_subset_of(placed))
                    .then_some((p.id, cmp.op))
            })
            .collect();
        if let Some((id, _)) = comparisons.iter().find(|(_, op)| *op == BinaryOp::Eq) {
            matched.predicates.push(*id);
            matched.equality_columns += 1;
            matched.selectivity *= selectivity::EQUALS;
            continue;
        }
        for (id, op) in &comparisons {
            matched.predicates.push(*id);
            matched.selectivity *= op_selectivity(*op);
        }
        break;
    }
    matched
}

/// Product of the heuristic selectivities of the predicates not in `skip`.
pub(crate) fn residual_selectivity(predicates: &[&Predicate], skip: &[PredicateId]) -> f64 {
    predicates
        .iter()
        .filter(|p| !skip.contains(&p.id))
        .map(|p| heuristic_selectivity(&p.expr))
        .product()
}

/// The parts of a base table that access-path costing reads.
#[derive(Debug, Clone)]
pub(crate) struct TableAccess<'a> {
    pub table_number: usize,
    pub level: usize,
    pub descriptor: &'a TableDescriptor,
    pub rows: f64,
    /// Positions of the columns the query reads.
    pub referenced: &'a [usize],
}

impl TableAccess<'_> {
    pub fn heap_scan(&self, predicates: &[&Predicate]) -> ScanEstimate {
        ScanEstimate {
            cost: constants::HEAP_SCAN_OPEN + self.rows * constants::HEAP_ROW,
            rows: self.rows * residual_selectivity(predicates, &[]),
            rows_read: self.rows,
            key_predicates: Vec::new(),
            covering: true,
        }
    }

    pub fn index_scan(
        &self,
        index: &IndexDescriptor,
        predicates: &[&Predicate],
        placed: &TableMap,
        stats: &StatisticsAdapter<'_>,
    ) -> ScanEstimate {
        let keys = self.descriptor.index_key_positions(index);
        let matched = match_index_keys(&keys, self.table_number, self.level, predicates, placed);

        let mut start_stop = matched.selectivity;
        let range_selectivity = matched.selectivity
            / selectivity::EQUALS.powi(matched.equality_columns as i32);
        if matched.equality_columns > 0 {
            if let Some(s) = stats.index_selectivity(self.descriptor, index, matched.equality_columns) {
                start_stop = s * range_selectivity;
            } else if index.unique && matched.equality_columns == keys.len() {
                start_stop = 1.0 / self.rows;
            }
        }

        let rows_read = self.rows * start_stop;
        let covering = self.referenced.iter().all(|c| keys.contains(c));
        let mut cost = constants::INDEX_POSITION + rows_read * constants::INDEX_ROW;
        if !covering {
            cost += rows_read * constants::BASE_ROW_FETCH;
        }
        ScanEstimate {
            cost,
            rows: rows_read * residual_selectivity(predicates, &matched.predicates),
            rows_read,
            key_predicates: matched.predicates,
            covering,
        }
    }

    /// Heap followed by every index in catalog order.
    pub fn scans(
        &self,
        predicates: &[&Predicate],
        placed: &TableMap,
        stats: &StatisticsAdapter<'_>,
    ) -> Vec<(Conglomerate, ScanEstimate)> {
        let mut scans = vec![(Conglomerate::heap(&self.descriptor.name), self.heap_scan(predicates))];
        for index in &self.descriptor.indexes {
            scans.push((Conglomerate::index(index), self.index_scan(index, predicates, placed, stats)));
        }
        scans
    }
}

/// One scan of a materialized operand.
pub(crate) fn materialized_scan(inner: &CostEstimate, predicates: &[&Predicate]) -> ScanEstimate {
    ScanEstimate {
        cost: inner.cost,
        rows: inner.row_count * residual_selectivity(predicates, &[]),
        rows_read: inner.row_count,
        key_predicates: Vec::new(),
        covering: false,
    }
}

/// Rank used when conglomerates are chosen by rule instead of cost.
pub(crate) fn rule_rank(conglomerate: &Conglomerate, scan: &ScanEstimate) -> u8 {
    match (conglomerate.is_index(), scan.has_keys(), scan.covering) {
        (true, true, true) => 0,
        (true, true, false) => 1,
        (true, false, true) => 2,
        (false, _, _) => 3,
        (true, false, false) => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, InMemoryCatalog, TableBuilder};
    use crate::optimizer::OptimizerConfig;
    use crate::tree::{ColumnReference, ColumnSource, DataType, Literal, Position, ValueNode};

    fn col(table_number: usize, column_position: usize) -> ValueNode {
        ValueNode::Column(ColumnReference {
            table: None,
            column: format!("C{}", column_position),
            position: Position::default(),
            source: Some(ColumnSource { table_number, column_position, level: 0 }),
            data_type: Some(DataType::integer()),
        })
    }

    fn pred(id: usize, op: BinaryOp, left: ValueNode, right: ValueNode) -> Predicate {
        Predicate::new(
            PredicateId(id),
            ValueNode::typed_binary(op, left, right, DataType::boolean()),
            0,
        )
    }

    fn int(value: i64) -> ValueNode {
        ValueNode::literal(Literal::Integer(value))
    }

    fn catalog() -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        catalog
            .add_table(
                TableBuilder::new("T")
                    .column("A", DataType::integer())
                    .column("B", DataType::integer())
                    .column("C", DataType::integer())
                    .index("T_AB", &["A", "B"], false)
                    .index("T_C", &["C"], true)
                    .row_count(1000)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
    }

    #[test]
    fn test_match_stops_after_range() {
        let p0 = pred(0, BinaryOp::Gt, col(0, 0), int(3));
        let p1 = pred(1, BinaryOp::Eq, col(0, 1), int(4));
        let preds = [&p0, &p1];
        let matched = match_index_keys(&[0, 1], 0, 0, &preds, &TableMap::new());
        assert_eq!(matched.predicates, vec![PredicateId(0)]);
        assert_eq!(matched.equality_columns, 0);

        let p2 = pred(2, BinaryOp::Eq, int(7), col(0, 0));
        let preds = [&p0, &p1, &p2];
        let matched = match_index_keys(&[0, 1], 0, 0, &preds, &TableMap::new());
        assert_eq!(matched.predicates, vec![PredicateId(2), PredicateId(1)]);
        assert_eq!(matched.equality_columns, 2);
    }

    #[test]
    fn test_join_key_needs_placed_table() {
        let p = pred(0, BinaryOp::Eq, col(0, 0), col(1, 0));
        let preds = [&p];
        assert!(match_index_keys(&[0], 0, 0, &preds, &TableMap::new()).predicates.is_empty());
        assert_eq!(match_index_keys(&[0], 0, 0, &preds, &TableMap::single(1)).predicates.len(), 1);
    }

    #[test]
    fn test_unique_equality_reads_one_row() {
        let catalog = catalog();
        let table = catalog.table("APP", "T").unwrap().unwrap();
        let config = OptimizerConfig::default();
        let stats = StatisticsAdapter::new(&catalog, &config);
        let referenced = [0, 2];
        let access = TableAccess { table_number: 0, level: 0, descriptor: &table, rows: 1000.0, referenced: &referenced };

        let p = pred(0, BinaryOp::Eq, col(0, 2), int(1));
        let scan = access.index_scan(table.index("T_C").unwrap(), &[&p], &TableMap::new(), &stats);
        assert_eq!(scan.rows_read, 1.0);
        assert!(!scan.covering);
        assert_eq!(scan.cost, 2.0 + 0.5 + 1.0);
        assert_eq!(access.heap_scan(&[&p]).cost, 1000.5);
    }

    #[test]
    fn test_leading_equality_never_raises_best_cost() {
        let catalog = catalog();
        let table = catalog.table("APP", "T").unwrap().unwrap();
        let config = OptimizerConfig::default();
        let stats = StatisticsAdapter::new(&catalog, &config);
        let referenced = [0, 1];
        let access = TableAccess { table_number: 0, level: 0, descriptor: &table, rows: 1000.0, referenced: &referenced };
        let best = |preds: &[&Predicate]| {
            access
                .scans(preds, &TableMap::new(), &stats)
                .iter()
                .map(|(_, s)| s.cost)
                .fold(f64::INFINITY, f64::min)
        };

        let range = pred(0, BinaryOp::Lt, col(0, 1), int(9));
        let before = best(&[&range]);
        let equality = pred(1, BinaryOp::Eq, col(0, 0), int(5));
        let after = best(&[&range, &equality]);
        assert!(after <= before);

        let covering = access.index_scan(table.index("T_AB").unwrap(), &[&range, &equality], &TableMap::new(), &stats);
        assert!(covering.covering);
        assert_eq!(covering.key_predicates, vec![PredicateId(1), PredicateId(0)]);
    }

    #[test]
    fn test_lock_mode_and_rule_rank() {
        assert_eq!(LockMode::for_scan(false, 1.0, 5000), LockMode::Table);
        assert_eq!(LockMode::for_scan(true, 6000.0, 5000), LockMode::Table);
        assert_eq!(LockMode::for_scan(true, 10.0, 5000), LockMode::Row);

        let heap = Conglomerate::heap("T");
        let scan = ScanEstimate { cost: 1.0, rows: 1.0, rows_read: 1.0, key_predicates: vec![PredicateId(0)], covering: false };
        assert_eq!(rule_rank(&heap, &scan), 3);
        let index = Conglomerate { name: "I".into(), kind: ConglomerateKind::Index { columns: vec!["A".into()], unique: false } };
        assert_eq!(rule_rank(&index, &scan), 1);
        assert_eq!(index.to_string(), "index I (A)");
    }
}
