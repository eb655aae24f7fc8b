//! Required orderings and ORDER BY cleanup.

use crate::binder::{CompileFacts, CompileWarning};
use crate::tree::{OrderByList, SelectNode};

/// An ordering the join order can deliver without a sort: ascending on
/// columns of one table, in key order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequiredOrder {
    pub table_number: usize,
    pub columns: Vec<usize>,
}

impl RequiredOrder {
    /// Ordering `order_by` asks of `select`, if an index could provide it.
    pub fn for_select(order_by: &OrderByList, select: &SelectNode) -> Option<Self> {
        if order_by.is_empty() || select.is_grouped() {
            return None;
        }
        let mut table_number = None;
        let mut columns = Vec::new();
        for key in order_by.iter() {
            if !key.ascending {
                return None;
            }
            let source = select
                .result_columns
                .get(key.result_column?)?
                .expression
                .as_column()?
                .source?;
            if source.level != select.level || *table_number.get_or_insert(source.table_number) != source.table_number {
                return None;
            }
            if !columns.contains(&source.column_position) {
                columns.push(source.column_position);
            }
        }
        Some(Self {
            table_number: table_number?,
            columns,
        })
    }

    /// Whether an index with these key columns returns rows in this order.
    /// Key columns bound by an equality hold one value and can be skipped.
    pub fn satisfied_by(&self, key_positions: &[usize], equality_bound: &[usize]) -> bool {
        let mut required = self.columns.iter().filter(|c| !equality_bound.contains(c)).peekable();
        for key in key_positions {
            match required.peek() {
                None => break,
                Some(&&next) if next == *key => {
                    required.next();
                }
                Some(_) if equality_bound.contains(key) => {}
                Some(_) => return false,
            }
        }
        required.peek().is_none()
    }
}

/// Drop generated ORDER BY columns that repeat a select list column and
/// sort keys that repeat an earlier key.
pub(crate) fn remove_redundant_order_columns(select: &mut SelectNode, order_by: &mut OrderByList, facts: &mut CompileFacts) {
    let mut index = select.result_columns.len();
    while index > 0 {
        index -= 1;
        let Some(column) = select.result_columns.get(index) else { continue };
        if !column.generated {
            continue;
        }
        let duplicate = select
            .result_columns
            .iter()
            .position(|c| !c.generated && c.expression.is_equivalent(&column.expression));
        if let Some(visible) = duplicate {
            let removed = select.result_columns.remove(index);
            log::debug!("ORDER BY column {} duplicates result column {}", removed.name, visible + 1);
            order_by.redirect(index, visible);
            order_by.column_removed(index);
            facts.warn(CompileWarning::RedundantOrderByColumn { column: removed.name });
        }
    }
    let repeated = order_by.remove_repeated_keys();
    if repeated > 0 {
        log::debug!("dropped {} repeated sort keys", repeated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{
        ColumnReference, ColumnSource, DataType, OrderByColumn, OrderByTarget, Position, ResultColumn, ValueNode,
    };

    fn col(table_number: usize, column_position: usize) -> ValueNode {
        ValueNode::Column(ColumnReference {
            table: Some("T".into()),
            column: format!("C{}", column_position),
            position: Position::default(),
            source: Some(ColumnSource { table_number, column_position, level: 0 }),
            data_type: Some(DataType::integer()),
        })
    }

    fn key(result_column: usize, ascending: bool) -> OrderByColumn {
        OrderByColumn {
            result_column: Some(result_column),
            ..OrderByColumn::new(OrderByTarget::Position(result_column + 1), ascending)
        }
    }

    fn select(columns: Vec<ResultColumn>) -> SelectNode {
        let mut select = SelectNode::new(Vec::new(), Vec::new());
        select.result_columns = columns.into_iter().collect();
        select
    }

    #[test]
    fn test_required_order_from_single_table() {
        let select = select(vec![ResultColumn::new("C1", col(0, 1)), ResultColumn::new("C0", col(0, 0))]);
        let order = RequiredOrder::for_select(&OrderByList::new(vec![key(1, true), key(0, true)]), &select).unwrap();
        assert_eq!(order, RequiredOrder { table_number: 0, columns: vec![0, 1] });
        assert!(RequiredOrder::for_select(&OrderByList::new(vec![key(0, false)]), &select).is_none());

        let mixed = self::select(vec![ResultColumn::new("A", col(0, 0)), ResultColumn::new("B", col(1, 0))]);
        assert!(RequiredOrder::for_select(&OrderByList::new(vec![key(0, true), key(1, true)]), &mixed).is_none());
    }

    #[test]
    fn test_index_satisfies_order() {
        let order = RequiredOrder { table_number: 0, columns: vec![1] };
        assert!(order.satisfied_by(&[1, 2], &[]));
        assert!(!order.satisfied_by(&[0, 1], &[]));
        assert!(order.satisfied_by(&[0, 1], &[0]));
        assert!(order.satisfied_by(&[0], &[1]));
    }

    #[test]
    fn test_redundant_generated_column_removed() {
        let mut columns = vec![ResultColumn::new("A", col(0, 0))];
        columns.push(ResultColumn::generated("T.C1", col(0, 1)));
        columns.push(ResultColumn::generated("T.C0", col(0, 0)));
        let mut select = select(columns);
        let mut order_by = OrderByList::new(vec![key(2, true), key(1, true), key(0, true)]);
        let mut facts = CompileFacts::new();

        remove_redundant_order_columns(&mut select, &mut order_by, &mut facts);
        assert_eq!(select.result_columns.len(), 2);
        assert_eq!(order_by.result_columns(), vec![0, 1]);
        assert!(!order_by.columns[0].added);
        assert_eq!(facts.warnings().len(), 1);
    }
}
