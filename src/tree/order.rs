//! ORDER BY lists.

use super::value::ValueNode;

/// What an ORDER BY item names before binding.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderByTarget {
    /// One-based position in the select list.
    Position(usize),
    Expression(ValueNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByColumn {
    pub target: OrderByTarget,
    pub ascending: bool,
    /// Zero-based index of the result column sorted on, set by the binder.
    pub result_column: Option<usize>,
    /// The sort key was pulled into the select list as a generated column.
    pub added: bool,
}

impl OrderByColumn {
    pub fn new(target: OrderByTarget, ascending: bool) -> Self {
        Self {
            target,
            ascending,
            result_column: None,
            added: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderByList {
    pub columns: Vec<OrderByColumn>,
}

impl OrderByList {
    pub fn new(columns: Vec<OrderByColumn>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OrderByColumn> {
        self.columns.iter()
    }

    /// Resolved result column indexes in sort-key order.
    pub fn result_columns(&self) -> Vec<usize> {
        self.columns.iter().filter_map(|c| c.result_column).collect()
    }

    /// The result column at `index` was removed from the select list: every
    /// sort key pointing past it moves down by one.
    pub fn column_removed(&mut self, index: usize) {
        for column in &mut self.columns {
            if let Some(rc) = column.result_column.as_mut() {
                if *rc > index {
                    *rc -= 1;
                }
            }
        }
    }

    /// Point every sort key that uses result column `from` at `to` instead.
    pub fn redirect(&mut self, from: usize, to: usize) {
        for column in &mut self.columns {
            if column.result_column == Some(from) {
                column.result_column = Some(to);
                column.added = false;
            }
        }
    }

    /// Drop sort keys that repeat an earlier key, returning how many were dropped.
    pub fn remove_repeated_keys(&mut self) -> usize {
        let before = self.columns.len();
        let mut seen = Vec::new();
        self.columns.retain(|c| match c.result_column {
            Some(rc) if seen.contains(&rc) => false,
            Some(rc) => {
                seen.push(rc);
                true
            }
            None => true,
        });
        before - self.columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(result_column: usize) -> OrderByColumn {
        OrderByColumn {
            result_column: Some(result_column),
            ..OrderByColumn::new(OrderByTarget::Position(result_column + 1), true)
        }
    }

    #[test]
    fn test_column_removed_shifts_later_keys() {
        let mut list = OrderByList::new(vec![key(0), key(2), key(3)]);
        list.column_removed(1);
        assert_eq!(list.result_columns(), vec![0, 1, 2]);
    }

    #[test]
    fn test_redirect_and_repeated_keys() {
        let mut list = OrderByList::new(vec![key(0), key(2)]);
        list.redirect(2, 0);
        assert_eq!(list.result_columns(), vec![0, 0]);
        assert_eq!(list.remove_repeated_keys(), 1);
        assert_eq!(list.result_columns(), vec![0]);
    }
}
