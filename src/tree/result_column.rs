//! Result columns of a result set.

use super::types::DataType;
use super::value::ValueNode;

/// One output column: name, defining expression and bookkeeping flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultColumn {
    pub name: String,
    pub expression: ValueNode,
    /// Added by the compiler (ORDER BY or GROUP BY support), not visible to
    /// the statement's caller.
    pub generated: bool,
    /// Some expression above this result set reads the column.
    pub referenced: bool,
}

impl ResultColumn {
    pub fn new(name: impl Into<String>, expression: ValueNode) -> Self {
        Self {
            name: name.into(),
            expression,
            generated: false,
            referenced: false,
        }
    }

    /// Column added by the compiler.
    pub fn generated(name: impl Into<String>, expression: ValueNode) -> Self {
        Self {
            generated: true,
            ..Self::new(name, expression)
        }
    }

    pub fn data_type(&self) -> Option<&DataType> {
        self.expression.data_type()
    }
}

/// Ordered result column list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultColumnList {
    columns: Vec<ResultColumn>,
}

impl ResultColumnList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Number of columns the caller sees.
    pub fn visible_len(&self) -> usize {
        self.columns.iter().filter(|c| !c.generated).count()
    }

    pub fn push(&mut self, column: ResultColumn) -> usize {
        self.columns.push(column);
        self.columns.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&ResultColumn> {
        self.columns.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ResultColumn> {
        self.columns.get_mut(index)
    }

    pub fn remove(&mut self, index: usize) -> ResultColumn {
        self.columns.remove(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultColumn> {
        self.columns.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ResultColumn> {
        self.columns.iter_mut()
    }

    /// Position of the first non-generated column with this name.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| !c.generated && c.name.eq_ignore_ascii_case(name))
    }

    /// Number of non-generated columns with this name.
    pub fn count_named(&self, name: &str) -> usize {
        self.columns
            .iter()
            .filter(|c| !c.generated && c.name.eq_ignore_ascii_case(name))
            .count()
    }

    pub fn has_generated(&self) -> bool {
        self.columns.iter().any(|c| c.generated)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

impl FromIterator<ResultColumn> for ResultColumnList {
    fn from_iter<I: IntoIterator<Item = ResultColumn>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ResultColumnList {
    type Item = &'a ResultColumn;
    type IntoIter = std::slice::Iter<'a, ResultColumn>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Literal, ValueNode};

    #[test]
    fn test_visible_columns() {
        let mut list = ResultColumnList::new();
        list.push(ResultColumn::new("A", ValueNode::literal(Literal::Integer(1))));
        list.push(ResultColumn::generated("B", ValueNode::literal(Literal::Integer(2))));

        assert_eq!(list.len(), 2);
        assert_eq!(list.visible_len(), 1);
        assert_eq!(list.position_of("a"), Some(0));
        assert_eq!(list.position_of("b"), None);
        assert!(list.has_generated());
    }
}
