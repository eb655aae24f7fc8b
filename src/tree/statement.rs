//! Statement roots.

use std::sync::Arc;

use super::order::OrderByList;
use super::result_set::{ResultSetNode, TableName};
use super::value::{Position, ValueNode};
use crate::catalog::TableDescriptor;

/// A query returning rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorNode {
    pub query: ResultSetNode,
    pub order_by: Option<OrderByList>,
    pub offset: Option<ValueNode>,
    pub fetch: Option<ValueNode>,
}

impl CursorNode {
    pub fn new(query: ResultSetNode) -> Self {
        Self {
            query,
            order_by: None,
            offset: None,
            fetch: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertNode {
    pub table: TableName,
    pub position: Position,
    /// Target columns as written; empty means every column in table order.
    pub columns: Vec<String>,
    /// Positions of the target columns, set by the binder.
    pub column_positions: Vec<usize>,
    pub source: ResultSetNode,
    pub target: Option<Arc<TableDescriptor>>,
}

/// UPDATE and DELETE bind their target and WHERE clause as a query block
/// over the target table; `source` is that block.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateNode {
    pub table: TableName,
    pub position: Position,
    /// Assigned columns, in the order of `source`'s result columns.
    pub columns: Vec<String>,
    pub column_positions: Vec<usize>,
    pub source: ResultSetNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteNode {
    pub table: TableName,
    pub position: Position,
    pub source: ResultSetNode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Cursor(CursorNode),
    Insert(InsertNode),
    Update(UpdateNode),
    Delete(DeleteNode),
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Cursor(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
        }
    }

    /// Query tree whose rows the statement reads.
    pub fn query(&self) -> &ResultSetNode {
        match self {
            Statement::Cursor(c) => &c.query,
            Statement::Insert(i) => &i.source,
            Statement::Update(u) => &u.source,
            Statement::Delete(d) => &d.source,
        }
    }

    pub fn query_mut(&mut self) -> &mut ResultSetNode {
        match self {
            Statement::Cursor(c) => &mut c.query,
            Statement::Insert(i) => &mut i.source,
            Statement::Update(u) => &mut u.source,
            Statement::Delete(d) => &mut d.source,
        }
    }
}
