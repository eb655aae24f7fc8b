//! Query tree model.
//!
//! Expressions (`ValueNode`), relational operands (`ResultSetNode`) and
//! statement roots, plus the traversal used by every compilation pass.

mod display;
mod order;
mod predicate;
mod result_column;
mod result_set;
mod statement;
mod table_map;
mod types;
mod value;
mod visit;

pub use order::{OrderByColumn, OrderByList, OrderByTarget};
pub use predicate::{ColumnComparison, Predicate, PredicateId, PredicateList, PredicateRole};
pub use result_column::{ResultColumn, ResultColumnList};
pub use result_set::{
    BaseTableNode, DistinctNode, FromSubquery, GroupByNode, JoinKind, JoinNode, JoinRole, OrderByNode,
    ProjectRestrictNode, ResultSetNode, RowCountNode, SelectItem, SelectNode, SetOp, SetOperatorNode, TableName,
    ValuesNode,
};
pub use statement::{CursorNode, DeleteNode, InsertNode, Statement, UpdateNode};
pub use table_map::TableMap;
pub use types::{
    Collation, CollationKind, DataType, Derivation, TypeId, UnknownType, CHAR_MAX_WIDTH, CLOB_MAX_WIDTH,
    DECIMAL_MAX_PRECISION, LONG_VARCHAR_MAX_WIDTH, VARCHAR_MAX_WIDTH,
};
pub use value::{
    AggregateFn, AggregateNode, BinaryNode, BinaryOp, CastNode, CoalesceNode, ColumnReference, ColumnSource,
    Constant, Literal, Parameter, Position, SubqueryKind, SubqueryNode, TernaryNode, TernaryOp, UnaryNode, UnaryOp,
    ValueNode, VirtualColumn,
};
pub use visit::{fold_value, visit_value, ValueRewriter, ValueVisitor, Visit};
