//! Binding errors.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::sql::ParseError;
use crate::tree::Position;

/// Result type for binding operations.
pub type BindResult<T> = Result<T, BindError>;

/// Fatal binding errors. Each one aborts the compilation.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("table or view {name} does not exist ({position})")]
    TableNotFound { name: String, position: Position },

    #[error("column {name} is not in any table in the FROM list ({position})")]
    ColumnNotFound { name: String, position: Position },

    #[error("column reference {name} is ambiguous ({position})")]
    AmbiguousColumn { name: String, position: Position },

    #[error("type mismatch: {message} ({position})")]
    TypeMismatch { message: String, position: Position },

    #[error("cannot infer the type of a parameter or NULL ({position})")]
    NoResolvableType { position: Position },

    #[error("comparison between collations {left} and {right} is not allowed ({position})")]
    CollationMismatch {
        left: String,
        right: String,
        position: Position,
    },

    #[error("aggregate not allowed in {clause} ({position})")]
    AggregateNotAllowed { clause: &'static str, position: Position },

    #[error("column {name} must be in the GROUP BY list ({position})")]
    NotGroupingColumn { name: String, position: Position },

    #[error("column count mismatch: expected {expected}, found {found}")]
    ColumnCountMismatch { expected: usize, found: usize },

    #[error("cannot cast {from} to {to} ({position})")]
    IllegalCast {
        from: String,
        to: String,
        position: Position,
    },

    #[error("ORDER BY item {0} does not name a result column")]
    OrderByColumnNotFound(String),

    #[error("column {0} appears more than once")]
    DuplicateColumn(String),

    #[error("definition of view {view} is invalid: {source}")]
    ViewDefinition {
        view: String,
        #[source]
        source: ParseError,
    },

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("unsupported: {0}")]
    Unsupported(String),
}
