//! Optimization errors.

use thiserror::Error;

/// Result type for optimization.
pub type OptimizeResult<T> = Result<T, OptimizeError>;

fn no_plan_reason(timed_out: &bool) -> &'static str {
    if *timed_out {
        "the time budget ran out first"
    } else {
        "every join order was pruned"
    }
}

/// Fatal optimization failures. A timeout that still found a plan is not an
/// error; it is reported as a warning.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("no access path is available for {table}")]
    NoAccessPath { table: String },

    #[error("no plan found for a query block of {tables} tables: {}", no_plan_reason(.timed_out))]
    NoBestPlan { tables: usize, timed_out: bool },

    #[error("the fixed join order {order} places a table before one it depends on")]
    IllegalForcedJoinOrder { order: String },

    #[error("unsupported: {0}")]
    Unsupported(String),
}
