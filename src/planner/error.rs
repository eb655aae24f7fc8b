//! Compilation errors.

use thiserror::Error;

use crate::binder::BindError;
use crate::catalog::CatalogError;
use crate::optimizer::{ConfigError, OptimizeError};
use crate::sql::ParseError;

/// Result type for compilation.
pub type PlanResult<T> = Result<T, PlanError>;

/// Fatal compilation errors. No partial plan is returned with any of them.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("bind error: {0}")]
    Bind(#[from] BindError),

    #[error("optimization failed: {0}")]
    Optimize(#[from] OptimizeError),

    #[error("internal error: {0}")]
    Internal(String),
}
