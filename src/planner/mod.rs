//! Compilation pipeline.
//!
//! [`QueryPlanner`] takes SQL text through parsing, binding, optimization
//! and finalization, and returns a [`QueryPlan`] ready for code generation.

mod error;
mod finalize;
#[allow(clippy::module_inception)]
mod planner;

pub use error::{PlanError, PlanResult};
pub use planner::{CompileOptions, QueryPlan, QueryPlanner};
