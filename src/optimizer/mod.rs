//! Cost-based optimizer.
//!
//! For each query block the optimizer enumerates join orders of the FROM
//! list, picks an access path (heap or index) and a join strategy (nested
//! loop or hash) per operand, and keeps the cheapest complete plan under the
//! cost model of [`CostEstimate`]. Search decisions can be observed through an
//! [`OptimizerTrace`].

mod access_path;
mod config;
mod cost;
mod error;
mod join_strategy;
mod optimizable;
#[allow(clippy::module_inception)]
mod optimizer;
mod ordering;
mod pushdown;
mod search;
mod stats;
mod trace;

pub use access_path::{ChosenAccess, Conglomerate, ConglomerateKind, LockMode};
pub use config::{ConfigError, JoinOrderMode, OptimizerConfig};
pub use cost::{heuristic_selectivity, sort_cost, CostEstimate};
pub use error::{OptimizeError, OptimizeResult};
pub use join_strategy::JoinStrategyKind;
pub use optimizable::Optimizable;
pub use optimizer::Optimizer;
pub use stats::{RowEstimate, StatisticsAdapter};
pub use trace::{CollectingTrace, LogTrace, NoopTrace, OptimizerTrace, TraceEvent};
