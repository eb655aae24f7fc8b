//! querycore - SQL query compilation core.
//!
//! Takes a parsed statement through name binding, type and collation
//! resolution, boolean normalization, subquery flattening and cost-based
//! join-order optimization, and produces a bound, optimized tree plus the
//! privileges and schema objects the statement depends on.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use querycore::catalog::InMemoryCatalog;
//! use querycore::planner::QueryPlanner;
//!
//! let catalog = InMemoryCatalog::load("catalog.json").unwrap();
//! let planner = QueryPlanner::new(Arc::new(catalog));
//! let plan = planner.compile("SELECT name FROM users WHERE id = 7").unwrap();
//! println!("{}", plan.explain());
//! ```

pub mod binder;
pub mod catalog;
pub mod optimizer;
pub mod planner;
pub mod sql;
pub mod tree;
