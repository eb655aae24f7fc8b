//! Name binding, typing and query-block flattening.
//!
//! [`Binder::bind`] takes a parsed statement and leaves it fully bound: every
//! column reference knows its table number and nesting level, every node is
//! typed, search conditions are normalized and split into predicates, and
//! simple subqueries and derived tables are merged into their outer block.
//! Privileges and dependencies discovered on the way go into
//! [`CompileFacts`].

mod binder;
mod closure;
mod context;
mod error;
mod facts;
mod flatten;
mod normalize;
mod resolve;
mod scope;

pub use binder::Binder;
pub use context::{CompilerContext, Numbering};
pub use error::{BindError, BindResult};
pub use facts::{CompileFacts, CompileWarning, Dependency, DependencyKind, PrivilegeKind, RequiredPrivilege};
pub use normalize::{conjuncts, is_normalized, normalize};
pub use resolve::{cast_allowed, position_of, TypeResolver};
