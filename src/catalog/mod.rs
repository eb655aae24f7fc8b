//! Catalog interface.
//!
//! The compiler resolves table, view, column and index names through the
//! [`Catalog`] trait and asks it for statistics. [`InMemoryCatalog`] is the
//! implementation used by the CLI and the tests; it can be built in code or
//! loaded from a JSON document.

mod descriptor;
mod error;
mod memory;
mod types;

pub use descriptor::{Catalog, TableBuilder, TableDescriptor, ViewDescriptor, DEFAULT_SCHEMA};
pub use error::{CatalogError, CatalogResult};
pub use memory::{CatalogDocument, InMemoryCatalog};
pub use types::{ColumnDescriptor, IndexDescriptor, IndexStatistics, TableStatistics};
