//! SQL front end.
//!
//! Uses the `sqlparser` crate for lexing and parsing, then converts its AST
//! into the unbound query tree.

mod error;
mod parser;

pub use error::{ParseError, ParseResult};
pub use parser::Parser;
