//! Errors raised while turning SQL text into an unbound tree.

use sqlparser::parser::ParserError;
use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

/// Either `sqlparser` rejected the text, or it accepted something the query
/// tree has no node for.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Statements other than queries, INSERT, UPDATE and DELETE.
    #[error("{0} statements cannot be compiled")]
    UnsupportedStatement(String),

    #[error("expression not supported: {0}")]
    UnsupportedExpression(String),

    #[error("clause not supported: {0}")]
    UnsupportedClause(String),

    #[error("no SQL type matches {0}")]
    UnsupportedDataType(String),

    /// Compound names with too many parts, or an empty name.
    #[error("bad name: {0}")]
    InvalidIdentifier(String),

    #[error("{0} is required here")]
    MissingClause(String),

    #[error("no statement found")]
    EmptyQuery,

    #[error("expected exactly one statement")]
    MultipleStatements,
}

impl From<ParserError> for ParseError {
    fn from(e: ParserError) -> Self {
        match e {
            ParserError::TokenizerError(message) | ParserError::ParserError(message) => ParseError::Syntax(message),
            ParserError::RecursionLimitExceeded => ParseError::Syntax("statement nested too deeply".into()),
        }
    }
}
