//! Query language for the factdb system.
//!
//! The grammar is compiled into the crate as a hand-written lexer and
//! recursive-descent parser; there is no grammar file and no IO at open.
//! [`parse`] turns query text into a [`ParsedQuery`] -- the action plus its
//! fact list -- which the transaction layer dispatches on.

pub mod parser;
pub mod token;

pub use parser::{ParsedQuery, parse};

/// Errors produced while lexing or parsing a query.
///
/// The rendered message is the first-line cause reported to the caller; a
/// failed parse never starts a transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("empty query")]
    Empty,

    #[error("unclosed [[[ quote starting at offset {0}")]
    UnclosedQuote(usize),

    #[error("invalid tag {text:?} at offset {pos}")]
    InvalidTag { pos: usize, text: String },

    #[error("invalid prop {text:?} at offset {pos}")]
    InvalidProp { pos: usize, text: String },

    #[error("invalid ref at offset {pos}")]
    InvalidRef { pos: usize },

    #[error("missing value after '=' at offset {pos}")]
    MissingValue { pos: usize },

    #[error("unexpected {what} at offset {pos}")]
    Unexpected { what: String, pos: usize },
}
