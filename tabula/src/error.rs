//! Error types of the scanner/parser runtime.
//!
//! - [`TableError`]: a scanner or parser table is malformed, cannot be linked
//!   against its factories, or cannot be read back from a stream. These are
//!   consistency failures meant to surface during development.
//! - [`SyntaxError`]: raised by factories and client hooks to abort a
//!   compilation; [`SyntaxError::Interrupted`] is the client-requested
//!   interrupt.
//! - [`ScanError`]: what a [`TokenStream`](crate::TokenStream) may fail with.
//! - [`ParseError`]: why [`Parser::parse`](crate::Parser::parse) stopped.

use smartstring::alias::String;
use std::io;
use std::str::Utf8Error;
use thiserror::Error;

/// A malformed, unlinkable or unreadable table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("duplicate start condition {0:?}")]
    DuplicateCondition(String),

    #[error("unknown start condition {0:?}")]
    UnknownCondition(String),

    #[error("duplicate symbol {0:?}")]
    DuplicateSymbol(String),

    #[error("unknown symbol {0:?}")]
    UnknownSymbol(String),

    /// A token definition links to a token name the table does not declare.
    #[error("token {token:?} links to undeclared token {link:?}")]
    UnresolvedLink { token: String, link: String },

    /// A production names a link tag for which no factory was registered.
    #[error("no factory registered for link {0:?}")]
    MissingFactory(String),

    /// A factory was registered under a name the table never refers to.
    #[error("factory registered for unknown link {0:?}")]
    UnknownLink(String),

    #[error("invalid pattern for token {token:?}: {message}")]
    Pattern { token: String, message: std::string::String },

    #[error("automaton construction failed: {0}")]
    Automaton(std::string::String),

    #[error("symbol {0} out of range")]
    SymbolOutOfRange(usize),

    #[error("state {0} out of range")]
    StateOutOfRange(usize),

    #[error("production {0} out of range")]
    ProductionOutOfRange(usize),

    #[error("malformed table: {0}")]
    Malformed(std::string::String),

    #[error("table i/o error: {0}")]
    Io(#[from] io::Error),
}

/// A condition that aborts the compilation in progress.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// The client asked for the compilation to stop.
    #[error("compilation interrupted")]
    Interrupted,

    /// A factory or hook gave up.
    #[error("{0}")]
    Fatal(std::string::String),

    /// Token text that had to be UTF-8 was not.
    #[error("invalid utf-8 in token text: {0}")]
    InvalidText(#[from] Utf8Error),
}

/// Failure of a token stream.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

/// Why a parse ended without a result.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("i/o error: {0}")]
    Io(#[source] io::Error),

    #[error(transparent)]
    Syntax(SyntaxError),

    /// Error repair exhausted its search.
    #[error("unrepairable syntax error at {symbol}")]
    Unrepairable {
        symbol: std::string::String,
        line: Option<usize>,
        column: Option<usize>,
    },

    /// The table and the stacks disagree (missing goto, stack underflow).
    #[error("internal parser error: {0}")]
    Internal(std::string::String),
}

impl ParseError {
    /// `true` when the parse stopped because the client interrupted it.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, ParseError::Syntax(SyntaxError::Interrupted))
    }
}

impl From<ScanError> for ParseError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Io(e) => ParseError::Io(e),
            ScanError::Syntax(e) => ParseError::Syntax(e),
        }
    }
}

impl From<SyntaxError> for ParseError {
    fn from(err: SyntaxError) -> Self {
        ParseError::Syntax(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn errors_are_send_sync_static() {
        _assert_send_sync_static::<TableError>();
        _assert_send_sync_static::<SyntaxError>();
        _assert_send_sync_static::<ScanError>();
        _assert_send_sync_static::<ParseError>();
    }

    #[test]
    fn scan_errors_map_onto_parse_errors() {
        let err: ParseError = ScanError::Io(io::Error::other("disk gone")).into();
        assert!(matches!(err, ParseError::Io(_)));
        assert!(err.to_string().contains("disk gone"));

        let err: ParseError = ScanError::Syntax(SyntaxError::Interrupted).into();
        assert!(err.is_interrupt());
        assert_eq!(err.to_string(), "compilation interrupted");
    }

    #[test]
    fn fatal_is_not_an_interrupt() {
        let err = ParseError::from(SyntaxError::Fatal("bad literal".into()));
        assert!(!err.is_interrupt());
        assert_eq!(err.to_string(), "bad literal");
    }

    #[test]
    fn table_error_messages_name_the_culprit() {
        let err = TableError::UnresolvedLink {
            token: "comment_text".into(),
            link: "spaces".into(),
        };
        assert_eq!(
            err.to_string(),
            "token \"comment_text\" links to undeclared token \"spaces\""
        );
        let err = TableError::DuplicateCondition("Comment".into());
        assert!(err.to_string().contains("Comment"));
    }

    #[test]
    fn utf8_errors_convert_to_syntax_errors() {
        let bytes = vec![0xf0, 0x28, 0x8c, 0x28];
        let err: SyntaxError = std::str::from_utf8(&bytes).unwrap_err().into();
        assert!(matches!(err, SyntaxError::InvalidText(_)));
    }
}
