//! Tokens and token streams.
//!
//! A [`Token`] is the unit exchanged between every layer of the runtime: the
//! scanner produces them, a preprocessor filters them, and the parser consumes
//! them. Token numbers carry the protocol:
//!
//! - `0` ([`EOF`]) marks the end of a stream,
//! - negative numbers are *escape tokens*, addressed to a preprocessing layer
//!   and never meant to reach the parser,
//! - positive numbers are ordinary terminals.
//!
//! Streams hand out an owned token per call. A consumer may keep a token as
//! long as it likes; nothing is overwritten behind its back.

use crate::ScanError;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Token number of the end-of-file sentinel.
pub const EOF: i32 = 0;

/// Token number pre-populated into tokens handed to
/// [`ScannerClient::scanner_unmatched_token`](crate::ScannerClient::scanner_unmatched_token).
///
/// No parser table declares it, so a client that assembles such a token
/// without renumbering it produces a token the parser treats as a syntax error.
pub const UNMATCHED: i32 = i32::MAX;

/// A 1-based line/column position in source text.
#[derive(Debug, Clone, Default, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number (character position in the line).
    pub column: usize,
}

impl Position {
    /// Creates a new `Position`.
    #[inline]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A lexical token.
///
/// `value` is `None` for tokens without a payload (punctuation, keywords) and
/// for tokens synthesized by error repair, which have no real value. Every
/// consumer of a value must therefore be prepared to see `None` and should
/// propagate it rather than invent a result.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<V> {
    /// Token number; see the module docs for the sign convention.
    pub number: i32,
    /// Payload, or `None`.
    pub value: Option<V>,
    /// Name of the source the token came from, if known.
    pub file: Option<Arc<str>>,
    /// 1-based line of the first character, if known.
    pub line: Option<usize>,
    /// 1-based column of the first character, if known.
    pub column: Option<usize>,
}

impl<V> Token<V> {
    /// Creates a token without position information.
    pub fn new(number: i32, value: Option<V>) -> Self {
        Self {
            number,
            value,
            file: None,
            line: None,
            column: None,
        }
    }

    /// Creates an end-of-file token without position information.
    pub fn eof() -> Self {
        Self::new(EOF, None)
    }

    /// Creates a value-less token numbered `number` at the position of `at`.
    ///
    /// This is the shape of every token inserted by error repair.
    pub fn synthetic(number: i32, at: &Token<V>) -> Self {
        Self {
            number,
            value: None,
            file: at.file.clone(),
            line: at.line,
            column: at.column,
        }
    }

    /// Sets the position fields, builder style.
    pub fn at(mut self, file: Option<Arc<str>>, line: usize, column: usize) -> Self {
        self.file = file;
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.number == EOF
    }

    #[inline]
    pub fn is_escape(&self) -> bool {
        self.number < 0
    }

    /// Returns the token's position when both line and column are known.
    pub fn position(&self) -> Option<Position> {
        match (self.line, self.column) {
            (Some(line), Some(column)) => Some(Position::new(line, column)),
            _ => None,
        }
    }
}

/// A source of tokens.
///
/// `C` is the compilation context threaded through every call; scanners hand
/// it to their token factories and client hooks, preprocessors hand it to
/// nested streams. After a stream has returned [`EOF`] it keeps returning
/// end-of-file tokens.
pub trait TokenStream<C> {
    type Value;

    /// Returns the next token.
    fn next_token(&mut self, context: &mut C) -> Result<Token<Self::Value>, ScanError>;

    /// Releases the stream's resources. Further reads yield end-of-file.
    fn close(&mut self, _context: &mut C) -> Result<(), ScanError> {
        Ok(())
    }
}

/// A type-erased token stream, as carried by insert-stream escape tokens.
pub type BoxedTokenStream<C, V> = Box<dyn TokenStream<C, Value = V>>;

impl<C, S> TokenStream<C> for Box<S>
where
    S: TokenStream<C> + ?Sized,
{
    type Value = S::Value;

    #[inline]
    fn next_token(&mut self, context: &mut C) -> Result<Token<Self::Value>, ScanError> {
        (**self).next_token(context)
    }

    #[inline]
    fn close(&mut self, context: &mut C) -> Result<(), ScanError> {
        (**self).close(context)
    }
}

/// A token stream over already assembled tokens.
///
/// Yields the tokens in order and then end-of-file forever. Useful for
/// synthesized token sequences (macro bodies, pre-tokenized includes) and for
/// driving a parser without a scanner.
#[derive(Debug, Clone)]
pub struct VecStream<V> {
    tokens: VecDeque<Token<V>>,
}

impl<V> VecStream<V> {
    pub fn new(tokens: impl IntoIterator<Item = Token<V>>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    /// Number of tokens not yet read.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<C, V> TokenStream<C> for VecStream<V> {
    type Value = V;

    fn next_token(&mut self, _context: &mut C) -> Result<Token<V>, ScanError> {
        Ok(self.tokens.pop_front().unwrap_or_else(Token::eof))
    }

    fn close(&mut self, _context: &mut C) -> Result<(), ScanError> {
        self.tokens.clear();
        Ok(())
    }
}
