//! Stream layering for file inclusion.
//!
//! A [`Preprocessor`] sits between a token source and the parser. It passes
//! ordinary tokens through and intercepts escape tokens. An
//! [`INSERT_STREAM`] escape whose value converts into a token stream suspends
//! the active stream and reads from the inserted one until its end-of-file,
//! which is swallowed; the suspended stream then resumes where it stopped.

use crate::diagnostic::{Diagnostic, DiagnosticSink, codes};
use crate::{BoxedTokenStream, ScanError, Token, TokenStream};
use std::fmt;

/// Escape token number asking the preprocessor to insert the stream carried
/// in the token's value.
pub const INSERT_STREAM: i32 = -1;

/// Nesting limit of inserted streams.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Token values that may carry a stream to insert.
pub trait EscapeValue<C>: Sized {
    /// Returns the stream this value carries, if any.
    fn into_stream(self) -> Option<BoxedTokenStream<C, Self>>;
}

pub struct Preprocessor<C, V> {
    active: BoxedTokenStream<C, V>,
    suspended: Vec<BoxedTokenStream<C, V>>,
    max_depth: usize,
}

impl<C, V> Preprocessor<C, V> {
    pub fn new(stream: BoxedTokenStream<C, V>) -> Self {
        Self {
            active: stream,
            suspended: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Number of suspended streams.
    pub fn depth(&self) -> usize {
        self.suspended.len()
    }

    /// Suspends the active stream and continues with `stream`. Gives the
    /// stream back when the nesting limit is reached.
    pub fn insert(&mut self, stream: BoxedTokenStream<C, V>) -> Result<(), BoxedTokenStream<C, V>> {
        if self.suspended.len() >= self.max_depth {
            return Err(stream);
        }
        let outer = std::mem::replace(&mut self.active, stream);
        self.suspended.push(outer);
        log::debug!("stream inserted, depth {}", self.suspended.len());
        Ok(())
    }
}

impl<C, V> TokenStream<C> for Preprocessor<C, V>
where
    C: DiagnosticSink,
    V: EscapeValue<C>,
{
    type Value = V;

    fn next_token(&mut self, context: &mut C) -> Result<Token<V>, ScanError> {
        loop {
            let mut token = self.active.next_token(context)?;

            if token.is_eof() {
                let Some(outer) = self.suspended.pop() else {
                    return Ok(token);
                };
                let mut inner = std::mem::replace(&mut self.active, outer);
                inner.close(context)?;
                log::debug!("stream ended, resuming at depth {}", self.suspended.len());
                continue;
            }

            if !token.is_escape() {
                return Ok(token);
            }

            if token.number == INSERT_STREAM {
                if let Some(stream) = token.value.take().and_then(|v| v.into_stream()) {
                    if let Err(mut rejected) = self.insert(stream) {
                        context.report(
                            Diagnostic::error(
                                "preprocessor",
                                codes::INCLUDE_DEPTH,
                                format!("streams nested deeper than {}", self.max_depth),
                            )
                            .at_token(&token),
                        );
                        rejected.close(context)?;
                    }
                    continue;
                }
            }

            context.report(
                Diagnostic::warning(
                    "preprocessor",
                    codes::UNKNOWN_ESCAPE,
                    format!("ignored escape token {}", token.number),
                )
                .at_token(&token),
            );
        }
    }

    /// Closes the active stream and every suspended one, returning the first
    /// error.
    fn close(&mut self, context: &mut C) -> Result<(), ScanError> {
        let mut first = self.active.close(context).err();
        while let Some(mut stream) = self.suspended.pop() {
            if let Err(e) = stream.close(context) {
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<C, V> fmt::Debug for Preprocessor<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preprocessor")
            .field("depth", &self.suspended.len())
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}
