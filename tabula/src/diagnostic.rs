//! Diagnostics and the sink every report goes through.
//!
//! Scanner and parser hooks have default implementations that format a
//! [`Diagnostic`] and hand it to the client's [`DiagnosticSink`]. Clients that
//! only want to *collect* reports implement the sink and nothing else.

use crate::Token;
use std::fmt;
use std::sync::Arc;

/// Numeric codes of the diagnostics emitted by the runtime itself.
pub mod codes {
    /// Input that no token definition matches.
    pub const UNMATCHED_INPUT: u32 = 100;
    /// Malformed input reported by a prescanner (e.g. a bad `\u` escape).
    pub const MALFORMED_INPUT: u32 = 101;
    /// Error repair inserted a symbol.
    pub const REPAIR_INSERT: u32 = 200;
    /// Error repair deleted a symbol.
    pub const REPAIR_DELETE: u32 = 201;
    /// Error repair succeeded but the edit was too large to itemize.
    pub const SYNTAX_ERROR: u32 = 202;
    /// Error repair gave up.
    pub const REPAIR_FAILED: u32 = 203;
    /// The token stream failed with an I/O error.
    pub const IO_ERROR: u32 = 204;
    /// A factory or hook raised a fatal syntax error.
    pub const FATAL: u32 = 205;
    /// The client interrupted the compilation.
    pub const INTERRUPTED: u32 = 206;
    /// An escape token the preprocessor does not understand.
    pub const UNKNOWN_ESCAPE: u32 = 300;
    /// Stream insertion nested deeper than the preprocessor allows.
    pub const INCLUDE_DEPTH: u32 = 301;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        })
    }
}

/// One report: severity, originating module, optional position, code and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub module: &'static str,
    pub file: Option<Arc<str>>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        module: &'static str,
        code: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            module,
            file: None,
            line: None,
            column: None,
            code,
            message: message.into(),
        }
    }

    pub fn warning(module: &'static str, code: u32, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, module, code, message)
    }

    pub fn error(module: &'static str, code: u32, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, module, code, message)
    }

    pub fn fatal(module: &'static str, code: u32, message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, module, code, message)
    }

    /// Attaches an explicit position.
    pub fn at(mut self, file: Option<Arc<str>>, line: Option<usize>, column: Option<usize>) -> Self {
        self.file = file;
        self.line = line;
        self.column = column;
        self
    }

    /// Attaches the position of `token`.
    pub fn at_token<V>(self, token: &Token<V>) -> Self {
        self.at(token.file.clone(), token.line, token.column)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{file}:")?;
        }
        if let Some(line) = self.line {
            write!(f, "{line}:")?;
            if let Some(column) = self.column {
                write!(f, "{column}:")?;
            }
        }
        if self.file.is_some() || self.line.is_some() {
            f.write_str(" ")?;
        }
        write!(
            f,
            "{}[{}] {}: {}",
            self.severity, self.code, self.module, self.message
        )
    }
}

/// Receiver of every diagnostic produced during a compilation.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        let level = match diagnostic.severity {
            Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error | Severity::Fatal => log::Level::Error,
        };
        log::log!(target: diagnostic.module, level, "{diagnostic}");
    }
}

/// Collects diagnostics in memory.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of reports at [`Severity::Error`] or above.
    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity >= Severity::Error)
            .count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    /// Returns `true` if any report carries `code`.
    pub fn contains_code(&self, code: u32) -> bool {
        self.items.iter().any(|d| d.code == code)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl DiagnosticSink for Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        log::debug!("{diagnostic}");
        self.items.push(diagnostic);
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
