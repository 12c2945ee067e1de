//! # count
//!
//! Identifier counting with the scanner alone, no parser involved.
//!
//! For every identifier the counter reports the number of *statements* it
//! occurs in, where a statement ends at `;` or at end of input. The keyword
//! `int` is declared before the identifier pattern and so wins the tie on
//! equal-length matches; it is never counted. Identifiers are listed in order
//! of first appearance.

use crate::CalcError;
use indexmap::{IndexMap, IndexSet};
use smartstring::alias::String;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tabula::{
    ByteSource, Diagnostic, DiagnosticSink, Diagnostics, Discard, Disposition, LinkedScannerTable,
    ScanState, Scanner, ScannerClient, ScannerTable, SyntaxError, TableError, Token, TokenDef,
    TokenFactories, TokenStream,
};

pub mod tok {
    pub const INT: i32 = 1;
    pub const IDENT: i32 = 2;
    pub const SEMI: i32 = 3;
    pub const PUNCT: i32 = 4;
}

#[derive(Debug, Default)]
pub struct CountContext {
    diagnostics: Diagnostics,
}

impl DiagnosticSink for CountContext {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.report(diagnostic);
    }
}

impl ScannerClient<String> for CountContext {}

pub fn scanner_table() -> Result<ScannerTable, TableError> {
    ScannerTable::builder()
        .token(TokenDef::new("int", "int").param(tok::INT))
        .token(TokenDef::new("ident", "[A-Za-z_][A-Za-z0-9_]*").param(tok::IDENT))
        .token(TokenDef::new("semi", ";").param(tok::SEMI))
        .token(TokenDef::new("punct", r"[0-9=+\-*/(),{}<>!&|]+").param(tok::PUNCT))
        .token(TokenDef::new("line_comment", "//[^\r\n]*"))
        .token(TokenDef::new("space", "[ \t\r]+").link("line_comment"))
        .token(TokenDef::new("newline", "\n"))
        .build()
}

fn ident(s: &mut ScanState, _: &mut CountContext, t: &mut Token<String>) -> Result<Disposition, SyntaxError> {
    t.value = Some(s.text_str()?.into());
    Ok(Disposition::Assemble)
}

fn newline(s: &mut ScanState, _: &mut CountContext, _: &mut Token<String>) -> Result<Disposition, SyntaxError> {
    s.count_line();
    Ok(Disposition::Discard)
}

/// Result of one count.
#[derive(Debug, Default)]
pub struct Counts {
    /// Identifier to number of statements it occurs in.
    pub counts: IndexMap<String, usize>,
    pub statements: usize,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct IdentifierCounter {
    linked: Arc<LinkedScannerTable<CountContext, String>>,
}

impl IdentifierCounter {
    pub fn new() -> Result<Self, CalcError> {
        let factories = TokenFactories::new()
            .register_fn("ident", ident)
            .register_fn("newline", newline)
            .register("line_comment", Discard);
        Ok(Self {
            linked: Arc::new(factories.link(scanner_table()?)?),
        })
    }

    pub fn count<R: Read>(&self, reader: R, file: &str) -> Result<Counts, CalcError> {
        let mut ctx = CountContext::default();
        let mut scanner = Scanner::new(Arc::clone(&self.linked), ByteSource::new(reader)).with_file(file);
        let mut counts = Counts::default();
        let mut statement: IndexSet<String> = IndexSet::new();
        loop {
            let token = scanner.next_token(&mut ctx)?;
            match token.number {
                tok::IDENT => {
                    if let Some(name) = token.value {
                        statement.insert(name);
                    }
                }
                tok::SEMI => flush(&mut statement, &mut counts),
                _ if token.is_eof() => {
                    if !statement.is_empty() {
                        flush(&mut statement, &mut counts);
                    }
                    break;
                }
                _ => {}
            }
        }
        scanner.close(&mut ctx)?;
        log::debug!("{file}: {} statements, {:?}", counts.statements, scanner.stats());
        counts.diagnostics = ctx.diagnostics;
        Ok(counts)
    }

    pub fn count_str(&self, source: &str) -> Result<Counts, CalcError> {
        self.count(source.as_bytes(), "<input>")
    }

    pub fn count_file(&self, path: impl AsRef<Path>) -> Result<Counts, CalcError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| CalcError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.count(file, &path.display().to_string())
    }
}

fn flush(statement: &mut IndexSet<String>, counts: &mut Counts) {
    counts.statements += 1;
    for name in statement.drain(..) {
        *counts.counts.entry(name).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula::diagnostic::codes;

    fn count(source: &str) -> Counts {
        IdentifierCounter::new().unwrap().count_str(source).unwrap()
    }

    fn pairs(counts: &Counts) -> Vec<(&str, usize)> {
        counts.counts.iter().map(|(k, v)| (k.as_str(), *v)).collect()
    }

    #[test]
    fn counts_statements_per_identifier() {
        let c = count("int x; int y; x = x;");
        assert_eq!(pairs(&c), vec![("x", 2), ("y", 1)]);
        assert_eq!(c.statements, 3);
        assert!(c.diagnostics.is_empty());
    }

    #[test]
    fn keyword_is_not_an_identifier_but_longer_words_are() {
        let c = count("int integer; intx = int_;");
        assert_eq!(pairs(&c), vec![("integer", 1), ("intx", 1), ("int_", 1)]);
    }

    #[test]
    fn trailing_statement_is_flushed_at_eof() {
        let c = count("a = b;\nb = a + a");
        assert_eq!(pairs(&c), vec![("a", 2), ("b", 2)]);
        assert_eq!(c.statements, 2);
    }

    #[test]
    fn comments_and_numbers_are_skipped() {
        let c = count("// x y z\nw = 42; // w\n");
        assert_eq!(pairs(&c), vec![("w", 1)]);
    }

    #[test]
    fn unexpected_characters_are_reported() {
        let c = count("x # y;");
        assert_eq!(pairs(&c), vec![("x", 1), ("y", 1)]);
        assert_eq!(c.diagnostics.len(), 1);
        let d = c.diagnostics.iter().next().unwrap();
        assert_eq!(d.code, codes::UNMATCHED_INPUT);
        assert_eq!((d.line, d.column), (Some(1), Some(3)));
    }
}
