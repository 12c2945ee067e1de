//! Copyright (c) 2005–2025 IKH Software, Inc.
//!
//! Released under the terms of the GNU Lesser General Public License, version 3.0
//! or (at your option) any later version (LGPL-3.0-or-later).
//!
//! Table-driven scanner and LR parser runtime.
//!
//! `tabula` runs compilers built from precomputed tables:
//!  * a **scanner** compiles ordered regular-expression token definitions into
//!    one DFA per start condition and dispatches every match to a token
//!    factory that assembles, discards or rejects it;
//!  * a **parser** drives an LR action table, computes nonterminal values
//!    through nonterminal factories, and repairs syntax errors by inserting
//!    and deleting tokens;
//!  * a **preprocessor** layers token streams so that escape tokens can splice
//!    in the tokens of another source (file inclusion).
//!
//! Diagnostics from every layer go through one [`DiagnosticSink`]. Tables are
//! immutable, shareable across threads, and can be written to and read back
//! from a byte stream.

mod codec;
mod error;
mod parser_table;
mod scanner_table;
mod token;

pub mod diagnostic;
pub mod parser;
pub mod prescan;
pub mod preprocessor;
pub mod repair;
pub mod scanner;

#[cfg(test)]
mod test_tables;

pub use crate::codec::{FORMAT_VERSION, read_tables, write_tables};
pub use crate::diagnostic::{Diagnostic, DiagnosticSink, Diagnostics, LogSink, Severity};
pub use crate::error::{ParseError, ScanError, SyntaxError, TableError};
pub use crate::parser::{
    FirstValue, FnNonterminal, LinkedParserTable, NonterminalFactories, NonterminalFactory, Parser,
    ParserClient, ParserStats, Reduction,
};
pub use crate::parser_table::{
    Action, ParserTable, ParserTableBuilder, Production, ProductionDef, ProductionId, RepairConfig,
    StateId, SymbolId,
};
pub use crate::prescan::{ByteSource, Prescanner, UnicodeEscapes};
pub use crate::preprocessor::{EscapeValue, INSERT_STREAM, Preprocessor};
pub use crate::repair::{Repair, SIMPLE_REPAIR_LIMIT};
pub use crate::scanner::{
    Assemble, Discard, Disposition, FnFactory, LinkedScannerTable, ScanState, Scanner,
    ScannerClient, ScannerStats, TokenFactories, TokenFactory,
};
pub use crate::scanner_table::{
    DEFAULT_CONDITION, ScannerTable, ScannerTableBuilder, TokenDef, TokenDefinition,
};
pub use crate::token::{BoxedTokenStream, EOF, Position, Token, TokenStream, UNMATCHED, VecStream};
