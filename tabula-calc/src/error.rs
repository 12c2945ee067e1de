//! # Calculator Error Type
//!
//! [`CalcError`] is the single error surface of this crate. It aggregates
//! failures from:
//!
//! - **Table construction and linking** ([`TableError`]),
//! - **Scanning** ([`ScanError`]) and **parsing** ([`ParseError`]) that could not
//!   be recovered from,
//! - **Opening input files**.
//!
//! Conversions are derived with `#[from]`, so functions returning
//! `Result<T, CalcError>` can use `?` directly.
//!
//! Diagnostics that a compilation recovers from are *not* errors; they are
//! collected in the compilation's diagnostics instead.
use std::path::PathBuf;
use tabula::{ParseError, ScanError, TableError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalcError {
    /// Building, reading or linking a table failed.
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// A token stream failed outside of a parse.
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// A parse ended early.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// An input file could not be opened.
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
