//! # tabula-calc
//!
//! Two small compilers built on the **tabula** runtime, kept deliberately
//! minimal so they double as worked examples of wiring tables, factories and
//! clients together.
//!
//! - [`arith`]: an arithmetic compiler. Scanner and parser tables are built
//!   in code, statements are evaluated through nonterminal factories,
//!   `#include "file"` is handled by the preprocessor, and syntax errors are
//!   repaired.
//! - [`count`]: an identifier counter that drives the scanner alone.
//! - [`error`]: the crate-wide [`CalcError`].
//!
//! ## Example
//!
//! ```text
//! let compiler = ArithCompiler::new()?;
//! let compilation = compiler.compile_str("1 + 2; (3 - 4) + 5;");
//! assert_eq!(compilation.output, vec![Some(3), Some(4)]);
//! ```
pub mod arith;
pub mod count;
pub mod error;

pub use arith::{ArithCompiler, ArithContext, ArithValue, Compilation};
pub use count::{Counts, IdentifierCounter};
pub use error::CalcError;
