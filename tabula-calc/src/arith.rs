//! # arith
//!
//! A compiler for a small arithmetic language:
//!
//! ```text
//! Program    -> Program Statement | Statement
//! Statement  -> Expression ';'
//! Expression -> Expression '+' Primary | Expression '-' Primary | Primary
//! Primary    -> number | '(' Expression ')'
//! ```
//!
//! Whitespace and `/* */` comments are skipped; comments are scanned in their
//! own start condition so that a comment left open at end of input can be
//! reported. `#include "file"` splices the tokens of another file in place,
//! through the [`Preprocessor`]. The value of every statement is collected in
//! [`Compilation::output`]; statements whose value could not be computed
//! (overflow, error repair) yield `None`.

use crate::CalcError;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabula::diagnostic::codes as core_codes;
use tabula::{
    Action, BoxedTokenStream, ByteSource, Diagnostic, DiagnosticSink, Diagnostics, Disposition,
    Discard, EscapeValue, INSERT_STREAM, LinkedParserTable, LinkedScannerTable,
    NonterminalFactories, ParseError, Parser, ParserClient, ParserTable, Preprocessor,
    ProductionDef, Reduction, RepairConfig, ScanState, Scanner, ScannerClient, ScannerTable,
    SyntaxError, TableError, Token, TokenDef, TokenFactories, TokenStream,
};

/// Token numbers.
pub mod tok {
    pub const NUMBER: i32 = 1;
    pub const PLUS: i32 = 2;
    pub const MINUS: i32 = 3;
    pub const SEMI: i32 = 4;
    pub const LPAREN: i32 = 5;
    pub const RPAREN: i32 = 6;
}

/// Diagnostic codes reported by the compiler itself.
pub mod codes {
    /// The input ended inside a comment.
    pub const RUN_ON_COMMENT: u32 = 1000;
    /// An included file could not be opened.
    pub const INCLUDE_FAILED: u32 = 1001;
    /// A literal or an intermediate result does not fit in 64 bits.
    pub const OVERFLOW: u32 = 1002;
}

/// Token and nonterminal values.
pub enum ArithValue {
    Number(i64),
    /// Carried by `#include` tokens.
    Include(BoxedTokenStream<ArithContext, ArithValue>),
}

impl fmt::Debug for ArithValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithValue::Number(n) => f.debug_tuple("Number").field(n).finish(),
            ArithValue::Include(_) => f.write_str("Include(..)"),
        }
    }
}

impl EscapeValue<ArithContext> for ArithValue {
    fn into_stream(self) -> Option<BoxedTokenStream<ArithContext, ArithValue>> {
        match self {
            ArithValue::Include(stream) => Some(stream),
            ArithValue::Number(_) => None,
        }
    }
}

type LinkedScanner = Arc<LinkedScannerTable<ArithContext, ArithValue>>;
type LinkedParser = Arc<LinkedParserTable<ArithContext, ArithValue>>;

/// State of one compilation, handed to every factory and hook.
#[derive(Debug)]
pub struct ArithContext {
    scanner: LinkedScanner,
    diagnostics: Diagnostics,
    output: Vec<Option<i64>>,
}

impl ArithContext {
    fn new(scanner: LinkedScanner) -> Self {
        Self {
            scanner,
            diagnostics: Diagnostics::new(),
            output: Vec::new(),
        }
    }
}

impl DiagnosticSink for ArithContext {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.report(diagnostic);
    }
}

impl ScannerClient<ArithValue> for ArithContext {
    fn scanner_eof(&mut self, scanner: &mut ScanState, token: &mut Token<ArithValue>) -> Result<(), SyntaxError> {
        if scanner.condition_named("Comment") == Some(scanner.condition()) {
            self.report(Diagnostic::error("arith", codes::RUN_ON_COMMENT, "comment not terminated").at_token(token));
        }
        Ok(())
    }
}

impl ParserClient<ArithValue> for ArithContext {}

pub fn scanner_table() -> Result<ScannerTable, TableError> {
    let normal = ["Normal"];
    let comment = ["Comment"];
    ScannerTable::builder()
        .condition("Normal")
        .condition("Comment")
        .token(TokenDef::new("number", "[0-9]+").param(tok::NUMBER).conditions(normal))
        .token(TokenDef::new("plus", r"\+").param(tok::PLUS).conditions(normal))
        .token(TokenDef::new("minus", "-").param(tok::MINUS).conditions(normal))
        .token(TokenDef::new("semi", ";").param(tok::SEMI).conditions(normal))
        .token(TokenDef::new("lparen", r"\(").param(tok::LPAREN).conditions(normal))
        .token(TokenDef::new("rparen", r"\)").param(tok::RPAREN).conditions(normal))
        .token(TokenDef::new("include", r#"#include[ \t]*"[^"\r\n]*""#).param(INSERT_STREAM).conditions(normal))
        .token(TokenDef::new("space", "[ \t]+").conditions(normal))
        .token(TokenDef::new("newline", "\r?\n"))
        .token(TokenDef::new("comment_begin", r"/\*").conditions(normal))
        .token(TokenDef::new("comment_end", r"\*/").conditions(comment))
        .token(TokenDef::new("comment_text", "[^*\r\n]+").conditions(comment).link("space"))
        .token(TokenDef::new("comment_star", r"\*").conditions(comment).link("space"))
        .build()
}

pub fn parser_table() -> Result<ParserTable, TableError> {
    use Action::{Accept, Goto, Reduce, Shift};
    let reduce_on_follow = |p| [("+", Reduce(p)), ("-", Reduce(p)), (";", Reduce(p)), (")", Reduce(p))];
    let reduce_on_start = |p| [("$end", Reduce(p)), ("number", Reduce(p)), ("(", Reduce(p))];
    ParserTable::builder()
        .terminals(["$end", "number", "+", "-", ";", "(", ")"])
        .nonterminals(["Program", "Statement", "Expression", "Primary"])
        .production(ProductionDef::new("Program", ["Program", "Statement"]))
        .production(ProductionDef::new("Program", ["Statement"]))
        .production(ProductionDef::new("Statement", ["Expression", ";"]).link("statement"))
        .production(ProductionDef::new("Expression", ["Expression", "+", "Primary"]).link("add"))
        .production(ProductionDef::new("Expression", ["Expression", "-", "Primary"]).link("sub"))
        .production(ProductionDef::new("Expression", ["Primary"]))
        .production(ProductionDef::new("Primary", ["number"]))
        .production(ProductionDef::new("Primary", ["(", "Expression", ")"]).link("paren"))
        .state([
            ("number", Shift(5)),
            ("(", Shift(6)),
            ("Program", Goto(1)),
            ("Statement", Goto(2)),
            ("Expression", Goto(3)),
            ("Primary", Goto(4)),
        ])
        .state([
            ("$end", Accept),
            ("number", Shift(5)),
            ("(", Shift(6)),
            ("Statement", Goto(7)),
            ("Expression", Goto(3)),
            ("Primary", Goto(4)),
        ])
        .state(reduce_on_start(1))
        .state([("+", Shift(9)), ("-", Shift(10)), (";", Shift(8))])
        .state(reduce_on_follow(5))
        .state(reduce_on_follow(6))
        .state([("number", Shift(5)), ("(", Shift(6)), ("Expression", Goto(11)), ("Primary", Goto(4))])
        .state(reduce_on_start(0))
        .state(reduce_on_start(2))
        .state([("number", Shift(5)), ("(", Shift(6)), ("Primary", Goto(12))])
        .state([("number", Shift(5)), ("(", Shift(6)), ("Primary", Goto(13))])
        .state([("+", Shift(9)), ("-", Shift(10)), (")", Shift(14))])
        .state(reduce_on_follow(3))
        .state(reduce_on_follow(4))
        .state(reduce_on_follow(7))
        .build()
}

fn number(s: &mut ScanState, ctx: &mut ArithContext, t: &mut Token<ArithValue>) -> Result<Disposition, SyntaxError> {
    let text = s.text_str()?;
    match text.parse::<i64>() {
        Ok(n) => t.value = Some(ArithValue::Number(n)),
        Err(_) => ctx.report(
            Diagnostic::error("arith", codes::OVERFLOW, format!("number {text} out of range")).at_token(t),
        ),
    }
    Ok(Disposition::Assemble)
}

fn newline(s: &mut ScanState, _: &mut ArithContext, _: &mut Token<ArithValue>) -> Result<Disposition, SyntaxError> {
    s.count_line();
    Ok(Disposition::Discard)
}

fn switch_to(s: &mut ScanState, condition: &str) -> Result<Disposition, SyntaxError> {
    let c = s
        .condition_named(condition)
        .ok_or_else(|| SyntaxError::Fatal(format!("scanner table lacks condition {condition}")))?;
    s.set_condition(c);
    Ok(Disposition::Discard)
}

/// Opens the quoted file, relative to the directory of the including file,
/// and hands it to the preprocessor as a nested scanner.
fn include(s: &mut ScanState, ctx: &mut ArithContext, t: &mut Token<ArithValue>) -> Result<Disposition, SyntaxError> {
    let text = s.text_str()?;
    let name = text.split('"').nth(1).unwrap_or_default();
    let base = s.file().and_then(|f| Path::new(&**f).parent().map(Path::to_path_buf));
    let path = match base {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    };
    match File::open(&path) {
        Ok(file) => {
            log::debug!("including {}", path.display());
            let scanner = Scanner::new(Arc::clone(&ctx.scanner), ByteSource::new(file))
                .with_file(path.display().to_string());
            t.value = Some(ArithValue::Include(Box::new(scanner)));
            Ok(Disposition::Assemble)
        }
        Err(e) => {
            ctx.report(
                Diagnostic::error("arith", codes::INCLUDE_FAILED, format!("cannot include {}: {e}", path.display()))
                    .at_token(t),
            );
            Ok(Disposition::Discard)
        }
    }
}

fn token_factories() -> TokenFactories<ArithContext, ArithValue> {
    TokenFactories::new()
        .register_fn("number", number)
        .register_fn("include", include)
        .register("space", Discard)
        .register_fn("newline", newline)
        .register_fn("comment_begin", |s: &mut ScanState, _: &mut ArithContext, _: &mut Token<ArithValue>| {
            switch_to(s, "Comment")
        })
        .register_fn("comment_end", |s: &mut ScanState, _: &mut ArithContext, _: &mut Token<ArithValue>| {
            switch_to(s, "Normal")
        })
}

fn statement(r: &mut Reduction<'_, ArithValue>, ctx: &mut ArithContext) -> Result<Option<ArithValue>, SyntaxError> {
    let value = r.take(0);
    let n = match &value {
        Some(ArithValue::Number(n)) => Some(*n),
        _ => None,
    };
    log::debug!("statement value {n:?}");
    ctx.output.push(n);
    Ok(value)
}

fn binary(
    r: &Reduction<'_, ArithValue>,
    ctx: &mut ArithContext,
    op: &str,
    f: fn(i64, i64) -> Option<i64>,
) -> Result<Option<ArithValue>, SyntaxError> {
    let (Some(ArithValue::Number(a)), Some(ArithValue::Number(b))) = (r.rhs_value(0), r.rhs_value(2)) else {
        return Ok(None);
    };
    match f(*a, *b) {
        Some(n) => Ok(Some(ArithValue::Number(n))),
        None => {
            ctx.report(Diagnostic::error("arith", codes::OVERFLOW, format!("{a} {op} {b} overflows")));
            Ok(None)
        }
    }
}

fn nonterminal_factories() -> NonterminalFactories<ArithContext, ArithValue> {
    NonterminalFactories::new()
        .register_fn("statement", statement)
        .register_fn("add", |r, ctx| binary(r, ctx, "+", i64::checked_add))
        .register_fn("sub", |r, ctx| binary(r, ctx, "-", i64::checked_sub))
        .register_fn("paren", |r, _| Ok(r.take(1)))
}

/// What a compilation produced.
#[derive(Debug)]
pub struct Compilation {
    /// Value of every statement, in source order.
    pub output: Vec<Option<i64>>,
    pub diagnostics: Diagnostics,
    /// Why the parse stopped early, if it did.
    pub error: Option<ParseError>,
}

impl Compilation {
    /// `true` when the whole input was parsed and nothing was reported at
    /// error severity.
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.diagnostics.error_count() == 0
    }

    /// The statement values, or the error that stopped the parse.
    pub fn into_output(self) -> Result<Vec<Option<i64>>, CalcError> {
        match self.error {
            Some(e) => Err(e.into()),
            None => Ok(self.output),
        }
    }
}

/// The arithmetic compiler: linked tables plus repair settings.
#[derive(Debug, Clone)]
pub struct ArithCompiler {
    scanner: LinkedScanner,
    parser: LinkedParser,
    repair: Option<RepairConfig>,
}

impl ArithCompiler {
    /// Builds the compiler from its built-in tables.
    pub fn new() -> Result<Self, CalcError> {
        Self::from_tables(scanner_table()?, parser_table()?)
    }

    /// Builds the compiler from tables read elsewhere, e.g. with
    /// [`tabula::read_tables`].
    pub fn from_tables(scanner: ScannerTable, parser: ParserTable) -> Result<Self, CalcError> {
        Ok(Self {
            scanner: Arc::new(token_factories().link(scanner)?),
            parser: Arc::new(nonterminal_factories().link(parser)?),
            repair: None,
        })
    }

    /// Limits error repair to edits of at most `max_cost` tokens.
    pub fn with_max_cost(mut self, max_cost: usize) -> Self {
        let base = self.repair.unwrap_or_else(|| self.parser.table().repair_config());
        self.repair = Some(RepairConfig { max_cost, ..base });
        self
    }

    pub fn scanner_table(&self) -> &ScannerTable {
        self.scanner.table()
    }

    pub fn parser_table(&self) -> &ParserTable {
        self.parser.table()
    }

    /// Compiles the program read from `reader`; `file` names it in
    /// diagnostics and anchors relative includes.
    pub fn compile_reader<R: Read + 'static>(&self, reader: R, file: &str) -> Compilation {
        let mut ctx = ArithContext::new(Arc::clone(&self.scanner));
        let scanner = Scanner::new(Arc::clone(&self.scanner), ByteSource::new(reader)).with_file(file);
        let mut stream = Preprocessor::new(Box::new(scanner));
        let mut parser = Parser::new(Arc::clone(&self.parser));
        if let Some(config) = self.repair {
            parser = parser.with_repair(config);
        }
        let error = parser.parse(&mut stream, &mut ctx).err();
        if let Err(e) = stream.close(&mut ctx) {
            ctx.report(Diagnostic::error("arith", core_codes::IO_ERROR, e.to_string()));
        }
        log::debug!("{file}: {:?}", parser.stats());
        Compilation {
            output: ctx.output,
            diagnostics: ctx.diagnostics,
            error,
        }
    }

    pub fn compile_str(&self, source: &str) -> Compilation {
        self.compile_reader(std::io::Cursor::new(source.as_bytes().to_vec()), "<input>")
    }

    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<Compilation, CalcError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CalcError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.compile_reader(file, &path.display().to_string()))
    }
}

/// The scanner alone over `source`, for inspecting tokens.
pub fn tokens(compiler: &ArithCompiler, source: &str) -> Result<Vec<Token<ArithValue>>, CalcError> {
    let mut ctx = ArithContext::new(Arc::clone(&compiler.scanner));
    let mut scanner = Scanner::new(
        Arc::clone(&compiler.scanner),
        ByteSource::new(std::io::Cursor::new(source.as_bytes().to_vec())),
    );
    let mut out = Vec::new();
    loop {
        let token = scanner.next_token(&mut ctx)?;
        let eof = token.is_eof();
        out.push(token);
        if eof {
            return Ok(out);
        }
    }
}
