//! Hand-written tables shared by the unit tests: a small arithmetic language
//! with `/* */` comments.
//!
//! ```text
//! P0 Program    -> Program Statement
//! P1 Program    -> Statement
//! P2 Statement  -> Expression ';'
//! P3 Expression -> Expression '+' Primary
//! P4 Expression -> Expression '-' Primary
//! P5 Expression -> Primary
//! P6 Primary    -> number
//! P7 Primary    -> '(' Expression ')'
//! ```

use crate::diagnostic::{Diagnostic, DiagnosticSink, Diagnostics};
use crate::parser::{NonterminalFactories, Parser, ParserClient, Reduction};
use crate::prescan::ByteSource;
use crate::preprocessor::EscapeValue;
use crate::repair::Repair;
use crate::scanner::{Disposition, Discard, ScanState, Scanner, ScannerClient, TokenFactories};
use crate::scanner_table::TokenDef;
use crate::{Action, BoxedTokenStream, ParserTable, ProductionDef, ProductionId, ScannerTable, SyntaxError, Token};
use std::fmt;
use std::sync::Arc;

pub mod tok {
    pub const NUMBER: i32 = 1;
    pub const PLUS: i32 = 2;
    pub const MINUS: i32 = 3;
    pub const SEMI: i32 = 4;
    pub const LPAREN: i32 = 5;
    pub const RPAREN: i32 = 6;
}

pub mod sym {
    use crate::SymbolId;

    pub const PROGRAM: SymbolId = 7;
    pub const STATEMENT: SymbolId = 8;
    pub const EXPRESSION: SymbolId = 9;
    pub const PRIMARY: SymbolId = 10;
}

/// Reported when the input ends inside a comment.
pub const RUN_ON_COMMENT: u32 = 900;

pub enum Val {
    Int(i64),
    Text(String),
    Stream(BoxedTokenStream<TestContext, Val>),
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Val::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Val::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Text(a), Val::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl EscapeValue<TestContext> for Val {
    fn into_stream(self) -> Option<BoxedTokenStream<TestContext, Val>> {
        match self {
            Val::Stream(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct TestContext {
    pub diagnostics: Diagnostics,
    pub run_on_comments: usize,
    /// Value of every statement, in order.
    pub output: Vec<Option<i64>>,
    pub reductions: Vec<ProductionId>,
    pub repairs: Vec<Repair>,
    pub interrupt_after_reductions: Option<usize>,
}

impl DiagnosticSink for TestContext {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.report(diagnostic);
    }
}

impl ScannerClient<Val> for TestContext {
    fn scanner_eof(&mut self, scanner: &mut ScanState, token: &mut Token<Val>) -> Result<(), SyntaxError> {
        if scanner.condition_named("Comment") == Some(scanner.condition()) {
            self.run_on_comments += 1;
            self.report(Diagnostic::error("test", RUN_ON_COMMENT, "run-on comment").at_token(token));
        }
        Ok(())
    }
}

impl ParserClient<Val> for TestContext {
    fn parser_error_repair(&mut self, parser: &Parser<Self, Val>, token: &Token<Val>, repair: &Repair) {
        self.repairs.push(repair.clone());
        for d in repair.diagnostics(parser.table(), token) {
            self.report(d);
        }
    }

    fn parser_reduction(&mut self, _parser: &Parser<Self, Val>, production: ProductionId) {
        self.reductions.push(production);
    }

    fn interrupted(&self) -> bool {
        self.interrupt_after_reductions
            .is_some_and(|n| self.reductions.len() >= n)
    }
}

pub fn arith_scanner_table() -> ScannerTable {
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
        .token(TokenDef::new("space", "[ \t]+").conditions(normal))
        .token(TokenDef::new("newline", "\r?\n"))
        .token(TokenDef::new("comment_begin", r"/\*").conditions(normal))
        .token(TokenDef::new("comment_end", r"\*/").conditions(comment))
        .token(TokenDef::new("comment_text", "[^*\r\n]+").conditions(comment).link("space"))
        .token(TokenDef::new("comment_star", r"\*").conditions(comment).link("space"))
        .build()
        .unwrap()
}

fn switch_to(scanner: &mut ScanState, condition: &str) -> Result<Disposition, SyntaxError> {
    let c = scanner
        .condition_named(condition)
        .ok_or_else(|| SyntaxError::Fatal(format!("no condition {condition}")))?;
    scanner.set_condition(c);
    Ok(Disposition::Discard)
}

pub fn arith_token_factories() -> TokenFactories<TestContext, Val> {
    TokenFactories::new()
        .register_fn("number", |s: &mut ScanState, _: &mut TestContext, t: &mut Token<Val>| {
            let text = s.text_str()?;
            let n = text
                .parse::<i64>()
                .map_err(|e| SyntaxError::Fatal(format!("bad number {text}: {e}")))?;
            t.value = Some(Val::Int(n));
            Ok(Disposition::Assemble)
        })
        .register("space", Discard)
        .register_fn("newline", |s: &mut ScanState, _: &mut TestContext, _: &mut Token<Val>| {
            s.count_line();
            Ok(Disposition::Discard)
        })
        .register_fn("comment_begin", |s: &mut ScanState, _: &mut TestContext, _: &mut Token<Val>| {
            switch_to(s, "Comment")
        })
        .register_fn("comment_end", |s: &mut ScanState, _: &mut TestContext, _: &mut Token<Val>| {
            switch_to(s, "Normal")
        })
}

pub fn arith_scanner(input: &'static str) -> Scanner<TestContext, Val, ByteSource<&'static [u8]>> {
    let linked = arith_token_factories().link(arith_scanner_table()).unwrap();
    Scanner::new(Arc::new(linked), ByteSource::new(input.as_bytes()))
}

pub fn arith_parser_table() -> ParserTable {
    use Action::{Accept, Goto, Reduce, Shift};
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
        // 0
        .state([
            ("number", Shift(5)),
            ("(", Shift(6)),
            ("Program", Goto(1)),
            ("Statement", Goto(2)),
            ("Expression", Goto(3)),
            ("Primary", Goto(4)),
        ])
        // 1
        .state([
            ("$end", Accept),
            ("number", Shift(5)),
            ("(", Shift(6)),
            ("Statement", Goto(7)),
            ("Expression", Goto(3)),
            ("Primary", Goto(4)),
        ])
        // 2
        .state([("$end", Reduce(1)), ("number", Reduce(1)), ("(", Reduce(1))])
        // 3
        .state([("+", Shift(9)), ("-", Shift(10)), (";", Shift(8))])
        // 4
        .state([("+", Reduce(5)), ("-", Reduce(5)), (";", Reduce(5)), (")", Reduce(5))])
        // 5
        .state([("+", Reduce(6)), ("-", Reduce(6)), (";", Reduce(6)), (")", Reduce(6))])
        // 6
        .state([
            ("number", Shift(5)),
            ("(", Shift(6)),
            ("Expression", Goto(11)),
            ("Primary", Goto(4)),
        ])
        // 7
        .state([("$end", Reduce(0)), ("number", Reduce(0)), ("(", Reduce(0))])
        // 8
        .state([("$end", Reduce(2)), ("number", Reduce(2)), ("(", Reduce(2))])
        // 9
        .state([("number", Shift(5)), ("(", Shift(6)), ("Primary", Goto(12))])
        // 10
        .state([("number", Shift(5)), ("(", Shift(6)), ("Primary", Goto(13))])
        // 11
        .state([("+", Shift(9)), ("-", Shift(10)), (")", Shift(14))])
        // 12
        .state([("+", Reduce(3)), ("-", Reduce(3)), (";", Reduce(3)), (")", Reduce(3))])
        // 13
        .state([("+", Reduce(4)), ("-", Reduce(4)), (";", Reduce(4)), (")", Reduce(4))])
        // 14
        .state([("+", Reduce(7)), ("-", Reduce(7)), (";", Reduce(7)), (")", Reduce(7))])
        .build()
        .unwrap()
}

fn ints(r: &Reduction<'_, Val>) -> Option<(i64, i64)> {
    match (r.rhs_value(0), r.rhs_value(2)) {
        (Some(Val::Int(a)), Some(Val::Int(b))) => Some((*a, *b)),
        _ => None,
    }
}

pub fn arith_nonterminal_factories() -> NonterminalFactories<TestContext, Val> {
    NonterminalFactories::new()
        .register_fn("statement", |r: &mut Reduction<'_, Val>, ctx: &mut TestContext| {
            let value = r.take(0);
            ctx.output.push(match &value {
                Some(Val::Int(n)) => Some(*n),
                _ => None,
            });
            Ok(value)
        })
        .register_fn("add", |r: &mut Reduction<'_, Val>, _: &mut TestContext| {
            Ok(ints(r).and_then(|(a, b)| a.checked_add(b)).map(Val::Int))
        })
        .register_fn("sub", |r: &mut Reduction<'_, Val>, _: &mut TestContext| {
            Ok(ints(r).and_then(|(a, b)| a.checked_sub(b)).map(Val::Int))
        })
        .register_fn("paren", |r: &mut Reduction<'_, Val>, _: &mut TestContext| Ok(r.take(1)))
}

pub fn arith_parser() -> Parser<TestContext, Val> {
    let linked = arith_nonterminal_factories().link(arith_parser_table()).unwrap();
    Parser::new(Arc::new(linked))
}
