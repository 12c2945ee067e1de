//! The table-driven LR parser.
//!
//! [`Parser::parse`] pulls tokens from a [`TokenStream`], shifts and reduces
//! as the [`ParserTable`] says, and computes nonterminal values through the
//! [`NonterminalFactory`] linked to each production. A token with no action
//! starts error repair; see [`crate::repair`].

use crate::diagnostic::{Diagnostic, DiagnosticSink, codes};
use crate::repair::{self, Repair, symbol_label};
use crate::{
    Action, ParseError, ParserTable, Production, ProductionId, RepairConfig, StateId, SymbolId,
    SyntaxError, TableError, Token, TokenStream,
};
use smartstring::alias::String;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::io;
use std::sync::Arc;

/// The view of a reduction handed to a [`NonterminalFactory`].
///
/// Values are indexed by right-hand-side position. A value is `None` when the
/// symbol carried none or was inserted by error repair.
pub struct Reduction<'a, V> {
    table: &'a ParserTable,
    id: ProductionId,
    production: &'a Production,
    values: &'a mut [Option<V>],
}

impl<V> Reduction<'_, V> {
    pub fn rhs_value(&self, i: usize) -> Option<&V> {
        self.values.get(i).and_then(Option::as_ref)
    }

    /// Moves the value at `i` out of the stack.
    pub fn take(&mut self, i: usize) -> Option<V> {
        self.values.get_mut(i).and_then(Option::take)
    }

    /// Length of the right-hand side.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn param(&self) -> i32 {
        self.production.param
    }

    pub fn production_id(&self) -> ProductionId {
        self.id
    }

    pub fn lhs(&self) -> SymbolId {
        self.production.lhs
    }

    pub fn symbol_name(&self, id: SymbolId) -> Option<&str> {
        self.table.symbol_name(id)
    }
}

/// Computes the value of a production's left-hand side.
pub trait NonterminalFactory<C, V> {
    fn make(&self, reduction: &mut Reduction<'_, V>, context: &mut C) -> Result<Option<V>, SyntaxError>;
}

/// The value of the first right-hand-side symbol, or `None` for an empty
/// production. Used for every production without a link.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstValue;

impl<C, V> NonterminalFactory<C, V> for FirstValue {
    fn make(&self, reduction: &mut Reduction<'_, V>, _: &mut C) -> Result<Option<V>, SyntaxError> {
        Ok(reduction.take(0))
    }
}

/// Adapts a closure to [`NonterminalFactory`].
pub struct FnNonterminal<F>(pub F);

impl<C, V, F> NonterminalFactory<C, V> for FnNonterminal<F>
where
    F: Fn(&mut Reduction<'_, V>, &mut C) -> Result<Option<V>, SyntaxError>,
{
    fn make(&self, reduction: &mut Reduction<'_, V>, context: &mut C) -> Result<Option<V>, SyntaxError> {
        (self.0)(reduction, context)
    }
}

type SharedNonterminalFactory<C, V> = Arc<dyn NonterminalFactory<C, V> + Send + Sync>;

/// Nonterminal factories keyed by production link tag.
pub struct NonterminalFactories<C, V> {
    factories: HashMap<String, SharedNonterminalFactory<C, V>>,
}

impl<C, V> Default for NonterminalFactories<C, V> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<C: 'static, V: 'static> NonterminalFactories<C, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, tag: &str, factory: F) -> Self
    where
        F: NonterminalFactory<C, V> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
        self
    }

    pub fn register_fn<F>(self, tag: &str, f: F) -> Self
    where
        F: Fn(&mut Reduction<'_, V>, &mut C) -> Result<Option<V>, SyntaxError> + Send + Sync + 'static,
    {
        self.register(tag, FnNonterminal(f))
    }

    /// Resolves a factory for every production of `table`. Every link tag
    /// must be registered and every registration must be used.
    pub fn link(self, table: impl Into<Arc<ParserTable>>) -> Result<LinkedParserTable<C, V>, TableError> {
        let table = table.into();
        let used: HashSet<&str> = table
            .productions()
            .iter()
            .filter_map(|p| p.link.as_deref())
            .collect();
        if let Some(tag) = self.factories.keys().find(|k| !used.contains(k.as_str())) {
            return Err(TableError::UnknownLink(tag.clone()));
        }
        let factories = table
            .productions()
            .iter()
            .map(|p| match &p.link {
                Some(tag) => self
                    .factories
                    .get(tag)
                    .map(Arc::clone)
                    .ok_or_else(|| TableError::MissingFactory(tag.clone())),
                None => Ok(Arc::new(FirstValue) as SharedNonterminalFactory<C, V>),
            })
            .collect::<Result<_, _>>()?;
        Ok(LinkedParserTable { table, factories })
    }
}

/// A parser table together with one factory per production.
pub struct LinkedParserTable<C, V> {
    table: Arc<ParserTable>,
    factories: Vec<SharedNonterminalFactory<C, V>>,
}

impl<C, V> LinkedParserTable<C, V> {
    pub fn table(&self) -> &Arc<ParserTable> {
        &self.table
    }
}

impl<C, V> fmt::Debug for LinkedParserTable<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedParserTable")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

/// Hooks a compilation context provides to its parser.
pub trait ParserClient<V>: DiagnosticSink + Sized {
    /// The token stream failed to read. The parse ends.
    fn parser_io_exception(&mut self, error: &io::Error) {
        self.report(Diagnostic::fatal("parser", codes::IO_ERROR, error.to_string()));
    }

    /// A factory or hook raised a syntax error, or the parse was interrupted.
    /// The parse ends.
    fn parser_syntax_exception(&mut self, error: &SyntaxError) {
        let d = match error {
            SyntaxError::Interrupted => Diagnostic::warning("parser", codes::INTERRUPTED, error.to_string()),
            _ => Diagnostic::fatal("parser", codes::FATAL, error.to_string()),
        };
        self.report(d);
    }

    /// A syntax error at `token` was repaired. The parse goes on.
    fn parser_error_repair(&mut self, parser: &Parser<Self, V>, token: &Token<V>, repair: &Repair) {
        for d in repair.diagnostics(parser.table(), token) {
            self.report(d);
        }
    }

    /// No repair was found for the syntax error at `token`. The parse ends.
    fn parser_error_fail(&mut self, parser: &Parser<Self, V>, token: &Token<V>) {
        self.report(
            Diagnostic::error(
                "parser",
                codes::REPAIR_FAILED,
                format!("unrecoverable syntax error at {}", parser.symbol_name(token.number)),
            )
            .at_token(token),
        );
    }

    /// Called after every reduction.
    fn parser_reduction(&mut self, _parser: &Parser<Self, V>, _production: ProductionId) {}

    /// Polled before every token fetch and every reduction; `true` stops the
    /// parse with [`SyntaxError::Interrupted`].
    fn interrupted(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParserStats {
    /// Tokens read from the stream.
    pub tokens: usize,
    pub shifts: usize,
    pub reductions: usize,
    /// Syntax errors met.
    pub errors: usize,
    /// Syntax errors repaired.
    pub repairs: usize,
}

/// An LR parser. Reusable: every [`parse`](Parser::parse) starts afresh.
pub struct Parser<C, V> {
    linked: Arc<LinkedParserTable<C, V>>,
    states: Vec<StateId>,
    values: Vec<Option<V>>,
    pending: VecDeque<Token<V>>,
    repair: RepairConfig,
    stats: ParserStats,
}

impl<C, V> Parser<C, V> {
    pub fn new(linked: Arc<LinkedParserTable<C, V>>) -> Self {
        let repair = linked.table.repair_config();
        Self {
            linked,
            states: Vec::new(),
            values: Vec::new(),
            pending: VecDeque::new(),
            repair,
            stats: ParserStats::default(),
        }
    }

    /// Overrides the table's repair limits.
    pub fn with_repair(mut self, config: RepairConfig) -> Self {
        self.repair = config;
        self
    }

    pub fn table(&self) -> &ParserTable {
        &self.linked.table
    }

    /// Printable name of a token number.
    pub fn symbol_name(&self, number: i32) -> std::string::String {
        symbol_label(&self.linked.table, number)
    }

    /// Current depth of the state stack.
    pub fn depth(&self) -> usize {
        self.states.len()
    }

    pub fn stats(&self) -> ParserStats {
        self.stats.clone()
    }

    fn top(&self) -> StateId {
        self.states.last().copied().unwrap_or_else(|| self.linked.table.start_state())
    }

    fn dump_state(&self, incoming: &Token<V>) {
        let mut output = std::string::String::new();
        for state in &self.states {
            output.push_str(&format!("<{state}>  "));
        }
        output.push_str(&format!("<-  {}", self.symbol_name(incoming.number)));
        log::trace!("{output}");
    }
}

impl<C, V> Parser<C, V>
where
    C: ParserClient<V>,
{
    /// Parses `stream` to the end and returns the value of the start symbol.
    ///
    /// Syntax errors are repaired and reported through `context`; the parse
    /// fails only when repair gives up, the stream fails, a factory raises a
    /// [`SyntaxError`], or the context asks for an interrupt.
    pub fn parse<S>(&mut self, stream: &mut S, context: &mut C) -> Result<Option<V>, ParseError>
    where
        S: TokenStream<C, Value = V> + ?Sized,
    {
        self.states.clear();
        self.values.clear();
        self.pending.clear();
        let result = self.run(stream, context);
        match &result {
            Err(ParseError::Io(e)) => context.parser_io_exception(e),
            Err(ParseError::Syntax(e)) => context.parser_syntax_exception(e),
            _ => {}
        }
        self.states.clear();
        self.values.clear();
        self.pending.clear();
        result
    }

    fn run<S>(&mut self, stream: &mut S, context: &mut C) -> Result<Option<V>, ParseError>
    where
        S: TokenStream<C, Value = V> + ?Sized,
    {
        let linked = Arc::clone(&self.linked);
        let table = linked.table.as_ref();
        self.states.push(table.start_state());
        self.values.push(None);
        let mut token = self.fetch(stream, context)?;
        loop {
            if log::log_enabled!(log::Level::Trace) {
                self.dump_state(&token);
            }
            match table.action(self.top(), token.number) {
                Action::Shift(next) => {
                    log::trace!("Shift {next}");
                    self.states.push(next);
                    self.values.push(token.value.take());
                    self.stats.shifts += 1;
                    token = self.fetch(stream, context)?;
                }
                Action::Reduce(p) => {
                    log::trace!("Reduce {p}");
                    Self::poll(context)?;
                    self.reduce(&linked, p, context)?;
                }
                Action::Accept => {
                    log::trace!("Accept");
                    return Ok(self.values.pop().flatten());
                }
                Action::Error => {
                    token = self.recover(token, stream, context)?;
                }
                Action::Goto(_) => {
                    return Err(ParseError::Internal(format!(
                        "goto entry for terminal {}",
                        self.symbol_name(token.number)
                    )));
                }
            }
            debug_assert_eq!(self.states.len(), self.values.len());
        }
    }

    fn poll(context: &C) -> Result<(), SyntaxError> {
        if context.interrupted() {
            return Err(SyntaxError::Interrupted);
        }
        Ok(())
    }

    /// Next token: a pending one if any, else one from the stream.
    fn fetch<S>(&mut self, stream: &mut S, context: &mut C) -> Result<Token<V>, ParseError>
    where
        S: TokenStream<C, Value = V> + ?Sized,
    {
        match self.pending.pop_front() {
            Some(token) => {
                Self::poll(context)?;
                Ok(token)
            }
            None => self.read(stream, context),
        }
    }

    fn read<S>(&mut self, stream: &mut S, context: &mut C) -> Result<Token<V>, ParseError>
    where
        S: TokenStream<C, Value = V> + ?Sized,
    {
        Self::poll(context)?;
        let token = stream.next_token(context)?;
        self.stats.tokens += 1;
        Ok(token)
    }

    fn reduce(
        &mut self,
        linked: &LinkedParserTable<C, V>,
        id: ProductionId,
        context: &mut C,
    ) -> Result<(), ParseError> {
        let table = linked.table.as_ref();
        let production = table
            .production(id)
            .ok_or_else(|| ParseError::Internal(format!("production {id} out of range")))?;
        let n = production.rhs.len();
        if n >= self.states.len() {
            return Err(ParseError::Internal(format!("stack underflow reducing production {id}")));
        }
        let base = self.values.len() - n;
        let value = {
            let mut reduction = Reduction {
                table,
                id,
                production,
                values: &mut self.values[base..],
            };
            linked.factories[id].make(&mut reduction, context)?
        };
        self.states.truncate(base);
        self.values.truncate(base);
        let top = self.top();
        let next = table.goto(top, production.lhs).ok_or_else(|| {
            ParseError::Internal(format!(
                "no goto from state {top} on {}",
                table.symbol_name(production.lhs).unwrap_or("?")
            ))
        })?;
        self.states.push(next);
        self.values.push(value);
        self.stats.reductions += 1;
        context.parser_reduction(self, id);
        Ok(())
    }

    /// Repairs the input in front of `token`, which has no action in the
    /// current state, and returns the token to continue with.
    fn recover<S>(&mut self, token: Token<V>, stream: &mut S, context: &mut C) -> Result<Token<V>, ParseError>
    where
        S: TokenStream<C, Value = V> + ?Sized,
    {
        self.stats.errors += 1;
        log::debug!(
            "syntax error at {} in state {}",
            self.symbol_name(token.number),
            self.top()
        );
        let want = self.repair.max_cost + self.repair.window + 1;
        self.pending.push_front(token);
        while self.pending.len() < want && !self.pending.back().is_some_and(Token::is_eof) {
            let next = self.read(stream, context)?;
            self.pending.push_back(next);
        }
        let lookahead: Vec<i32> = self.pending.iter().map(|t| t.number).collect();

        let Some(repair) = repair::search(self.table(), &self.states, &lookahead, &self.repair) else {
            let failed = &self.pending[0];
            context.parser_error_fail(self, failed);
            return Err(ParseError::Unrepairable {
                symbol: self.symbol_name(failed.number),
                line: failed.line,
                column: failed.column,
            });
        };

        self.stats.repairs += 1;
        context.parser_error_repair(self, &self.pending[0], &repair);
        self.pending.drain(..repair.deletions.len());
        for &number in repair.insertions.iter().rev() {
            let inserted = match self.pending.front() {
                Some(at) => Token::synthetic(number, at),
                None => Token::new(number, None),
            };
            self.pending.push_front(inserted);
        }
        self.fetch(stream, context)
    }
}

impl<C, V> fmt::Debug for Parser<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("states", &self.states)
            .field("repair", &self.repair)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Diagnostics;
    use crate::test_tables::{
        TestContext, Val, arith_nonterminal_factories, arith_parser, arith_parser_table, arith_scanner, tok,
    };
    use crate::{EOF, ScanError, VecStream};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn eval(input: &'static str) -> (Result<Option<Val>, ParseError>, TestContext) {
        init_logger();
        let mut ctx = TestContext::default();
        let mut parser = arith_parser();
        let result = parser.parse(&mut arith_scanner(input), &mut ctx);
        (result, ctx)
    }

    #[test]
    fn evaluates_arithmetic() {
        let (result, ctx) = eval("3 + 4 - 2;");
        assert_eq!(result.unwrap(), Some(Val::Int(5)));
        assert_eq!(ctx.output, vec![Some(5)]);
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn evaluates_several_statements() {
        let (result, ctx) = eval("1 - (2 - 3);\n(10);\n/* skip */ 7 - 1 - 1;");
        assert!(result.is_ok());
        assert_eq!(ctx.output, vec![Some(2), Some(10), Some(5)]);
    }

    #[test]
    fn reductions_follow_the_table() {
        let (_, ctx) = eval("3 + 4;");
        // number -> Primary, Primary -> Expression, number -> Primary,
        // Expression + Primary, Statement, Program
        assert_eq!(ctx.reductions, vec![6, 5, 6, 3, 2, 1]);
    }

    #[test]
    fn reductions_are_deterministic() {
        let (_, a) = eval("(1 + 2) - 3; 4;");
        let (_, b) = eval("(1 + 2) - 3; 4;");
        assert_eq!(a.reductions, b.reductions);
        assert_eq!(a.output, b.output);
    }

    #[test]
    fn missing_operand_is_inserted() {
        let (result, ctx) = eval("3 + ;");
        assert_eq!(result.unwrap(), None);
        assert_eq!(ctx.output, vec![None]);
        assert_eq!(ctx.repairs.len(), 1);
        assert_eq!(ctx.repairs[0].insertions, vec![tok::NUMBER]);
        assert!(ctx.repairs[0].deletions.is_empty());
        let d = ctx.diagnostics.iter().next().unwrap();
        assert_eq!(d.code, codes::REPAIR_INSERT);
        assert_eq!(d.message, "inserted number");
        assert_eq!((d.line, d.column), (Some(1), Some(5)));
    }

    #[test]
    fn stray_paren_is_deleted() {
        let (result, ctx) = eval("3 ) ; 4;");
        assert!(result.is_ok());
        assert_eq!(ctx.output, vec![Some(3), Some(4)]);
        assert_eq!(ctx.repairs[0].deletions, vec![tok::RPAREN]);
        assert!(ctx.diagnostics.contains_code(codes::REPAIR_DELETE));
    }

    #[test]
    fn empty_input_gets_a_statement() {
        let (result, ctx) = eval("");
        assert_eq!(result.unwrap(), None);
        assert_eq!(ctx.repairs[0].insertions, vec![tok::NUMBER, tok::SEMI]);
        assert_eq!(ctx.output, vec![None]);
    }

    #[test]
    fn escape_tokens_reaching_the_parser_are_deleted() {
        let mut ctx = TestContext::default();
        let mut stream = VecStream::new([
            Token::new(-4, None),
            Token::new(tok::NUMBER, Some(Val::Int(8))),
            Token::new(tok::SEMI, None),
        ]);
        let value = arith_parser().parse(&mut stream, &mut ctx).unwrap();
        assert_eq!(value, Some(Val::Int(8)));
        assert_eq!(ctx.repairs[0].deletions, vec![-4]);
        assert!(ctx.diagnostics.iter().any(|d| d.message == "deleted <token -4>"));
    }

    #[test]
    fn unrepairable_input_fails() {
        let mut ctx = TestContext::default();
        let mut parser = arith_parser().with_repair(RepairConfig {
            max_cost: 0,
            ..RepairConfig::default()
        });
        let err = parser.parse(&mut arith_scanner("1 + ;"), &mut ctx).unwrap_err();
        match err {
            ParseError::Unrepairable { symbol, line, column } => {
                assert_eq!(symbol, ";");
                assert_eq!((line, column), (Some(1), Some(5)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(ctx.diagnostics.contains_code(codes::REPAIR_FAILED));
        assert_eq!(parser.stats().errors, 1);
        assert_eq!(parser.stats().repairs, 0);
    }

    #[test]
    fn interrupt_stops_the_parse() {
        let mut ctx = TestContext {
            interrupt_after_reductions: Some(2),
            ..TestContext::default()
        };
        let err = arith_parser().parse(&mut arith_scanner("1; 2; 3;"), &mut ctx).unwrap_err();
        assert!(err.is_interrupt());
        assert_eq!(ctx.reductions.len(), 2);
        assert!(ctx.diagnostics.contains_code(codes::INTERRUPTED));
    }

    #[test]
    fn factory_errors_end_the_parse() {
        let (result, ctx) = eval("99999999999999999999;");
        let err = result.unwrap_err();
        assert!(matches!(err, ParseError::Syntax(SyntaxError::Fatal(_))));
        assert!(ctx.diagnostics.contains_code(codes::FATAL));
    }

    #[test]
    fn stream_io_errors_end_the_parse() {
        struct Broken;
        impl TokenStream<TestContext> for Broken {
            type Value = Val;
            fn next_token(&mut self, _: &mut TestContext) -> Result<Token<Val>, ScanError> {
                Err(ScanError::Io(io::Error::other("cable cut")))
            }
        }
        let mut ctx = TestContext::default();
        let err = arith_parser().parse(&mut Broken, &mut ctx).unwrap_err();
        assert!(matches!(err, ParseError::Io(_)));
        let d = ctx.diagnostics.iter().next().unwrap();
        assert_eq!(d.code, codes::IO_ERROR);
        assert_eq!(d.message, "cable cut");
    }

    #[test]
    fn parser_is_reusable() {
        let mut ctx = TestContext::default();
        let mut parser = arith_parser();
        assert!(parser.parse(&mut arith_scanner("1 + ;"), &mut ctx).is_ok());
        let value = parser.parse(&mut arith_scanner("2 + 2;"), &mut ctx).unwrap();
        assert_eq!(value, Some(Val::Int(4)));
        assert_eq!(parser.depth(), 0);
        let stats = parser.stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.repairs, 1);
        assert_eq!(stats.tokens, 9);
    }

    #[test]
    fn symbol_names() {
        let parser = arith_parser();
        assert_eq!(parser.symbol_name(EOF), "$end");
        assert_eq!(parser.symbol_name(tok::LPAREN), "(");
        assert_eq!(parser.symbol_name(-1), "<token -1>");
        assert_eq!(parser.symbol_name(9), "<token 9>");
    }

    /// Checks the two stacks after every reduction.
    #[derive(Default)]
    struct Balanced {
        diagnostics: Diagnostics,
        checked: usize,
    }

    impl DiagnosticSink for Balanced {
        fn report(&mut self, d: Diagnostic) {
            self.diagnostics.report(d);
        }
    }

    impl ParserClient<i64> for Balanced {
        fn parser_reduction(&mut self, parser: &Parser<Self, i64>, _: ProductionId) {
            assert_eq!(parser.states.len(), parser.values.len());
            assert_eq!(parser.values[0], None);
            self.checked += 1;
        }
    }

    #[test]
    fn stacks_stay_balanced() {
        let sum = |r: &mut Reduction<'_, i64>, _: &mut Balanced| {
            Ok(match (r.rhs_value(0), r.rhs_value(2)) {
                (Some(a), Some(b)) if r.production_id() == 3 => Some(a + b),
                (Some(a), Some(b)) => Some(a - b),
                _ => None,
            })
        };
        let factories = NonterminalFactories::<Balanced, i64>::new()
            .register_fn("statement", |r, _| Ok(r.take(0)))
            .register_fn("add", sum)
            .register_fn("sub", sum)
            .register_fn("paren", |r, _| {
                assert_eq!(r.len(), 3);
                assert_eq!(r.symbol_name(r.lhs()), Some("Primary"));
                Ok(r.take(1))
            });
        let linked = Arc::new(factories.link(arith_parser_table()).unwrap());
        let n = |v: i64| Token::new(tok::NUMBER, Some(v));
        let p = |t: i32| Token::new(t, None);
        let mut stream = VecStream::new([
            p(tok::LPAREN),
            n(5),
            p(tok::MINUS),
            n(2),
            p(tok::RPAREN),
            p(tok::PLUS),
            p(tok::SEMI),
        ]);
        let mut ctx = Balanced::default();
        let value = Parser::new(linked).parse(&mut stream, &mut ctx).unwrap();
        // the missing operand after '+' is inserted without a value
        assert_eq!(value, None);
        assert!(ctx.checked > 0);
        assert!(ctx.diagnostics.contains_code(codes::REPAIR_INSERT));
    }

    #[test]
    fn first_value_is_the_default() {
        let factories = NonterminalFactories::<Balanced, i64>::new()
            .register_fn("statement", |r, _| Ok(r.take(0).map(|v| v * 10)))
            .register("add", FirstValue)
            .register("sub", FirstValue)
            .register("paren", FirstValue);
        let linked = Arc::new(factories.link(arith_parser_table()).unwrap());
        let mut stream = VecStream::new([Token::new(tok::NUMBER, Some(4)), Token::new(tok::SEMI, None)]);
        let value = Parser::new(linked).parse(&mut stream, &mut Balanced::default()).unwrap();
        assert_eq!(value, Some(40));
    }

    #[test]
    fn linking_requires_exact_tags() {
        let err = NonterminalFactories::<TestContext, Val>::new()
            .register("statement", FirstValue)
            .link(arith_parser_table())
            .unwrap_err();
        assert!(matches!(err, TableError::MissingFactory(_)));

        let err = arith_nonterminal_factories()
            .register("mul", FirstValue)
            .link(arith_parser_table())
            .unwrap_err();
        assert!(matches!(err, TableError::UnknownLink(ref t) if t == "mul"));
    }
}
