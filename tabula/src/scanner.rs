//! The table-driven scanner.
//!
//! [`Scanner`] walks the DFA of the current start condition over its working
//! buffer, collects every definition that matches at the current position and
//! offers them, longest first and earlier-declared first among equals, to
//! their [`TokenFactory`]. The factory answers with a [`Disposition`]:
//!
//! - [`Disposition::Assemble`] returns the token to the caller,
//! - [`Disposition::Discard`] skips the text and scans on,
//! - [`Disposition::Reject`] offers the same position to the next candidate
//!   without matching again.
//!
//! Input no candidate accepts is handed to
//! [`ScannerClient::scanner_unmatched_token`] one character at a time, so the
//! scanner always makes progress.

use crate::diagnostic::{Diagnostic, DiagnosticSink, codes};
use crate::prescan::Prescanner;
use crate::{EOF, Position, ScanError, ScannerTable, SyntaxError, TableError, Token, TokenStream, UNMATCHED};
use regex_automata::dfa::Automaton;
use smartstring::alias::String;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Consumed buffer prefix beyond which the buffer is compacted.
const COMPACT_THRESHOLD: usize = 4096;

/// A token factory's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Assemble,
    Discard,
    Reject,
}

/// Turns matched text into a token.
///
/// `token` arrives pre-populated with the definition's number, no value and
/// the current position; the factory may change any of them.
pub trait TokenFactory<C, V> {
    fn make(
        &self,
        scanner: &mut ScanState,
        context: &mut C,
        token: &mut Token<V>,
    ) -> Result<Disposition, SyntaxError>;
}

/// Returns the pre-populated token as is. Used for every definition without a
/// registered factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct Assemble;

impl<C, V> TokenFactory<C, V> for Assemble {
    fn make(&self, _: &mut ScanState, _: &mut C, _: &mut Token<V>) -> Result<Disposition, SyntaxError> {
        Ok(Disposition::Assemble)
    }
}

/// Skips the matched text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl<C, V> TokenFactory<C, V> for Discard {
    fn make(&self, _: &mut ScanState, _: &mut C, _: &mut Token<V>) -> Result<Disposition, SyntaxError> {
        Ok(Disposition::Discard)
    }
}

/// Adapts a closure to [`TokenFactory`].
pub struct FnFactory<F>(pub F);

impl<C, V, F> TokenFactory<C, V> for FnFactory<F>
where
    F: Fn(&mut ScanState, &mut C, &mut Token<V>) -> Result<Disposition, SyntaxError>,
{
    fn make(
        &self,
        scanner: &mut ScanState,
        context: &mut C,
        token: &mut Token<V>,
    ) -> Result<Disposition, SyntaxError> {
        (self.0)(scanner, context, token)
    }
}

type SharedTokenFactory<C, V> = Arc<dyn TokenFactory<C, V> + Send + Sync>;

/// Token factories keyed by token name.
pub struct TokenFactories<C, V> {
    factories: HashMap<String, SharedTokenFactory<C, V>>,
}

impl<C, V> Default for TokenFactories<C, V> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<C: 'static, V: 'static> TokenFactories<C, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: TokenFactory<C, V> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_fn<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&mut ScanState, &mut C, &mut Token<V>) -> Result<Disposition, SyntaxError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, FnFactory(f))
    }

    /// Resolves a factory for every definition of `table`.
    ///
    /// A definition uses the factory registered under its link name, or its own
    /// name when it has no link, or [`Assemble`]. Registering a name the table
    /// does not declare is an error.
    pub fn link(self, table: impl Into<Arc<ScannerTable>>) -> Result<LinkedScannerTable<C, V>, TableError> {
        let table = table.into();
        let declared: HashSet<&str> = table.definitions().iter().map(|d| d.name.as_str()).collect();
        if let Some(name) = self.factories.keys().find(|k| !declared.contains(k.as_str())) {
            return Err(TableError::UnknownLink(name.clone()));
        }
        let factories = table
            .definitions()
            .iter()
            .map(|def| match self.factories.get(def.factory_name()) {
                Some(f) => Arc::clone(f),
                None => Arc::new(Assemble) as SharedTokenFactory<C, V>,
            })
            .collect();
        Ok(LinkedScannerTable { table, factories })
    }
}

/// A scanner table together with one factory per definition.
pub struct LinkedScannerTable<C, V> {
    table: Arc<ScannerTable>,
    factories: Vec<SharedTokenFactory<C, V>>,
}

impl<C, V> LinkedScannerTable<C, V> {
    pub fn table(&self) -> &Arc<ScannerTable> {
        &self.table
    }
}

impl<C, V> fmt::Debug for LinkedScannerTable<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedScannerTable")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

/// Hooks a compilation context provides to its scanners.
pub trait ScannerClient<V>: DiagnosticSink {
    /// Called once when the input is exhausted, before the end-of-file token
    /// is returned.
    fn scanner_eof(&mut self, _scanner: &mut ScanState, _token: &mut Token<V>) -> Result<(), SyntaxError> {
        Ok(())
    }

    /// Called with one character of input nothing matched; the token's number
    /// is [`UNMATCHED`]. Returning [`Disposition::Assemble`] hands the token to
    /// the caller, anything else skips the character.
    fn scanner_unmatched_token(
        &mut self,
        scanner: &mut ScanState,
        token: &mut Token<V>,
    ) -> Result<Disposition, SyntaxError> {
        let text = scanner.text();
        let shown = match std::str::from_utf8(text) {
            Ok(s) => format!("{s:?}"),
            Err(_) => format!("byte 0x{}", hex::encode(text)),
        };
        self.report(
            Diagnostic::error("scanner", codes::UNMATCHED_INPUT, format!("unexpected input {shown}"))
                .at_token(token),
        );
        Ok(Disposition::Discard)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScannerStats {
    /// Bytes read from the prescanner.
    pub chars: usize,
    pub matches: usize,
    pub rejects: usize,
    pub unmatched: usize,
}

/// The scanner state factories and hooks see.
#[derive(Debug)]
pub struct ScanState {
    table: Arc<ScannerTable>,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    context_end: usize,
    condition: usize,
    file: Option<Arc<str>>,
    line: usize,
    column: isize,
    token_chars: usize,
    input_done: bool,
    eof_reported: bool,
}

impl ScanState {
    fn new(table: Arc<ScannerTable>) -> Self {
        let condition = table.initial_condition();
        Self {
            table,
            buf: Vec::new(),
            start: 0,
            end: 0,
            context_end: 0,
            condition,
            file: None,
            line: 1,
            column: 1,
            token_chars: 0,
            input_done: false,
            eof_reported: false,
        }
    }

    pub fn table(&self) -> &ScannerTable {
        &self.table
    }

    /// The active start condition.
    pub fn condition(&self) -> usize {
        self.condition
    }

    /// Changes the start condition used by the next scan.
    ///
    /// # Panics
    /// If `condition` is not a condition of the table.
    pub fn set_condition(&mut self, condition: usize) {
        assert!(
            condition < self.table.condition_count(),
            "start condition {condition} out of range"
        );
        self.condition = condition;
    }

    pub fn condition_named(&self, name: &str) -> Option<usize> {
        self.table.condition_index(name)
    }

    /// Advances to the next line. The column is set so that it reads 1 once
    /// the current token has been consumed.
    pub fn count_line(&mut self) {
        self.line += 1;
        self.column = 1 - self.token_chars as isize;
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn set_line(&mut self, line: usize) {
        self.line = line;
    }

    pub fn column(&self) -> usize {
        self.column.max(1) as usize
    }

    pub fn file(&self) -> Option<&Arc<str>> {
        self.file.as_ref()
    }

    pub fn set_file(&mut self, file: impl Into<Arc<str>>) {
        self.file = Some(file.into());
    }

    pub fn position(&self) -> Position {
        Position::new(self.line(), self.column())
    }

    /// Matched text of the current token.
    pub fn text(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub fn text_str(&self) -> Result<&str, SyntaxError> {
        Ok(std::str::from_utf8(self.text())?)
    }

    /// Right-context text following the current token.
    pub fn context(&self) -> &[u8] {
        &self.buf[self.end..self.context_end]
    }

    /// Buffered input after the current token. More input may follow.
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.end..]
    }

    /// Length of the current token in bytes.
    pub fn token_len(&self) -> usize {
        self.end - self.start
    }

    fn prepare(&mut self, len: usize, total: usize) {
        self.end = self.start + len;
        self.context_end = self.start + total;
        self.token_chars = count_chars(self.text());
    }

    fn token<V>(&self, number: i32) -> Token<V> {
        Token::new(number, None).at(self.file.clone(), self.line, self.column())
    }

    fn advance(&mut self) {
        self.column += self.token_chars as isize;
        self.start = self.end;
        self.token_chars = 0;
    }

    fn compact(&mut self) {
        if self.start > 0 && (self.start >= COMPACT_THRESHOLD || self.start == self.buf.len()) {
            self.buf.drain(..self.start);
            self.end -= self.start;
            self.context_end = self.context_end.saturating_sub(self.start);
            self.start = 0;
        }
    }

    /// Pulls more input; `false` once the prescanner is exhausted.
    fn fill<P: Prescanner>(&mut self, prescanner: &mut P, stats: &mut ScannerStats) -> Result<bool, ScanError> {
        if self.input_done {
            return Ok(false);
        }
        let n = prescanner.fill(&mut self.buf)?;
        stats.chars += n;
        if n == 0 {
            self.input_done = true;
        }
        Ok(n > 0)
    }
}

/// A match offered to a factory.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    definition: usize,
    /// Consumed length.
    len: usize,
    /// Length including right context.
    total: usize,
}

/// Counts characters, treating every byte that is not a UTF-8 continuation
/// byte as the start of one.
fn count_chars(text: &[u8]) -> usize {
    text.iter().filter(|&&b| (b & 0xC0) != 0x80).count()
}

/// Length of the first character of `text`: one UTF-8 sequence, or one byte
/// if `text` does not start with a valid one.
/// Length of the UTF-8 sequence a lead byte announces; 1 for anything else.
fn utf8_width(lead: u8) -> usize {
    match lead {
        b if b & 0xE0 == 0xC0 => 2,
        b if b & 0xF0 == 0xE0 => 3,
        b if b & 0xF8 == 0xF0 => 4,
        _ => 1,
    }
}

fn first_char_len(text: &[u8]) -> usize {
    let n = match text.first() {
        None => return 0,
        Some(&b) => utf8_width(b),
    };
    if n == 1 {
        return 1;
    }
    match text.get(..n).map(std::str::from_utf8) {
        Some(Ok(_)) => n,
        _ => 1,
    }
}

/// A scanner over one input.
pub struct Scanner<C, V, P> {
    linked: Arc<LinkedScannerTable<C, V>>,
    prescanner: P,
    state: ScanState,
    stats: ScannerStats,
}

impl<C, V, P> Scanner<C, V, P>
where
    P: Prescanner,
{
    pub fn new(linked: Arc<LinkedScannerTable<C, V>>, prescanner: P) -> Self {
        let state = ScanState::new(Arc::clone(&linked.table));
        Self {
            linked,
            prescanner,
            state,
            stats: ScannerStats::default(),
        }
    }

    /// Sets the file name attached to tokens.
    pub fn with_file(mut self, file: impl Into<Arc<str>>) -> Self {
        self.state.set_file(file);
        self
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ScanState {
        &mut self.state
    }

    pub fn condition(&self) -> usize {
        self.state.condition()
    }

    pub fn set_condition(&mut self, condition: usize) {
        self.state.set_condition(condition);
    }

    pub fn stats(&self) -> ScannerStats {
        self.stats.clone()
    }

    /// Walks the current condition's automaton from the token start, reading
    /// input as long as the automaton is alive, and returns every match
    /// ordered by total length (longest first), then declaration order.
    fn candidates(&mut self) -> Result<Vec<Candidate>, ScanError> {
        let table = Arc::clone(&self.state.table);
        let cd = table.condition_dfa(self.state.condition);
        let dfa = cd.dfa();
        let start = self.state.start;
        let mut sid = cd.start();
        let mut matches = Vec::new();
        let mut i = start;
        let mut dead = false;
        loop {
            if i == self.state.buf.len() && !self.state.fill(&mut self.prescanner, &mut self.stats)? {
                break;
            }
            let b = self.state.buf[i];
            sid = dfa.next_state(sid, b);
            if dfa.is_special_state(sid) {
                if dfa.is_match_state(sid) {
                    for k in 0..dfa.match_len(sid) {
                        matches.push((i - start, cd.definition(dfa.match_pattern(sid, k).as_usize())));
                    }
                } else if dfa.is_dead_state(sid) || dfa.is_quit_state(sid) {
                    dead = true;
                    break;
                }
            }
            i += 1;
        }
        if !dead {
            sid = dfa.next_eoi_state(sid);
            if dfa.is_match_state(sid) {
                for k in 0..dfa.match_len(sid) {
                    matches.push((i - start, cd.definition(dfa.match_pattern(sid, k).as_usize())));
                }
            }
        }

        let mut candidates: Vec<Candidate> = matches
            .into_iter()
            .filter(|&(total, _)| total > 0)
            .filter_map(|(total, definition)| {
                let text = &self.state.buf[start..start + total];
                table
                    .split_right_context(definition, text)
                    .filter(|&len| len > 0)
                    .map(|len| Candidate {
                        definition,
                        len,
                        total,
                    })
            })
            .collect();
        candidates.sort_by(|a, b| b.total.cmp(&a.total).then(a.definition.cmp(&b.definition)));
        Ok(candidates)
    }

    fn report_malformed(&mut self, context: &mut C)
    where
        C: DiagnosticSink,
    {
        for message in self.prescanner.take_malformed() {
            log::warn!("malformed input: {message}");
            context.report(
                Diagnostic::warning("scanner", codes::MALFORMED_INPUT, message).at(
                    self.state.file.clone(),
                    Some(self.state.line()),
                    Some(self.state.column()),
                ),
            );
        }
    }

    fn trace_match(&self, definition: usize) {
        if log::log_enabled!(log::Level::Trace) {
            let text = self.state.text();
            let def = &self.state.table.definitions()[definition];
            log::trace!(
                "MATCHED: condition={}, token={}, param={}, text={:?}",
                self.state.condition,
                def.name,
                def.param,
                match std::str::from_utf8(text) {
                    Ok(s) => s.to_owned(),
                    Err(_) => hex::encode(text),
                }
            );
        }
    }
}

impl<C, V, P> TokenStream<C> for Scanner<C, V, P>
where
    C: ScannerClient<V>,
    P: Prescanner,
{
    type Value = V;

    fn next_token(&mut self, context: &mut C) -> Result<Token<V>, ScanError> {
        let linked = Arc::clone(&self.linked);
        'scan: loop {
            self.state.compact();
            let candidates = self.candidates()?;
            self.report_malformed(context);

            if candidates.is_empty() && self.state.start == self.state.buf.len() {
                let mut token = self.state.token(EOF);
                if !self.state.eof_reported {
                    self.state.eof_reported = true;
                    self.state.prepare(0, 0);
                    context.scanner_eof(&mut self.state, &mut token)?;
                }
                token.number = EOF;
                return Ok(token);
            }

            for cand in candidates {
                self.state.prepare(cand.len, cand.total);
                let mut token = self.state.token(table_param(&self.state.table, cand.definition));
                self.stats.matches += 1;
                self.trace_match(cand.definition);
                match linked.factories[cand.definition].make(&mut self.state, context, &mut token)? {
                    Disposition::Assemble => {
                        self.state.advance();
                        return Ok(token);
                    }
                    Disposition::Discard => {
                        self.state.advance();
                        continue 'scan;
                    }
                    Disposition::Reject => {
                        self.stats.rejects += 1;
                    }
                }
            }

            let want = self.state.buf.get(self.state.start).copied().map_or(1, utf8_width);
            while self.state.buf.len() - self.state.start < want {
                if !self.state.fill(&mut self.prescanner, &mut self.stats)? {
                    break;
                }
            }
            self.report_malformed(context);
            let len = first_char_len(&self.state.buf[self.state.start..]);
            self.state.prepare(len, len);
            let mut token = self.state.token(UNMATCHED);
            self.stats.unmatched += 1;
            let disposition = context.scanner_unmatched_token(&mut self.state, &mut token)?;
            self.state.advance();
            if disposition == Disposition::Assemble {
                return Ok(token);
            }
        }
    }

    fn close(&mut self, _context: &mut C) -> Result<(), ScanError> {
        self.state.input_done = true;
        self.state.eof_reported = true;
        self.state.buf.clear();
        self.state.start = 0;
        self.state.end = 0;
        self.state.context_end = 0;
        Ok(())
    }
}

fn table_param(table: &ScannerTable, definition: usize) -> i32 {
    table.definitions()[definition].param
}

impl<C, V, P> fmt::Debug for Scanner<C, V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
