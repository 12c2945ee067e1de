//! Scanner tables: token definitions, start conditions and their DFAs.
//!
//! A [`ScannerTable`] is compiled once by [`ScannerTableBuilder::build`] (or
//! loaded with [`ScannerTable::read_from`]) and is immutable afterwards. One
//! anchored dense DFA is built per start condition from the patterns of the
//! definitions active in it; the DFA's pattern ids map back to definition
//! indices. Definitions with a right context get a second pair of DFAs (head
//! and tail) used to split a match into consumed text and trailing context.

use crate::TableError;
use crate::codec::{Decoder, Encoder, prealloc, SCANNER_MAGIC};
use regex_automata::{
    Anchored, Input, MatchKind,
    dfa::{Automaton, StartKind, dense},
    nfa::thompson::{self, NFA},
    util::{primitives::StateID, syntax},
};
use smartstring::alias::String;
use std::collections::HashSet;
use std::io::{Read, Write};

/// Condition created when a table declares none.
pub const DEFAULT_CONDITION: &str = "INITIAL";

/// A token definition as handed to the builder.
#[derive(Debug, Clone)]
pub struct TokenDef {
    name: String,
    pattern: std::string::String,
    right_context: Option<std::string::String>,
    conditions: Option<Vec<String>>,
    param: i32,
    link: Option<String>,
}

impl TokenDef {
    /// A definition named `name` matching the regular expression `pattern`.
    ///
    /// Defaults: token number 0, active in every condition, no right context,
    /// factory looked up by `name`.
    pub fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            right_context: None,
            conditions: None,
            param: 0,
            link: None,
        }
    }

    /// Token number pre-populated into matched tokens.
    pub fn param(mut self, param: i32) -> Self {
        self.param = param;
        self
    }

    /// Restricts the definition to the named start conditions.
    pub fn conditions<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.conditions = Some(names.into_iter().map(String::from).collect());
        self
    }

    /// Trailing context that must follow the match but is not consumed.
    pub fn right_context(mut self, pattern: &str) -> Self {
        self.right_context = Some(pattern.into());
        self
    }

    /// Uses the factory registered for another declared token name.
    pub fn link(mut self, name: &str) -> Self {
        self.link = Some(name.into());
        self
    }
}

/// A compiled token definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDefinition {
    pub name: String,
    pub pattern: std::string::String,
    pub right_context: Option<std::string::String>,
    /// Indices of the start conditions the definition is active in.
    pub conditions: Vec<usize>,
    pub param: i32,
    pub link: Option<String>,
}

impl TokenDefinition {
    /// Name of the token whose factory this definition uses.
    pub fn factory_name(&self) -> &str {
        self.link.as_deref().unwrap_or(&self.name)
    }
}

/// Per-condition automaton.
#[derive(Clone)]
pub(crate) struct ConditionDfa {
    dfa: dense::DFA<Vec<u32>>,
    start: StateID,
    /// Pattern id -> definition index.
    patterns: Vec<usize>,
}

impl ConditionDfa {
    fn new(dfa: dense::DFA<Vec<u32>>, patterns: Vec<usize>) -> Result<Self, TableError> {
        let start = start_state(&dfa)?;
        Ok(Self {
            dfa,
            start,
            patterns,
        })
    }

    #[inline]
    pub(crate) fn dfa(&self) -> &dense::DFA<Vec<u32>> {
        &self.dfa
    }

    #[inline]
    pub(crate) fn start(&self) -> StateID {
        self.start
    }

    #[inline]
    pub(crate) fn definition(&self, pattern: usize) -> usize {
        self.patterns[pattern]
    }
}

/// Head and tail automata of a right-context definition.
#[derive(Clone)]
pub(crate) struct ContextDfa {
    head: dense::DFA<Vec<u32>>,
    head_start: StateID,
    tail: dense::DFA<Vec<u32>>,
    tail_start: StateID,
}

impl ContextDfa {
    fn new(head: dense::DFA<Vec<u32>>, tail: dense::DFA<Vec<u32>>) -> Result<Self, TableError> {
        Ok(Self {
            head_start: start_state(&head)?,
            tail_start: start_state(&tail)?,
            head,
            tail,
        })
    }
}

/// An immutable scanner table.
#[derive(Clone)]
pub struct ScannerTable {
    conditions: Vec<String>,
    initial: usize,
    definitions: Vec<TokenDefinition>,
    dfas: Vec<ConditionDfa>,
    contexts: Vec<Option<ContextDfa>>,
}

impl std::fmt::Debug for ScannerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerTable")
            .field("conditions", &self.conditions)
            .field("initial", &self.initial)
            .field("definitions", &self.definitions)
            .finish_non_exhaustive()
    }
}

impl ScannerTable {
    pub fn builder() -> ScannerTableBuilder {
        ScannerTableBuilder::default()
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    pub fn condition_index(&self, name: &str) -> Option<usize> {
        self.conditions.iter().position(|c| c == name)
    }

    pub fn condition_name(&self, index: usize) -> Option<&str> {
        self.conditions.get(index).map(|c| c.as_str())
    }

    pub fn initial_condition(&self) -> usize {
        self.initial
    }

    pub fn definitions(&self) -> &[TokenDefinition] {
        &self.definitions
    }

    pub fn definition(&self, index: usize) -> Option<&TokenDefinition> {
        self.definitions.get(index)
    }

    /// Returns `true` if some definition is named `name`.
    pub fn declares(&self, name: &str) -> bool {
        self.definitions.iter().any(|d| d.name == name)
    }

    #[inline]
    pub(crate) fn condition_dfa(&self, condition: usize) -> &ConditionDfa {
        &self.dfas[condition]
    }

    /// Splits a right-context match of `text` into consumed length.
    ///
    /// Returns the longest prefix length `k > 0` such that the head pattern
    /// matches `text[..k]` exactly and the context pattern matches `text[k..]`
    /// exactly. Definitions without a right context consume all of `text`.
    pub(crate) fn split_right_context(&self, definition: usize, text: &[u8]) -> Option<usize> {
        let Some(ctx) = &self.contexts[definition] else {
            return Some(text.len());
        };
        let mut ends = Vec::new();
        let dfa = &ctx.head;
        let mut sid = ctx.head_start;
        let mut dead = false;
        for (i, &b) in text.iter().enumerate() {
            sid = dfa.next_state(sid, b);
            if dfa.is_special_state(sid) {
                if dfa.is_match_state(sid) {
                    ends.push(i);
                } else if dfa.is_dead_state(sid) || dfa.is_quit_state(sid) {
                    dead = true;
                    break;
                }
            }
        }
        if !dead && dfa.is_match_state(dfa.next_eoi_state(sid)) {
            ends.push(text.len());
        }
        ends.into_iter()
            .rev()
            .filter(|&k| k > 0)
            .find(|&k| matches_exactly(&ctx.tail, ctx.tail_start, &text[k..]))
    }

    /// Verifies the table invariants.
    pub fn check(&self) -> Result<(), TableError> {
        if self.conditions.is_empty() {
            return Err(TableError::Malformed("no start conditions".into()));
        }
        let mut seen = HashSet::new();
        for name in &self.conditions {
            if !seen.insert(name.as_str()) {
                return Err(TableError::DuplicateCondition(name.clone()));
            }
        }
        if self.initial >= self.conditions.len() {
            return Err(TableError::Malformed(format!(
                "initial condition {} out of range",
                self.initial
            )));
        }
        for def in &self.definitions {
            if let Some(&c) = def.conditions.iter().find(|&&c| c >= self.conditions.len()) {
                return Err(TableError::Malformed(format!(
                    "token {:?} refers to condition {c} out of range",
                    def.name
                )));
            }
            if let Some(link) = &def.link {
                if !self.declares(link) {
                    return Err(TableError::UnresolvedLink {
                        token: def.name.clone(),
                        link: link.clone(),
                    });
                }
            }
        }
        if self.dfas.len() != self.conditions.len() {
            return Err(TableError::Malformed(format!(
                "{} automata for {} conditions",
                self.dfas.len(),
                self.conditions.len()
            )));
        }
        for (c, cd) in self.dfas.iter().enumerate() {
            if cd.dfa.pattern_len() != cd.patterns.len() {
                return Err(TableError::Malformed(format!(
                    "condition {:?}: {} patterns mapped, automaton has {}",
                    self.conditions[c],
                    cd.patterns.len(),
                    cd.dfa.pattern_len()
                )));
            }
            for &d in &cd.patterns {
                let active = self
                    .definitions
                    .get(d)
                    .is_some_and(|def| def.conditions.contains(&c));
                if !active {
                    return Err(TableError::Malformed(format!(
                        "condition {:?} maps a pattern to inactive definition {d}",
                        self.conditions[c]
                    )));
                }
            }
        }
        if self.contexts.len() != self.definitions.len() {
            return Err(TableError::Malformed("right-context automata missing".into()));
        }
        for (def, ctx) in self.definitions.iter().zip(&self.contexts) {
            if def.right_context.is_some() != ctx.is_some() {
                return Err(TableError::Malformed(format!(
                    "token {:?}: right-context automaton mismatch",
                    def.name
                )));
            }
        }
        Ok(())
    }

    /// Serializes the table as one block.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<(), TableError> {
        let mut enc = Encoder::new(w);
        enc.header(SCANNER_MAGIC)?;
        enc.usize(self.conditions.len())?;
        for c in &self.conditions {
            enc.str(c)?;
        }
        enc.usize(self.initial)?;
        enc.usize(self.definitions.len())?;
        for def in &self.definitions {
            enc.str(&def.name)?;
            enc.str(&def.pattern)?;
            enc.opt_str(def.right_context.as_deref())?;
            enc.i32(def.param)?;
            enc.opt_str(def.link.as_deref())?;
            enc.usize(def.conditions.len())?;
            for &c in &def.conditions {
                enc.usize(c)?;
            }
        }
        for cd in &self.dfas {
            enc.bytes(&dfa_to_bytes(&cd.dfa))?;
            enc.usize(cd.patterns.len())?;
            for &p in &cd.patterns {
                enc.usize(p)?;
            }
        }
        for ctx in self.contexts.iter().flatten() {
            enc.bytes(&dfa_to_bytes(&ctx.head))?;
            enc.bytes(&dfa_to_bytes(&ctx.tail))?;
        }
        Ok(())
    }

    /// Reads a table written by [`write_to`](Self::write_to) and checks it.
    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<Self, TableError> {
        let mut dec = Decoder::new(r);
        dec.header(SCANNER_MAGIC, "scanner")?;
        let n = dec.count()?;
        let mut conditions = prealloc(n);
        for _ in 0..n {
            conditions.push(dec.string()?);
        }
        let initial = dec.usize()?;
        let n = dec.count()?;
        let mut definitions = prealloc(n);
        for _ in 0..n {
            let name = dec.string()?;
            let pattern = dec.std_string()?;
            let right_context = if dec.bool()? {
                Some(dec.std_string()?)
            } else {
                None
            };
            let param = dec.i32()?;
            let link = dec.opt_string()?;
            let k = dec.count()?;
            let mut conds = prealloc(k);
            for _ in 0..k {
                conds.push(dec.usize()?);
            }
            definitions.push(TokenDefinition {
                name,
                pattern,
                right_context,
                conditions: conds,
                param,
                link,
            });
        }
        let mut dfas = Vec::with_capacity(conditions.len());
        for _ in 0..conditions.len() {
            let dfa = dfa_from_bytes(&dec.bytes()?)?;
            let k = dec.count()?;
            let mut patterns = prealloc(k);
            for _ in 0..k {
                patterns.push(dec.usize()?);
            }
            dfas.push(ConditionDfa::new(dfa, patterns)?);
        }
        let mut contexts = Vec::with_capacity(definitions.len());
        for def in &definitions {
            if def.right_context.is_some() {
                let head = dfa_from_bytes(&dec.bytes()?)?;
                let tail = dfa_from_bytes(&dec.bytes()?)?;
                contexts.push(Some(ContextDfa::new(head, tail)?));
            } else {
                contexts.push(None);
            }
        }
        let table = Self {
            conditions,
            initial,
            definitions,
            dfas,
            contexts,
        };
        table.check()?;
        log::debug!(
            "loaded scanner table: {} conditions, {} definitions",
            table.conditions.len(),
            table.definitions.len()
        );
        Ok(table)
    }
}

/// Collects conditions and definitions and compiles them into a [`ScannerTable`].
#[derive(Debug, Clone, Default)]
pub struct ScannerTableBuilder {
    conditions: Vec<String>,
    initial: Option<String>,
    defs: Vec<TokenDef>,
}

impl ScannerTableBuilder {
    /// Declares a start condition. The first declared one is the initial
    /// condition unless [`initial`](Self::initial) says otherwise.
    pub fn condition(mut self, name: &str) -> Self {
        self.conditions.push(name.into());
        self
    }

    pub fn initial(mut self, name: &str) -> Self {
        self.initial = Some(name.into());
        self
    }

    /// Appends a definition. Declaration order breaks ties between matches of
    /// equal length.
    pub fn token(mut self, def: TokenDef) -> Self {
        self.defs.push(def);
        self
    }

    pub fn build(self) -> Result<ScannerTable, TableError> {
        let mut conditions = self.conditions;
        if conditions.is_empty() {
            conditions.push(DEFAULT_CONDITION.into());
        }
        let lookup = |name: &str| -> Result<usize, TableError> {
            conditions
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| TableError::UnknownCondition(name.into()))
        };
        let initial = match &self.initial {
            Some(name) => lookup(name)?,
            None => 0,
        };

        let mut definitions = Vec::with_capacity(self.defs.len());
        for def in self.defs {
            let conds = match &def.conditions {
                Some(names) => names
                    .iter()
                    .map(|n| lookup(n))
                    .collect::<Result<Vec<_>, _>>()?,
                None => (0..conditions.len()).collect(),
            };
            definitions.push(TokenDefinition {
                name: def.name,
                pattern: def.pattern,
                right_context: def.right_context,
                conditions: conds,
                param: def.param,
                link: def.link,
            });
        }

        let mut dfas = Vec::with_capacity(conditions.len());
        for c in 0..conditions.len() {
            let mut regexes = Vec::new();
            let mut patterns = Vec::new();
            for (d, def) in definitions.iter().enumerate() {
                if !def.conditions.contains(&c) {
                    continue;
                }
                let regex = match &def.right_context {
                    Some(rc) => format!("(?:{})(?:{})", def.pattern, rc),
                    None => def.pattern.clone(),
                };
                regexes.push((def.name.as_str(), regex));
                patterns.push(d);
            }
            let pairs: Vec<(&str, &str)> =
                regexes.iter().map(|(n, r)| (*n, r.as_str())).collect();
            let dfa = compile(&pairs)?;
            log::debug!(
                "condition {:?}: {} patterns, {} bytes of automaton",
                conditions[c],
                patterns.len(),
                dfa.memory_usage()
            );
            dfas.push(ConditionDfa::new(dfa, patterns)?);
        }

        let mut contexts = Vec::with_capacity(definitions.len());
        for def in &definitions {
            match &def.right_context {
                Some(rc) => {
                    let head = compile(&[(def.name.as_str(), def.pattern.as_str())])?;
                    let tail = compile(&[(def.name.as_str(), rc.as_str())])?;
                    contexts.push(Some(ContextDfa::new(head, tail)?));
                }
                None => contexts.push(None),
            }
        }

        let table = ScannerTable {
            conditions,
            initial,
            definitions,
            dfas,
            contexts,
        };
        table.check()?;
        Ok(table)
    }
}

/// Compiles `(token, pattern)` pairs into one anchored automaton whose pattern
/// ids follow the order of `patterns`.
fn compile(patterns: &[(&str, &str)]) -> Result<dense::DFA<Vec<u32>>, TableError> {
    if patterns.is_empty() {
        return dense::DFA::never_match().map_err(|e| TableError::Automaton(e.to_string()));
    }
    let conf = syntax::Config::new().utf8(false);
    let mut hirs = Vec::with_capacity(patterns.len());
    for &(token, pattern) in patterns {
        hirs.push(
            syntax::parse_with(pattern, &conf).map_err(|e| TableError::Pattern {
                token: token.into(),
                message: e.to_string(),
            })?,
        );
    }
    let nfa = NFA::compiler()
        .configure(thompson::Config::new().utf8(false))
        .build_many_from_hir(&hirs)
        .map_err(|e| TableError::Automaton(e.to_string()))?;
    dense::Builder::new()
        .configure(
            dense::DFA::config()
                .match_kind(MatchKind::All)
                .start_kind(StartKind::Anchored),
        )
        .build_from_nfa(&nfa)
        .map_err(|e| TableError::Automaton(e.to_string()))
}

fn start_state(dfa: &dense::DFA<Vec<u32>>) -> Result<StateID, TableError> {
    dfa.start_state_forward(&Input::new(b"").anchored(Anchored::Yes))
        .map_err(|e| TableError::Automaton(e.to_string()))
}

fn matches_exactly(dfa: &dense::DFA<Vec<u32>>, start: StateID, text: &[u8]) -> bool {
    let mut sid = start;
    for &b in text {
        sid = dfa.next_state(sid, b);
        if dfa.is_dead_state(sid) || dfa.is_quit_state(sid) {
            return false;
        }
    }
    dfa.is_match_state(dfa.next_eoi_state(sid))
}

fn dfa_to_bytes(dfa: &dense::DFA<Vec<u32>>) -> Vec<u8> {
    let (bytes, pad) = dfa.to_bytes_little_endian();
    bytes[pad..].to_vec()
}

fn dfa_from_bytes(bytes: &[u8]) -> Result<dense::DFA<Vec<u32>>, TableError> {
    if cfg!(target_endian = "big") {
        return Err(TableError::Automaton(
            "little-endian automata cannot be loaded on a big-endian host".into(),
        ));
    }
    // DFA deserialization needs 4-byte alignment.
    let mut storage = vec![0u8; bytes.len() + 3];
    let offset = storage.as_ptr().align_offset(4);
    if offset > 3 {
        return Err(TableError::Automaton("cannot align automaton".into()));
    }
    let aligned = &mut storage[offset..offset + bytes.len()];
    aligned.copy_from_slice(bytes);
    let (dfa, _) =
        dense::DFA::from_bytes(&*aligned).map_err(|e| TableError::Automaton(e.to_string()))?;
    Ok(dfa.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_tables::arith_scanner_table;
    use std::io::Cursor;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn conditions_and_defaults() {
        init_logger();
        let table = arith_scanner_table();
        assert_eq!(table.condition_count(), 2);
        assert_eq!(table.condition_index("Comment"), Some(1));
        assert_eq!(table.condition_name(0), Some("Normal"));
        assert_eq!(table.initial_condition(), 0);
        let newline = table
            .definitions()
            .iter()
            .find(|d| d.name == "newline")
            .unwrap();
        assert_eq!(newline.conditions, vec![0, 1]);
        let text = table
            .definitions()
            .iter()
            .find(|d| d.name == "comment_text")
            .unwrap();
        assert_eq!(text.conditions, vec![1]);
        assert_eq!(text.factory_name(), "space");
    }

    #[test]
    fn missing_conditions_get_a_default() {
        let table = ScannerTable::builder()
            .token(TokenDef::new("a", "a").param(1))
            .build()
            .unwrap();
        assert_eq!(table.condition_count(), 1);
        assert_eq!(table.condition_name(0), Some(DEFAULT_CONDITION));
    }

    #[test]
    fn duplicate_condition_is_rejected() {
        let err = ScannerTable::builder()
            .condition("A")
            .condition("A")
            .build()
            .unwrap_err();
        assert!(matches!(err, TableError::DuplicateCondition(ref c) if c == "A"));
    }

    #[test]
    fn unknown_condition_is_rejected() {
        let err = ScannerTable::builder()
            .condition("A")
            .token(TokenDef::new("x", "x").conditions(["B"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, TableError::UnknownCondition(ref c) if c == "B"));

        let err = ScannerTable::builder()
            .condition("A")
            .initial("Z")
            .build()
            .unwrap_err();
        assert!(matches!(err, TableError::UnknownCondition(_)));
    }

    #[test]
    fn unresolved_link_is_rejected() {
        let err = ScannerTable::builder()
            .token(TokenDef::new("comment_text", "[a-z]+").link("spaces"))
            .token(TokenDef::new("space", " +"))
            .build()
            .unwrap_err();
        assert!(matches!(err, TableError::UnresolvedLink { .. }));
    }

    #[test]
    fn bad_pattern_names_the_token() {
        let err = ScannerTable::builder()
            .token(TokenDef::new("broken", "(a"))
            .build()
            .unwrap_err();
        match err {
            TableError::Pattern { token, .. } => assert_eq!(token, "broken"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn condition_without_definitions_never_matches() {
        let table = ScannerTable::builder()
            .condition("A")
            .condition("Empty")
            .token(TokenDef::new("a", "a").conditions(["A"]))
            .build()
            .unwrap();
        let cd = table.condition_dfa(1);
        let sid = cd.dfa().next_state(cd.start(), b'a');
        assert!(!cd.dfa().is_match_state(cd.dfa().next_eoi_state(sid)));
    }

    #[test]
    fn right_context_split_takes_longest_head() {
        let table = ScannerTable::builder()
            .token(TokenDef::new("call", "[a-z]+").right_context(r"\("))
            .token(TokenDef::new("ab", "a*").right_context("a*b"))
            .build()
            .unwrap();
        assert_eq!(table.split_right_context(0, b"foo("), Some(3));
        assert_eq!(table.split_right_context(0, b"foo"), None);
        // "aaab": the head may take all three a's, leaving "b" for the context.
        assert_eq!(table.split_right_context(1, b"aaab"), Some(3));
        // the head must consume something
        assert_eq!(table.split_right_context(1, b"b"), None);
    }

    #[test]
    fn definitions_without_context_consume_everything() {
        let table = arith_scanner_table();
        assert_eq!(table.split_right_context(0, b"123"), Some(3));
    }

    #[test]
    fn round_trip_preserves_table() {
        init_logger();
        let table = ScannerTable::builder()
            .condition("A")
            .condition("B")
            .initial("B")
            .token(TokenDef::new("call", "[a-z]+").right_context(r"\(").param(3))
            .token(TokenDef::new("word", "[a-z]+").param(4).conditions(["A"]))
            .token(TokenDef::new("word2", "[a-z]+").link("word").conditions(["B"]))
            .build()
            .unwrap();
        let mut out = Vec::new();
        table.write_to(&mut out).unwrap();
        let back = ScannerTable::read_from(&mut Cursor::new(out)).unwrap();
        assert_eq!(back.definitions(), table.definitions());
        assert_eq!(back.initial_condition(), 1);
        assert_eq!(back.condition_name(1), Some("B"));
        assert_eq!(back.split_right_context(0, b"ab("), Some(2));
    }

    #[test]
    fn truncated_table_is_rejected() {
        let table = arith_scanner_table();
        let mut out = Vec::new();
        table.write_to(&mut out).unwrap();
        out.truncate(out.len() - 7);
        let err = ScannerTable::read_from(&mut Cursor::new(out)).unwrap_err();
        assert!(matches!(err, TableError::Io(_)));
    }

    #[test]
    fn garbage_automaton_is_rejected() {
        let mut out = Vec::new();
        let mut enc = Encoder::new(&mut out);
        enc.header(SCANNER_MAGIC).unwrap();
        enc.usize(1).unwrap();
        enc.str("A").unwrap();
        enc.usize(0).unwrap();
        enc.usize(0).unwrap();
        enc.bytes(&[0u8; 64]).unwrap();
        enc.usize(0).unwrap();
        let err = ScannerTable::read_from(&mut Cursor::new(out)).unwrap_err();
        assert!(matches!(err, TableError::Automaton(_)));
    }
}
