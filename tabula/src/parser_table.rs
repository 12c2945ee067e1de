//! Parser tables: symbols, productions and the LR action matrix.
//!
//! Symbols are numbered terminals first, so a terminal's symbol id equals the
//! number of the tokens that carry it; terminal 0 is end-of-file. Nonterminals
//! follow. The action matrix has one row per state and one column per symbol:
//! terminal columns hold shift/reduce/accept/error, nonterminal columns hold
//! goto/error.

use crate::TableError;
use crate::codec::{Decoder, Encoder, prealloc, PARSER_MAGIC};
use smartstring::alias::String;
use std::collections::HashMap;
use std::io::{Read, Write};

pub type SymbolId = usize;
pub type StateId = usize;
pub type ProductionId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Action {
    #[default]
    Error,
    Accept,
    Shift(StateId),
    Reduce(ProductionId),
    Goto(StateId),
}

impl Action {
    fn encode(self) -> (u32, usize) {
        match self {
            Action::Error => (0, 0),
            Action::Accept => (1, 0),
            Action::Shift(s) => (2, s),
            Action::Reduce(p) => (3, p),
            Action::Goto(s) => (4, s),
        }
    }

    fn decode(tag: u32, operand: usize) -> Result<Self, TableError> {
        Ok(match tag {
            0 => Action::Error,
            1 => Action::Accept,
            2 => Action::Shift(operand),
            3 => Action::Reduce(operand),
            4 => Action::Goto(operand),
            t => return Err(TableError::Malformed(format!("invalid action tag {t}"))),
        })
    }
}

/// Error-repair search limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairConfig {
    /// Largest number of insertions plus deletions tried.
    pub max_cost: usize,
    /// Tokens that must shift after a repair for it to be accepted.
    pub window: usize,
    /// Budget of simulated parser actions per repair search.
    pub max_trials: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_cost: 10,
            window: 3,
            max_trials: 20_000,
        }
    }
}

/// A production as handed to the builder, with symbols by name.
#[derive(Debug, Clone)]
pub struct ProductionDef {
    lhs: String,
    rhs: Vec<String>,
    link: Option<String>,
    param: i32,
}

impl ProductionDef {
    pub fn new<'a>(lhs: &str, rhs: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            lhs: lhs.into(),
            rhs: rhs.into_iter().map(String::from).collect(),
            link: None,
            param: 0,
        }
    }

    /// Tag under which the production's nonterminal factory is registered.
    pub fn link(mut self, tag: &str) -> Self {
        self.link = Some(tag.into());
        self
    }

    pub fn param(mut self, param: i32) -> Self {
        self.param = param;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
    pub lhs: SymbolId,
    pub rhs: Vec<SymbolId>,
    pub link: Option<String>,
    pub param: i32,
}

/// An immutable LR parser table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserTable {
    symbols: Vec<String>,
    terminal_count: usize,
    productions: Vec<Production>,
    actions: Vec<Action>,
    state_count: usize,
    start_state: StateId,
    repair: RepairConfig,
}

impl ParserTable {
    pub fn builder() -> ParserTableBuilder {
        ParserTableBuilder::default()
    }

    /// Action for a token number in `state`. Numbers that are not terminals
    /// (escapes, unmatched input) get [`Action::Error`].
    #[inline]
    pub fn action(&self, state: StateId, number: i32) -> Action {
        match usize::try_from(number) {
            Ok(t) if t < self.terminal_count && state < self.state_count => {
                self.actions[state * self.symbols.len() + t]
            }
            _ => Action::Error,
        }
    }

    /// Goto target for `nonterminal` in `state`.
    #[inline]
    pub fn goto(&self, state: StateId, nonterminal: SymbolId) -> Option<StateId> {
        if state >= self.state_count || nonterminal >= self.symbols.len() {
            return None;
        }
        match self.actions[state * self.symbols.len() + nonterminal] {
            Action::Goto(s) => Some(s),
            _ => None,
        }
    }

    pub fn symbol_name(&self, id: SymbolId) -> Option<&str> {
        self.symbols.get(id).map(|s| s.as_str())
    }

    pub fn symbol_id(&self, name: &str) -> Option<SymbolId> {
        self.symbols.iter().position(|s| s == name)
    }

    pub fn is_terminal(&self, id: SymbolId) -> bool {
        id < self.terminal_count
    }

    pub fn terminal_count(&self) -> usize {
        self.terminal_count
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn state_count(&self) -> usize {
        self.state_count
    }

    pub fn production(&self, id: ProductionId) -> Option<&Production> {
        self.productions.get(id)
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn start_state(&self) -> StateId {
        self.start_state
    }

    pub fn repair_config(&self) -> RepairConfig {
        self.repair
    }

    /// Verifies the table invariants.
    pub fn check(&self) -> Result<(), TableError> {
        let mut seen = HashMap::new();
        for (i, name) in self.symbols.iter().enumerate() {
            if seen.insert(name.as_str(), i).is_some() {
                return Err(TableError::DuplicateSymbol(name.clone()));
            }
        }
        if self.terminal_count == 0 || self.terminal_count > self.symbols.len() {
            return Err(TableError::Malformed(format!(
                "{} terminals among {} symbols",
                self.terminal_count,
                self.symbols.len()
            )));
        }
        if self.actions.len() != self.state_count * self.symbols.len() {
            return Err(TableError::Malformed(format!(
                "{} actions for {} states of width {}",
                self.actions.len(),
                self.state_count,
                self.symbols.len()
            )));
        }
        if self.start_state >= self.state_count {
            return Err(TableError::StateOutOfRange(self.start_state));
        }
        if self.repair.window == 0 {
            return Err(TableError::Malformed("repair window must be at least 1".into()));
        }
        for (i, p) in self.productions.iter().enumerate() {
            if p.lhs < self.terminal_count || p.lhs >= self.symbols.len() {
                return Err(TableError::Malformed(format!(
                    "production {i}: left-hand side {} is not a nonterminal",
                    p.lhs
                )));
            }
            if let Some(&s) = p.rhs.iter().find(|&&s| s >= self.symbols.len()) {
                return Err(TableError::SymbolOutOfRange(s));
            }
        }
        let width = self.symbols.len();
        for (i, &action) in self.actions.iter().enumerate() {
            let (state, symbol) = (i / width, i % width);
            let terminal = symbol < self.terminal_count;
            let bad = |what: &str| {
                TableError::Malformed(format!(
                    "state {state}, symbol {:?}: {what}",
                    self.symbols[symbol]
                ))
            };
            match action {
                Action::Error => {}
                Action::Accept | Action::Reduce(_) | Action::Shift(_) if !terminal => {
                    return Err(bad("terminal action in a nonterminal column"));
                }
                Action::Goto(_) if terminal => {
                    return Err(bad("goto in a terminal column"));
                }
                Action::Shift(s) | Action::Goto(s) if s >= self.state_count => {
                    return Err(TableError::StateOutOfRange(s));
                }
                Action::Reduce(p) if p >= self.productions.len() => {
                    return Err(TableError::ProductionOutOfRange(p));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Serializes the table as one block.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<(), TableError> {
        let mut enc = Encoder::new(w);
        enc.header(PARSER_MAGIC)?;
        enc.usize(self.symbols.len())?;
        enc.usize(self.terminal_count)?;
        for s in &self.symbols {
            enc.str(s)?;
        }
        enc.usize(self.productions.len())?;
        for p in &self.productions {
            enc.usize(p.lhs)?;
            enc.usize(p.rhs.len())?;
            for &s in &p.rhs {
                enc.usize(s)?;
            }
            enc.opt_str(p.link.as_deref())?;
            enc.i32(p.param)?;
        }
        enc.usize(self.state_count)?;
        enc.usize(self.start_state)?;
        enc.usize(self.repair.max_cost)?;
        enc.usize(self.repair.window)?;
        enc.usize(self.repair.max_trials)?;
        for &a in &self.actions {
            let (tag, operand) = a.encode();
            enc.u32(tag)?;
            enc.usize(operand)?;
        }
        Ok(())
    }

    /// Reads a table written by [`write_to`](Self::write_to) and checks it.
    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<Self, TableError> {
        let mut dec = Decoder::new(r);
        dec.header(PARSER_MAGIC, "parser")?;
        let n = dec.count()?;
        let terminal_count = dec.usize()?;
        let mut symbols = prealloc(n);
        for _ in 0..n {
            symbols.push(dec.string()?);
        }
        let n = dec.count()?;
        let mut productions = prealloc(n);
        for _ in 0..n {
            let lhs = dec.usize()?;
            let k = dec.count()?;
            let mut rhs = prealloc(k);
            for _ in 0..k {
                rhs.push(dec.usize()?);
            }
            let link = dec.opt_string()?;
            let param = dec.i32()?;
            productions.push(Production {
                lhs,
                rhs,
                link,
                param,
            });
        }
        let state_count = dec.count()?;
        let start_state = dec.usize()?;
        let repair = RepairConfig {
            max_cost: dec.usize()?,
            window: dec.usize()?,
            max_trials: dec.usize()?,
        };
        let cells = state_count
            .checked_mul(symbols.len())
            .ok_or_else(|| TableError::Malformed("action matrix too large".into()))?;
        let mut actions = prealloc(cells);
        for _ in 0..cells {
            let tag = dec.u32()?;
            let operand = dec.usize()?;
            actions.push(Action::decode(tag, operand)?);
        }
        let table = Self {
            symbols,
            terminal_count,
            productions,
            actions,
            state_count,
            start_state,
            repair,
        };
        table.check()?;
        log::debug!(
            "loaded parser table: {} symbols, {} productions, {} states",
            table.symbols.len(),
            table.productions.len(),
            table.state_count
        );
        Ok(table)
    }
}

/// Collects symbols, productions and action rows into a [`ParserTable`].
#[derive(Debug, Clone, Default)]
pub struct ParserTableBuilder {
    terminals: Vec<String>,
    nonterminals: Vec<String>,
    productions: Vec<ProductionDef>,
    rows: Vec<Vec<(String, Action)>>,
    start_state: StateId,
    repair: RepairConfig,
}

impl ParserTableBuilder {
    /// Declares the terminals in token-number order; the first one is
    /// end-of-file.
    pub fn terminals<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.terminals.extend(names.into_iter().map(String::from));
        self
    }

    pub fn nonterminals<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.nonterminals.extend(names.into_iter().map(String::from));
        self
    }

    pub fn production(mut self, def: ProductionDef) -> Self {
        self.productions.push(def);
        self
    }

    /// Appends the next state's row, given as its non-error entries.
    pub fn state<'a>(mut self, row: impl IntoIterator<Item = (&'a str, Action)>) -> Self {
        self.rows
            .push(row.into_iter().map(|(s, a)| (String::from(s), a)).collect());
        self
    }

    pub fn start_state(mut self, state: StateId) -> Self {
        self.start_state = state;
        self
    }

    pub fn repair(mut self, config: RepairConfig) -> Self {
        self.repair = config;
        self
    }

    pub fn build(self) -> Result<ParserTable, TableError> {
        let terminal_count = self.terminals.len();
        let symbols: Vec<String> = self.terminals.into_iter().chain(self.nonterminals).collect();
        let index: HashMap<&str, SymbolId> = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        let lookup = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| TableError::UnknownSymbol(name.into()))
        };

        let mut productions = Vec::with_capacity(self.productions.len());
        for def in &self.productions {
            productions.push(Production {
                lhs: lookup(&def.lhs)?,
                rhs: def.rhs.iter().map(|s| lookup(s)).collect::<Result<_, _>>()?,
                link: def.link.clone(),
                param: def.param,
            });
        }

        let width = symbols.len();
        let mut actions = vec![Action::Error; self.rows.len() * width];
        for (state, row) in self.rows.iter().enumerate() {
            for (name, action) in row {
                actions[state * width + lookup(name)?] = *action;
            }
        }

        let table = ParserTable {
            terminal_count,
            productions,
            actions,
            state_count: self.rows.len(),
            start_state: self.start_state,
            repair: self.repair,
            symbols,
        };
        table.check()?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_tables::{arith_parser_table, sym, tok};
    use std::io::Cursor;

    #[test]
    fn symbols_terminals_first() {
        let t = arith_parser_table();
        assert_eq!(t.terminal_count(), 7);
        assert_eq!(t.symbol_count(), 11);
        assert_eq!(t.symbol_name(0), Some("$end"));
        assert_eq!(t.symbol_id("Expression"), Some(sym::EXPRESSION));
        assert!(t.is_terminal(tok::RPAREN as usize));
        assert!(!t.is_terminal(sym::PROGRAM));
        assert_eq!(t.symbol_name(99), None);
    }

    #[test]
    fn actions_and_gotos() {
        let t = arith_parser_table();
        assert_eq!(t.action(0, tok::NUMBER), Action::Shift(5));
        assert_eq!(t.action(1, 0), Action::Accept);
        assert_eq!(t.action(5, tok::SEMI), Action::Reduce(6));
        assert_eq!(t.action(9, tok::SEMI), Action::Error);
        assert_eq!(t.goto(0, sym::EXPRESSION), Some(3));
        assert_eq!(t.goto(9, sym::PRIMARY), Some(12));
        assert_eq!(t.goto(9, sym::EXPRESSION), None);
    }

    #[test]
    fn non_terminal_numbers_are_errors() {
        let t = arith_parser_table();
        assert_eq!(t.action(0, -1), Action::Error);
        assert_eq!(t.action(0, crate::UNMATCHED), Action::Error);
        // nonterminal ids are not token numbers
        assert_eq!(t.action(0, sym::EXPRESSION as i32), Action::Error);
        assert_eq!(t.action(1000, tok::NUMBER), Action::Error);
    }

    #[test]
    fn default_repair_config() {
        let t = arith_parser_table();
        assert_eq!(
            t.repair_config(),
            RepairConfig {
                max_cost: 10,
                window: 3,
                max_trials: 20_000
            }
        );
    }

    #[test]
    fn round_trip_is_identical() {
        let t = arith_parser_table();
        let mut out = Vec::new();
        t.write_to(&mut out).unwrap();
        let back = ParserTable::read_from(&mut Cursor::new(out)).unwrap();
        assert_eq!(back, t);
    }

    fn no_entries() -> Vec<(&'static str, Action)> {
        Vec::new()
    }

    fn tiny() -> ParserTableBuilder {
        ParserTable::builder()
            .terminals(["$end", "a"])
            .nonterminals(["S"])
            .production(ProductionDef::new("S", ["a"]))
    }

    #[test]
    fn shift_in_nonterminal_column_is_rejected() {
        let err = tiny()
            .state([("S", Action::Shift(0))])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("nonterminal column"));
    }

    #[test]
    fn goto_in_terminal_column_is_rejected() {
        let err = tiny().state([("a", Action::Goto(0))]).build().unwrap_err();
        assert!(err.to_string().contains("goto in a terminal column"));
    }

    #[test]
    fn out_of_range_targets_are_rejected() {
        let err = tiny().state([("a", Action::Shift(3))]).build().unwrap_err();
        assert!(matches!(err, TableError::StateOutOfRange(3)));
        let err = tiny().state([("a", Action::Reduce(4))]).build().unwrap_err();
        assert!(matches!(err, TableError::ProductionOutOfRange(4)));
        let err = tiny().state(no_entries()).start_state(2).build().unwrap_err();
        assert!(matches!(err, TableError::StateOutOfRange(2)));
    }

    #[test]
    fn unknown_and_duplicate_symbols_are_rejected() {
        let err = tiny()
            .production(ProductionDef::new("S", ["b"]))
            .state(no_entries())
            .build()
            .unwrap_err();
        assert!(matches!(err, TableError::UnknownSymbol(ref s) if s == "b"));

        let err = ParserTable::builder()
            .terminals(["$end", "x"])
            .nonterminals(["x"])
            .state(no_entries())
            .build()
            .unwrap_err();
        assert!(matches!(err, TableError::DuplicateSymbol(_)));
    }

    #[test]
    fn terminal_lhs_is_rejected() {
        let err = tiny()
            .production(ProductionDef::new("a", ["S"]))
            .state(no_entries())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("not a nonterminal"));
    }

    #[test]
    fn zero_window_is_rejected() {
        let err = tiny()
            .state(no_entries())
            .repair(RepairConfig {
                window: 0,
                ..RepairConfig::default()
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("window"));
    }

    #[test]
    fn bad_action_tag_is_rejected() {
        let mut out = Vec::new();
        tiny().state(no_entries()).build().unwrap().write_to(&mut out).unwrap();
        // last cell: tag, operand
        let n = out.len();
        out[n - 8] = 9;
        let err = ParserTable::read_from(&mut Cursor::new(out)).unwrap_err();
        assert!(err.to_string().contains("invalid action tag 9"));
    }
}
