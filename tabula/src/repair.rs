//! Syntax error repair.
//!
//! When the parser meets a token it has no action for, [`search`] looks for
//! the cheapest edit of the pending input (delete some leading tokens, then
//! insert some terminals) after which the parse continues for a window of
//! tokens. Candidates are explored breadth-first by cost; at equal cost fewer
//! deletions come first, then insertion sequences in terminal-id order.
//! Insertion sequences that leave the parser in the same stack are explored
//! once. End-of-file is never inserted nor deleted.

use crate::diagnostic::{Diagnostic, codes};
use crate::{Action, EOF, ParserTable, RepairConfig, StateId, Token};
use std::collections::HashSet;

/// Repairs costing at most this much are reported symbol by symbol.
pub const SIMPLE_REPAIR_LIMIT: usize = 6;

/// An accepted edit: `deletions` are removed from the front of the input, then
/// `insertions` are placed in front of what remains. Both hold token numbers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Repair {
    pub insertions: Vec<i32>,
    pub deletions: Vec<i32>,
}

impl Repair {
    pub fn cost(&self) -> usize {
        self.insertions.len() + self.deletions.len()
    }

    pub fn is_simple(&self) -> bool {
        self.cost() <= SIMPLE_REPAIR_LIMIT
    }

    /// Diagnostics describing the repair at `token`: one per deleted and
    /// inserted symbol when simple, otherwise a single syntax error.
    pub fn diagnostics<V>(&self, table: &ParserTable, token: &Token<V>) -> Vec<Diagnostic> {
        let name = |n: i32| symbol_label(table, n);
        if !self.is_simple() {
            return vec![
                Diagnostic::error(
                    "parser",
                    codes::SYNTAX_ERROR,
                    format!("syntax error before {}", name(token.number)),
                )
                .at_token(token),
            ];
        }
        let deleted = self.deletions.iter().map(|&n| {
            Diagnostic::error("parser", codes::REPAIR_DELETE, format!("deleted {}", name(n)))
                .at_token(token)
        });
        let inserted = self.insertions.iter().map(|&n| {
            Diagnostic::error("parser", codes::REPAIR_INSERT, format!("inserted {}", name(n)))
                .at_token(token)
        });
        deleted.chain(inserted).collect()
    }
}

/// Printable name of a token number.
pub(crate) fn symbol_label(table: &ParserTable, number: i32) -> String {
    match usize::try_from(number).ok().filter(|&n| table.is_terminal(n)) {
        Some(n) => match table.symbol_name(n) {
            Some(name) => name.to_owned(),
            None => format!("<token {number}>"),
        },
        None => format!("<token {number}>"),
    }
}

enum Step {
    Shifted,
    Accepted,
    Failed,
}

/// Simulates the parser on a copy of its state stack.
struct Simulator<'a> {
    table: &'a ParserTable,
    budget: usize,
}

impl Simulator<'_> {
    /// Reduces as the table says and then shifts `number`. `None` when the
    /// trial budget is exhausted.
    fn feed(&mut self, stack: &mut Vec<StateId>, number: i32) -> Option<Step> {
        loop {
            self.budget = self.budget.checked_sub(1)?;
            let Some(&state) = stack.last() else {
                return Some(Step::Failed);
            };
            match self.table.action(state, number) {
                Action::Shift(next) => {
                    stack.push(next);
                    return Some(Step::Shifted);
                }
                Action::Reduce(p) => {
                    let Some(prod) = self.table.production(p) else {
                        return Some(Step::Failed);
                    };
                    if prod.rhs.len() >= stack.len() {
                        return Some(Step::Failed);
                    }
                    stack.truncate(stack.len() - prod.rhs.len());
                    let top = stack[stack.len() - 1];
                    match self.table.goto(top, prod.lhs) {
                        Some(next) => stack.push(next),
                        None => return Some(Step::Failed),
                    }
                }
                Action::Accept => return Some(Step::Accepted),
                Action::Error | Action::Goto(_) => return Some(Step::Failed),
            }
        }
    }

    /// `true` if the next `window` tokens of `input` shift, or the input is
    /// accepted before that.
    fn validates(&mut self, mut stack: Vec<StateId>, input: &[i32], window: usize) -> Option<bool> {
        for &number in input.iter().take(window) {
            match self.feed(&mut stack, number)? {
                Step::Shifted => {}
                Step::Accepted => return Some(true),
                Step::Failed => return Some(false),
            }
        }
        Some(true)
    }
}

/// Searches for a repair of `input` (the pending token numbers, the first of
/// which has no action) given the parser's state stack.
pub fn search(
    table: &ParserTable,
    states: &[StateId],
    input: &[i32],
    config: &RepairConfig,
) -> Option<Repair> {
    let mut sim = Simulator {
        table,
        budget: config.max_trials,
    };
    let deletable = input.iter().take_while(|&&n| n != EOF).count();

    // frontiers[k]: distinct stacks reachable by k insertions, each with the
    // first insertion sequence (in terminal order) that reaches it.
    let mut frontiers: Vec<Vec<(Vec<i32>, Vec<StateId>)>> = vec![vec![(Vec::new(), states.to_vec())]];
    let mut seen: HashSet<Vec<StateId>> = HashSet::new();
    seen.insert(states.to_vec());

    for cost in 1..=config.max_cost {
        if frontiers.len() <= cost {
            let next = expand(&mut sim, &frontiers[cost - 1], &mut seen)?;
            frontiers.push(next);
        }
        for deletions in 0..=cost.min(deletable) {
            let insertions = cost - deletions;
            let rest = &input[deletions..];
            for (seq, stack) in &frontiers[insertions] {
                if sim.validates(stack.clone(), rest, config.window)? {
                    let repair = Repair {
                        insertions: seq.clone(),
                        deletions: input[..deletions].to_vec(),
                    };
                    log::debug!(
                        "repair found at cost {cost} after {} trials: {repair:?}",
                        config.max_trials - sim.budget
                    );
                    return Some(repair);
                }
            }
        }
    }
    log::debug!("no repair within cost {}", config.max_cost);
    None
}

fn expand(
    sim: &mut Simulator<'_>,
    frontier: &[(Vec<i32>, Vec<StateId>)],
    seen: &mut HashSet<Vec<StateId>>,
) -> Option<Vec<(Vec<i32>, Vec<StateId>)>> {
    let mut next = Vec::new();
    for (seq, stack) in frontier {
        for t in 1..sim.table.terminal_count() {
            let t = t as i32;
            let mut s = stack.clone();
            if let Step::Shifted = sim.feed(&mut s, t)? {
                if seen.insert(s.clone()) {
                    let mut seq = seq.clone();
                    seq.push(t);
                    next.push((seq, s));
                }
            }
        }
    }
    Some(next)
}
