//! Subset construction, for pattern diagnostics.

use crate::ast::EventNode;
use crate::nfa::{Nfa, StateId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A deterministic automaton over event terms.
///
/// Each DFA state stands for a set of NFA states; two NFA sets are the same
/// DFA state iff they are equal. The empty (dead) set is not materialized,
/// so a missing transition means rejection.
#[derive(Debug, Clone)]
pub struct Dfa {
    states: Vec<BTreeSet<StateId>>,
    accepting: BTreeSet<usize>,
    transitions: BTreeMap<usize, BTreeMap<EventNode, usize>>,
}

impl Dfa {
    pub fn from_nfa(nfa: &Nfa) -> Self {
        let symbols = nfa.input_symbols();
        let start = nfa.start_states();

        let mut dfa = Self {
            states: Vec::new(),
            accepting: BTreeSet::new(),
            transitions: BTreeMap::new(),
        };
        let mut ids: BTreeMap<BTreeSet<StateId>, usize> = BTreeMap::new();
        let mut worklist = vec![dfa.intern(&mut ids, start, nfa)];

        while let Some(id) = worklist.pop() {
            for symbol in &symbols {
                let moved = nfa.move_on(&dfa.states[id], symbol);
                if moved.is_empty() {
                    continue;
                }
                let target_set = nfa.epsilon_closure(&moved);
                let target = match ids.get(&target_set) {
                    Some(&existing) => existing,
                    None => {
                        let fresh = dfa.intern(&mut ids, target_set, nfa);
                        worklist.push(fresh);
                        fresh
                    }
                };
                dfa.transitions
                    .entry(id)
                    .or_default()
                    .insert(symbol.clone(), target);
            }
        }
        dfa
    }

    fn intern(
        &mut self,
        ids: &mut BTreeMap<BTreeSet<StateId>, usize>,
        set: BTreeSet<StateId>,
        nfa: &Nfa,
    ) -> usize {
        let id = self.states.len();
        if set.contains(&nfa.accepting()) {
            self.accepting.insert(id);
        }
        ids.insert(set.clone(), id);
        self.states.push(set);
        id
    }

    pub fn size(&self) -> usize {
        self.states.len()
    }

    pub fn initial(&self) -> usize {
        0
    }

    pub fn is_accepting(&self, state: usize) -> bool {
        self.accepting.contains(&state)
    }

    /// The NFA states a DFA state stands for.
    pub fn nfa_states(&self, state: usize) -> Option<&BTreeSet<StateId>> {
        self.states.get(state)
    }

    pub fn next(&self, state: usize, symbol: &EventNode) -> Option<usize> {
        self.transitions.get(&state)?.get(symbol).copied()
    }

    /// Walk a sequence of terms from the initial state.
    pub fn accepts(&self, symbols: &[EventNode]) -> bool {
        let mut state = self.initial();
        for symbol in symbols {
            match self.next(state, symbol) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.is_accepting(state)
    }
}

impl fmt::Display for Dfa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DFA: {} states, initial {}", self.size(), self.initial())?;
        for (id, set) in self.states.iter().enumerate() {
            let marker = if self.is_accepting(id) { " (final)" } else { "" };
            writeln!(f, "  state {} = {:?}{}", id, set, marker)?;
            if let Some(outs) = self.transitions.get(&id) {
                for (symbol, target) in outs {
                    writeln!(f, "    --{}--> {}", symbol, target)?;
                }
            }
        }
        Ok(())
    }
}
