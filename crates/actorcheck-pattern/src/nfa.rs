//! Thompson construction.
//!
//! Every composed automaton keeps two shape invariants that the composition
//! steps rely on: the initial state is `0` and the accepting state is
//! `size - 1`. Concatenation uses them to overlay the left automaton's
//! accepting state onto the right automaton's initial state without adding
//! a state.

use crate::ast::{BinaryOp, EventNode, Label, Pattern, UnaryOp};
use crate::event::EventPayload;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub type StateId = usize;

/// One labelled edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: StateId,
    pub to: StateId,
    pub label: Label,
}

/// Event kinds that appear on some non-ε edge.
///
/// A pattern containing `.` makes every event kind interesting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestingEvents {
    kinds: BTreeSet<String>,
    any: bool,
}

impl InterestingEvents {
    pub fn new(kinds: impl IntoIterator<Item = String>) -> Self {
        let mut out = Self::default();
        for kind in kinds {
            out.insert(kind);
        }
        out
    }

    pub fn insert(&mut self, kind: String) {
        if kind == crate::ast::ANY_EVENT {
            self.any = true;
        }
        self.kinds.insert(kind);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.any || self.kinds.contains(kind)
    }

    /// Whether `.` occurs in the pattern.
    pub fn matches_any(&self) -> bool {
        self.any
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// A nondeterministic automaton over event terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nfa {
    size: usize,
    initial: StateId,
    accepting: StateId,
    edges: BTreeMap<StateId, Vec<(StateId, Label)>>,
}

impl Nfa {
    /// Compile a pattern tree.
    pub fn from_pattern(pattern: &Pattern) -> Self {
        match pattern {
            Pattern::Epsilon => Nfa::basic(Label::Epsilon),
            Pattern::Event(node) => Nfa::basic(Label::Event(node.clone())),
            Pattern::Binary { op, left, right } => {
                let left = Nfa::from_pattern(left);
                let right = Nfa::from_pattern(right);
                match op {
                    BinaryOp::Alternation => Nfa::alternation(left, right),
                    BinaryOp::Concatenation => Nfa::concatenation(left, right),
                }
            }
            Pattern::Unary { op, inner } => {
                let inner = Nfa::from_pattern(inner);
                match op {
                    UnaryOp::Star => Nfa::star(inner),
                    UnaryOp::Maybe => Nfa::alternation(Nfa::basic(Label::Epsilon), inner),
                }
            }
        }
    }

    /// Two states joined by a single edge.
    pub fn basic(label: Label) -> Self {
        let mut nfa = Self {
            size: 2,
            initial: 0,
            accepting: 1,
            edges: BTreeMap::new(),
        };
        nfa.add_transition(0, 1, label);
        nfa
    }

    /// New initial state ε-connected to both operands; both accepting
    /// states ε-connected to a new accepting state.
    pub fn alternation(left: Nfa, right: Nfa) -> Self {
        let left = left.shifted(1);
        let right = right.shifted(left.size);
        let (left_initial, left_accepting) = (left.initial, left.accepting);
        let (right_initial, right_accepting) = (right.initial, right.accepting);

        let mut nfa = right;
        nfa.absorb(left);
        nfa.initial = 0;
        nfa.add_transition(0, left_initial, Label::Epsilon);
        nfa.add_transition(0, right_initial, Label::Epsilon);
        let accepting = nfa.add_state();
        nfa.add_transition(left_accepting, accepting, Label::Epsilon);
        nfa.add_transition(right_accepting, accepting, Label::Epsilon);
        nfa.accepting = accepting;
        nfa
    }

    /// Overlay `left`'s accepting state onto `right`'s initial state.
    pub fn concatenation(left: Nfa, right: Nfa) -> Self {
        debug_assert_eq!(left.accepting, left.size - 1);
        debug_assert_eq!(right.initial, 0);
        let right = right.shifted(left.size - 1);
        let initial = left.initial;

        let mut nfa = right;
        nfa.absorb(left);
        nfa.initial = initial;
        nfa
    }

    /// New initial and accepting states with bypass and repeat edges.
    pub fn star(inner: Nfa) -> Self {
        let mut nfa = inner.shifted(1);
        let (old_initial, old_accepting) = (nfa.initial, nfa.accepting);
        let accepting = nfa.add_state();
        nfa.add_transition(old_accepting, old_initial, Label::Epsilon);
        nfa.add_transition(0, old_initial, Label::Epsilon);
        nfa.add_transition(old_accepting, accepting, Label::Epsilon);
        nfa.add_transition(0, accepting, Label::Epsilon);
        nfa.initial = 0;
        nfa.accepting = accepting;
        nfa
    }

    /// Renumber every state up by `shift`, growing the state count to match.
    fn shifted(self, shift: usize) -> Self {
        let edges = self
            .edges
            .into_iter()
            .map(|(from, outs)| {
                let outs = outs
                    .into_iter()
                    .map(|(to, label)| (to + shift, label))
                    .collect();
                (from + shift, outs)
            })
            .collect();
        Self {
            size: self.size + shift,
            initial: self.initial + shift,
            accepting: self.accepting + shift,
            edges,
        }
    }

    /// Copy all of `other`'s edges into `self`.
    fn absorb(&mut self, other: Nfa) {
        self.size = self.size.max(other.size);
        for (from, outs) in other.edges {
            for (to, label) in outs {
                self.add_transition(from, to, label);
            }
        }
    }

    fn add_state(&mut self) -> StateId {
        self.size += 1;
        self.size - 1
    }

    fn add_transition(&mut self, from: StateId, to: StateId, label: Label) {
        let outs = self.edges.entry(from).or_default();
        if !outs.iter().any(|(t, l)| *t == to && *l == label) {
            outs.push((to, label));
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn initial(&self) -> StateId {
        self.initial
    }

    pub fn accepting(&self) -> StateId {
        self.accepting
    }

    pub fn transitions(&self) -> impl Iterator<Item = Transition> + '_ {
        self.edges.iter().flat_map(|(&from, outs)| {
            outs.iter().map(move |(to, label)| Transition {
                from,
                to: *to,
                label: label.clone(),
            })
        })
    }

    /// Outgoing edges of `state`.
    pub fn outgoing(&self, state: StateId) -> &[(StateId, Label)] {
        self.edges.get(&state).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether every edge endpoint and both distinguished states lie in
    /// `0..size`.
    pub fn is_well_formed(&self) -> bool {
        self.initial < self.size
            && self.accepting < self.size
            && self
                .transitions()
                .all(|t| t.from < self.size && t.to < self.size)
    }

    /// States reachable from `states` over zero or more ε edges.
    pub fn epsilon_closure(&self, states: &BTreeSet<StateId>) -> BTreeSet<StateId> {
        let mut closure = states.clone();
        let mut stack: Vec<StateId> = states.iter().copied().collect();
        while let Some(state) = stack.pop() {
            for (to, label) in self.outgoing(state) {
                if label.is_epsilon() && closure.insert(*to) {
                    stack.push(*to);
                }
            }
        }
        closure
    }

    /// ε-closure of the initial state.
    pub fn start_states(&self) -> BTreeSet<StateId> {
        self.epsilon_closure(&BTreeSet::from([self.initial]))
    }

    /// Follow every non-ε edge whose term accepts `event`, then close over ε.
    pub fn step<E: EventPayload + ?Sized>(
        &self,
        states: &BTreeSet<StateId>,
        event: &E,
    ) -> BTreeSet<StateId> {
        let mut reached = BTreeSet::new();
        for &state in states {
            for (to, label) in self.outgoing(state) {
                if let Label::Event(node) = label {
                    if node.matches(event) {
                        reached.insert(*to);
                    }
                }
            }
        }
        self.epsilon_closure(&reached)
    }

    /// Follow every edge labelled exactly `symbol` (no closure).
    pub fn move_on(&self, states: &BTreeSet<StateId>, symbol: &EventNode) -> BTreeSet<StateId> {
        let mut reached = BTreeSet::new();
        for &state in states {
            for (to, label) in self.outgoing(state) {
                if label.event() == Some(symbol) {
                    reached.insert(*to);
                }
            }
        }
        reached
    }

    /// Distinct non-ε edge labels.
    pub fn input_symbols(&self) -> BTreeSet<EventNode> {
        self.edges
            .values()
            .flatten()
            .filter_map(|(_, label)| label.event().cloned())
            .collect()
    }

    pub fn interesting_events(&self) -> InterestingEvents {
        InterestingEvents::new(self.input_symbols().into_iter().map(|node| node.name))
    }
}

impl fmt::Display for Nfa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "NFA: {} states, initial {}, final {}",
            self.size, self.initial, self.accepting
        )?;
        for t in self.transitions() {
            writeln!(f, "  {} --{}--> {}", t.from, t.label, t.to)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::parser::parse_pattern;
    use proptest::prelude::*;

    fn compile(src: &str) -> Nfa {
        Nfa::from_pattern(&parse_pattern(src).unwrap())
    }

    fn accepts(nfa: &Nfa, kinds: &[&str]) -> bool {
        let mut states = nfa.start_states();
        for kind in kinds {
            states = nfa.step(&states, &Event::new(*kind));
        }
        states.contains(&nfa.accepting())
    }

    #[test]
    fn test_basic_shape() {
        let nfa = Nfa::basic(Label::Event(EventNode::new("A")));
        assert_eq!(nfa.size(), 2);
        assert_eq!(nfa.initial(), 0);
        assert_eq!(nfa.accepting(), 1);
        assert_eq!(nfa.transitions().count(), 1);
    }

    #[test]
    fn test_state_counts() {
        // Concatenation adds no states; alternation and star add two.
        assert_eq!(compile("A, B").size(), 3);
        assert_eq!(compile("A | B").size(), 6);
        assert_eq!(compile("A*").size(), 4);
        assert_eq!(compile("A?").size(), 6);
        assert_eq!(compile("(A, B) | C").size(), 7);
    }

    #[test]
    fn test_shape_invariants_hold() {
        for src in ["A", "A, B", "A | B", "A*", "(A | B)+, C?", "((A, B)* | C), D"] {
            let nfa = compile(src);
            assert_eq!(nfa.initial(), 0, "{}", src);
            assert_eq!(nfa.accepting(), nfa.size() - 1, "{}", src);
            assert!(nfa.is_well_formed(), "{}", src);
        }
    }

    #[test]
    fn test_language() {
        let nfa = compile("A, B* | C");
        assert!(accepts(&nfa, &["A"]));
        assert!(accepts(&nfa, &["A", "B", "B"]));
        assert!(accepts(&nfa, &["C"]));
        assert!(!accepts(&nfa, &["B"]));
        assert!(!accepts(&nfa, &["A", "C"]));
    }

    #[test]
    fn test_maybe_and_plus() {
        let nfa = compile("A?, B+");
        assert!(accepts(&nfa, &["B"]));
        assert!(accepts(&nfa, &["A", "B", "B"]));
        assert!(!accepts(&nfa, &["A"]));
        assert!(!accepts(&nfa, &[]));
    }

    #[test]
    fn test_interesting_events() {
        let interesting = compile(r#"A{k:"1"}, (B | C)*"#).interesting_events();
        assert_eq!(interesting.kinds().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert!(!interesting.contains("D"));
        assert!(compile("A, .").interesting_events().contains("D"));
    }

    #[test]
    fn test_display_lists_edges() {
        let text = compile("A").to_string();
        assert!(text.contains("2 states"));
        assert!(text.contains("0 --A--> 1"));
    }

    fn arb_pattern() -> impl Strategy<Value = Pattern> {
        let leaf = prop_oneof![
            Just(Pattern::Epsilon),
            "[A-D]".prop_map(|name| Pattern::event(EventNode::new(name))),
        ];
        leaf.prop_recursive(4, 24, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| Pattern::alternation(a, b)),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| Pattern::concatenation(a, b)),
                inner.clone().prop_map(Pattern::star),
                inner.prop_map(Pattern::maybe),
            ]
        })
    }

    proptest! {
        #[test]
        fn composed_automata_are_well_formed(pattern in arb_pattern()) {
            let nfa = Nfa::from_pattern(&pattern);
            prop_assert!(nfa.is_well_formed());
            prop_assert_eq!(nfa.initial(), 0);
            prop_assert_eq!(nfa.accepting(), nfa.size() - 1);
        }

        #[test]
        fn epsilon_closure_is_idempotent(pattern in arb_pattern(), seed in prop::collection::btree_set(0usize..64, 0..6)) {
            let nfa = Nfa::from_pattern(&pattern);
            let states: BTreeSet<StateId> = seed.into_iter().map(|s| s % nfa.size()).collect();
            let once = nfa.epsilon_closure(&states);
            let twice = nfa.epsilon_closure(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
