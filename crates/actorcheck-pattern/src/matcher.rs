//! Incremental pattern matching, one event at a time.

use crate::event::EventPayload;
use crate::nfa::{InterestingEvents, Nfa, StateId};
use crate::parser::{parse_pattern, ParseResult};
use log::debug;
use std::collections::BTreeSet;

/// Drives an [`Nfa`] over a stream of events.
///
/// Keeps the current state set plus every state visited since the last
/// [`reset`](NfaMatcher::reset), which callers use as a coverage signal.
/// Matching never resets on its own.
#[derive(Debug, Clone)]
pub struct NfaMatcher {
    nfa: Nfa,
    interesting: InterestingEvents,
    current: BTreeSet<StateId>,
    visited: BTreeSet<StateId>,
}

impl NfaMatcher {
    pub fn new(nfa: Nfa) -> Self {
        let interesting = nfa.interesting_events();
        let current = nfa.start_states();
        Self {
            nfa,
            interesting,
            current,
            visited: BTreeSet::new(),
        }
    }

    /// Parse and compile pattern text.
    pub fn compile(source: &str) -> ParseResult<Self> {
        let pattern = parse_pattern(source)?;
        Ok(Self::new(Nfa::from_pattern(&pattern)))
    }

    /// Feed one event. Returns true iff the accepting state is now current.
    ///
    /// Events whose kind never appears in the pattern are skipped without
    /// touching any state and return false.
    pub fn match_one<E: EventPayload + ?Sized>(&mut self, event: &E) -> bool {
        if !self.interesting.contains(event.kind()) {
            return false;
        }
        self.current = self.nfa.step(&self.current, event);
        self.visited.extend(self.current.iter().copied());
        let accepting = self.current.contains(&self.nfa.accepting());
        if accepting {
            debug!("Pattern accepted on {}", event.kind());
        }
        accepting
    }

    pub fn reset(&mut self) {
        self.current = self.nfa.start_states();
        self.visited.clear();
    }

    pub fn visited_states(&self) -> &BTreeSet<StateId> {
        &self.visited
    }

    pub fn current_states(&self) -> &BTreeSet<StateId> {
        &self.current
    }

    pub fn is_accepting(&self) -> bool {
        self.current.contains(&self.nfa.accepting())
    }

    /// True once no event can ever lead to acceptance again.
    pub fn is_dead(&self) -> bool {
        self.current.is_empty()
    }

    pub fn is_interesting(&self, kind: &str) -> bool {
        self.interesting.contains(kind)
    }

    pub fn interesting_events(&self) -> &InterestingEvents {
        &self.interesting
    }

    pub fn nfa(&self) -> &Nfa {
        &self.nfa
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    fn run(matcher: &mut NfaMatcher, kinds: &[&str]) -> bool {
        matcher.reset();
        let mut last = false;
        for kind in kinds {
            last = matcher.match_one(&Event::new(*kind));
        }
        last
    }

    #[test]
    fn test_sequence_or_single() {
        let mut m = NfaMatcher::compile("(E1,E2, E3)| E4").unwrap();
        assert!(run(&mut m, &["E4"]));
        assert!(run(&mut m, &["E1", "E2", "E3"]));
        assert!(!run(&mut m, &["E1", "E2"]));
        assert!(!run(&mut m, &["E1", "E3", "E2"]));
    }

    #[test]
    fn test_uninteresting_events_are_skipped() {
        let mut m = NfaMatcher::compile("A, B").unwrap();
        let before = m.current_states().clone();
        assert!(!m.match_one(&Event::new("Noise")));
        assert_eq!(m.current_states(), &before);
        assert!(m.visited_states().is_empty());
        assert!(!m.match_one(&Event::new("A")));
        assert!(!m.match_one(&Event::new("Noise")));
        assert!(m.match_one(&Event::new("B")));
    }

    #[test]
    fn test_wildcard_scenario() {
        let mut any = NfaMatcher::compile(r#"Evt{k:"*"}"#).unwrap();
        assert!(any.match_one(&Event::new("Evt").with_field("k", "7")));
        any.reset();
        assert!(any.match_one(&Event::new("Evt").with_field("k", "x")));

        let mut exact = NfaMatcher::compile(r#"Evt{k:"1"}"#).unwrap();
        assert!(!exact.match_one(&Event::new("Evt").with_field("k", "2")));
        exact.reset();
        assert!(exact.match_one(&Event::new("Evt").with_field("k", "1")));
    }

    #[test]
    fn test_dead_after_wrong_order() {
        let mut m = NfaMatcher::compile("A, B").unwrap();
        m.match_one(&Event::new("B"));
        assert!(m.is_dead());
        assert!(!m.match_one(&Event::new("A")));
        assert!(!m.match_one(&Event::new("B")));
    }

    #[test]
    fn test_visited_accumulates_until_reset() {
        let mut m = NfaMatcher::compile("A, B, C").unwrap();
        m.match_one(&Event::new("A"));
        let after_a = m.visited_states().len();
        m.match_one(&Event::new("B"));
        assert!(m.visited_states().len() > after_a);
        m.reset();
        assert!(m.visited_states().is_empty());
        assert_eq!(m.current_states(), &m.nfa().start_states());
    }

    #[test]
    fn test_any_event_star() {
        let mut m = NfaMatcher::compile("Start, .*, End").unwrap();
        assert!(m.is_interesting("Whatever"));
        assert!(!run(&mut m, &["Start", "X", "Y"]));
        assert!(run(&mut m, &["Start", "X", "Y", "End"]));
    }
}
