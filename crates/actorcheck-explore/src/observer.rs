//! Per-run observers fed by the runtime's dequeue hook.

use crate::coverage::EventCoverage;
use actorcheck_pattern::{EventPayload, NfaMatcher};
use actorcheck_sched::RunSummary;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::hash::{Hash, Hasher};

/// Events kept per actor when hashing timelines.
pub const TIMELINE_WINDOW: usize = 15;

/// Drives the pattern matcher over dequeued events.
#[derive(Debug, Clone)]
pub struct EventPatternObserver {
    matcher: NfaMatcher,
    matched: bool,
    matched_events: Vec<String>,
}

impl EventPatternObserver {
    pub fn new(matcher: NfaMatcher) -> Self {
        Self {
            matcher,
            matched: false,
            matched_events: Vec::new(),
        }
    }

    pub fn on_dequeue_event<E: EventPayload + ?Sized>(&mut self, event: &E) {
        if !self.matcher.is_interesting(event.kind()) {
            return;
        }
        self.matched_events.push(event.kind().to_string());
        if self.matcher.match_one(event) && !self.matched {
            log::debug!(
                "pattern matched after {} interesting events",
                self.matched_events.len()
            );
            self.matched = true;
        }
    }

    /// The pattern was witnessed at some point during this run.
    pub fn is_matched(&self) -> bool {
        self.matched
    }

    pub fn visited_states(&self) -> &BTreeSet<usize> {
        self.matcher.visited_states()
    }

    pub fn matched_events(&self) -> &[String] {
        &self.matched_events
    }

    pub fn matcher(&self) -> &NfaMatcher {
        &self.matcher
    }

    pub fn reset(&mut self) {
        self.matcher.reset();
        self.matched = false;
        self.matched_events.clear();
    }
}

/// Run-length encoded per-actor timelines.
///
/// After every event the window of the receiving actor's last
/// [`TIMELINE_WINDOW`] event runs is hashed; the run's timeline hash combines
/// all distinct window hashes. Only the order of event kinds is hashed, not
/// run lengths, so looping more often is not a new timeline.
#[derive(Debug, Clone, Default)]
pub struct TimelineObserver {
    windows: BTreeMap<String, VecDeque<(String, u32)>>,
    seen: BTreeSet<u64>,
}

impl TimelineObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_dequeue_event(&mut self, actor: &str, kind: &str) {
        let window = self.windows.entry(actor.to_string()).or_default();
        let repeated = window.back().map_or(false, |(last, _)| last == kind);
        if !repeated {
            window.push_back((kind.to_string(), 0));
        }
        if let Some(run) = window.back_mut() {
            run.1 = run.1.saturating_add(1);
        }
        while window.len() > TIMELINE_WINDOW {
            window.pop_front();
        }
        let mut hasher = DefaultHasher::new();
        actor.hash(&mut hasher);
        for (kind, _) in window.iter() {
            kind.hash(&mut hasher);
        }
        self.seen.insert(hasher.finish());
    }

    /// `None` until some event was observed.
    pub fn timeline_hash(&self) -> Option<u64> {
        if self.seen.is_empty() {
            return None;
        }
        let mut hasher = DefaultHasher::new();
        self.seen.hash(&mut hasher);
        Some(hasher.finish())
    }

    pub fn reset(&mut self) {
        self.windows.clear();
        self.seen.clear();
    }
}

/// Everything observed during one run.
#[derive(Debug, Clone, Default)]
pub struct RunObserver {
    pattern: Option<EventPatternObserver>,
    coverage: EventCoverage,
    timeline: TimelineObserver,
}

impl RunObserver {
    pub fn new(matcher: Option<NfaMatcher>) -> Self {
        Self {
            pattern: matcher.map(EventPatternObserver::new),
            ..Default::default()
        }
    }

    pub fn on_dequeue_event<E: EventPayload + ?Sized>(&mut self, receiver: &str, event: &E) {
        self.coverage.record(receiver, event.kind());
        self.timeline.on_dequeue_event(receiver, event.kind());
        if let Some(pattern) = &mut self.pattern {
            pattern.on_dequeue_event(event);
        }
    }

    pub fn coverage(&self) -> &EventCoverage {
        &self.coverage
    }

    pub fn pattern(&self) -> Option<&EventPatternObserver> {
        self.pattern.as_ref()
    }

    pub fn summary(&self, steps: usize, bug_found: bool) -> RunSummary {
        RunSummary {
            steps,
            event_coverage: self.coverage.keys(),
            visited_states: self
                .pattern
                .as_ref()
                .map(|p| p.visited_states().clone())
                .unwrap_or_default(),
            pattern_matched: self.pattern.as_ref().map_or(false, |p| p.is_matched()),
            timeline_hash: self.timeline.timeline_hash(),
            matched_events: self
                .pattern
                .as_ref()
                .map(|p| p.matched_events().to_vec())
                .unwrap_or_default(),
            bug_found,
        }
    }

    pub fn reset(&mut self) {
        self.coverage.clear();
        self.timeline.reset();
        if let Some(pattern) = &mut self.pattern {
            pattern.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actorcheck_pattern::Event;

    fn observer(pattern: &str) -> RunObserver {
        RunObserver::new(Some(NfaMatcher::compile(pattern).unwrap()))
    }

    #[test]
    fn test_pattern_match_is_sticky() {
        let mut obs = observer("Ping, Pong");
        obs.on_dequeue_event("server", &Event::new("Ping"));
        obs.on_dequeue_event("client", &Event::new("Pong"));
        obs.on_dequeue_event("server", &Event::new("Ping"));
        let summary = obs.summary(3, false);
        assert!(summary.pattern_matched);
        assert_eq!(summary.matched_events, vec!["Ping", "Pong", "Ping"]);
        assert!(!summary.visited_states.is_empty());
    }

    #[test]
    fn test_uninteresting_events_only_feed_coverage() {
        let mut obs = observer("Ping");
        obs.on_dequeue_event("server", &Event::new("Tick"));
        let summary = obs.summary(1, false);
        assert!(!summary.pattern_matched);
        assert!(summary.matched_events.is_empty());
        assert!(summary.event_coverage.contains("server:Tick"));
    }

    #[test]
    fn test_reset_clears_run_state() {
        let mut obs = observer("Ping");
        obs.on_dequeue_event("server", &Event::new("Ping"));
        obs.reset();
        let summary = obs.summary(0, false);
        assert!(!summary.pattern_matched);
        assert!(summary.event_coverage.is_empty());
        assert_eq!(summary.timeline_hash, None);
    }

    #[test]
    fn test_timeline_hash_tracks_order() {
        let mut a = TimelineObserver::new();
        a.on_dequeue_event("x", "A");
        a.on_dequeue_event("x", "B");
        let mut b = TimelineObserver::new();
        b.on_dequeue_event("x", "B");
        b.on_dequeue_event("x", "A");
        let mut c = TimelineObserver::new();
        c.on_dequeue_event("x", "A");
        c.on_dequeue_event("x", "B");
        assert_ne!(a.timeline_hash(), b.timeline_hash());
        assert_eq!(a.timeline_hash(), c.timeline_hash());
    }

    #[test]
    fn test_timeline_run_length_encoding() {
        let mut timeline = TimelineObserver::new();
        for _ in 0..100 {
            timeline.on_dequeue_event("x", "Tick");
        }
        assert_eq!(timeline.windows["x"].len(), 1);
        assert_eq!(timeline.windows["x"][0].1, 100);
    }

    #[test]
    fn test_timeline_hash_ignores_repeat_counts() {
        let timeline = |ticks: usize| {
            let mut timeline = TimelineObserver::new();
            for _ in 0..ticks {
                timeline.on_dequeue_event("x", "Tick");
            }
            timeline.on_dequeue_event("x", "Done");
            timeline.timeline_hash()
        };
        assert_eq!(timeline(3), timeline(7));
        assert_ne!(timeline(3), timeline(0));
    }

    #[test]
    fn test_timeline_window_is_bounded() {
        let mut timeline = TimelineObserver::new();
        for i in 0..40 {
            timeline.on_dequeue_event("x", &format!("E{}", i));
        }
        assert_eq!(timeline.windows["x"].len(), TIMELINE_WINDOW);
    }

    #[test]
    fn test_no_pattern() {
        let mut obs = RunObserver::new(None);
        obs.on_dequeue_event("a", &Event::new("E"));
        let summary = obs.summary(1, true);
        assert!(summary.visited_states.is_empty());
        assert!(summary.bug_found);
        assert!(summary.timeline_hash.is_some());
    }
}
