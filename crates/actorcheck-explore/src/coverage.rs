//! Event coverage collection and comparison.
//!
//! Coverage is the set of `receiver:event` pairs dequeued during a run, each
//! with a saturating hit counter. The collector keeps the union over every
//! run of the session.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which `receiver:event` pairs were dequeued, and how often.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCoverage {
    hits: BTreeMap<String, u32>,
}

impl EventCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(receiver: &str, event: &str) -> String {
        format!("{}:{}", receiver, event)
    }

    /// Record one dequeue. Saturates at `u32::MAX`.
    pub fn record(&mut self, receiver: &str, event: &str) {
        let count = self.hits.entry(Self::key(receiver, event)).or_insert(0);
        *count = count.saturating_add(1);
    }

    pub fn clear(&mut self) {
        self.hits.clear();
    }

    /// Union, keeping the larger count for each pair.
    pub fn merge(&mut self, other: &EventCoverage) {
        for (key, &count) in &other.hits {
            let entry = self.hits.entry(key.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
    }

    /// Number of distinct pairs hit.
    pub fn count(&self) -> usize {
        self.hits.len()
    }

    pub fn hits(&self, receiver: &str, event: &str) -> u32 {
        self.hits
            .get(&Self::key(receiver, event))
            .copied()
            .unwrap_or(0)
    }

    /// Number of pairs in `self` that `global` has never seen.
    pub fn has_new_coverage(&self, global: &EventCoverage) -> usize {
        self.hits
            .keys()
            .filter(|key| !global.hits.contains_key(*key))
            .count()
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.hits.keys().cloned().collect()
    }
}

/// Accumulates event coverage across a session.
#[derive(Debug, Default)]
pub struct CoverageCollector {
    global_coverage: EventCoverage,
    total_pairs: usize,
    total_runs: u64,
}

impl CoverageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from previously collected coverage.
    pub fn with_global(global_coverage: EventCoverage, total_runs: u64) -> Self {
        Self {
            total_pairs: global_coverage.count(),
            global_coverage,
            total_runs,
        }
    }

    pub fn is_interesting(&self, coverage: &EventCoverage) -> bool {
        coverage.has_new_coverage(&self.global_coverage) > 0
    }

    /// Merge one run's coverage into the global map. Returns the number of
    /// new pairs.
    pub fn update_global(&mut self, coverage: &EventCoverage) -> usize {
        self.total_runs += 1;
        let before = self.global_coverage.count();
        self.global_coverage.merge(coverage);
        self.total_pairs = self.global_coverage.count();
        let new_pairs = self.total_pairs.saturating_sub(before);
        if new_pairs > 0 {
            log::info!(
                "New coverage: {} event pairs (total: {})",
                new_pairs,
                self.total_pairs
            );
        }
        new_pairs
    }

    pub fn stats(&self) -> CoverageStats {
        CoverageStats {
            total_pairs: self.total_pairs,
            total_runs: self.total_runs,
        }
    }

    pub fn global_coverage(&self) -> &EventCoverage {
        &self.global_coverage
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageStats {
    pub total_pairs: usize,
    pub total_runs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count() {
        let mut coverage = EventCoverage::new();
        coverage.record("server", "Ping");
        coverage.record("server", "Ping");
        coverage.record("client", "Pong");
        assert_eq!(coverage.count(), 2);
        assert_eq!(coverage.hits("server", "Ping"), 2);
        assert_eq!(coverage.hits("server", "Pong"), 0);
        assert!(coverage.keys().contains("client:Pong"));
    }

    #[test]
    fn test_merge_keeps_max() {
        let mut a = EventCoverage::new();
        a.record("s", "E");
        let mut b = EventCoverage::new();
        b.record("s", "E");
        b.record("s", "E");
        b.record("s", "F");
        a.merge(&b);
        assert_eq!(a.hits("s", "E"), 2);
        assert_eq!(a.count(), 2);
    }

    #[test]
    fn test_has_new_coverage() {
        let mut global = EventCoverage::new();
        global.record("s", "E");
        let mut run = EventCoverage::new();
        run.record("s", "E");
        assert_eq!(run.has_new_coverage(&global), 0);
        run.record("s", "F");
        assert_eq!(run.has_new_coverage(&global), 1);
    }

    #[test]
    fn test_collector_tracks_totals() {
        let mut collector = CoverageCollector::new();
        let mut run = EventCoverage::new();
        run.record("a", "X");
        assert!(collector.is_interesting(&run));
        assert_eq!(collector.update_global(&run), 1);
        assert!(!collector.is_interesting(&run));
        assert_eq!(collector.update_global(&run), 0);
        let stats = collector.stats();
        assert_eq!(stats.total_pairs, 1);
        assert_eq!(stats.total_runs, 2);
    }

    #[test]
    fn test_clear() {
        let mut coverage = EventCoverage::new();
        coverage.record("a", "X");
        coverage.clear();
        assert_eq!(coverage.count(), 0);
    }
}
