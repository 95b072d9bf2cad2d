//! Bugs found during exploration, each with the trace that reproduces it.

use serde::{Deserialize, Serialize};

/// A property violation in the program under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReport {
    /// Unique bug ID, assigned by the [`BugLog`].
    pub bug_id: u64,
    /// Iteration the bug was found in.
    pub iteration: u64,
    pub message: String,
    /// Scheduling decisions before the bug surfaced.
    pub steps: usize,
    /// Strategy that found it.
    pub strategy: String,
    /// Reproducible trace text.
    pub trace: String,
}

/// Bugs found so far, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct BugLog {
    bugs: Vec<BugReport>,
    next_bug_id: u64,
}

impl BugLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from previously saved reports.
    pub fn from_reports(bugs: Vec<BugReport>) -> Self {
        let next_bug_id = bugs.iter().map(|b| b.bug_id + 1).max().unwrap_or(0);
        Self { bugs, next_bug_id }
    }

    /// Assigns an id and stores the report. Returns the id.
    pub fn add(&mut self, mut bug: BugReport) -> u64 {
        bug.bug_id = self.next_bug_id;
        self.next_bug_id += 1;
        let id = bug.bug_id;
        self.bugs.push(bug);
        id
    }

    pub fn bugs(&self) -> &[BugReport] {
        &self.bugs
    }

    /// Number of distinct messages seen.
    pub fn distinct_messages(&self) -> usize {
        let mut messages: Vec<&str> = self.bugs.iter().map(|b| b.message.as_str()).collect();
        messages.sort_unstable();
        messages.dedup();
        messages.len()
    }

    pub fn len(&self) -> usize {
        self.bugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bugs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bug(message: &str) -> BugReport {
        BugReport {
            bug_id: 0,
            iteration: 3,
            message: message.to_string(),
            steps: 12,
            strategy: "random".to_string(),
            trace: "(0)\n(1)\n".to_string(),
        }
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut log = BugLog::new();
        assert!(log.is_empty());
        assert_eq!(log.add(bug("a")), 0);
        assert_eq!(log.add(bug("b")), 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.bugs()[1].bug_id, 1);
    }

    #[test]
    fn test_distinct_messages() {
        let mut log = BugLog::new();
        log.add(bug("race"));
        log.add(bug("race"));
        log.add(bug("deadlock"));
        assert_eq!(log.distinct_messages(), 2);
    }

    #[test]
    fn test_from_reports_continues_ids() {
        let mut first = BugLog::new();
        first.add(bug("a"));
        first.add(bug("b"));
        let mut resumed = BugLog::from_reports(first.bugs().to_vec());
        assert_eq!(resumed.add(bug("c")), 2);
    }
}
