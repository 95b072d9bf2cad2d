//! Race detection from vector clocks.
//!
//! Two sends to the same receiver from different senders race when neither
//! send's clock is ordered before the other's.

use crate::clock::VectorClock;
use crate::operation::{Operation, SendSite};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct ConflictMonitor {
    /// Per receiver: every send seen this iteration and its clock.
    history: BTreeMap<String, Vec<(SendSite, VectorClock)>>,
    /// Symmetric conflict relation, kept across iterations.
    conflicts: BTreeMap<SendSite, BTreeSet<SendSite>>,
}

impl ConflictMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a send and compare it against earlier sends to the same
    /// receiver. Returns how many new racing pairs were found.
    pub fn on_send_event(
        &mut self,
        sender: &str,
        location: u32,
        receiver: &str,
        clock: &VectorClock,
    ) -> usize {
        let site = SendSite {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            location,
        };

        let history = self.history.entry(receiver.to_string()).or_default();
        let mut found = 0;
        for (prior, prior_clock) in history.iter() {
            if prior.sender == site.sender || !clock.concurrent(prior_clock) {
                continue;
            }
            let inserted = self
                .conflicts
                .entry(site.clone())
                .or_default()
                .insert(prior.clone());
            self.conflicts
                .entry(prior.clone())
                .or_default()
                .insert(site.clone());
            if inserted {
                debug!("Race: {} || {}", site, prior);
                found += 1;
            }
        }
        history.push((site, clock.clone()));
        found
    }

    /// Both operations are sends and their sites were seen racing.
    pub fn is_racing(&self, a: &Operation, b: &Operation) -> bool {
        match (a.send_site(), b.send_site()) {
            (Some(a), Some(b)) => self.sites_race(&a, &b),
            _ => false,
        }
    }

    pub fn sites_race(&self, a: &SendSite, b: &SendSite) -> bool {
        self.conflicts.get(a).is_some_and(|others| others.contains(b))
    }

    /// Forget per-receiver histories. Discovered races are kept.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Number of distinct unordered racing pairs.
    pub fn conflict_count(&self) -> usize {
        self.conflicts.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Every racing pair once, smaller site first.
    pub fn racing_pairs(&self) -> Vec<(SendSite, SendSite)> {
        self.conflicts
            .iter()
            .flat_map(|(a, others)| {
                others
                    .iter()
                    .filter(move |b| a < *b)
                    .map(move |b| (a.clone(), b.clone()))
            })
            .collect()
    }
}
