//! Vector clocks keyed by actor name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Per-actor logical counters. Missing entries read as 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, actor: &str) -> u64 {
        self.0.get(actor).copied().unwrap_or(0)
    }

    pub fn set(&mut self, actor: impl Into<String>, value: u64) {
        self.0.insert(actor.into(), value);
    }

    /// Tick `actor`'s own entry.
    pub fn increment(&mut self, actor: &str) {
        *self.0.entry(actor.to_string()).or_insert(0) += 1;
    }

    /// Component-wise maximum, as on message receipt.
    pub fn merge(&mut self, other: &VectorClock) {
        for (actor, &value) in &other.0 {
            let entry = self.0.entry(actor.clone()).or_insert(0);
            *entry = (*entry).max(value);
        }
    }

    /// `self ≤ other` on every key of either clock.
    pub fn le(&self, other: &VectorClock) -> bool {
        self.0.iter().all(|(actor, &v)| v <= other.get(actor))
            && other.0.iter().all(|(actor, &v)| self.get(actor) <= v)
    }

    /// `self ≤ other` with at least one strict component.
    pub fn lt(&self, other: &VectorClock) -> bool {
        self.le(other) && self.differs_from(other)
    }

    /// Neither clock is `≤` the other.
    pub fn concurrent(&self, other: &VectorClock) -> bool {
        !self.le(other) && !other.le(self)
    }

    fn differs_from(&self, other: &VectorClock) -> bool {
        self.0.iter().any(|(actor, &v)| v != other.get(actor))
            || other.0.iter().any(|(actor, &v)| self.get(actor) != v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(actor, &v)| (actor.as_str(), v))
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(actor, v)| (actor.into(), v)).collect())
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (actor, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", actor, v)?;
        }
        write!(f, "]")
    }
}
