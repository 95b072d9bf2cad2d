//! Event payloads as seen by the pattern matcher.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Typed access to an event's kind and payload fields.
///
/// Event types implement this at their definition site so the matcher can
/// test field constraints without any runtime introspection.
pub trait EventPayload {
    /// The event kind, e.g. `"eRequest"`.
    fn kind(&self) -> &str;

    /// All payload fields rendered as strings.
    fn fields(&self) -> BTreeMap<String, String>;

    /// A single payload field.
    fn field(&self, name: &str) -> Option<String> {
        self.fields().remove(name)
    }
}

/// A plain event record: a kind plus string-valued fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub fields: BTreeMap<String, String>,
}

impl Event {
    /// Create an event with no fields.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder: attach a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(name.into(), value.to_string());
        self
    }
}

impl EventPayload for Event {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn fields(&self) -> BTreeMap<String, String> {
        self.fields.clone()
    }

    fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }
}
