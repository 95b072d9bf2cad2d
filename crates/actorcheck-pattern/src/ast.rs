//! Pattern tree.
//!
//! Leaves are [`EventNode`]s (or ε); interior nodes are binary
//! (alternation, concatenation) or unary (star, maybe). Trees are built once
//! by the parser and never mutated afterwards.

use crate::event::EventPayload;
use std::collections::BTreeMap;
use std::fmt;

/// Field constraint value that matches any value.
pub const WILDCARD: &str = "*";

/// Event name that matches any event kind.
pub const ANY_EVENT: &str = ".";

/// One event term: a kind plus per-field constraints.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventNode {
    pub name: String,
    pub constraints: BTreeMap<String, String>,
}

impl EventNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraints: BTreeMap::new(),
        }
    }

    /// The `.` term.
    pub fn any() -> Self {
        Self::new(ANY_EVENT)
    }

    pub fn with_constraint(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints.insert(field.into(), value.into());
        self
    }

    pub fn is_any(&self) -> bool {
        self.name == ANY_EVENT
    }

    /// Whether `event` satisfies this term.
    ///
    /// The kind must match (unless this is `.`), and every constrained field
    /// must be present on the event and equal the literal, or the literal
    /// must be `*`.
    pub fn matches<E: EventPayload + ?Sized>(&self, event: &E) -> bool {
        if !self.is_any() && self.name != event.kind() {
            return false;
        }
        self.constraints.iter().all(|(field, expected)| {
            match event.field(field) {
                Some(actual) => expected == WILDCARD || *expected == actual,
                None => false,
            }
        })
    }
}

impl fmt::Display for EventNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.constraints.is_empty() {
            return Ok(());
        }
        write!(f, "{{")?;
        for (i, (field, value)) in self.constraints.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{:?}", field, value)?;
        }
        write!(f, "}}")
    }
}

/// An automaton edge label: ε or an event term.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    Epsilon,
    Event(EventNode),
}

impl Label {
    pub fn is_epsilon(&self) -> bool {
        matches!(self, Label::Epsilon)
    }

    pub fn event(&self) -> Option<&EventNode> {
        match self {
            Label::Epsilon => None,
            Label::Event(node) => Some(node),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Epsilon => write!(f, "ε"),
            Label::Event(node) => write!(f, "{}", node),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `a | b`
    Alternation,
    /// `a, b`
    Concatenation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `a*`
    Star,
    /// `a?`
    Maybe,
}

/// A parsed event pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Epsilon,
    Event(EventNode),
    Binary {
        op: BinaryOp,
        left: Box<Pattern>,
        right: Box<Pattern>,
    },
    Unary {
        op: UnaryOp,
        inner: Box<Pattern>,
    },
}

impl Pattern {
    pub fn event(node: EventNode) -> Self {
        Pattern::Event(node)
    }

    pub fn alternation(left: Pattern, right: Pattern) -> Self {
        Pattern::Binary {
            op: BinaryOp::Alternation,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn concatenation(left: Pattern, right: Pattern) -> Self {
        Pattern::Binary {
            op: BinaryOp::Concatenation,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn star(inner: Pattern) -> Self {
        Pattern::Unary {
            op: UnaryOp::Star,
            inner: Box::new(inner),
        }
    }

    pub fn maybe(inner: Pattern) -> Self {
        Pattern::Unary {
            op: UnaryOp::Maybe,
            inner: Box::new(inner),
        }
    }

    /// `a+` is sugar for `a, a*`.
    pub fn plus(inner: Pattern) -> Self {
        Pattern::concatenation(inner.clone(), Pattern::star(inner))
    }

    /// Every event term in the tree, left to right.
    pub fn events(&self) -> Vec<&EventNode> {
        let mut out = Vec::new();
        self.collect_events(&mut out);
        out
    }

    fn collect_events<'a>(&'a self, out: &mut Vec<&'a EventNode>) {
        match self {
            Pattern::Epsilon => {}
            Pattern::Event(node) => out.push(node),
            Pattern::Binary { left, right, .. } => {
                left.collect_events(out);
                right.collect_events(out);
            }
            Pattern::Unary { inner, .. } => inner.collect_events(out),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Pattern::Binary {
                op: BinaryOp::Alternation,
                ..
            } => 0,
            Pattern::Binary {
                op: BinaryOp::Concatenation,
                ..
            } => 1,
            _ => 2,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Epsilon => write!(f, "()"),
            Pattern::Event(node) => write!(f, "{}", node),
            Pattern::Binary { op, left, right } => {
                let (min, sep) = match op {
                    BinaryOp::Alternation => (0, " | "),
                    BinaryOp::Concatenation => (1, ", "),
                };
                left.fmt_child(f, min)?;
                write!(f, "{}", sep)?;
                right.fmt_child(f, min)
            }
            Pattern::Unary { op, inner } => {
                inner.fmt_child(f, 2)?;
                match op {
                    UnaryOp::Star => write!(f, "*"),
                    UnaryOp::Maybe => write!(f, "?"),
                }
            }
        }
    }
}
