//! Event-pattern language for actor programs.
//!
//! Patterns describe shapes of event sequences that the exploration engine
//! wants to see (or avoid). A pattern string is parsed into a [`Pattern`]
//! tree, compiled into an [`Nfa`] with Thompson's construction, and then
//! driven one event at a time by an [`NfaMatcher`].
//!
//! # Syntax
//!
//! ```text
//! Name{field:"literal", other:"*"}   one event of kind Name with field constraints
//! .                                  any event
//! a, b                               a followed by b (a bare space also works)
//! a | b                              a or b
//! a*   a+   a?                       zero-or-more, one-or-more, optional
//! ( ... )                            grouping
//! ```
//!
//! # Example
//!
//! ```
//! use actorcheck_pattern::{Event, NfaMatcher};
//!
//! let mut matcher = NfaMatcher::compile("(Ping, Pong)+ | Crash").unwrap();
//! assert!(!matcher.match_one(&Event::new("Ping")));
//! assert!(matcher.match_one(&Event::new("Pong")));
//! ```
//!
//! # Module Structure
//!
//! - [`event`]: typed event payload accessor
//! - [`ast`]: pattern tree and event-node predicates
//! - [`lexer`] / [`parser`]: pattern text to [`Pattern`]
//! - [`nfa`]: Thompson construction and ε-closure
//! - [`matcher`]: incremental matching with visited-state coverage
//! - [`dfa`]: subset construction, used for diagnostics

pub mod ast;
pub mod dfa;
pub mod event;
pub mod lexer;
pub mod matcher;
pub mod nfa;
pub mod parser;

pub use ast::{BinaryOp, EventNode, Label, Pattern, UnaryOp, ANY_EVENT, WILDCARD};
pub use dfa::Dfa;
pub use event::{Event, EventPayload};
pub use matcher::NfaMatcher;
pub use nfa::{InterestingEvents, Nfa, StateId, Transition};
pub use parser::{parse_pattern, ParseError, ParseResult, MAX_NESTING};
