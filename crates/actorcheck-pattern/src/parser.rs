//! Recursive-descent parser for event patterns.
//!
//! ```text
//! alternation := sequence ('|' sequence)*
//! sequence    := postfix (','? postfix)*
//! postfix     := primary ('+' | '?' | '*')*
//! primary     := Ident fields? | '.' | '(' alternation? ')'
//! fields      := '{' (Ident ':' (Str | '*')) (',' Ident ':' (Str | '*'))* '}'
//! ```

use crate::ast::{EventNode, Pattern, WILDCARD};
use crate::lexer::{Lexer, Span, Token, TokenKind};
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing pattern text. No automaton is built on failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected token at {span}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("unexpected end of pattern at {span}: expected {expected}")]
    UnexpectedEof { expected: String, span: Span },
    #[error("invalid syntax at {span}: {message}")]
    InvalidSyntax { message: String, span: Span },
    #[error("empty pattern")]
    Empty,
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::UnexpectedEof { span, .. }
            | ParseError::InvalidSyntax { span, .. } => Some(*span),
            ParseError::Empty => None,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Deepest parenthesis nesting accepted in a pattern.
pub const MAX_NESTING: usize = 64;

/// Parse pattern text into a tree.
pub fn parse_pattern(source: &str) -> ParseResult<Pattern> {
    Parser::new(source).parse()
}

impl FromStr for Pattern {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_pattern(s)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            tokens: Lexer::new(source).tokenize(),
            pos: 0,
            depth: 0,
        }
    }

    fn parse(mut self) -> ParseResult<Pattern> {
        if self.peek().is_eof() {
            return Err(ParseError::Empty);
        }
        let pattern = self.parse_alternation()?;
        let trailing = self.peek();
        if !trailing.is_eof() {
            return Err(self.unexpected("end of pattern"));
        }
        Ok(pattern)
    }

    fn parse_alternation(&mut self) -> ParseResult<Pattern> {
        let mut left = self.parse_sequence()?;
        while self.eat(&TokenKind::Pipe) {
            let right = self.parse_sequence()?;
            left = Pattern::alternation(left, right);
        }
        Ok(left)
    }

    fn parse_sequence(&mut self) -> ParseResult<Pattern> {
        let mut left = self.parse_postfix()?;
        loop {
            if self.eat(&TokenKind::Comma) || self.starts_term() {
                let right = self.parse_postfix()?;
                left = Pattern::concatenation(left, right);
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Pattern> {
        let mut inner = self.parse_primary()?;
        loop {
            inner = match self.peek().kind {
                TokenKind::Plus => Pattern::plus(inner),
                TokenKind::Question => Pattern::maybe(inner),
                TokenKind::Star => Pattern::star(inner),
                _ => return Ok(inner),
            };
            self.pos += 1;
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Pattern> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.pos += 1;
                let node = self.parse_fields(EventNode::new(name))?;
                Ok(Pattern::event(node))
            }
            TokenKind::Dot => {
                self.pos += 1;
                Ok(Pattern::event(EventNode::any()))
            }
            TokenKind::LParen => {
                self.pos += 1;
                if self.eat(&TokenKind::RParen) {
                    return Ok(Pattern::Epsilon);
                }
                if self.depth >= MAX_NESTING {
                    return Err(ParseError::InvalidSyntax {
                        message: format!("groups nested deeper than {}", MAX_NESTING),
                        span: token.span,
                    });
                }
                self.depth += 1;
                let inner = self.parse_alternation()?;
                self.depth -= 1;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            _ => Err(self.unexpected("an event, `.` or `(`")),
        }
    }

    fn parse_fields(&mut self, mut node: EventNode) -> ParseResult<EventNode> {
        if !self.eat(&TokenKind::LBrace) {
            return Ok(node);
        }
        if self.eat(&TokenKind::RBrace) {
            return Ok(node);
        }
        loop {
            let field = match self.peek().kind.clone() {
                TokenKind::Ident(field) => {
                    self.pos += 1;
                    field
                }
                _ => return Err(self.unexpected("a field name")),
            };
            self.expect(&TokenKind::Colon, "`:`")?;
            let value = match self.peek().kind.clone() {
                TokenKind::Str(value) => value,
                TokenKind::Star => WILDCARD.to_string(),
                _ => return Err(self.unexpected("a quoted value or `*`")),
            };
            self.pos += 1;
            node = node.with_constraint(field, value);

            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(&TokenKind::RBrace, "`}` or `,`")?;
            return Ok(node);
        }
    }

    fn starts_term(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Ident(_) | TokenKind::Dot | TokenKind::LParen
        )
    }

    fn peek(&self) -> &Token {
        // The token stream always ends in Eof and `pos` never passes it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        match &token.kind {
            TokenKind::Eof => ParseError::UnexpectedEof {
                expected: expected.to_string(),
                span: token.span,
            },
            TokenKind::Error(message) => ParseError::InvalidSyntax {
                message: message.clone(),
                span: token.span,
            },
            other => ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: other.to_string(),
                span: token.span,
            },
        }
    }
}
