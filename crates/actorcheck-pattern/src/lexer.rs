//! Tokenizer for pattern text.

use std::fmt;
use std::str::Chars;

/// Byte range of a token in the pattern text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Dot,
    Comma,
    Pipe,
    Plus,
    Question,
    Star,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    /// Unterminated string or stray character.
    Error(String),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier `{}`", name),
            TokenKind::Str(s) => write!(f, "string {:?}", s),
            TokenKind::Dot => write!(f, "`.`"),
            TokenKind::Comma => write!(f, "`,`"),
            TokenKind::Pipe => write!(f, "`|`"),
            TokenKind::Plus => write!(f, "`+`"),
            TokenKind::Question => write!(f, "`?`"),
            TokenKind::Star => write!(f, "`*`"),
            TokenKind::Colon => write!(f, "`:`"),
            TokenKind::LParen => write!(f, "`(`"),
            TokenKind::RParen => write!(f, "`)`"),
            TokenKind::LBrace => write!(f, "`{{`"),
            TokenKind::RBrace => write!(f, "`}}`"),
            TokenKind::Error(msg) => write!(f, "{}", msg),
            TokenKind::Eof => write!(f, "end of pattern"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

/// Hand-written lexer over pattern text.
pub struct Lexer<'a> {
    chars: Chars<'a>,
    pos: usize,
    token_start: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars(),
            pos: 0,
            token_start: 0,
        }
    }

    /// Lex the whole input; the last token is always `Eof`.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        self.token_start = self.pos;

        let Some(c) = self.advance() else {
            return self.make_token(TokenKind::Eof);
        };

        let kind = match c {
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            '|' => TokenKind::Pipe,
            '+' => TokenKind::Plus,
            '?' => TokenKind::Question,
            '*' => TokenKind::Star,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '"' => self.lex_string(),
            c if is_ident_start(c) => self.lex_ident(c),
            other => TokenKind::Error(format!("unexpected character {:?}", other)),
        };
        self.make_token(kind)
    }

    fn lex_ident(&mut self, first: char) -> TokenKind {
        let mut name = String::from(first);
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Ident(name)
    }

    fn lex_string(&mut self) -> TokenKind {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('"') => return TokenKind::Str(value),
                Some('\\') => match self.advance() {
                    Some(escaped) => value.push(escaped),
                    None => break,
                },
                Some(c) => value.push(c),
                None => break,
            }
        }
        TokenKind::Error("unterminated string".to_string())
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            span: Span {
                start: self.token_start,
                end: self.pos,
            },
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_event_with_fields() {
        assert_eq!(
            kinds(r#"eReq{id:"3", who:"*"}"#),
            vec![
                TokenKind::Ident("eReq".into()),
                TokenKind::LBrace,
                TokenKind::Ident("id".into()),
                TokenKind::Colon,
                TokenKind::Str("3".into()),
                TokenKind::Comma,
                TokenKind::Ident("who".into()),
                TokenKind::Colon,
                TokenKind::Str("*".into()),
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_operators() {
        assert_eq!(
            kinds("(a|.)+?*"),
            vec![
                TokenKind::LParen,
                TokenKind::Ident("a".into()),
                TokenKind::Pipe,
                TokenKind::Dot,
                TokenKind::RParen,
                TokenKind::Plus,
                TokenKind::Question,
                TokenKind::Star,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_spans() {
        let tokens = Lexer::new("  ab , c").tokenize();
        assert_eq!(tokens[0].span, Span { start: 2, end: 4 });
        assert_eq!(tokens[1].span, Span { start: 5, end: 6 });
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = Lexer::new(r#"E{k:"oops"#).tokenize();
        assert!(matches!(tokens[4].kind, TokenKind::Error(_)));
    }
}
