//! Tokenizer shared by the selection, filter and order languages
//!
//! Keywords (`and`, `or`, `not`, `eq`, `asc`, `limit`, ...) are lexed as plain
//! identifiers; each grammar recognises them in context, so a field called
//! `order` or `limit` stays addressable.

use std::fmt;

/// One lexical token with its byte offset in the input
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Letters, digits, `_` and `-`; never starts with a digit or `-`
    Ident(String),
    /// Double-quoted string literal, escapes already resolved
    Str(String),
    /// Numeric literal in its source spelling
    Number(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBrace,
    RBrace,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "'{}'", s),
            TokenKind::Str(s) => write!(f, "\"{}\"", s),
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
        }
    }
}

/// Lexing failure: byte offset and reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub position: usize,
    pub message: String,
}

/// Splits `input` into tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        let kind = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '.' => {
                chars.next();
                TokenKind::Dot
            }
            ',' => {
                chars.next();
                TokenKind::Comma
            }
            '(' => {
                chars.next();
                TokenKind::LParen
            }
            ')' => {
                chars.next();
                TokenKind::RParen
            }
            '{' => {
                chars.next();
                TokenKind::LBrace
            }
            '}' => {
                chars.next();
                TokenKind::RBrace
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(LexError {
                        position: pos,
                        message: "unterminated string literal".into(),
                    });
                }
                TokenKind::Str(value)
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut raw = String::new();
                raw.push(c);
                chars.next();
                let mut seen_dot = false;
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        raw.push(c);
                        chars.next();
                    } else if c == '.' && !seen_dot && followed_by_digit(input, pos + raw.len()) {
                        seen_dot = true;
                        raw.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if raw != "-" {
                    for _ in 0..exponent_len(input, pos + raw.len()) {
                        if let Some((_, c)) = chars.next() {
                            raw.push(c);
                        }
                    }
                }
                if raw == "-" {
                    return Err(LexError {
                        position: pos,
                        message: "expected digits after '-'".into(),
                    });
                }
                TokenKind::Number(raw)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '-' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                TokenKind::Ident(ident)
            }
            other => {
                return Err(LexError {
                    position: pos,
                    message: format!("unexpected character '{}'", other),
                });
            }
        };
        tokens.push(Token {
            kind,
            position: pos,
        });
    }

    Ok(tokens)
}

/// True if the byte after the `.` at `dot` is an ASCII digit
fn followed_by_digit(input: &str, dot: usize) -> bool {
    input
        .as_bytes()
        .get(dot + 1)
        .is_some_and(|b| b.is_ascii_digit())
}

/// Length of an `[eE][+-]?digits` exponent starting at byte `at`, or 0
fn exponent_len(input: &str, at: usize) -> usize {
    let bytes = input.as_bytes();
    if !matches!(bytes.get(at), Some(b'e' | b'E')) {
        return 0;
    }
    let sign = usize::from(matches!(bytes.get(at + 1), Some(b'+' | b'-')));
    let digits = bytes[at + 1 + sign..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        0
    } else {
        1 + sign + digits
    }
}

/// Cursor over a token stream used by the three grammars
pub(crate) struct TokenStream {
    tokens: Vec<Token>,
    index: usize,
    end: usize,
}

impl TokenStream {
    pub(crate) fn new(tokens: Vec<Token>, input_len: usize) -> Self {
        Self {
            tokens,
            index: 0,
            end: input_len,
        }
    }

    pub(crate) fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.index).map(|t| &t.kind)
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.index + offset).map(|t| &t.kind)
    }

    pub(crate) fn advance(&mut self) -> Option<TokenKind> {
        let token = self.tokens.get(self.index).map(|t| t.kind.clone());
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    /// Byte offset of the next token, or the input length at the end
    pub(crate) fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map(|t| t.position)
            .unwrap_or(self.end)
    }

    pub(crate) fn is_done(&self) -> bool {
        self.index >= self.tokens.len()
    }

    /// Consumes the next token if it equals `kind`
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Consumes the next token if it is the identifier `word`
    pub(crate) fn eat_keyword(&mut self, word: &str) -> bool {
        match self.peek() {
            Some(TokenKind::Ident(ident)) if ident == word => {
                self.index += 1;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn peek_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Ident(ident)) if ident == word)
    }
}
