//! Hand-written lexer: a single source buffer, a cursor, and one `tokenize`
//! driver dispatching on the current character.

use crate::error::LexError;
use crate::token::{keyword, Span, Token, TokenKind};

pub struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let span = Span::new(self.line, self.col);
            let Some(c) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, span));
                break;
            };

            let kind = match c {
                b'#' => {
                    self.read_comment();
                    continue;
                }
                b'\n' => {
                    self.advance();
                    self.line += 1;
                    self.col = 1;
                    TokenKind::Newline
                }
                b'"' | b'\'' => self.read_string()?,
                b'0'..=b'9' => self.read_number(),
                c if is_identifier_start(c) => self.read_identifier(),
                b'+' => self.single(TokenKind::Plus),
                b'-' => self.single(TokenKind::Minus),
                b'*' => self.single(TokenKind::Star),
                b'/' => self.single(TokenKind::Slash),
                b'%' => self.single(TokenKind::Percent),
                b'.' => self.single(TokenKind::Dot),
                b',' => self.single(TokenKind::Comma),
                b':' => self.single(TokenKind::Colon),
                b'(' => self.single(TokenKind::LParen),
                b')' => self.single(TokenKind::RParen),
                b'[' => self.single(TokenKind::LBracket),
                b']' => self.single(TokenKind::RBracket),
                b'{' => self.single(TokenKind::LBrace),
                b'}' => self.single(TokenKind::RBrace),
                b'=' => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        TokenKind::EqEq
                    } else {
                        TokenKind::Eq
                    }
                }
                b'!' => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        TokenKind::NotEq
                    } else {
                        return Err(self.error(span, "unexpected '!'"));
                    }
                }
                b'<' => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        TokenKind::LtEq
                    } else {
                        TokenKind::Lt
                    }
                }
                b'>' => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        TokenKind::GtEq
                    } else {
                        TokenKind::Gt
                    }
                }
                other => {
                    return Err(self.error(span, &format!("unexpected character '{}'", other as char)));
                }
            };
            tokens.push(Token::new(kind, span));
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        self.col += 1;
        Some(c)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn error(&self, span: Span, message: &str) -> LexError {
        LexError {
            line: span.line,
            col: span.col,
            message: message.to_string(),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c == b' ' || c == b'\t' || c == b'\r' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == b'\n' {
                break;
            }
            self.advance();
        }
    }

    /// A string literal opens with either `"` or `'` and must close with
    /// the same quote character; the other quote is an ordinary character
    /// inside it.
    fn read_string(&mut self) -> Result<TokenKind, LexError> {
        let span = Span::new(self.line, self.col);
        let quote = self.peek().expect("caller only dispatches here on a quote byte");
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Err(self.error(span, "unterminated string literal"));
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    match self.advance() {
                        Some(b'n') => value.push('\n'),
                        Some(b't') => value.push('\t'),
                        Some(b'\\') => value.push('\\'),
                        Some(c) if c == quote => value.push(c as char),
                        Some(other) => value.push(other as char),
                        None => return Err(self.error(span, "unterminated string literal")),
                    }
                }
                Some(c) => {
                    value.push(c as char);
                    self.advance();
                }
            }
        }
        Ok(TokenKind::Str(value))
    }

    /// A `.` is a decimal point only when followed by a digit; otherwise the
    /// number ends there and the `.` is left for member-access parsing.
    fn read_number(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            is_float = true;
            self.advance();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.advance();
            }
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).expect("ascii digits");
        if is_float {
            TokenKind::Float(text.parse().expect("validated float lexeme"))
        } else {
            TokenKind::Integer(text.parse().expect("validated integer lexeme"))
        }
    }

    fn read_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_identifier_continue(c)) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).expect("ascii identifier");
        keyword(text).unwrap_or_else(|| TokenKind::Identifier(text.to_string()))
    }
}

fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_identifier_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}
