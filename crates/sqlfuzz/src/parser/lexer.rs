//! Lexer for SQL queries
//!
//! Tokenizes a query into a stream of tokens with source position tracking.
//! The lexer never fails: characters it does not understand, and quotes that
//! never close, come back as [`TokenKind::Invalid`] so that malformed corpus
//! lines and fuzzed input still produce a token sequence.

use super::span::{Position, Span};
use super::tokens::{Token, TokenKind};

/// A token with its source location span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Lexer for SQL queries.
pub struct Lexer<'a> {
    input: &'a str,
    /// Current position in the input
    position: Position,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            position: Position::new(),
            chars: input.chars().peekable(),
        }
    }

    /// Get the current position in the input.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Get the next token from the input (without span info).
    pub fn next_token(&mut self) -> Option<Token> {
        self.next_spanned_token().map(|spanned| spanned.token)
    }

    /// Get the next token with its source span.
    pub fn next_spanned_token(&mut self) -> Option<SpannedToken> {
        self.skip_trivia();
        let start = self.position;
        let kind = self.next_kind()?;
        let end = self.position;
        let span = Span::from_positions(start, end);
        Some(SpannedToken {
            token: Token::new(kind, &self.input[span.range()]),
            span,
        })
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Look one character past `peek_char`.
    fn peek_second(&self) -> Option<char> {
        self.input[self.position.offset..].chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next();
        if let Some(c) = ch {
            self.position.advance(c);
        }
        ch
    }

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('#') => self.skip_line(),
                // MySQL only treats `--` as a comment when whitespace follows
                Some('-')
                    if self.peek_second() == Some('-')
                        && self.input[self.position.offset + 2..]
                            .chars()
                            .next()
                            .is_none_or(char::is_whitespace) =>
                {
                    self.skip_line()
                }
                Some('/') if self.peek_second() == Some('*') => {
                    self.advance();
                    self.advance();
                    // An unterminated block comment runs to the end of input
                    while let Some(c) = self.advance() {
                        if c == '*' && self.peek_char() == Some('/') {
                            self.advance();
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Consume one token and return its kind (called after trivia skip).
    fn next_kind(&mut self) -> Option<TokenKind> {
        let ch = self.peek_char()?;

        let kind = match ch {
            '\'' | '"' => self.read_string(ch),
            '`' => self.read_quoted_identifier(),
            '@' => self.read_variable(),
            c if c.is_ascii_digit() => self.read_number(),
            '.' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => self.read_number(),
            c if c.is_alphabetic() || c == '_' => self.read_word(),
            _ => self.read_operator(),
        };
        Some(kind)
    }

    fn read_operator(&mut self) -> TokenKind {
        let Some(ch) = self.advance() else {
            return TokenKind::End;
        };
        match ch {
            '*' => TokenKind::Star,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Semicolon,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => {
                // `==` is accepted as equality
                if self.peek_char() == Some('=') {
                    self.advance();
                }
                TokenKind::Equals
            }
            '<' => match self.peek_char() {
                Some('=') => {
                    self.advance();
                    TokenKind::LessEqual
                }
                Some('>') => {
                    self.advance();
                    TokenKind::NotEquals
                }
                _ => TokenKind::Less,
            },
            '>' => {
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::NotEquals
                } else {
                    TokenKind::Invalid
                }
            }
            _ => TokenKind::Invalid,
        }
    }

    /// Read a quoted string. Handles backslash escapes and doubled quotes.
    fn read_string(&mut self, quote: char) -> TokenKind {
        self.advance();
        while let Some(c) = self.advance() {
            if c == '\\' {
                if self.advance().is_none() {
                    break;
                }
            } else if c == quote {
                if self.peek_char() == Some(quote) {
                    self.advance();
                } else {
                    return TokenKind::StringLiteral;
                }
            }
        }
        TokenKind::Invalid
    }

    fn read_quoted_identifier(&mut self) -> TokenKind {
        self.advance();
        while let Some(c) = self.advance() {
            if c == '`' {
                return TokenKind::Identifier;
            }
        }
        TokenKind::Invalid
    }

    fn read_variable(&mut self) -> TokenKind {
        self.advance();
        if self.peek_char() == Some('@') {
            self.advance();
        }
        let mut saw_name = false;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == '$' {
                saw_name = true;
                self.advance();
            } else {
                break;
            }
        }
        if saw_name {
            TokenKind::Variable
        } else {
            TokenKind::Invalid
        }
    }

    fn read_number(&mut self) -> TokenKind {
        let mut is_float = false;
        self.eat_digits();
        if self.peek_char() == Some('.') {
            is_float = true;
            self.advance();
            self.eat_digits();
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let sign_or_digit = self.peek_second();
            let digit_after_sign = self.input[self.position.offset..].chars().nth(2);
            let has_exponent = match sign_or_digit {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => digit_after_sign.is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if has_exponent {
                is_float = true;
                self.advance();
                if matches!(self.peek_char(), Some('+' | '-')) {
                    self.advance();
                }
                self.eat_digits();
            }
        }
        if is_float {
            TokenKind::Float
        } else {
            TokenKind::Integer
        }
    }

    fn eat_digits(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
    }

    fn read_word(&mut self) -> TokenKind {
        let start = self.position.offset;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.advance();
            } else {
                break;
            }
        }
        let word = &self.input[start..self.position.offset];
        TokenKind::keyword(word).unwrap_or(TokenKind::Identifier)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}
