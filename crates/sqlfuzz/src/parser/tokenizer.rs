//! Tokenizer boundary consumed by the corpus model
//!
//! The model only needs integer token ids and one printable rendering per
//! lexeme. Any lexer can sit behind [`Tokenizer`]; [`SqlTokenizer`] is the
//! reference one built on [`Lexer`].

use super::lexer::Lexer;
use super::tokens::TokenKind;
use crate::error::{Error, Result};
use crate::limits::FuzzLimits;

/// Integer token id. `0` is reserved for end of query.
pub type TokenId = i32;

/// Token id that terminates every tokenized line.
pub const END_OF_QUERY: TokenId = 0;

/// Text rendered for every string literal, whatever its contents.
pub const STRING_PLACEHOLDER: &str = "'str'";

/// One tokenized unit: its id and the text to emit for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub id: TokenId,
    pub text: String,
}

impl Lexeme {
    pub fn new(id: TokenId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }

    pub fn end() -> Self {
        Self::new(END_OF_QUERY, "")
    }
}

/// Splits one line of text into lexemes.
///
/// The returned sequence always ends with exactly one [`END_OF_QUERY`]
/// lexeme. An `Err` means the tokenizer could not be set up for this line.
pub trait Tokenizer {
    fn tokenize(&self, line: &str) -> Result<Vec<Lexeme>>;
}

/// Reference tokenizer for MySQL-flavoured SQL.
#[derive(Debug, Clone)]
pub struct SqlTokenizer {
    max_line_bytes: usize,
}

impl Default for SqlTokenizer {
    fn default() -> Self {
        Self::new(&FuzzLimits::default())
    }
}

impl SqlTokenizer {
    pub fn new(limits: &FuzzLimits) -> Self {
        Self {
            max_line_bytes: limits.max_line_bytes,
        }
    }

    /// Text the model should store for a token.
    ///
    /// String literal contents are irrelevant to the model, so every
    /// literal renders as [`STRING_PLACEHOLDER`].
    pub fn render(kind: TokenKind, text: &str) -> String {
        match kind {
            TokenKind::StringLiteral => STRING_PLACEHOLDER.to_string(),
            _ => text.to_string(),
        }
    }
}

impl Tokenizer for SqlTokenizer {
    fn tokenize(&self, line: &str) -> Result<Vec<Lexeme>> {
        if line.len() > self.max_line_bytes {
            return Err(Error::Tokenizer {
                line: 0,
                message: format!(
                    "line is {} bytes, limit is {}",
                    line.len(),
                    self.max_line_bytes
                ),
            });
        }

        let mut lexemes: Vec<Lexeme> = Lexer::new(line)
            .map(|token| Lexeme::new(token.kind.id(), Self::render(token.kind, &token.text)))
            .collect();
        lexemes.push(Lexeme::end());
        Ok(lexemes)
    }
}
