//! Parser module for sqlfuzz
//!
//! Holds both sides of the boundary to the code under test: the
//! [`Tokenizer`] the corpus model trains on and the [`ParseTarget`] the
//! harness drives. The reference implementations here are a recursive
//! descent parser for the MySQL statements a database firewall sees, and the
//! lexer it is built on.

mod ast;
mod lexer;
mod span;
mod tokenizer;
mod tokens;

pub use ast::{Statement, StatementKind};
pub use lexer::{Lexer, SpannedToken};
pub use span::{Position, Span};
pub use tokenizer::{END_OF_QUERY, Lexeme, STRING_PLACEHOLDER, SqlTokenizer, TokenId, Tokenizer};
pub use tokens::{Token, TokenKind};

use crate::error::{Error, Result};
use crate::limits::FuzzLimits;

/// Something that can be asked to parse a query.
///
/// Implementations are expected to be callable over and over in one process.
/// Crashing, aborting or hanging is allowed: that is what the crash harness
/// is looking for.
pub trait ParseTarget {
    /// Parse `query`, returning whether it was accepted.
    fn parse(&mut self, query: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> ParseTarget for F {
    fn parse(&mut self, query: &str) -> bool {
        self(query)
    }
}

/// [`ParseTarget`] backed by the reference [`Parser`].
#[derive(Debug, Clone, Default)]
pub struct ReferenceParser {
    limits: FuzzLimits,
}

impl ReferenceParser {
    pub fn new(limits: FuzzLimits) -> Self {
        Self { limits }
    }
}

impl ParseTarget for ReferenceParser {
    fn parse(&mut self, query: &str) -> bool {
        Parser::with_limits(query, &self.limits).parse().is_ok()
    }
}

/// Parse a single statement with default limits.
pub fn parse_query(query: &str) -> Result<Statement> {
    Parser::new(query).parse()
}

/// Parser for SQL statements.
pub struct Parser {
    tokens: Vec<SpannedToken>,
    current: usize,
    /// Where end-of-input errors point
    eof: Position,
    depth: usize,
    max_depth: usize,
    tables: Vec<String>,
}

impl Parser {
    /// Create a new parser for the given input.
    pub fn new(input: &str) -> Self {
        Self::with_limits(input, &FuzzLimits::default())
    }

    /// Create a parser with explicit limits.
    pub fn with_limits(input: &str, limits: &FuzzLimits) -> Self {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_spanned_token() {
            tokens.push(token);
        }
        Self {
            tokens,
            current: 0,
            eof: lexer.position(),
            depth: 0,
            max_depth: limits.max_parse_depth,
            tables: Vec::new(),
        }
    }

    /// Parse exactly one statement, optionally followed by `;`.
    pub fn parse(mut self) -> Result<Statement> {
        let kind = self.parse_statement()?;
        self.eat(TokenKind::Semicolon);
        if self.peek() != TokenKind::End {
            return Err(self.error("unexpected token after statement"));
        }
        Ok(Statement {
            kind,
            tables: self.tables,
        })
    }

    fn peek(&self) -> TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> TokenKind {
        self.tokens
            .get(self.current + ahead)
            .map_or(TokenKind::End, |t| t.token.kind)
    }

    fn advance(&mut self) -> Option<&SpannedToken> {
        let token = self.tokens.get(self.current);
        if token.is_some() {
            self.current += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {}", what)))
        }
    }

    fn error(&self, message: &str) -> Error {
        match self.tokens.get(self.current) {
            Some(t) => Error::parse_at(
                format!("{}, found '{}'", message, t.token.text),
                t.span.start.line,
                t.span.start.column,
            ),
            None => Error::parse_at(
                format!("{}, found end of input", message),
                self.eof.line,
                self.eof.column,
            ),
        }
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.max_depth {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn parse_statement(&mut self) -> Result<StatementKind> {
        match self.peek() {
            TokenKind::Select => {
                self.parse_select()?;
                Ok(StatementKind::Select)
            }
            TokenKind::Insert => self.parse_insert(),
            TokenKind::Update => self.parse_update(),
            TokenKind::Delete => self.parse_delete(),
            TokenKind::Set => self.parse_set(),
            TokenKind::Show => self.parse_show(),
            TokenKind::Describe | TokenKind::Desc => self.parse_describe(),
            TokenKind::Explain => self.parse_explain(),
            TokenKind::End => Err(self.error("empty query")),
            _ => Err(self.error("expected statement")),
        }
    }

    fn parse_select(&mut self) -> Result<()> {
        self.expect(TokenKind::Select, "SELECT")?;
        if !self.eat(TokenKind::Distinct) {
            self.eat(TokenKind::All);
        }
        self.parse_select_list()?;
        if self.eat(TokenKind::From) {
            self.parse_table_refs()?;
        }
        if self.eat(TokenKind::Where) {
            self.parse_expr()?;
        }
        if self.eat(TokenKind::Group) {
            self.expect(TokenKind::By, "BY after GROUP")?;
            self.parse_expr_list()?;
        }
        if self.eat(TokenKind::Having) {
            self.parse_expr()?;
        }
        self.parse_order_by()?;
        self.parse_limit()?;
        if self.eat(TokenKind::Union) {
            if !self.eat(TokenKind::All) {
                self.eat(TokenKind::Distinct);
            }
            self.nested(|p| p.parse_select())?;
        }
        Ok(())
    }

    fn parse_select_list(&mut self) -> Result<()> {
        if self.eat(TokenKind::Star) {
            return Ok(());
        }
        loop {
            // table.*
            if self.peek() == TokenKind::Identifier
                && self.peek_at(1) == TokenKind::Dot
                && self.peek_at(2) == TokenKind::Star
            {
                self.current += 3;
            } else {
                self.parse_expr()?;
                self.parse_alias()?;
            }
            if !self.eat(TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    fn parse_alias(&mut self) -> Result<()> {
        if self.eat(TokenKind::As) {
            if !self.eat(TokenKind::Identifier) && !self.eat(TokenKind::StringLiteral) {
                return Err(self.error("expected alias after AS"));
            }
        } else {
            self.eat(TokenKind::Identifier);
        }
        Ok(())
    }

    fn parse_table_refs(&mut self) -> Result<()> {
        self.parse_table_ref()?;
        loop {
            match self.peek() {
                TokenKind::Comma => {
                    self.advance();
                    self.parse_table_ref()?;
                }
                TokenKind::Join
                | TokenKind::Inner
                | TokenKind::Cross
                | TokenKind::Left
                | TokenKind::Right => self.parse_join()?,
                _ => return Ok(()),
            }
        }
    }

    fn parse_join(&mut self) -> Result<()> {
        if self.eat(TokenKind::Left) || self.eat(TokenKind::Right) {
            self.eat(TokenKind::Outer);
        } else if !self.eat(TokenKind::Inner) {
            self.eat(TokenKind::Cross);
        }
        self.expect(TokenKind::Join, "JOIN")?;
        self.parse_table_ref()?;
        if self.eat(TokenKind::On) {
            self.parse_expr()?;
        } else if self.eat(TokenKind::Using) {
            self.expect(TokenKind::LeftParen, "'(' after USING")?;
            loop {
                self.expect(TokenKind::Identifier, "column name")?;
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RightParen, "')'")?;
        }
        Ok(())
    }

    fn parse_table_ref(&mut self) -> Result<()> {
        if self.eat(TokenKind::LeftParen) {
            self.nested(|p| p.parse_select())?;
            self.expect(TokenKind::RightParen, "')' after subquery")?;
        } else {
            self.parse_table_name()?;
        }
        self.parse_alias()
    }

    fn parse_table_name(&mut self) -> Result<()> {
        let mut name = self.expect_name("table name")?;
        if self.eat(TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_name("table name after '.'")?);
        }
        self.tables.push(name);
        Ok(())
    }

    fn expect_name(&mut self, what: &str) -> Result<String> {
        if self.peek() != TokenKind::Identifier {
            return Err(self.error(&format!("expected {}", what)));
        }
        let text = self
            .advance()
            .map(|t| t.token.text.trim_matches('`').to_string())
            .unwrap_or_default();
        Ok(text)
    }

    fn parse_insert(&mut self) -> Result<StatementKind> {
        self.expect(TokenKind::Insert, "INSERT")?;
        self.eat(TokenKind::Into);
        self.parse_table_name()?;
        if self.peek() == TokenKind::LeftParen && self.peek_at(1) != TokenKind::Select {
            self.advance();
            loop {
                self.expect(TokenKind::Identifier, "column name")?;
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RightParen, "')' after column list")?;
        }
        match self.peek() {
            TokenKind::Values => {
                self.advance();
                loop {
                    self.expect(TokenKind::LeftParen, "'(' before values")?;
                    self.parse_expr_list()?;
                    self.expect(TokenKind::RightParen, "')' after values")?;
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            TokenKind::Select => self.parse_select()?,
            TokenKind::LeftParen => {
                self.advance();
                self.nested(|p| p.parse_select())?;
                self.expect(TokenKind::RightParen, "')' after subquery")?;
            }
            TokenKind::Set => {
                self.advance();
                self.parse_assignments()?;
            }
            _ => return Err(self.error("expected VALUES, SELECT or SET")),
        }
        Ok(StatementKind::Insert)
    }

    fn parse_update(&mut self) -> Result<StatementKind> {
        self.expect(TokenKind::Update, "UPDATE")?;
        self.parse_table_name()?;
        while self.eat(TokenKind::Comma) {
            self.parse_table_name()?;
        }
        self.expect(TokenKind::Set, "SET")?;
        self.parse_assignments()?;
        if self.eat(TokenKind::Where) {
            self.parse_expr()?;
        }
        self.parse_order_by()?;
        self.parse_limit()?;
        Ok(StatementKind::Update)
    }

    fn parse_delete(&mut self) -> Result<StatementKind> {
        self.expect(TokenKind::Delete, "DELETE")?;
        self.expect(TokenKind::From, "FROM")?;
        self.parse_table_name()?;
        if self.eat(TokenKind::Where) {
            self.parse_expr()?;
        }
        self.parse_order_by()?;
        self.parse_limit()?;
        Ok(StatementKind::Delete)
    }

    fn parse_set(&mut self) -> Result<StatementKind> {
        self.expect(TokenKind::Set, "SET")?;
        self.parse_assignments()?;
        Ok(StatementKind::Set)
    }

    fn parse_assignments(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                TokenKind::Variable => {
                    self.advance();
                }
                TokenKind::Identifier => {
                    self.advance();
                    if self.eat(TokenKind::Dot) {
                        self.expect(TokenKind::Identifier, "column name after '.'")?;
                    }
                }
                _ => return Err(self.error("expected assignment target")),
            }
            self.expect(TokenKind::Equals, "'='")?;
            self.parse_expr()?;
            if !self.eat(TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    fn parse_show(&mut self) -> Result<StatementKind> {
        self.expect(TokenKind::Show, "SHOW")?;
        match self.peek() {
            TokenKind::Tables => {
                self.advance();
                if self.eat(TokenKind::From) || self.eat(TokenKind::In) {
                    self.expect_name("database name")?;
                }
            }
            TokenKind::Databases => {
                self.advance();
            }
            TokenKind::Columns => {
                self.advance();
                if !self.eat(TokenKind::From) {
                    self.expect(TokenKind::In, "FROM or IN")?;
                }
                self.parse_table_name()?;
            }
            _ => return Err(self.error("expected TABLES, DATABASES or COLUMNS")),
        }
        if self.eat(TokenKind::Like) {
            self.expect(TokenKind::StringLiteral, "pattern after LIKE")?;
        } else if self.eat(TokenKind::Where) {
            self.parse_expr()?;
        }
        Ok(StatementKind::Show)
    }

    fn parse_describe(&mut self) -> Result<StatementKind> {
        self.advance();
        self.parse_table_name()?;
        self.eat(TokenKind::Identifier);
        Ok(StatementKind::Describe)
    }

    fn parse_explain(&mut self) -> Result<StatementKind> {
        self.expect(TokenKind::Explain, "EXPLAIN")?;
        match self.peek() {
            TokenKind::Select | TokenKind::Insert | TokenKind::Update | TokenKind::Delete => {
                self.nested(|p| p.parse_statement())?;
                Ok(StatementKind::Explain)
            }
            _ => Err(self.error("expected statement after EXPLAIN")),
        }
    }

    fn parse_order_by(&mut self) -> Result<()> {
        if !self.eat(TokenKind::Order) {
            return Ok(());
        }
        self.expect(TokenKind::By, "BY after ORDER")?;
        loop {
            self.parse_expr()?;
            if !self.eat(TokenKind::Asc) {
                self.eat(TokenKind::Desc);
            }
            if !self.eat(TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    fn parse_limit(&mut self) -> Result<()> {
        if !self.eat(TokenKind::Limit) {
            return Ok(());
        }
        self.expect(TokenKind::Integer, "row count")?;
        if self.eat(TokenKind::Comma) || self.eat(TokenKind::Offset) {
            self.expect(TokenKind::Integer, "row offset")?;
        }
        Ok(())
    }

    fn parse_expr_list(&mut self) -> Result<()> {
        loop {
            self.parse_expr()?;
            if !self.eat(TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    fn parse_expr(&mut self) -> Result<()> {
        self.nested(|p| p.parse_or())
    }

    fn parse_or(&mut self) -> Result<()> {
        self.parse_and()?;
        while self.eat(TokenKind::Or) {
            self.parse_and()?;
        }
        Ok(())
    }

    fn parse_and(&mut self) -> Result<()> {
        self.parse_not()?;
        while self.eat(TokenKind::And) {
            self.parse_not()?;
        }
        Ok(())
    }

    fn parse_not(&mut self) -> Result<()> {
        if self.eat(TokenKind::Not) {
            self.nested(|p| p.parse_not())
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<()> {
        self.parse_additive()?;
        loop {
            match self.peek() {
                TokenKind::Equals
                | TokenKind::NotEquals
                | TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual => {
                    self.advance();
                    self.parse_additive()?;
                }
                TokenKind::Is => {
                    self.advance();
                    self.eat(TokenKind::Not);
                    if !self.eat(TokenKind::Null)
                        && !self.eat(TokenKind::True)
                        && !self.eat(TokenKind::False)
                    {
                        return Err(self.error("expected NULL, TRUE or FALSE after IS"));
                    }
                }
                TokenKind::Not
                    if matches!(
                        self.peek_at(1),
                        TokenKind::Like | TokenKind::In | TokenKind::Between
                    ) =>
                {
                    self.advance();
                }
                TokenKind::Like => {
                    self.advance();
                    self.parse_additive()?;
                }
                TokenKind::In => {
                    self.advance();
                    self.parse_in_list()?;
                }
                TokenKind::Between => {
                    self.advance();
                    self.parse_additive()?;
                    self.expect(TokenKind::And, "AND in BETWEEN")?;
                    self.parse_additive()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_in_list(&mut self) -> Result<()> {
        self.expect(TokenKind::LeftParen, "'(' after IN")?;
        if self.peek() == TokenKind::Select {
            self.nested(|p| p.parse_select())?;
        } else {
            self.parse_expr_list()?;
        }
        self.expect(TokenKind::RightParen, "')' after IN list")
    }

    fn parse_additive(&mut self) -> Result<()> {
        self.parse_multiplicative()?;
        while matches!(self.peek(), TokenKind::Plus | TokenKind::Minus) {
            self.advance();
            self.parse_multiplicative()?;
        }
        Ok(())
    }

    fn parse_multiplicative(&mut self) -> Result<()> {
        self.parse_unary()?;
        while matches!(
            self.peek(),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent
        ) {
            self.advance();
            self.parse_unary()?;
        }
        Ok(())
    }

    fn parse_unary(&mut self) -> Result<()> {
        if matches!(self.peek(), TokenKind::Minus | TokenKind::Plus) {
            self.advance();
            self.nested(|p| p.parse_unary())
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<()> {
        match self.peek() {
            TokenKind::Integer
            | TokenKind::Float
            | TokenKind::StringLiteral
            | TokenKind::Null
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Variable => {
                self.advance();
                Ok(())
            }
            TokenKind::Identifier => {
                self.advance();
                if self.eat(TokenKind::Dot) {
                    self.expect(TokenKind::Identifier, "column name after '.'")?;
                } else if self.eat(TokenKind::LeftParen) {
                    self.parse_call_args()?;
                }
                Ok(())
            }
            TokenKind::LeftParen => {
                self.advance();
                if self.peek() == TokenKind::Select {
                    self.nested(|p| p.parse_select())?;
                } else {
                    // A parenthesised list is a row constructor
                    self.parse_expr_list()?;
                }
                self.expect(TokenKind::RightParen, "')'")
            }
            TokenKind::Exists => {
                self.advance();
                self.expect(TokenKind::LeftParen, "'(' after EXISTS")?;
                self.nested(|p| p.parse_select())?;
                self.expect(TokenKind::RightParen, "')' after subquery")
            }
            _ => Err(self.error("expected expression")),
        }
    }

    /// Arguments of a function call, after the opening parenthesis.
    fn parse_call_args(&mut self) -> Result<()> {
        if self.eat(TokenKind::Star) {
            return self.expect(TokenKind::RightParen, "')' after '*'");
        }
        if self.eat(TokenKind::RightParen) {
            return Ok(());
        }
        self.eat(TokenKind::Distinct);
        self.parse_expr_list()?;
        self.expect(TokenKind::RightParen, "')' after arguments")
    }
}
