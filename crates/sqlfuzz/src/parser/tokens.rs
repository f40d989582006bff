//! Token kinds for the reference SQL lexer
//!
//! Discriminants are the integer token ids the corpus model sees. They are
//! part of the tokenizer's contract: `End` must stay `0`, and an id must
//! never be reused for a different kind.

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum TokenKind {
    /// End of query
    End = 0,

    // Statement keywords
    Select = 1,
    Insert = 2,
    Update = 3,
    Delete = 4,
    Set = 5,
    Show = 6,
    Describe = 7,
    Explain = 8,

    // Clause keywords
    From = 10,
    Where = 11,
    Into = 12,
    Values = 13,
    Group = 14,
    Order = 15,
    By = 16,
    Having = 17,
    Limit = 18,
    Offset = 19,
    Union = 20,
    All = 21,
    Distinct = 22,
    As = 23,
    Join = 24,
    Inner = 25,
    Left = 26,
    Right = 27,
    Outer = 28,
    Cross = 29,
    On = 30,
    Using = 31,
    Asc = 32,
    Desc = 33,
    Tables = 34,
    Databases = 35,
    Columns = 36,

    // Expression keywords
    And = 40,
    Or = 41,
    Not = 42,
    Null = 43,
    Is = 44,
    In = 45,
    Like = 46,
    Between = 47,
    Exists = 48,
    True = 49,
    False = 50,

    /// `*`
    Star = 60,
    /// `,`
    Comma = 61,
    /// `.`
    Dot = 62,
    /// `;`
    Semicolon = 63,
    /// `(`
    LeftParen = 64,
    /// `)`
    RightParen = 65,
    /// `=`
    Equals = 66,
    /// `<>` or `!=`
    NotEquals = 67,
    /// `<`
    Less = 68,
    /// `<=`
    LessEqual = 69,
    /// `>`
    Greater = 70,
    /// `>=`
    GreaterEqual = 71,
    /// `+`
    Plus = 72,
    /// `-`
    Minus = 73,
    /// `/`
    Slash = 74,
    /// `%`
    Percent = 75,

    /// Bare or backtick-quoted name
    Identifier = 80,
    Integer = 81,
    Float = 82,
    /// Single- or double-quoted string
    StringLiteral = 83,
    /// `@name` or `@@name`
    Variable = 84,

    /// Unrecognized character or unterminated quote
    Invalid = 90,
}

impl TokenKind {
    /// Integer id of this kind.
    pub fn id(self) -> i32 {
        self as i32
    }

    /// Look up a keyword, case-insensitively.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word.to_ascii_uppercase().as_str() {
            "SELECT" => TokenKind::Select,
            "INSERT" => TokenKind::Insert,
            "UPDATE" => TokenKind::Update,
            "DELETE" => TokenKind::Delete,
            "SET" => TokenKind::Set,
            "SHOW" => TokenKind::Show,
            "DESCRIBE" => TokenKind::Describe,
            "EXPLAIN" => TokenKind::Explain,
            "FROM" => TokenKind::From,
            "WHERE" => TokenKind::Where,
            "INTO" => TokenKind::Into,
            "VALUES" => TokenKind::Values,
            "GROUP" => TokenKind::Group,
            "ORDER" => TokenKind::Order,
            "BY" => TokenKind::By,
            "HAVING" => TokenKind::Having,
            "LIMIT" => TokenKind::Limit,
            "OFFSET" => TokenKind::Offset,
            "UNION" => TokenKind::Union,
            "ALL" => TokenKind::All,
            "DISTINCT" => TokenKind::Distinct,
            "AS" => TokenKind::As,
            "JOIN" => TokenKind::Join,
            "INNER" => TokenKind::Inner,
            "LEFT" => TokenKind::Left,
            "RIGHT" => TokenKind::Right,
            "OUTER" => TokenKind::Outer,
            "CROSS" => TokenKind::Cross,
            "ON" => TokenKind::On,
            "USING" => TokenKind::Using,
            "ASC" => TokenKind::Asc,
            // MySQL also accepts DESC as a DESCRIBE abbreviation at statement start
            "DESC" => TokenKind::Desc,
            "TABLES" => TokenKind::Tables,
            "DATABASES" => TokenKind::Databases,
            "COLUMNS" => TokenKind::Columns,
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            "NULL" => TokenKind::Null,
            "IS" => TokenKind::Is,
            "IN" => TokenKind::In,
            "LIKE" => TokenKind::Like,
            "BETWEEN" => TokenKind::Between,
            "EXISTS" => TokenKind::Exists,
            "TRUE" => TokenKind::True,
            "FALSE" => TokenKind::False,
            _ => return None,
        };
        Some(kind)
    }
}

/// A token with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source text, quotes included for quoted tokens
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_is_zero() {
        assert_eq!(TokenKind::End.id(), 0);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(TokenKind::keyword("select"), Some(TokenKind::Select));
        assert_eq!(TokenKind::keyword("SeLeCt"), Some(TokenKind::Select));
        assert_eq!(TokenKind::keyword("describe"), Some(TokenKind::Describe));
        assert_eq!(TokenKind::keyword("desc"), Some(TokenKind::Desc));
        assert_eq!(TokenKind::keyword("users"), None);
    }
}
