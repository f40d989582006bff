//! AST types for parsed SQL statements
//!
//! The reference parser only validates structure, so the tree is shallow:
//! what kind of statement it was and which tables it touched.

use std::fmt;

/// A parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    /// Table names in the order they were referenced, qualified names kept
    /// as written (`db.table`)
    pub tables: Vec<String>,
}

/// Top-level statement kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Set,
    Show,
    Describe,
    Explain,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Set => "SET",
            StatementKind::Show => "SHOW",
            StatementKind::Describe => "DESCRIBE",
            StatementKind::Explain => "EXPLAIN",
        };
        f.write_str(name)
    }
}
