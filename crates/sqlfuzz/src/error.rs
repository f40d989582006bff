//! Error types for sqlfuzz
//!
//! Only startup conditions are errors. A crashing worker or a leaking batch
//! is a finding, reported through [`crate::CrashReport`] and
//! [`crate::LeakReport`], never through this type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using sqlfuzz's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// sqlfuzz error types.
#[derive(Error, Debug)]
pub enum Error {
    /// The training corpus could not be opened.
    #[error("unable to open corpus {}: {source}", path.display())]
    CorpusOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The training corpus could not be read to the end.
    #[error("unable to read corpus {}: {source}", path.display())]
    CorpusRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The corpus produced no tokens at all.
    #[error("corpus contains no queries")]
    EmptyCorpus,

    /// The tokenizer could not be set up for a corpus line.
    #[error("tokenizer failed on corpus line {line}: {message}")]
    Tokenizer { line: usize, message: String },

    /// Parse error with source location information.
    #[error("parse error at line {line}, column {column}: {message}")]
    ParseAt {
        message: String,
        line: usize,
        column: usize,
    },

    /// The shared in-flight query region could not be allocated.
    #[error("unable to create shared memory: {0}")]
    SharedMemory(std::io::Error),

    /// A worker process could not be forked.
    #[error("unable to fork worker: {0}")]
    Fork(std::io::Error),

    /// Waiting on a worker process failed.
    #[error("unable to wait for worker: {0}")]
    Wait(std::io::Error),

    /// The external memory checker could not be run.
    #[error("checker error: {0}")]
    Checker(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a parse error with source location.
    pub fn parse_at(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::ParseAt {
            message: message.into(),
            line,
            column,
        }
    }
}
