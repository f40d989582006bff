//! sqlfuzz - Markov-chain fuzzing harness for a SQL lexer/parser
//!
//! A first-order token model learned from a corpus of real queries drives a
//! query synthesizer. Its output feeds one of two searches:
//!
//! - **crash search** ([`CrashHarness`]): forked workers parse synthesized
//!   queries until they die; the query in flight is recovered through a
//!   shared memory slot.
//! - **leak search** ([`LeakBisector`]): batches run under an external
//!   memory checker are split until the leaking queries are isolated.
//!
//! # Example
//!
//! ```rust
//! use sqlfuzz::{QuerySynthesizer, SqlTokenizer, TokenCorpusModel, seeded_rng};
//!
//! # fn main() -> sqlfuzz::Result<()> {
//! let model = TokenCorpusModel::from_lines(
//!     ["SELECT a FROM t", "SELECT b FROM t WHERE a = 1"],
//!     &SqlTokenizer::default(),
//! )?;
//! let synth = QuerySynthesizer::new(&model);
//! let query = synth.generate(&mut seeded_rng(42));
//! assert!(query.is_empty() || query.ends_with(' '));
//! # Ok(())
//! # }
//! ```

mod bisect;
mod error;
#[cfg(unix)]
mod harness;
mod limits;
mod logging_impl;
mod model;
pub mod parser;
mod synth;

pub use bisect::{
    CheckerConfig, DEFINITELY_LOST_PATTERN, DiagnosticClassifier, FaultOracle, FaultyQuery,
    LeakBisector, LeakReport, LeakSignature, MemcheckOracle, find_leaks,
};
pub use error::{Error, Result};
#[cfg(unix)]
pub use harness::{
    CrashHarness, CrashReport, ExitReason, HarnessConfig, PANIC_EXIT_CODE, SharedQuerySlot, Worker,
    WorkerHandle,
};
pub use limits::FuzzLimits;
pub use logging_impl::LogConfig;
pub use model::{ModelBuilder, TokenCorpusModel, Transition, TransitionTable};
pub use parser::{
    END_OF_QUERY, Lexeme, ParseTarget, ReferenceParser, SqlTokenizer, TokenId, Tokenizer,
};
pub use synth::{
    DEFAULT_EXPLORATION, QuerySynthesizer, RandomSource, SynthesisConfig, fresh_seed, seeded_rng,
};

/// Logging helpers for query text.
pub mod logging {
    pub use crate::logging_impl::{LogConfig, format_query_for_log, sanitize_for_log};
}
