//! First-order Markov model over lexical tokens
//!
//! Built once from a corpus of real queries, then shared read-only by every
//! synthesis call. For each token seen as a source, the model keeps the
//! cumulative distribution of the tokens that followed it.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};
use crate::parser::{END_OF_QUERY, TokenId, Tokenizer};

/// One entry of a token's continuation distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub token: TokenId,
    /// Probability that the next token is this one or any earlier entry
    pub cumulative: f64,
}

/// Continuation distributions keyed by source token.
pub type TransitionTable = BTreeMap<TokenId, Vec<Transition>>;

/// Accumulates corpus statistics line by line.
///
/// Use [`TokenCorpusModel::from_path`] unless the corpus is not a file.
pub struct ModelBuilder<'t, T: Tokenizer + ?Sized> {
    tokenizer: &'t T,
    text: BTreeMap<TokenId, String>,
    counts: BTreeMap<TokenId, BTreeMap<TokenId, usize>>,
    last_target: Option<TokenId>,
    lines: usize,
}

impl<'t, T: Tokenizer + ?Sized> ModelBuilder<'t, T> {
    pub fn new(tokenizer: &'t T) -> Self {
        Self {
            tokenizer,
            text: BTreeMap::new(),
            counts: BTreeMap::new(),
            last_target: None,
            lines: 0,
        }
    }

    /// Tokenize one corpus line and record its transitions.
    pub fn add_line(&mut self, line: &str) -> Result<()> {
        self.lines += 1;
        let lexemes = self.tokenizer.tokenize(line).map_err(|e| match e {
            Error::Tokenizer { message, .. } => Error::Tokenizer {
                line: self.lines,
                message,
            },
            other => other,
        })?;

        let mut previous: Option<TokenId> = None;
        for lexeme in lexemes {
            self.observe(previous, lexeme.id, lexeme.text);
            if lexeme.id == END_OF_QUERY {
                return Ok(());
            }
            previous = Some(lexeme.id);
        }
        // The tokenizer left out the terminal; every line still ends in one
        self.observe(previous, END_OF_QUERY, String::new());
        Ok(())
    }

    fn observe(&mut self, previous: Option<TokenId>, token: TokenId, text: String) {
        self.text.entry(token).or_insert(text);
        if let Some(source) = previous {
            *self
                .counts
                .entry(source)
                .or_default()
                .entry(token)
                .or_insert(0) += 1;
            self.last_target = Some(token);
        }
    }

    /// Normalize the counts into cumulative distributions.
    ///
    /// Fails with [`Error::EmptyCorpus`] when no line contributed a single
    /// transition.
    pub fn build(self) -> Result<TokenCorpusModel> {
        let Some(fallback) = self.last_target else {
            return Err(Error::EmptyCorpus);
        };

        let mut transitions = TransitionTable::new();
        for (source, targets) in self.counts {
            let total: usize = targets.values().sum();
            let mut running = 0usize;
            let list = targets
                .into_iter()
                .map(|(token, count)| {
                    running += count;
                    Transition {
                        token,
                        cumulative: running as f64 / total as f64,
                    }
                })
                .collect();
            transitions.insert(source, list);
        }

        let max_token = self.text.keys().next_back().copied().unwrap_or(END_OF_QUERY);
        let model = TokenCorpusModel {
            text: self.text,
            transitions,
            fallback,
            max_token,
        };

        #[cfg(feature = "logging")]
        tracing::info!(
            target: "sqlfuzz::model",
            lines = self.lines,
            tokens = model.token_count(),
            sources = model.transitions.len(),
            "corpus model built"
        );

        Ok(model)
    }
}

/// Learned token model.
#[derive(Debug, Clone)]
pub struct TokenCorpusModel {
    text: BTreeMap<TokenId, String>,
    transitions: TransitionTable,
    fallback: TokenId,
    max_token: TokenId,
}

impl TokenCorpusModel {
    /// Build a model from a corpus file, one query per line.
    ///
    /// Lines that are not valid UTF-8 are decoded lossily.
    pub fn from_path<T>(path: impl AsRef<Path>, tokenizer: &T) -> Result<Self>
    where
        T: Tokenizer + ?Sized,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::CorpusOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read_corpus(BufReader::new(file), tokenizer).map_err(|e| match e {
            Error::Io(source) => Error::CorpusRead {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Build a model from any buffered reader.
    pub fn from_reader<R, T>(reader: R, tokenizer: &T) -> Result<Self>
    where
        R: BufRead,
        T: Tokenizer + ?Sized,
    {
        Self::read_corpus(reader, tokenizer)
    }

    /// Build a model from in-memory lines.
    pub fn from_lines<I, S, T>(lines: I, tokenizer: &T) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        T: Tokenizer + ?Sized,
    {
        let mut builder = ModelBuilder::new(tokenizer);
        for line in lines {
            builder.add_line(line.as_ref())?;
        }
        builder.build()
    }

    fn read_corpus<R, T>(mut reader: R, tokenizer: &T) -> Result<Self>
    where
        R: BufRead,
        T: Tokenizer + ?Sized,
    {
        let mut builder = ModelBuilder::new(tokenizer);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            while matches!(buf.last(), Some(&(b'\n' | b'\r'))) {
                buf.pop();
            }
            builder.add_line(&String::from_utf8_lossy(&buf))?;
        }
        builder.build()
    }

    /// Text to emit for a token, if the token was ever seen.
    pub fn text(&self, token: TokenId) -> Option<&str> {
        self.text.get(&token).map(String::as_str)
    }

    /// Whether the token was ever seen in the corpus.
    pub fn is_known(&self, token: TokenId) -> bool {
        self.text.contains_key(&token)
    }

    /// Continuation distribution of a token. Empty when the token never
    /// appeared as a source.
    pub fn transitions(&self, token: TokenId) -> &[Transition] {
        self.transitions
            .get(&token)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The full transition table.
    pub fn table(&self) -> &TransitionTable {
        &self.transitions
    }

    /// Largest token id seen.
    pub fn max_token(&self) -> TokenId {
        self.max_token
    }

    /// Number of distinct tokens seen, terminal included.
    pub fn token_count(&self) -> usize {
        self.text.len()
    }

    /// Continuation used for tokens without a distribution: the target of
    /// the last transition observed while building.
    pub fn fallback(&self) -> TokenId {
        self.fallback
    }

    /// Known token ids in ascending order.
    pub fn tokens(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.text.keys().copied()
    }

    /// Pick the continuation of `current` for a uniform draw `r` in `[0, 1)`.
    ///
    /// Scans the distribution in order for the first cumulative value `>= r`.
    /// Rounding can leave `r` above every entry; the last entry is used then.
    pub fn next_token(&self, current: TokenId, r: f64) -> TokenId {
        let list = self.transitions(current);
        match list.iter().find(|t| t.cumulative >= r) {
            Some(t) => t.token,
            None => list.last().map_or(self.fallback, |t| t.token),
        }
    }
}
