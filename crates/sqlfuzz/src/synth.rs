//! Query synthesis from the corpus model
//!
//! A query is a random walk over the model's transition table, starting at a
//! uniformly chosen known token and ending at [`END_OF_QUERY`]. With a small
//! probability each step ignores the table and jumps to any known token,
//! which is where most of the malformed input comes from.
//!
//! All randomness comes from a caller-owned [`RandomSource`]; there is no
//! hidden global generator.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{Error, Result};
use crate::model::TokenCorpusModel;
use crate::parser::{END_OF_QUERY, TokenId};

/// Default probability of an exploration step.
pub const DEFAULT_EXPLORATION: f64 = 0.05;

/// Entropy consumed by the synthesizer.
pub trait RandomSource {
    /// Uniform draw in `[0, 1)`.
    fn next_unit(&mut self) -> f64;

    /// Uniform draw in `[0, n)`. `n` is never zero.
    fn next_below(&mut self, n: usize) -> usize;
}

impl<R: rand::Rng + ?Sized> RandomSource for R {
    fn next_unit(&mut self) -> f64 {
        self.random::<f64>()
    }

    fn next_below(&mut self, n: usize) -> usize {
        self.random_range(0..n)
    }
}

/// Seed that differs between processes started at the same instant.
///
/// Forked workers inherit their parent's generator state, so each one calls
/// this to reseed.
pub fn fresh_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let pid = u64::from(std::process::id());
    nanos ^ pid.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Standard generator for a seed.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Synthesis tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisConfig {
    /// Probability that a step jumps to a random known token (default: 0.05)
    pub exploration: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            exploration: DEFAULT_EXPLORATION,
        }
    }
}

impl SynthesisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the exploration probability. `0.0` gives a pure Markov walk.
    pub fn exploration(mut self, probability: f64) -> Self {
        self.exploration = probability;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.exploration) {
            return Err(Error::InvalidConfig(format!(
                "exploration must be within [0, 1], got {}",
                self.exploration
            )));
        }
        Ok(())
    }
}

/// Generates queries from a model.
#[derive(Debug, Clone, Copy)]
pub struct QuerySynthesizer<'m> {
    model: &'m TokenCorpusModel,
    config: SynthesisConfig,
}

impl<'m> QuerySynthesizer<'m> {
    pub fn new(model: &'m TokenCorpusModel) -> Self {
        Self::with_config(model, SynthesisConfig::default())
    }

    pub fn with_config(model: &'m TokenCorpusModel, config: SynthesisConfig) -> Self {
        Self { model, config }
    }

    pub fn model(&self) -> &'m TokenCorpusModel {
        self.model
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Generate one query.
    ///
    /// Every emitted token is followed by a single space. The result is not
    /// validated and is often not valid SQL. It is empty when the start
    /// token drawn is the terminal one.
    pub fn generate<R: RandomSource + ?Sized>(&self, rng: &mut R) -> String {
        let start = self.random_known(rng);
        self.walk_from(start, rng)
    }

    /// Generate a query starting at a given token.
    pub fn walk_from<R: RandomSource + ?Sized>(&self, start: TokenId, rng: &mut R) -> String {
        let mut query = String::new();
        let mut current = start;
        while current != END_OF_QUERY {
            query.push_str(self.model.text(current).unwrap_or_default());
            query.push(' ');

            let explore =
                self.config.exploration > 0.0 && rng.next_unit() < self.config.exploration;
            current = if explore {
                self.random_known(rng)
            } else {
                self.model.next_token(current, rng.next_unit())
            };
        }
        query
    }

    /// Generate `count` queries in order.
    pub fn generate_batch<R>(&self, count: usize, rng: &mut R) -> Vec<String>
    where
        R: RandomSource + ?Sized,
    {
        (0..count).map(|_| self.generate(rng)).collect()
    }

    /// Uniform draw over `[0, max_token]`, retried until the id is known.
    fn random_known<R: RandomSource + ?Sized>(&self, rng: &mut R) -> TokenId {
        let universe = self.model.max_token().max(0) as usize + 1;
        loop {
            let candidate = rng.next_below(universe) as TokenId;
            if self.model.is_known(candidate) {
                return candidate;
            }
        }
    }
}
