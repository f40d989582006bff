//! Leak localization by batch splitting
//!
//! The checker can only say whether a whole batch leaked. [`LeakBisector`]
//! splits a batch in two and checks *both* halves independently, recursing
//! into each half that leaks, until it reaches single queries. Faults can
//! sit in both halves at once, so this is not a binary search: in the worst
//! case it costs O(n log n) checks.

mod checker;

pub use checker::{
    CheckerConfig, DEFINITELY_LOST_PATTERN, DiagnosticClassifier, LeakSignature, MemcheckOracle,
};

use serde::Serialize;

use crate::synth::{QuerySynthesizer, RandomSource};

/// Answers whether a batch of queries, run together, shows a fault.
pub trait FaultOracle {
    /// `batch` is never empty when called by [`LeakBisector`].
    fn has_fault(&mut self, batch: &[String]) -> bool;
}

impl<F: FnMut(&[String]) -> bool> FaultOracle for F {
    fn has_fault(&mut self, batch: &[String]) -> bool {
        self(batch)
    }
}

/// A query that leaks on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultyQuery {
    /// Position in the batch
    pub index: usize,
    pub query: String,
}

/// Outcome of one leak search iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakReport {
    pub iteration: usize,
    pub batch_size: usize,
    /// Whether the batch as a whole leaked
    pub batch_leaked: bool,
    /// Oracle invocations spent on this batch
    pub checks: usize,
    pub faulty: Vec<FaultyQuery>,
}

/// Recursive leak localizer over a [`FaultOracle`].
#[derive(Debug)]
pub struct LeakBisector<O> {
    oracle: O,
    checks: usize,
}

impl<O: FaultOracle> LeakBisector<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle, checks: 0 }
    }

    /// Total oracle invocations so far.
    pub fn checks(&self) -> usize {
        self.checks
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn into_inner(self) -> O {
        self.oracle
    }

    /// Check a range. Empty ranges are clean and cost nothing.
    pub fn has_fault(&mut self, batch: &[String]) -> bool {
        if batch.is_empty() {
            return false;
        }
        self.checks += 1;
        let faulty = self.oracle.has_fault(batch);

        #[cfg(feature = "logging")]
        tracing::debug!(target: "sqlfuzz::bisect", len = batch.len(), faulty, "range checked");

        faulty
    }

    /// Indices, in ascending order, of every query that leaks on its own.
    pub fn isolate(&mut self, batch: &[String]) -> Vec<usize> {
        let mut found = Vec::new();
        self.isolate_range(batch, 0, &mut found);
        found
    }

    fn isolate_range(&mut self, range: &[String], offset: usize, found: &mut Vec<usize>) {
        match range.len() {
            0 => {}
            1 => {
                if self.has_fault(range) {
                    found.push(offset);
                }
            }
            len => {
                let (left, right) = range.split_at(len / 2);
                // Both halves are always checked
                if self.has_fault(left) {
                    self.isolate_range(left, offset, found);
                }
                if self.has_fault(right) {
                    self.isolate_range(right, offset + left.len(), found);
                }
            }
        }
    }

    /// Check a whole batch and, if it leaks, isolate the faulty queries.
    pub fn examine(&mut self, iteration: usize, batch: &[String]) -> LeakReport {
        let before = self.checks;
        let batch_leaked = self.has_fault(batch);
        let faulty: Vec<FaultyQuery> = if batch_leaked {
            self.isolate(batch)
                .into_iter()
                .map(|index| FaultyQuery {
                    index,
                    query: batch[index].clone(),
                })
                .collect()
        } else {
            Vec::new()
        };

        #[cfg(feature = "logging")]
        {
            if batch_leaked && faulty.is_empty() {
                tracing::warn!(
                    target: "sqlfuzz::bisect",
                    iteration,
                    "batch leaked but no single query leaks on its own"
                );
            }
            tracing::info!(
                target: "sqlfuzz::bisect",
                iteration,
                batch_size = batch.len(),
                batch_leaked,
                faulty = faulty.len(),
                checks = self.checks - before,
                "batch examined"
            );
        }

        LeakReport {
            iteration,
            batch_size: batch.len(),
            batch_leaked,
            checks: self.checks - before,
            faulty,
        }
    }

    /// Generate and examine `iterations` batches of `batch_size` queries,
    /// handing each report to `on_report` as it completes.
    pub fn search_with<R, F>(
        &mut self,
        synth: &QuerySynthesizer<'_>,
        iterations: usize,
        batch_size: usize,
        rng: &mut R,
        mut on_report: F,
    ) -> Vec<LeakReport>
    where
        R: RandomSource + ?Sized,
        F: FnMut(&LeakReport),
    {
        (0..iterations)
            .map(|iteration| {
                let batch = synth.generate_batch(batch_size, rng);
                let report = self.examine(iteration, &batch);
                on_report(&report);
                report
            })
            .collect()
    }
}

/// Run a leak search with a fresh bisector over `oracle`.
pub fn find_leaks<O, R>(
    synth: &QuerySynthesizer<'_>,
    oracle: O,
    iterations: usize,
    batch_size: usize,
    rng: &mut R,
) -> Vec<LeakReport>
where
    O: FaultOracle,
    R: RandomSource + ?Sized,
{
    LeakBisector::new(oracle).search_with(synth, iterations, batch_size, rng, |_| {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn batch(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("q{i}")).collect()
    }

    /// A range is faulty iff it contains one of `faulty`.
    fn intersects(faulty: &BTreeSet<usize>) -> impl FnMut(&[String]) -> bool + '_ {
        move |range: &[String]| {
            range.iter().any(|q| {
                q[1..]
                    .parse::<usize>()
                    .map(|i| faulty.contains(&i))
                    .unwrap_or(false)
            })
        }
    }

    #[test]
    fn test_every_subset_small_batches() {
        for n in [0usize, 1, 2, 5] {
            for mask in 0u32..(1 << n) {
                let faulty: BTreeSet<usize> = (0..n).filter(|i| mask & (1 << i) != 0).collect();
                let mut bisector = LeakBisector::new(intersects(&faulty));
                let found = bisector.isolate(&batch(n));
                let expected: Vec<usize> = faulty.iter().copied().collect();
                assert_eq!(found, expected, "n={n} mask={mask:b}");
            }
        }
    }

    #[test]
    fn test_seventeen_patterns() {
        let n = 17;
        let patterns: Vec<BTreeSet<usize>> = vec![
            BTreeSet::new(),
            (0..n).collect(),
            [0].into(),
            [16].into(),
            [7, 8].into(),
            [0, 16].into(),
            [1, 3, 5, 9, 15].into(),
            (0..n).step_by(2).collect(),
        ];
        for faulty in patterns {
            let mut bisector = LeakBisector::new(intersects(&faulty));
            let found = bisector.isolate(&batch(n));
            assert_eq!(found, faulty.iter().copied().collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_faults_in_both_halves() {
        let faulty: BTreeSet<usize> = [1, 3].into();
        let mut bisector = LeakBisector::new(intersects(&faulty));
        assert_eq!(bisector.isolate(&batch(4)), vec![1, 3]);
        // two halves, four single queries, then the two faulty ones again
        assert_eq!(bisector.checks(), 8);
    }

    #[test]
    fn test_empty_batch_never_calls_oracle() {
        let mut calls = 0;
        let mut bisector = LeakBisector::new(|_: &[String]| {
            calls += 1;
            true
        });
        assert!(bisector.isolate(&[]).is_empty());
        assert!(!bisector.has_fault(&[]));
        assert_eq!(bisector.checks(), 0);
        drop(bisector);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_examine_clean_batch_costs_one_check() {
        let faulty = BTreeSet::new();
        let mut bisector = LeakBisector::new(intersects(&faulty));
        let report = bisector.examine(3, &batch(10));
        assert_eq!(
            report,
            LeakReport {
                iteration: 3,
                batch_size: 10,
                batch_leaked: false,
                checks: 1,
                faulty: Vec::new(),
            }
        );
    }

    #[test]
    fn test_examine_reports_queries() {
        let faulty: BTreeSet<usize> = [2].into();
        let mut bisector = LeakBisector::new(intersects(&faulty));
        let report = bisector.examine(0, &batch(4));
        assert!(report.batch_leaked);
        assert_eq!(
            report.faulty,
            vec![FaultyQuery {
                index: 2,
                query: "q2".to_string()
            }]
        );
    }

    #[test]
    fn test_leak_only_in_combination() {
        // Leaks only when q0 and q1 run together
        let mut bisector = LeakBisector::new(|range: &[String]| {
            range.iter().any(|q| q == "q0") && range.iter().any(|q| q == "q1")
        });
        let report = bisector.examine(0, &batch(4));
        assert!(report.batch_leaked);
        assert!(report.faulty.is_empty());
    }
}
