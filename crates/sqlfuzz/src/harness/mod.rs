//! Crash search
//!
//! Each round forks a worker that synthesizes queries forever, publishing
//! each one to a [`SharedQuerySlot`] before handing it to the parser. When
//! the worker dies, the supervisor reads the slot and reports the query that
//! was being attempted.
//!
//! The reported query is the one in flight, which is not necessarily the
//! one that caused the failure when a crash is delayed. That imprecision is
//! accepted.

mod slot;
mod worker;

pub use slot::SharedQuerySlot;
pub use worker::{ExitReason, PANIC_EXIT_CODE, Worker, WorkerHandle};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::limits::FuzzLimits;
use crate::logging::LogConfig;
use crate::model::TokenCorpusModel;
use crate::parser::ParseTarget;
use crate::synth::{QuerySynthesizer, SynthesisConfig, fresh_seed, seeded_rng};

/// Crash search configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Number of workers to run, one after another (default: 100)
    pub rounds: usize,
    pub limits: FuzzLimits,
    pub synthesis: SynthesisConfig,
    /// Controls how reported queries appear in logs
    pub log: LogConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            rounds: 100,
            limits: FuzzLimits::default(),
            synthesis: SynthesisConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn limits(mut self, limits: FuzzLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn synthesis(mut self, synthesis: SynthesisConfig) -> Self {
        self.synthesis = synthesis;
        self
    }

    pub fn log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.rounds == 0 {
            return Err(Error::InvalidConfig("rounds must be non-zero".into()));
        }
        self.limits.validate()?;
        self.synthesis.validate()
    }
}

/// One worker termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrashReport {
    /// Zero-based round number
    pub round: usize,
    pub pid: i32,
    pub exit: ExitReason,
    /// Query in flight when the worker stopped; empty if it died before
    /// publishing one
    pub query: String,
    /// The in-flight query did not fit the slot and was cut short
    pub truncated: bool,
}

/// Runs crash search rounds against a parser.
pub struct CrashHarness<'m> {
    synth: QuerySynthesizer<'m>,
    config: HarnessConfig,
    slot: SharedQuerySlot,
}

impl<'m> CrashHarness<'m> {
    /// Allocate the shared slot and prepare to run.
    ///
    /// Fails when the configuration is invalid or the slot cannot be
    /// allocated.
    pub fn new(model: &'m TokenCorpusModel, config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let slot = SharedQuerySlot::new(config.limits.slot_capacity)?;
        Ok(Self {
            synth: QuerySynthesizer::with_config(model, config.synthesis),
            config,
            slot,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every round and collect the reports.
    pub fn run<P: ParseTarget + ?Sized>(&mut self, target: &mut P) -> Result<Vec<CrashReport>> {
        let mut reports = Vec::with_capacity(self.config.rounds);
        self.run_with(target, |report| reports.push(report.clone()))?;
        Ok(reports)
    }

    /// Run every round, handing each report to `on_report` as soon as the
    /// worker is reaped. Returns the number of rounds run.
    pub fn run_with<P, F>(&mut self, target: &mut P, mut on_report: F) -> Result<usize>
    where
        P: ParseTarget + ?Sized,
        F: FnMut(&CrashReport),
    {
        #[cfg(feature = "logging")]
        tracing::info!(
            target: "sqlfuzz::harness",
            rounds = self.config.rounds,
            slot_capacity = self.slot.capacity(),
            timeout_ms = self.config.limits.worker_timeout.map(|t| t.as_millis() as u64),
            "crash search started"
        );

        for round in 0..self.config.rounds {
            let report = self.round(round, target)?;
            on_report(&report);
        }

        #[cfg(feature = "logging")]
        tracing::info!(
            target: "sqlfuzz::harness",
            rounds = self.config.rounds,
            "crash search finished"
        );

        Ok(self.config.rounds)
    }

    /// Run a single round: fork, wait, read the slot.
    pub fn round<P: ParseTarget + ?Sized>(
        &mut self,
        round: usize,
        target: &mut P,
    ) -> Result<CrashReport> {
        // No worker is alive here, so the supervisor may write the slot
        self.slot.clear();

        let synth = self.synth;
        let slot = &mut self.slot;
        let mut handle = Worker::spawn(move || worker_loop(&synth, slot, target))?;

        #[cfg(feature = "logging")]
        tracing::debug!(target: "sqlfuzz::harness", round, pid = handle.pid(), "worker started");

        let exit = handle.wait(self.config.limits.worker_timeout)?;
        let query = self.slot.read();
        let truncated = self.slot.truncated();

        #[cfg(feature = "logging")]
        {
            let shown = crate::logging::format_query_for_log(&query, &self.config.log);
            tracing::info!(
                target: "sqlfuzz::harness",
                round,
                pid = handle.pid(),
                %exit,
                query = %shown,
                "worker stopped"
            );
            if truncated {
                tracing::warn!(
                    target: "sqlfuzz::harness",
                    round,
                    capacity = self.slot.capacity(),
                    "in-flight query did not fit the shared slot and was truncated"
                );
            }
        }

        Ok(CrashReport {
            round,
            pid: handle.pid(),
            exit,
            query,
            truncated,
        })
    }
}

/// Body of a worker: synthesize, publish, parse, forever.
///
/// Runs in the child after `fork`, so it must not log.
fn worker_loop<P: ParseTarget + ?Sized>(
    synth: &QuerySynthesizer<'_>,
    slot: &mut SharedQuerySlot,
    target: &mut P,
) -> ! {
    let mut rng = seeded_rng(fresh_seed());
    loop {
        let query = synth.generate(&mut rng);
        slot.publish(&query);
        target.parse(&query);
    }
}
