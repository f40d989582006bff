//! External memory checker oracle
//!
//! Writes a batch to a fresh temporary file, one query per line, and runs
//! `<program> <args> <driver> <driver_args> <file>`. The checker's combined
//! stdout and stderr go through a [`DiagnosticClassifier`] to decide whether
//! the batch leaked.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;
use tempfile::NamedTempFile;

use super::FaultOracle;
use crate::error::{Error, Result};

/// Valgrind's summary line for leaked blocks.
pub const DEFINITELY_LOST_PATTERN: &str = r"definitely lost: ([0-9,]+) bytes";

/// Decides from checker output whether a fault occurred.
pub trait DiagnosticClassifier {
    fn classify(&self, diagnostics: &str) -> bool;
}

impl<F: Fn(&str) -> bool> DiagnosticClassifier for F {
    fn classify(&self, diagnostics: &str) -> bool {
        self(diagnostics)
    }
}

/// Matches a byte count in checker output against a threshold.
///
/// The pattern's first capture group must be the byte count; commas in it
/// are ignored. A fault is any match whose count exceeds the threshold, so
/// "definitely lost: 0 bytes" never counts with the default threshold.
#[derive(Debug, Clone)]
pub struct LeakSignature {
    pattern: Regex,
    threshold_bytes: u64,
}

impl Default for LeakSignature {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFINITELY_LOST_PATTERN).expect("leak pattern is a valid regex"),
            threshold_bytes: 0,
        }
    }
}

impl LeakSignature {
    /// Signature with a custom pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::InvalidConfig(format!("invalid leak pattern: {}", e)))?;
        if pattern.captures_len() < 2 {
            return Err(Error::InvalidConfig(
                "leak pattern needs a capture group for the byte count".into(),
            ));
        }
        Ok(Self {
            pattern,
            threshold_bytes: 0,
        })
    }

    /// Only count leaks larger than `bytes`.
    pub fn threshold_bytes(mut self, bytes: u64) -> Self {
        self.threshold_bytes = bytes;
        self
    }

    /// Largest byte count reported anywhere in `diagnostics`.
    pub fn lost_bytes(&self, diagnostics: &str) -> Option<u64> {
        self.pattern
            .captures_iter(diagnostics)
            .filter_map(|caps| {
                let digits: String = caps.get(1)?.as_str().chars().filter(|c| *c != ',').collect();
                digits.parse::<u64>().ok()
            })
            .max()
    }
}

impl DiagnosticClassifier for LeakSignature {
    fn classify(&self, diagnostics: &str) -> bool {
        self.lost_bytes(diagnostics)
            .is_some_and(|bytes| bytes > self.threshold_bytes)
    }
}

/// How to invoke the checker.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Checker executable (default: `valgrind`)
    pub program: PathBuf,
    /// Arguments before the driver (default: `--leak-check=full`)
    pub args: Vec<String>,
    /// Program the checker runs; receives the query file as its last argument
    pub driver: PathBuf,
    pub driver_args: Vec<String>,
    /// Where query files are created (default: the system temp dir)
    pub temp_dir: Option<PathBuf>,
}

impl CheckerConfig {
    pub fn new(driver: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("valgrind"),
            args: vec!["--leak-check=full".to_string()],
            driver: driver.into(),
            driver_args: Vec::new(),
            temp_dir: None,
        }
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Replace the checker arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn driver_arg(mut self, arg: impl Into<String>) -> Self {
        self.driver_args.push(arg.into());
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

/// [`FaultOracle`] that runs an external memory checker.
#[derive(Debug)]
pub struct MemcheckOracle<C = LeakSignature> {
    config: CheckerConfig,
    classifier: C,
    failures: usize,
}

impl MemcheckOracle<LeakSignature> {
    pub fn new(config: CheckerConfig) -> Self {
        Self::with_classifier(config, LeakSignature::default())
    }
}

impl<C: DiagnosticClassifier> MemcheckOracle<C> {
    pub fn with_classifier(config: CheckerConfig, classifier: C) -> Self {
        Self {
            config,
            classifier,
            failures: 0,
        }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Number of checks where the checker could not be run at all.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Confirm the checker program can be started.
    pub fn check_available(&self) -> Result<()> {
        Command::new(&self.config.program)
            .arg("--version")
            .output()
            .map(|_| ())
            .map_err(|e| {
                Error::Checker(format!(
                    "cannot run {}: {}",
                    self.config.program.display(),
                    e
                ))
            })
    }

    fn write_batch(&self, batch: &[String]) -> io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("query-").suffix(".sql");
        let mut file = match &self.config.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        for query in batch {
            writeln!(file, "{}", query)?;
        }
        file.flush()?;
        Ok(file)
    }

    fn run_checker(&self, path: &Path) -> io::Result<String> {
        let output = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(&self.config.driver)
            .args(&self.config.driver_args)
            .arg(path)
            .output()?;
        let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(diagnostics)
    }
}

impl<C: DiagnosticClassifier> FaultOracle for MemcheckOracle<C> {
    fn has_fault(&mut self, batch: &[String]) -> bool {
        if batch.is_empty() {
            return false;
        }

        let file = match self.write_batch(batch) {
            Ok(file) => file,
            Err(_e) => {
                #[cfg(feature = "logging")]
                tracing::warn!(
                    target: "sqlfuzz::bisect",
                    error = %_e,
                    "cannot create query file, treating batch as clean"
                );
                return false;
            }
        };

        let verdict = match self.run_checker(file.path()) {
            Ok(diagnostics) => self.classifier.classify(&diagnostics),
            Err(_e) => {
                self.failures += 1;
                #[cfg(feature = "logging")]
                tracing::error!(
                    target: "sqlfuzz::bisect",
                    program = %self.config.program.display(),
                    error = %_e,
                    "cannot run checker, treating batch as clean"
                );
                false
            }
        };

        if let Err(_e) = file.close() {
            #[cfg(feature = "logging")]
            tracing::warn!(target: "sqlfuzz::bisect", error = %_e, "cannot remove query file");
        }

        verdict
    }
}
