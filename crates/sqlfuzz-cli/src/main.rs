//! sqlfuzz CLI - Markov-chain fuzzing for the reference SQL parser
//!
//! Usage:
//!   sqlfuzz                                  # Crash search, 100 rounds
//!   sqlfuzz -q corpus.sql --iterations 10    # Crash search on another corpus
//!   sqlfuzz -l --batch-size 20               # Leak search under valgrind
//!   sqlfuzz -l --seed 7 --report out.json    # Reproducible leak search with a JSON summary

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use sqlfuzz::{
    CheckerConfig, DEFAULT_EXPLORATION, FuzzLimits, LeakBisector, LeakReport, LeakSignature,
    MemcheckOracle, QuerySynthesizer, SqlTokenizer, SynthesisConfig, TokenCorpusModel,
    fresh_seed, seeded_rng,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// sqlfuzz - Markov-chain SQL fuzzer
#[derive(Parser, Debug)]
#[command(name = "sqlfuzz")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Corpus of real queries, one per line
    #[arg(short = 'q', long = "queries", default_value = "queries/sample.sql")]
    queries: PathBuf,

    /// Search for memory leaks instead of crashes
    #[arg(short = 'l', long = "leaks")]
    leaks: bool,

    /// Rounds (crash search, default 100) or batches (leak search, default 10)
    #[arg(long)]
    iterations: Option<usize>,

    /// Queries per leak search batch
    #[arg(long, default_value_t = 10)]
    batch_size: usize,

    /// Kill crash search workers after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Bytes reserved for the in-flight query, terminator included
    #[arg(long, default_value_t = 4096)]
    slot_capacity: usize,

    /// Probability of jumping to a random token at each step
    #[arg(long, default_value_t = DEFAULT_EXPLORATION)]
    exploration: f64,

    /// Seed for leak search batches
    #[arg(long)]
    seed: Option<u64>,

    /// Memory checker executable
    #[arg(long, default_value = "valgrind")]
    checker: PathBuf,

    /// Checker argument, repeatable (default: --leak-check=full)
    #[arg(long = "checker-arg", allow_hyphen_values = true)]
    checker_args: Vec<String>,

    /// Program run under the checker (default: sqlfuzz-driver next to this binary)
    #[arg(long)]
    driver: Option<PathBuf>,

    /// Ignore leaks of this many bytes or fewer
    #[arg(long, default_value_t = 0)]
    threshold_bytes: u64,

    /// Include query text in log output (reports on stdout always carry it)
    #[arg(long)]
    log_queries: bool,

    /// Write a JSON summary here
    #[arg(long)]
    report: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    generated_at: String,
    mode: &'static str,
    corpus: &'a Path,
    seed: Option<u64>,
    findings: Findings,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Findings {
    #[cfg(unix)]
    Crashes(Vec<sqlfuzz::CrashReport>),
    Leaks(Vec<LeakReport>),
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let limits = limits(&args);
    limits.validate().context("Invalid limits")?;
    let synthesis = SynthesisConfig::new().exploration(args.exploration);
    synthesis.validate().context("Invalid --exploration")?;

    let model = TokenCorpusModel::from_path(&args.queries, &SqlTokenizer::new(&limits))
        .with_context(|| format!("Failed to build model from {}", args.queries.display()))?;

    let (mode, seed, findings) = if args.leaks {
        let seed = args.seed.unwrap_or_else(fresh_seed);
        let reports = leak_search(&args, &model, synthesis, seed)?;
        ("leaks", Some(seed), Findings::Leaks(reports))
    } else {
        ("crashes", None, crash_search(&args, &model, synthesis, limits)?)
    };

    if let Some(path) = &args.report {
        let summary = RunSummary {
            generated_at: chrono::Utc::now().to_rfc3339(),
            mode,
            corpus: &args.queries,
            seed,
            findings,
        };
        let json = serde_json::to_string_pretty(&summary).context("Failed to encode report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn limits(args: &Args) -> FuzzLimits {
    let limits = FuzzLimits::new().slot_capacity(args.slot_capacity);
    match args.timeout_ms {
        Some(ms) => limits.worker_timeout(Duration::from_millis(ms)),
        None => limits,
    }
}

#[cfg(unix)]
fn crash_search(
    args: &Args,
    model: &TokenCorpusModel,
    synthesis: SynthesisConfig,
    limits: FuzzLimits,
) -> Result<Findings> {
    use sqlfuzz::{CrashHarness, HarnessConfig, LogConfig, ReferenceParser};

    let log = if args.log_queries {
        LogConfig::new().log_queries()
    } else {
        LogConfig::new()
    };
    let config = HarnessConfig::new()
        .rounds(args.iterations.unwrap_or(100))
        .limits(limits.clone())
        .synthesis(synthesis)
        .log(log);
    let mut harness = CrashHarness::new(model, config).context("Failed to start crash search")?;
    let mut parser = ReferenceParser::new(limits);

    let mut reports = Vec::new();
    harness
        .run_with(&mut parser, |report| {
            println!("[{}] {}: {}", report.round, report.exit, report.query);
            reports.push(report.clone());
        })
        .context("Crash search failed")?;
    Ok(Findings::Crashes(reports))
}

#[cfg(not(unix))]
fn crash_search(
    _args: &Args,
    _model: &TokenCorpusModel,
    _synthesis: SynthesisConfig,
    _limits: FuzzLimits,
) -> Result<Findings> {
    bail!("crash search needs fork(2) and is only available on unix")
}

fn leak_search(
    args: &Args,
    model: &TokenCorpusModel,
    synthesis: SynthesisConfig,
    seed: u64,
) -> Result<Vec<LeakReport>> {
    if args.batch_size == 0 {
        bail!("--batch-size must be non-zero");
    }
    let driver = match &args.driver {
        Some(driver) => driver.clone(),
        None => default_driver()?,
    };

    let mut checker = CheckerConfig::new(driver).program(&args.checker);
    if !args.checker_args.is_empty() {
        checker = checker.args(args.checker_args.iter().cloned());
    }
    let signature = LeakSignature::default().threshold_bytes(args.threshold_bytes);
    let oracle = MemcheckOracle::with_classifier(checker, signature);
    if let Err(e) = oracle.check_available() {
        tracing::warn!(error = %e, "checker unavailable, every batch will look clean");
    }

    let synth = QuerySynthesizer::with_config(model, synthesis);
    let mut rng = seeded_rng(seed);
    let mut bisector = LeakBisector::new(oracle);
    tracing::info!(seed, batch_size = args.batch_size, "leak search started");

    let reports = bisector.search_with(
        &synth,
        args.iterations.unwrap_or(10),
        args.batch_size,
        &mut rng,
        |report| {
            for faulty in &report.faulty {
                println!("{}", faulty.query);
            }
        },
    );

    let failures = bisector.oracle().failures();
    if failures > 0 {
        tracing::warn!(failures, "checker could not be run for some batches");
    }
    tracing::info!(checks = bisector.checks(), "leak search finished");
    Ok(reports)
}

/// `sqlfuzz-driver` in the directory of the running executable.
fn default_driver() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    Ok(exe.with_file_name(format!(
        "sqlfuzz-driver{}",
        std::env::consts::EXE_SUFFIX
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["sqlfuzz"]).unwrap();
        assert_eq!(args.queries, PathBuf::from("queries/sample.sql"));
        assert!(!args.leaks);
        assert_eq!(args.iterations, None);
        assert_eq!(args.batch_size, 10);
        assert_eq!(args.slot_capacity, 4096);
        assert_eq!(args.exploration, DEFAULT_EXPLORATION);
        assert_eq!(args.checker, PathBuf::from("valgrind"));
        assert!(args.checker_args.is_empty());
        assert!(!args.log_queries);
        assert!(limits(&args).worker_timeout.is_none());
    }

    #[test]
    fn test_leak_flags() {
        let args = Args::try_parse_from([
            "sqlfuzz",
            "-l",
            "-q",
            "corpus.sql",
            "--iterations",
            "3",
            "--checker-arg",
            "--leak-check=full",
            "--checker-arg",
            "--show-leak-kinds=definite",
            "--timeout-ms",
            "250",
        ])
        .unwrap();
        assert!(args.leaks);
        assert_eq!(args.queries, PathBuf::from("corpus.sql"));
        assert_eq!(args.iterations, Some(3));
        assert_eq!(args.checker_args.len(), 2);
        assert_eq!(
            limits(&args).worker_timeout,
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_default_driver_is_sibling() {
        let driver = default_driver().unwrap();
        let exe = std::env::current_exe().unwrap();
        assert_eq!(driver.parent(), exe.parent());
        assert!(
            driver
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("sqlfuzz-driver")
        );
    }

    #[test]
    fn test_leak_search_with_stub_checker() {
        let model =
            TokenCorpusModel::from_lines(["SELECT a FROM t"], &SqlTokenizer::default()).unwrap();
        let args = Args::try_parse_from([
            "sqlfuzz",
            "-l",
            "--iterations",
            "2",
            "--batch-size",
            "4",
            "--checker",
            "true",
            "--driver",
            "unused",
        ])
        .unwrap();
        let reports = leak_search(&args, &model, SynthesisConfig::default(), 5).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| !r.batch_leaked && r.checks == 1));
    }
}
