//! MemcheckOracle tests against a shell script standing in for valgrind
//!
//! The script is run as `sh -c <script> checker <driver> [driver args] <file>`,
//! so inside it `$1` is the driver and the query file is the last argument.

#![cfg(unix)]

use std::fs;

use pretty_assertions::assert_eq;
use sqlfuzz::{CheckerConfig, FaultOracle, LeakBisector, MemcheckOracle};

/// Reports a leak whenever the query file mentions LEAK.
const LEAKY_CHECKER: &str = r#"
file=$(eval echo "\${$#}")
if grep -q LEAK "$file"; then
    echo "==42== definitely lost: 1,024 bytes in 2 blocks" >&2
else
    echo "==42== definitely lost: 0 bytes in 0 blocks" >&2
fi
"#;

fn script_checker(script: &str) -> CheckerConfig {
    CheckerConfig::new("sqlfuzz-driver")
        .program("sh")
        .args(["-c", script, "checker"])
}

fn queries(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn detects_leak_signature() {
    let mut oracle = MemcheckOracle::new(script_checker(LEAKY_CHECKER));
    assert!(oracle.has_fault(&queries(&["SELECT 1 ", "SELECT LEAK "])));
    assert!(!oracle.has_fault(&queries(&["SELECT 1 ", "SELECT 2 "])));
    assert_eq!(oracle.failures(), 0);
}

#[test]
fn bisector_isolates_leaky_queries() {
    let oracle = MemcheckOracle::new(script_checker(LEAKY_CHECKER));
    let mut bisector = LeakBisector::new(oracle);
    let batch = queries(&[
        "SELECT a ",
        "SELECT LEAK ",
        "SHOW TABLES ",
        "DELETE LEAK ",
        "SET x = 1 ",
    ]);
    assert_eq!(bisector.isolate(&batch), vec![1, 3]);
}

#[test]
fn query_file_has_one_line_per_query() {
    let config = CheckerConfig::new("sqlfuzz-driver")
        .program("sh")
        .args(["-c", r#"file=$(eval echo "\${$#}"); grep -c '' "$file""#, "checker"]);
    let mut oracle = MemcheckOracle::with_classifier(config, |out: &str| out.trim() == "3");
    assert!(oracle.has_fault(&queries(&["a ", "b ", "c "])));
    assert!(!oracle.has_fault(&queries(&["a ", "b "])));
}

#[test]
fn driver_and_driver_args_come_before_file() {
    let config = CheckerConfig::new("my-driver")
        .driver_arg("--quiet")
        .program("sh")
        .args(["-c", r#"echo "$1 $2 $#""#, "checker"]);
    let mut oracle =
        MemcheckOracle::with_classifier(config, |out: &str| out.trim() == "my-driver --quiet 3");
    assert!(oracle.has_fault(&queries(&["SELECT 1 "])));
}

#[test]
fn query_files_are_removed() {
    let dir = tempfile::tempdir().unwrap();
    let mut oracle = MemcheckOracle::new(script_checker(LEAKY_CHECKER).temp_dir(dir.path()));

    assert!(!oracle.has_fault(&[]));
    assert!(oracle.has_fault(&queries(&["LEAK "])));
    assert!(!oracle.has_fault(&queries(&["SELECT 1 "])));

    let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[test]
fn missing_temp_dir_degrades_to_clean() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone");
    let mut oracle = MemcheckOracle::new(script_checker(LEAKY_CHECKER).temp_dir(missing));
    assert!(!oracle.has_fault(&queries(&["LEAK "])));
    assert_eq!(oracle.failures(), 0);
}

#[test]
fn check_available_finds_shell() {
    let oracle = MemcheckOracle::new(script_checker(LEAKY_CHECKER));
    assert!(oracle.check_available().is_ok());
}
