//! Crash harness integration tests
//!
//! Every test forks, so they run serially.

#![cfg(unix)]

use std::time::Duration;

use serial_test::serial;
use sqlfuzz::{
    CrashHarness, ExitReason, FuzzLimits, HarnessConfig, PANIC_EXIT_CODE, ParseTarget,
    ReferenceParser, SqlTokenizer, TokenCorpusModel,
};

fn model() -> TokenCorpusModel {
    TokenCorpusModel::from_lines(
        [
            "SELECT a FROM t",
            "SELECT b FROM t WHERE a = 1",
            "DELETE FROM t WHERE b = 'x'",
        ],
        &SqlTokenizer::default(),
    )
    .unwrap()
}

#[test]
#[serial]
fn abort_reports_triggering_query() {
    let model = model();
    let mut harness = CrashHarness::new(&model, HarnessConfig::new().rounds(3)).unwrap();
    let mut target = |query: &str| -> bool {
        if query.contains("WHERE") {
            std::process::abort();
        }
        false
    };

    let reports = harness.run(&mut target).unwrap();
    assert_eq!(reports.len(), 3);
    for report in &reports {
        assert_eq!(report.exit, ExitReason::Signaled(libc::SIGABRT));
        assert!(report.query.contains("WHERE"), "query: {}", report.query);
    }
}

#[test]
#[serial]
fn panic_is_reported_as_crash() {
    let model = model();
    let mut harness = CrashHarness::new(&model, HarnessConfig::new().rounds(1)).unwrap();
    let mut target = |query: &str| -> bool {
        if query.starts_with("DELETE") {
            panic!("parser bug");
        }
        true
    };

    let reports = harness.run(&mut target).unwrap();
    assert_eq!(reports[0].exit, ExitReason::Exited(PANIC_EXIT_CODE));
    assert!(reports[0].query.starts_with("DELETE"));
}

#[test]
#[serial]
fn exit_code_is_preserved() {
    let model = model();
    let mut harness = CrashHarness::new(&model, HarnessConfig::new().rounds(1)).unwrap();
    let reports = harness
        .run(&mut |_: &str| -> bool { std::process::exit(3) })
        .unwrap();
    assert_eq!(reports[0].exit, ExitReason::Exited(3));
}

#[test]
#[serial]
fn hung_worker_is_killed_after_timeout() {
    let model = model();
    let limits = FuzzLimits::new().worker_timeout(Duration::from_millis(100));
    let mut harness =
        CrashHarness::new(&model, HarnessConfig::new().rounds(1).limits(limits)).unwrap();
    let mut target = |query: &str| -> bool {
        if query.contains("FROM") {
            loop {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
        true
    };

    let reports = harness.run(&mut target).unwrap();
    assert_eq!(reports[0].exit, ExitReason::TimedOut);
    assert!(reports[0].query.contains("FROM"));
}

#[test]
#[serial]
fn long_query_is_truncated_in_report() {
    let model = model();
    let limits = FuzzLimits::new().slot_capacity(8);
    let mut harness =
        CrashHarness::new(&model, HarnessConfig::new().rounds(1).limits(limits)).unwrap();
    let mut target = |query: &str| -> bool {
        if query.len() > 20 {
            std::process::abort();
        }
        true
    };

    let reports = harness.run(&mut target).unwrap();
    assert_eq!(reports[0].query.len(), 7);
    assert!(reports[0].truncated);
}

#[test]
#[serial]
fn reports_are_streamed() {
    let model = model();
    let mut harness = CrashHarness::new(&model, HarnessConfig::new().rounds(2)).unwrap();
    let mut seen = Vec::new();
    let rounds = harness
        .run_with(&mut |_: &str| -> bool { std::process::abort() }, |report| {
            seen.push(report.round)
        })
        .unwrap();
    assert_eq!(rounds, 2);
    assert_eq!(seen, vec![0, 1]);
}

#[test]
#[serial]
fn reference_parser_with_injected_fault() {
    let model = model();
    let mut harness = CrashHarness::new(&model, HarnessConfig::new().rounds(1)).unwrap();
    let mut parser = ReferenceParser::default();
    let mut target = move |query: &str| -> bool {
        let accepted = parser.parse(query);
        if accepted && query.starts_with("DELETE") {
            std::process::abort();
        }
        accepted
    };

    let reports = harness.run(&mut target).unwrap();
    assert!(reports[0].query.starts_with("DELETE FROM"));
}

#[test]
fn invalid_config_is_rejected() {
    let model = model();
    let result = CrashHarness::new(&model, HarnessConfig::new().rounds(0));
    assert!(result.is_err());
}
