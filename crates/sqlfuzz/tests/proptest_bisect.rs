//! Property-based tests for leak bisection
//!
//! For a batch of n queries and an oracle that marks a range faulty iff it
//! holds one of the chosen indices, isolation must report exactly those
//! indices.
//!
//! Run with: cargo test --test proptest_bisect

use proptest::prelude::*;
use sqlfuzz::LeakBisector;

fn batch(n: usize) -> Vec<String> {
    (0..n).map(|i| i.to_string()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Isolation reports exactly the faulty indices
    #[test]
    fn isolate_reports_exactly_faulty(faulty in proptest::collection::vec(any::<bool>(), 0..40)) {
        let expected: Vec<usize> = faulty
            .iter()
            .enumerate()
            .filter(|(_, f)| **f)
            .map(|(i, _)| i)
            .collect();
        let flags = faulty.clone();
        let mut bisector = LeakBisector::new(move |range: &[String]| {
            range.iter().any(|q| flags[q.parse::<usize>().unwrap()])
        });

        let found = bisector.isolate(&batch(faulty.len()));
        prop_assert_eq!(found, expected);
    }

    /// The oracle never sees an empty range
    #[test]
    fn oracle_never_sees_empty_range(n in 0usize..40, seed in any::<u64>()) {
        let mut bisector = LeakBisector::new(move |range: &[String]| {
            assert!(!range.is_empty());
            range.iter().any(|q| (q.parse::<u64>().unwrap() ^ seed) % 3 == 0)
        });
        bisector.isolate(&batch(n));
    }

    /// A clean batch costs at most two checks
    #[test]
    fn clean_batch_is_cheap(n in 0usize..100) {
        let mut bisector = LeakBisector::new(|_: &[String]| false);
        bisector.isolate(&batch(n));
        prop_assert!(bisector.checks() <= 2);
    }
}
