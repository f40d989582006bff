//! Fuzz target for the sqlfuzz reference parser
//!
//! Parses arbitrary input to find:
//! - Parser panics
//! - Stack overflows from deeply nested expressions or sub-selects
//! - Infinite loops on malformed statements
//!
//! Run with: cargo +nightly fuzz run parser_fuzz -- -max_total_time=300

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if input.len() > 100_000 {
            return;
        }

        let limits = sqlfuzz::FuzzLimits::new().max_parse_depth(100);
        // Errors are fine, panics are not
        let _ = sqlfuzz::parser::Parser::with_limits(input, &limits).parse();
    }
});
