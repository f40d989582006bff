//! Fuzz target for the sqlfuzz lexer and tokenizer
//!
//! Tokenizes arbitrary input to find:
//! - Lexer panics on odd quoting, comments or multi-byte characters
//! - Spans that do not slice the input on character boundaries
//! - Token sequences missing their terminal token
//!
//! Run with: cargo +nightly fuzz run lexer_fuzz -- -max_total_time=300

#![no_main]

use libfuzzer_sys::fuzz_target;
use sqlfuzz::{END_OF_QUERY, SqlTokenizer, Tokenizer};

fuzz_target!(|data: &[u8]| {
    // Corpus lines are text
    if let Ok(input) = std::str::from_utf8(data) {
        // Limit input size to prevent OOM
        if input.len() > 1_000_000 {
            return;
        }

        let mut lexer = sqlfuzz::parser::Lexer::new(input);
        while let Some(spanned) = lexer.next_spanned_token() {
            assert_eq!(&input[spanned.span.range()], spanned.token.text);
        }

        if let Ok(lexemes) = SqlTokenizer::default().tokenize(input) {
            let terminals = lexemes.iter().filter(|l| l.id == END_OF_QUERY).count();
            assert_eq!(terminals, 1);
            assert_eq!(lexemes.last().map(|l| l.id), Some(END_OF_QUERY));
        }
    }
});
