//! Corpus model and synthesis tests through the public API

use std::collections::BTreeSet;
use std::io::Write;

use pretty_assertions::assert_eq;
use sqlfuzz::parser::{TokenKind, parse_query};
use sqlfuzz::{
    END_OF_QUERY, Error, QuerySynthesizer, SqlTokenizer, SynthesisConfig, TokenCorpusModel,
    Tokenizer, seeded_rng,
};

const SAMPLE_CORPUS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../queries/sample.sql");

fn corpus_file(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
    file
}

fn scenario_model() -> TokenCorpusModel {
    let file = corpus_file(&["SELECT a FROM t", "SELECT b FROM t WHERE a = 1"]);
    TokenCorpusModel::from_path(file.path(), &SqlTokenizer::default()).unwrap()
}

#[test]
fn select_continues_to_identifier() {
    let model = scenario_model();
    let select = TokenKind::Select.id();
    let identifier = TokenKind::Identifier.id();

    assert_eq!(model.text(select), Some("SELECT"));
    let targets: Vec<_> = model.transitions(select).iter().map(|t| t.token).collect();
    assert!(targets.contains(&identifier));
}

#[test]
fn markov_walk_stays_on_observed_transitions() {
    let model = scenario_model();
    let synth = QuerySynthesizer::with_config(&model, SynthesisConfig::new().exploration(0.0));
    let tokenizer = SqlTokenizer::default();
    let select = TokenKind::Select.id();
    let mut rng = seeded_rng(1234);

    for _ in 0..500 {
        let query = synth.walk_from(select, &mut rng);
        assert!(query.starts_with("SELECT "), "query: {query}");

        let ids: Vec<_> = tokenizer
            .tokenize(&query)
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        for pair in ids.windows(2) {
            let observed = model.transitions(pair[0]).iter().any(|t| t.token == pair[1]);
            assert!(observed, "{} -> {} never seen, query: {query}", pair[0], pair[1]);
        }
    }
}

#[test]
fn generated_words_are_known_token_text() {
    let model = scenario_model();
    let synth = QuerySynthesizer::new(&model);
    let known: BTreeSet<&str> = model.tokens().filter_map(|t| model.text(t)).collect();
    let mut rng = seeded_rng(99);

    for query in synth.generate_batch(300, &mut rng) {
        for word in query.split_whitespace() {
            assert!(known.contains(word), "unknown word {word:?} in {query:?}");
        }
    }
}

#[test]
fn sample_corpus_distributions_are_cumulative() {
    let model = TokenCorpusModel::from_path(SAMPLE_CORPUS, &SqlTokenizer::default()).unwrap();
    assert!(model.token_count() > 20);

    for (source, list) in model.table() {
        assert!(!list.is_empty(), "token {source} has an empty list");
        for pair in list.windows(2) {
            assert!(pair[0].cumulative < pair[1].cumulative);
        }
        let last = list.last().unwrap().cumulative;
        assert!((last - 1.0).abs() < 1e-6, "token {source} ends at {last}");
    }
    assert!(model.transitions(END_OF_QUERY).is_empty());
    assert_eq!(model.fallback(), END_OF_QUERY);
}

#[test]
fn sample_corpus_parses_with_reference_parser() {
    let corpus = std::fs::read_to_string(SAMPLE_CORPUS).unwrap();
    for line in corpus.lines().filter(|l| !l.trim().is_empty()) {
        if let Err(e) = parse_query(line) {
            panic!("{line}: {e}");
        }
    }
}

#[test]
fn string_literals_become_placeholder() {
    let file = corpus_file(&["SELECT a FROM t WHERE b = 'secret value'"]);
    let model = TokenCorpusModel::from_path(file.path(), &SqlTokenizer::default()).unwrap();
    assert_eq!(model.text(TokenKind::StringLiteral.id()), Some("'str'"));
}

#[test]
fn missing_corpus_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = TokenCorpusModel::from_path(dir.path().join("nope.sql"), &SqlTokenizer::default())
        .unwrap_err();
    assert!(matches!(err, Error::CorpusOpen { .. }));
    assert!(err.to_string().contains("nope.sql"));
}

#[test]
fn empty_corpus_is_fatal() {
    let file = corpus_file(&["", "-- only a comment"]);
    let err = TokenCorpusModel::from_path(file.path(), &SqlTokenizer::default()).unwrap_err();
    assert!(matches!(err, Error::EmptyCorpus));
}
