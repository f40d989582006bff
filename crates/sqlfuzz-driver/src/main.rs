//! sqlfuzz driver - runs the reference parser over a query file
//!
//! This is the program the memory checker runs during leak search:
//!
//!   valgrind --leak-check=full sqlfuzz-driver [--quiet] queries.sql
//!
//! Every non-empty line is parsed once. Rejected queries are expected, so
//! the exit status is 0 whenever the file could be read.

use anyhow::{Context, Result};
use clap::Parser;
use sqlfuzz::{ParseTarget, ReferenceParser};
use std::path::PathBuf;

/// sqlfuzz-driver - parse every line of a query file
#[derive(Parser, Debug)]
#[command(name = "sqlfuzz-driver")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Do not print the summary line
    #[arg(short, long)]
    quiet: bool,

    /// Query file, one query per line
    path: PathBuf,
}

/// Parse each non-empty line, returning (accepted, rejected).
fn run(input: &str, parser: &mut impl ParseTarget) -> (usize, usize) {
    let mut accepted = 0;
    let mut rejected = 0;
    for line in input.lines().filter(|l| !l.trim().is_empty()) {
        if parser.parse(line) {
            accepted += 1;
        } else {
            rejected += 1;
        }
    }
    (accepted, rejected)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let bytes = std::fs::read(&args.path)
        .with_context(|| format!("Failed to read queries: {}", args.path.display()))?;
    let input = String::from_utf8_lossy(&bytes);

    let (accepted, rejected) = run(&input, &mut ReferenceParser::default());
    if !args.quiet {
        println!(
            "parsed {} queries: {} accepted, {} rejected",
            accepted + rejected,
            accepted,
            rejected
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let input = "SELECT a FROM t\n\nSELECT FROM\n   \nSHOW TABLES\n";
        assert_eq!(run(input, &mut ReferenceParser::default()), (2, 1));
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["sqlfuzz-driver", "--quiet", "q.sql"]).unwrap();
        assert!(args.quiet);
        assert_eq!(args.path, PathBuf::from("q.sql"));

        let args = Args::try_parse_from(["sqlfuzz-driver", "q.sql", "-q"]).unwrap();
        assert!(args.quiet);
        assert_eq!(args.path, PathBuf::from("q.sql"));
    }

    #[test]
    fn test_bad_args_are_rejected() {
        assert!(Args::try_parse_from(["sqlfuzz-driver"]).is_err());
        assert!(Args::try_parse_from(["sqlfuzz-driver", "q.sql", "--verbose"]).is_err());
        assert!(Args::try_parse_from(["sqlfuzz-driver", "a.sql", "b.sql"]).is_err());
    }
}
