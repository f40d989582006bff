//! Logging helpers for sqlfuzz
//!
//! Generated queries are hostile by construction: they can hold newlines,
//! control bytes and arbitrarily long token runs. Anything that puts query
//! text into a log line goes through [`format_query_for_log`].
//!
//! # Log Levels
//!
//! - **ERROR**: checker could not be started
//! - **WARN**: degraded conditions (temp file cleanup, truncated slot writes)
//! - **INFO**: model build, worker exits, batch lifecycle
//! - **DEBUG**: individual checks and worker starts

use std::borrow::Cow;

/// Configuration for logging behavior
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to include query text in logs (default: false)
    /// Corpus identifiers end up in generated queries.
    pub log_query_content: bool,

    /// Maximum length of logged values before truncation (default: 200)
    pub max_value_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_query_content: false,
            max_value_length: 200,
        }
    }
}

impl LogConfig {
    /// Create a new log configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Include query text in logs
    pub fn log_queries(mut self) -> Self {
        self.log_query_content = true;
        self
    }

    /// Set maximum length for logged values
    pub fn max_value_length(mut self, len: usize) -> Self {
        self.max_value_length = len;
        self
    }

    /// Truncate value if it exceeds max length
    ///
    /// Handles UTF-8 char boundaries properly to avoid panics on multi-byte chars.
    pub fn truncate<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if value.len() <= self.max_value_length {
            Cow::Borrowed(value)
        } else {
            let mut end = self.max_value_length;
            while end > 0 && !value.is_char_boundary(end) {
                end -= 1;
            }
            Cow::Owned(format!(
                "{}...[truncated {} bytes]",
                &value[..end],
                value.len() - end
            ))
        }
    }
}

/// Escape characters that could forge extra log lines.
pub fn sanitize_for_log(input: &str) -> String {
    input
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .collect()
}

/// Format a query for logging, honoring [`LogConfig::log_query_content`].
pub fn format_query_for_log(query: &str, config: &LogConfig) -> String {
    if !config.log_query_content {
        let tokens = query.split_whitespace().count();
        return format!("[query: {} tokens, {} bytes]", tokens, query.len());
    }

    let sanitized = sanitize_for_log(query);
    config.truncate(&sanitized).into_owned()
}
