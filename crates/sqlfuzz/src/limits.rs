//! Resource limits for fuzzing runs
//!
//! These bound the shared in-flight slot, the corpus reader, the reference
//! parser's recursion, and (optionally) how long a worker may run.

use std::time::Duration;

use crate::error::{Error, Result};

/// Resource limits for a fuzzing run
#[derive(Debug, Clone)]
pub struct FuzzLimits {
    /// Capacity in bytes of the shared in-flight query slot, terminator included
    /// Default: 4096
    pub slot_capacity: usize,

    /// Longest corpus line the tokenizer accepts
    /// Default: 64 KiB
    pub max_line_bytes: usize,

    /// Maximum nesting depth for the reference parser
    /// Default: 64
    pub max_parse_depth: usize,

    /// How long a worker may run before it is killed.
    /// Default: None (wait until the worker dies on its own)
    pub worker_timeout: Option<Duration>,
}

impl Default for FuzzLimits {
    fn default() -> Self {
        Self {
            slot_capacity: 4096,
            max_line_bytes: 64 * 1024,
            max_parse_depth: 64,
            worker_timeout: None,
        }
    }
}

impl FuzzLimits {
    /// Create new limits with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set shared slot capacity
    pub fn slot_capacity(mut self, bytes: usize) -> Self {
        self.slot_capacity = bytes;
        self
    }

    /// Set maximum corpus line length
    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.max_line_bytes = bytes;
        self
    }

    /// Set maximum parser nesting depth
    pub fn max_parse_depth(mut self, depth: usize) -> Self {
        self.max_parse_depth = depth;
        self
    }

    /// Kill workers that run longer than `timeout`
    pub fn worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = Some(timeout);
        self
    }

    /// Reject values that cannot work at all.
    pub fn validate(&self) -> Result<()> {
        if self.slot_capacity < 2 {
            return Err(Error::InvalidConfig(format!(
                "slot capacity must hold at least one byte and a terminator, got {}",
                self.slot_capacity
            )));
        }
        if self.max_line_bytes == 0 {
            return Err(Error::InvalidConfig("max line bytes must be non-zero".into()));
        }
        if self.max_parse_depth == 0 {
            return Err(Error::InvalidConfig("max parse depth must be non-zero".into()));
        }
        Ok(())
    }
}
