//! Shared in-flight query slot
//!
//! A fixed-capacity byte buffer mapped `MAP_SHARED` over an unlinked
//! temporary file, so a forked worker and its supervisor see the same bytes.
//! The worker is the only writer while it lives; the supervisor only touches
//! the slot when no worker is running. No lock is needed under that
//! discipline.
//!
//! One byte past the query capacity records whether the last publish had to
//! truncate.

use memmap2::MmapMut;

use crate::error::{Error, Result};

/// Null-terminated query buffer shared across `fork`.
#[derive(Debug)]
pub struct SharedQuerySlot {
    map: MmapMut,
}

impl SharedQuerySlot {
    /// Allocate a zeroed slot of `capacity` bytes, terminator included.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 2 {
            return Err(Error::InvalidConfig(format!(
                "slot capacity must be at least 2 bytes, got {}",
                capacity
            )));
        }
        let file = tempfile::tempfile().map_err(Error::SharedMemory)?;
        file.set_len(capacity as u64 + 1).map_err(Error::SharedMemory)?;

        // SAFETY: The file is unlinked and private to this process tree, its
        // length is set once above and never changed. Writers are serialized
        // by the worker lifecycle: only the live worker writes, and the
        // supervisor accesses the mapping only after reaping it.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(Error::SharedMemory)?;

        Ok(Self { map })
    }

    /// Total capacity in bytes, terminator included.
    pub fn capacity(&self) -> usize {
        self.map.len() - 1
    }

    fn flag_index(&self) -> usize {
        self.map.len() - 1
    }

    /// Longest query that fits without truncation.
    pub fn max_query_len(&self) -> usize {
        self.capacity() - 1
    }

    /// Store `query`, truncated to `capacity - 1` bytes on a character
    /// boundary, followed by a NUL.
    ///
    /// Returns `true` when the query had to be truncated.
    pub fn publish(&mut self, query: &str) -> bool {
        let mut len = query.len().min(self.max_query_len());
        while !query.is_char_boundary(len) {
            len -= 1;
        }
        let truncated = len < query.len();
        self.map[..len].copy_from_slice(&query.as_bytes()[..len]);
        self.map[len] = 0;
        let flag = self.flag_index();
        self.map[flag] = u8::from(truncated);
        truncated
    }

    /// Whether the last [`publish`](Self::publish) cut its query short.
    pub fn truncated(&self) -> bool {
        self.map[self.flag_index()] != 0
    }

    /// Contents up to the first NUL.
    pub fn read(&self) -> String {
        let query = &self.map[..self.capacity()];
        let end = query.iter().position(|&b| b == 0).unwrap_or(query.len());
        String::from_utf8_lossy(&query[..end]).into_owned()
    }

    /// Zero the whole slot.
    pub fn clear(&mut self) {
        self.map.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_starts_empty() {
        let slot = SharedQuerySlot::new(16).unwrap();
        assert_eq!(slot.capacity(), 16);
        assert_eq!(slot.read(), "");
    }

    #[test]
    fn test_publish_and_read() {
        let mut slot = SharedQuerySlot::new(64).unwrap();
        assert!(!slot.publish("SELECT a FROM t "));
        assert_eq!(slot.read(), "SELECT a FROM t ");

        // shorter write after a longer one
        slot.publish("SHOW ");
        assert_eq!(slot.read(), "SHOW ");
    }

    #[test]
    fn test_truncation_stays_in_bounds() {
        let mut slot = SharedQuerySlot::new(8).unwrap();
        assert!(slot.publish("SELECT a FROM t"));
        assert!(slot.truncated());
        assert_eq!(slot.read(), "SELECT ");
        assert_eq!(slot.map[7], 0);
        assert_eq!(slot.capacity(), 8);
    }

    #[test]
    fn test_exact_fit_is_not_truncated() {
        let mut slot = SharedQuerySlot::new(5).unwrap();
        assert!(!slot.publish("abcd"));
        assert!(!slot.truncated());
        assert_eq!(slot.read(), "abcd");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut slot = SharedQuerySlot::new(4).unwrap();
        // 'é' is two bytes, only one whole 'é' fits in three
        assert!(slot.publish("éé"));
        assert!(slot.truncated());
        assert_eq!(slot.read(), "é");
    }

    #[test]
    fn test_clear() {
        let mut slot = SharedQuerySlot::new(16).unwrap();
        slot.publish("DESCRIBE table_with_long_name ");
        assert!(slot.truncated());
        slot.clear();
        assert_eq!(slot.read(), "");
        assert!(!slot.truncated());
        assert!(slot.map.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_capacity_too_small() {
        assert!(matches!(
            SharedQuerySlot::new(1),
            Err(Error::InvalidConfig(_))
        ));
    }
}
