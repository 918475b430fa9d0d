//! Owned in-memory image of a target address space.
//!
//! Used to replay captured layouts (fixtures), to drive benchmarks, and as
//! the mock reader in tests. Reads follow exactly the same policy as live
//! reads: a range is served only when a single segment covers all of it.

use std::collections::BTreeMap;

use crate::config::ReaderConfig;
use crate::error::ReadError;
use crate::reader::{MemoryReader, check_request};

/// Sparse byte image keyed by segment base address.
#[derive(Debug, Clone, Default)]
pub struct SnapshotMemory {
    segments: BTreeMap<u64, Vec<u8>>,
    config: ReaderConfig,
}

impl SnapshotMemory {
    /// Create an empty image with the default read policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty image with an explicit read policy.
    #[must_use]
    pub fn with_config(config: ReaderConfig) -> Self {
        Self {
            segments: BTreeMap::new(),
            config,
        }
    }

    /// Map `bytes` at `base`. A segment already starting at `base` is replaced.
    ///
    /// Segments may nest or overlap. Where they do, a read is served by the
    /// covering segment with the highest base.
    pub fn map_bytes(&mut self, base: u64, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.segments.insert(base, bytes.into());
        self
    }

    /// Map consecutive little-endian words at `base`.
    pub fn map_words(&mut self, base: u64, words: &[u64]) -> &mut Self {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.map_bytes(base, bytes)
    }

    /// Builder form of [`map_words`](Self::map_words).
    #[must_use]
    pub fn with_words(mut self, base: u64, words: &[u64]) -> Self {
        self.map_words(base, words);
        self
    }

    /// Number of mapped segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn segment_for(&self, addr: u64, end: u64) -> Option<&[u8]> {
        self.segments
            .range(..=addr)
            .rev()
            .find_map(|(&base, bytes)| {
                let seg_end = base.checked_add(bytes.len() as u64)?;
                if end > seg_end {
                    return None;
                }
                let from = usize::try_from(addr - base).ok()?;
                let to = usize::try_from(end - base).ok()?;
                bytes.get(from..to)
            })
    }
}

impl MemoryReader for SnapshotMemory {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), ReadError> {
        let end = check_request(&self.config, addr, buf.len())?;
        let src = self.segment_for(addr, end).ok_or(ReadError::Unmapped {
            addr,
            len: buf.len(),
        })?;
        buf.copy_from_slice(src);
        Ok(())
    }
}
