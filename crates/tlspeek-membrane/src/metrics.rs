//! Atomic counters for read observability.
//!
//! All counters use relaxed ordering; they are advisory/diagnostic,
//! not synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ReadError;

/// Per-reader operation counters.
#[derive(Debug, Default)]
pub struct ReadMetrics {
    /// Reads requested.
    pub attempted: AtomicU64,
    /// Reads that filled the whole buffer.
    pub succeeded: AtomicU64,
    /// Bytes copied by successful reads.
    pub bytes: AtomicU64,
    /// Rejected by the null-page, size or overflow policy.
    pub policy_rejections: AtomicU64,
    /// Rejected because the range is not readable in the mapping table.
    pub mapping_rejections: AtomicU64,
    /// Rejected by the kernel or cut short.
    pub os_failures: AtomicU64,
}

impl ReadMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            policy_rejections: AtomicU64::new(0),
            mapping_rejections: AtomicU64::new(0),
            os_failures: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Account for one finished read.
    pub fn observe(&self, len: usize, result: &Result<(), ReadError>) {
        Self::inc(&self.attempted);
        match result {
            Ok(()) => {
                Self::inc(&self.succeeded);
                self.bytes.fetch_add(len as u64, Ordering::Relaxed);
            }
            Err(
                ReadError::NullPage { .. } | ReadError::TooLarge { .. } | ReadError::AddressOverflow,
            ) => Self::inc(&self.policy_rejections),
            Err(ReadError::Unmapped { .. } | ReadError::NotReadable { .. }) => {
                Self::inc(&self.mapping_rejections);
            }
            Err(_) => Self::inc(&self.os_failures),
        }
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempted: Self::get(&self.attempted),
            succeeded: Self::get(&self.succeeded),
            bytes: Self::get(&self.bytes),
            policy_rejections: Self::get(&self.policy_rejections),
            mapping_rejections: Self::get(&self.mapping_rejections),
            os_failures: Self::get(&self.os_failures),
        }
    }
}

/// Point-in-time copy of [`ReadMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub attempted: u64,
    pub succeeded: u64,
    pub bytes: u64,
    pub policy_rejections: u64,
    pub mapping_rejections: u64,
    pub os_failures: u64,
}

impl MetricsSnapshot {
    /// Reads that did not succeed.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.attempted.saturating_sub(self.succeeded)
    }
}
