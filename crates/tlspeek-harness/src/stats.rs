//! Outcome counters across many resolutions.
//!
//! One counter per terminal outcome, plus a per-site breakdown of read
//! failures. Relaxed atomics: these are diagnostic, not synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tlspeek_core::{ReadSite, ResolveError};

const SITES: [ReadSite; 6] = [
    ReadSite::TlsBase,
    ReadSite::SegmentIndex,
    ReadSite::ThreadSelf,
    ReadSite::SpecificSlot,
    ReadSite::TsdBase,
    ReadSite::TsdValue,
];

const fn site_index(site: ReadSite) -> usize {
    match site {
        ReadSite::TlsBase => 0,
        ReadSite::SegmentIndex => 1,
        ReadSite::ThreadSelf => 2,
        ReadSite::SpecificSlot => 3,
        ReadSite::TsdBase => 4,
        ReadSite::TsdValue => 5,
    }
}

#[derive(Debug, Default)]
pub struct OutcomeStats {
    pub resolved: AtomicU64,
    pub invalid_key: AtomicU64,
    pub unsupported_key_range: AtomicU64,
    pub read_failure: AtomicU64,
    /// Threads whose registers could not be captured at all.
    pub capture_failure: AtomicU64,
    read_failure_by_site: [AtomicU64; 6],
}

impl OutcomeStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, result: &Result<u64, ResolveError>) {
        let counter = match result {
            Ok(_) => &self.resolved,
            Err(ResolveError::InvalidKey) => &self.invalid_key,
            Err(ResolveError::UnsupportedKeyRange { .. }) => &self.unsupported_key_range,
            Err(ResolveError::ReadFailure { site, .. }) => {
                self.read_failure_by_site[site_index(*site)].fetch_add(1, Ordering::Relaxed);
                &self.read_failure
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_capture_failure(&self) {
        self.capture_failure.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> OutcomeSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        OutcomeSnapshot {
            resolved: get(&self.resolved),
            invalid_key: get(&self.invalid_key),
            unsupported_key_range: get(&self.unsupported_key_range),
            read_failure: get(&self.read_failure),
            capture_failure: get(&self.capture_failure),
            read_failure_by_site: SITES
                .iter()
                .map(|&site| (site, get(&self.read_failure_by_site[site_index(site)])))
                .filter(|&(_, n)| n > 0)
                .collect(),
        }
    }
}

/// Point-in-time copy of [`OutcomeStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeSnapshot {
    pub resolved: u64,
    pub invalid_key: u64,
    pub unsupported_key_range: u64,
    pub read_failure: u64,
    pub capture_failure: u64,
    /// Non-zero entries only.
    pub read_failure_by_site: Vec<(ReadSite, u64)>,
}

impl OutcomeSnapshot {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.resolved
            + self.invalid_key
            + self.unsupported_key_range
            + self.read_failure
            + self.capture_failure
    }
}
