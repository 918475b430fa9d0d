//! Resolution failures.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tlspeek_membrane::ReadError;

use crate::descriptor::LibcVariant;

/// The step of a recipe whose read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSite {
    /// Saved TLS base register.
    TlsBase,
    /// Saved segment selector.
    SegmentIndex,
    /// Descriptor self-pointer stored near the thread pointer.
    ThreadSelf,
    /// glibc `specific_1stblock[key]` record.
    SpecificSlot,
    /// musl `pthread::tsd` pointer.
    TsdBase,
    /// musl `tsd[key]`.
    TsdValue,
}

impl ReadSite {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TlsBase => "tls_base",
            Self::SegmentIndex => "segment_index",
            Self::ThreadSelf => "thread_self",
            Self::SpecificSlot => "specific_slot",
            Self::TsdBase => "tsd_base",
            Self::TsdValue => "tsd_value",
        }
    }
}

impl fmt::Display for ReadSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse error classification handed to callers deciding whether to retry
/// on a later sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidKey,
    UnsupportedKeyRange,
    ReadFailure,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidKey => "InvalidKey",
            Self::UnsupportedKeyRange => "UnsupportedKeyRange",
            Self::ReadFailure => "ReadFailure",
        }
    }

    /// Parse the names produced by [`as_str`](Self::as_str), case-insensitively.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "invalidkey" | "invalid_key" => Some(Self::InvalidKey),
            "unsupportedkeyrange" | "unsupported_key_range" => Some(Self::UnsupportedKeyRange),
            "readfailure" | "read_failure" => Some(Self::ReadFailure),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of one resolution call. No partial result accompanies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("tls key is unassigned (-1)")]
    InvalidKey,
    #[error("key {key} is outside the range supported for {variant}")]
    UnsupportedKeyRange { key: i32, variant: LibcVariant },
    #[error("reading {site} failed: {source}")]
    ReadFailure {
        site: ReadSite,
        /// Candidate address, when the failure happened in target memory.
        addr: Option<u64>,
        #[source]
        source: ReadError,
    },
}

impl ResolveError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidKey => ErrorKind::InvalidKey,
            Self::UnsupportedKeyRange { .. } => ErrorKind::UnsupportedKeyRange,
            Self::ReadFailure { .. } => ErrorKind::ReadFailure,
        }
    }

    pub(crate) const fn read(site: ReadSite, addr: Option<u64>, source: ReadError) -> Self {
        Self::ReadFailure { site, addr, source }
    }

    pub(crate) const fn overflow(site: ReadSite) -> Self {
        Self::ReadFailure {
            site,
            addr: None,
            source: ReadError::AddressOverflow,
        }
    }
}
