//! Read policy configuration.
//!
//! The policy is set via environment variables, read once per process:
//! - `TLSPEEK_READ_MODE`:
//!   - `strict` (default): live reads are checked against the target's
//!     readable mappings before the copy is attempted.
//!   - `permissive`: the range check is skipped and the kernel's own
//!     rejection of `process_vm_readv` is the only guard.
//! - `TLSPEEK_MAX_READ`: largest single copy in bytes (default 64).
//!
//! The null-page guard and the overflow guard apply in every mode.

use std::sync::OnceLock;

/// Reads starting below this address are always rejected.
pub const NULL_PAGE_LIMIT: u64 = 0x1000;

/// Default per-read cap. Every recipe copies at most one 16-byte record.
pub const DEFAULT_MAX_READ: usize = 64;

/// Validation depth for live reads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadMode {
    /// Pre-validate every range against the target's mappings.
    #[default]
    Strict,
    /// Let the kernel reject bad ranges.
    Permissive,
}

impl ReadMode {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "strict" | "default" | "checked" => Self::Strict,
            "permissive" | "kernel" | "fast" => Self::Permissive,
            _ => Self::Strict,
        }
    }

    /// Returns true if ranges must be checked against the mapping table.
    #[must_use]
    pub const fn checks_mappings(self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// Policy shared by every [`MemoryReader`](crate::MemoryReader) implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    pub mode: ReadMode,
    pub max_read: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            mode: ReadMode::Strict,
            max_read: DEFAULT_MAX_READ,
        }
    }
}

impl ReaderConfig {
    /// Build from explicit environment values. Unparseable or zero caps fall
    /// back to the default.
    #[must_use]
    pub fn from_values(mode: Option<&str>, max_read: Option<&str>) -> Self {
        let mode = mode.map(ReadMode::from_str_loose).unwrap_or_default();
        let max_read = max_read
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_READ);
        Self { mode, max_read }
    }

    /// Process-wide configuration (reads env vars on first call, caches thereafter).
    #[must_use]
    pub fn from_env() -> Self {
        *GLOBAL_CONFIG.get_or_init(|| {
            let mode = std::env::var("TLSPEEK_READ_MODE").ok();
            let max_read = std::env::var("TLSPEEK_MAX_READ").ok();
            Self::from_values(mode.as_deref(), max_read.as_deref())
        })
    }
}

static GLOBAL_CONFIG: OnceLock<ReaderConfig> = OnceLock::new();
