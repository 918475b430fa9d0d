//! Inputs describing the target's C runtime and the key to resolve.

use std::fmt;

use serde::{Deserialize, Serialize};

/// C library family linked by the target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibcVariant {
    Glibc,
    Musl,
}

impl LibcVariant {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "glibc" | "gnu" => Some(Self::Glibc),
            "musl" => Some(Self::Musl),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Glibc => "glibc",
            Self::Musl => "musl",
        }
    }
}

impl fmt::Display for LibcVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layout facts about one target's C runtime, supplied by the detection
/// service that inspected its libc build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryDescriptor {
    pub variant: LibcVariant,
    /// `sizeof(struct pthread)`.
    pub pthread_size: u64,
    /// glibc: offset of `specific_1stblock` in `struct pthread`.
    /// musl: offset of the `tsd` pointer in `struct pthread`.
    pub specific_block_offset: u64,
}

impl LibraryDescriptor {
    #[must_use]
    pub const fn glibc(pthread_size: u64, specific_block_offset: u64) -> Self {
        Self {
            variant: LibcVariant::Glibc,
            pthread_size,
            specific_block_offset,
        }
    }

    #[must_use]
    pub const fn musl(pthread_size: u64, specific_block_offset: u64) -> Self {
        Self {
            variant: LibcVariant::Musl,
            pthread_size,
            specific_block_offset,
        }
    }
}

/// A `pthread_key_t` as seen by the caller. `-1` means the application has
/// not created its key yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TlsKey(pub i32);

impl TlsKey {
    pub const UNASSIGNED: Self = Self(-1);

    #[must_use]
    pub const fn is_unassigned(self) -> bool {
        self.0 == Self::UNASSIGNED.0
    }

    /// Slot index, if the key is non-negative.
    #[must_use]
    pub fn index(self) -> Option<u64> {
        u64::try_from(self.0).ok()
    }
}

impl From<i32> for TlsKey {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TlsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_and_index() {
        assert!(TlsKey::UNASSIGNED.is_unassigned());
        assert!(TlsKey(-1).is_unassigned());
        assert_eq!(TlsKey(-1).index(), None);
        assert_eq!(TlsKey(-7).index(), None);
        assert_eq!(TlsKey(3).index(), Some(3));
    }

    #[test]
    fn descriptor_json_shape() {
        let d = LibraryDescriptor::musl(0xc8, 0x80);
        let json = serde_json::to_value(d).unwrap();
        assert_eq!(json["variant"], "musl");
        assert_eq!(json["specific_block_offset"], 0x80);
        let back: LibraryDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn variant_parse() {
        assert_eq!(LibcVariant::from_str_loose("GLIBC"), Some(LibcVariant::Glibc));
        assert_eq!(LibcVariant::from_str_loose("musl"), Some(LibcVariant::Musl));
        assert_eq!(LibcVariant::from_str_loose("bionic"), None);
    }
}
