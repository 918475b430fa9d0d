//! Scenario fixture loading.
//!
//! A scenario pins down everything one resolution depends on: the thread's
//! saved registers, the library descriptor, the key, and the words of target
//! memory the recipe is expected to touch. Numbers may be written as JSON
//! integers or as `"0x..."` strings.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tlspeek_core::{Arch, ErrorKind, LibcVariant, LibraryDescriptor, TlsKey};
use tlspeek_membrane::{SavedTask, SnapshotMemory};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("case {case}: unknown architecture {arch:?}")]
    UnknownArch { case: String, arch: String },
    #[error("case {case}: unknown error kind {kind:?}")]
    UnknownErrorKind { case: String, kind: String },
}

/// A `u64` that reads from either a JSON number or a hex/decimal string and
/// writes as a hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HexU64(pub u64);

impl HexU64 {
    /// Parse `0x`-prefixed hex or plain decimal; `_` separators are ignored.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let cleaned: String = s.trim().chars().filter(|&c| c != '_').collect();
        let parsed = match cleaned
            .strip_prefix("0x")
            .or_else(|| cleaned.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => cleaned.parse().ok(),
        };
        parsed.map(Self)
    }
}

impl fmt::Display for HexU64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Serialize for HexU64 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HexU64 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Str(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(Self(n)),
            Raw::Str(s) => Self::parse(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid integer {s:?}"))),
        }
    }
}

/// Library descriptor as written in fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureLibc {
    pub variant: LibcVariant,
    #[serde(default)]
    pub pthread_size: HexU64,
    pub specific_block_offset: HexU64,
}

impl From<FixtureLibc> for LibraryDescriptor {
    fn from(f: FixtureLibc) -> Self {
        Self {
            variant: f.variant,
            pthread_size: f.pthread_size.0,
            specific_block_offset: f.specific_block_offset.0,
        }
    }
}

/// Saved register state as written in fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureTask {
    pub tls_base: HexU64,
    #[serde(default)]
    pub segment_index: u16,
}

/// Consecutive words mapped at `addr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryWords {
    pub addr: HexU64,
    pub words: Vec<HexU64>,
}

/// Expected outcome of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    Value(HexU64),
    /// One of `InvalidKey`, `UnsupportedKeyRange`, `ReadFailure`.
    Error(String),
}

/// A single scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCase {
    pub name: String,
    #[serde(default = "default_arch")]
    pub arch: String,
    pub libc: FixtureLibc,
    pub key: i32,
    pub task: FixtureTask,
    #[serde(default)]
    pub memory: Vec<MemoryWords>,
    pub expect: Expectation,
    /// When present, the exact sequence of read addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_reads: Option<Vec<HexU64>>,
}

fn default_arch() -> String {
    "x86_64".to_string()
}

/// Fully decoded inputs of a [`ScenarioCase`].
#[derive(Debug, Clone)]
pub struct PreparedCase {
    pub arch: Arch,
    pub libc: LibraryDescriptor,
    pub key: TlsKey,
    pub task: SavedTask,
    pub memory: SnapshotMemory,
    pub expect: Result<u64, ErrorKind>,
}

impl ScenarioCase {
    /// Decode names and build the snapshot image and saved task.
    pub fn prepare(&self) -> Result<PreparedCase, FixtureError> {
        let arch = Arch::from_str_loose(&self.arch).ok_or_else(|| FixtureError::UnknownArch {
            case: self.name.clone(),
            arch: self.arch.clone(),
        })?;
        let expect = match &self.expect {
            Expectation::Value(v) => Ok(v.0),
            Expectation::Error(kind) => Err(ErrorKind::from_str_loose(kind).ok_or_else(|| {
                FixtureError::UnknownErrorKind {
                    case: self.name.clone(),
                    kind: kind.clone(),
                }
            })?),
        };
        let mut memory = SnapshotMemory::new();
        for block in &self.memory {
            let words: Vec<u64> = block.words.iter().map(|w| w.0).collect();
            memory.map_words(block.addr.0, &words);
        }
        Ok(PreparedCase {
            arch,
            libc: self.libc.into(),
            key: TlsKey(self.key),
            task: SavedTask::synthetic(arch, self.task.tls_base.0, self.task.segment_index),
            memory,
            expect,
        })
    }
}

/// A collection of scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSet {
    /// Schema version.
    pub version: String,
    /// Free-form description of where the layouts came from.
    #[serde(default)]
    pub description: String,
    pub cases: Vec<ScenarioCase>,
}

impl ScenarioSet {
    /// Load from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from a file path.
    pub fn from_file(path: &Path) -> Result<Self, FixtureError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parses_numbers_and_strings() {
        assert_eq!(HexU64::parse("0x7000"), Some(HexU64(0x7000)));
        assert_eq!(HexU64::parse("0XBEEF"), Some(HexU64(0xBEEF)));
        assert_eq!(HexU64::parse("0x7f00_0000"), Some(HexU64(0x7f00_0000)));
        assert_eq!(HexU64::parse("42"), Some(HexU64(42)));
        assert_eq!(HexU64::parse("0xZZ"), None);

        let v: Vec<HexU64> = serde_json::from_str(r#"[16, "0x10", "16"]"#).unwrap();
        assert!(v.iter().all(|h| h.0 == 16));
        assert_eq!(serde_json::to_string(&HexU64(255)).unwrap(), r#""0xff""#);
    }

    #[test]
    fn case_prepares_image_and_task() {
        let json = r#"{
            "name": "glibc_key0",
            "libc": { "variant": "glibc", "pthread_size": "0x900", "specific_block_offset": "0x310" },
            "key": 0,
            "task": { "tls_base": "0x7000" },
            "memory": [
                { "addr": "0x7010", "words": ["0x8000"] },
                { "addr": "0x8310", "words": ["0xAAAA", "0xBEEF"] }
            ],
            "expect": { "value": "0xBEEF" }
        }"#;
        let case: ScenarioCase = serde_json::from_str(json).unwrap();
        let prepared = case.prepare().unwrap();
        assert_eq!(prepared.arch, Arch::X86_64);
        assert_eq!(prepared.libc, LibraryDescriptor::glibc(0x900, 0x310));
        assert_eq!(prepared.memory.segment_count(), 2);
        assert_eq!(prepared.expect, Ok(0xBEEF));
    }

    #[test]
    fn unknown_names_are_reported() {
        let json = r#"{
            "name": "bad",
            "arch": "sparc",
            "libc": { "variant": "musl", "specific_block_offset": 128 },
            "key": 0,
            "task": { "tls_base": 28672 },
            "expect": { "error": "ReadFailure" }
        }"#;
        let case: ScenarioCase = serde_json::from_str(json).unwrap();
        assert!(matches!(
            case.prepare(),
            Err(FixtureError::UnknownArch { .. })
        ));

        let mut case = case;
        case.arch = "x86_64".into();
        case.expect = Expectation::Error("Segfault".into());
        assert!(matches!(
            case.prepare(),
            Err(FixtureError::UnknownErrorKind { .. })
        ));
    }
}
