//! Verification harness for tlspeek.
//!
//! This crate provides:
//! - Scenario fixtures: captured target layouts as JSON reference data
//! - Scenario runner: replay fixtures against snapshot memory and compare
//! - Live resolution: resolve a key for every thread of a running process
//! - Structured logging: JSONL trace records for both of the above
//! - Outcome statistics: per-error-kind counters across many resolutions

#![forbid(unsafe_code)]

pub mod fixtures;
#[cfg(target_os = "linux")]
pub mod live;
pub mod runner;
pub mod stats;
pub mod structured_log;
pub mod verify;

pub use fixtures::{FixtureError, HexU64, ScenarioCase, ScenarioSet};
pub use runner::ScenarioRunner;
pub use stats::OutcomeStats;
pub use verify::{VerificationReport, VerificationResult};
