//! Bounded access membrane for tlspeek.
//!
//! Everything the resolver learns about a foreign thread crosses this crate:
//! target memory is only ever copied through a [`MemoryReader`], and saved
//! register state is only ever read through a [`TaskView`]. Both report
//! failure instead of faulting.
//!
//! # Architecture
//!
//! - **Reader contract** (`reader`): the fallible copy capability and its
//!   shared validation policy
//! - **Region map** (`region`): readable-range lookups, `/proc/<pid>/maps` parsing
//! - **Snapshot memory** (`snapshot`): owned in-memory image of a target
//! - **Process memory** (`process`): live reads via `process_vm_readv`
//! - **Recording reader** (`recording`): read-log wrapper for tests and diagnostics
//! - **Task state** (`task`): bounds-checked saved register access
//! - **Ptrace capture** (`ptrace`): saved register capture for live threads
//! - **Configuration** (`config`): env-driven read policy
//! - **Metrics** (`metrics`): atomic counters for observability

#![deny(unsafe_code)]

pub mod arch;
pub mod config;
pub mod error;
pub mod metrics;
#[allow(unsafe_code)]
#[cfg(target_os = "linux")]
pub mod process;
#[allow(unsafe_code)]
#[cfg(target_os = "linux")]
pub mod ptrace;
pub mod reader;
pub mod recording;
pub mod region;
pub mod snapshot;
pub mod task;

pub use arch::Arch;
pub use config::{ReadMode, ReaderConfig};
pub use error::ReadError;
pub use metrics::{MetricsSnapshot, ReadMetrics};
pub use reader::MemoryReader;
pub use recording::{ReadEvent, RecordingReader};
pub use region::{MappedRegion, RegionMap};
pub use snapshot::SnapshotMemory;
pub use task::{SavedTask, TaskField, TaskLayout, TaskView};
