//! Leveled diagnostic records.
//!
//! Every step of a resolution emits a record: `debug` for intermediate
//! values, `error` for the step that failed. Records are fire-and-forget;
//! a sink can drop them and nothing about the result changes.
//!
//! The process-wide filter comes from `TLSPEEK_TRACE`:
//! - `error` (default): failures only.
//! - `debug`: every step.
//! - `off`: nothing.

use std::sync::OnceLock;

use parking_lot::Mutex;
use serde::Serialize;

/// Severity of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    Debug,
    Error,
}

impl TraceLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Error => "error",
        }
    }
}

/// Most verbose level a [`Tracer`] lets through.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceFilter {
    Off,
    #[default]
    Error,
    Debug,
}

impl TraceFilter {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" | "0" => Self::Off,
            "debug" | "trace" | "all" => Self::Debug,
            _ => Self::Error,
        }
    }

    #[must_use]
    pub const fn allows(self, level: TraceLevel) -> bool {
        match (self, level) {
            (Self::Off, _) => false,
            (Self::Error, TraceLevel::Error) => true,
            (Self::Error, TraceLevel::Debug) => false,
            (Self::Debug, _) => true,
        }
    }
}

static GLOBAL_FILTER: OnceLock<TraceFilter> = OnceLock::new();

/// Get the configured filter (reads env var on first call, caches thereafter).
#[must_use]
pub fn trace_filter() -> TraceFilter {
    *GLOBAL_FILTER.get_or_init(|| {
        std::env::var("TLSPEEK_TRACE")
            .map(|v| TraceFilter::from_str_loose(&v))
            .unwrap_or_default()
    })
}

/// One diagnostic record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRecord {
    pub level: TraceLevel,
    pub event: &'static str,
    pub details: serde_json::Value,
}

/// Destination for trace records.
pub trait TraceSink {
    fn record(&self, record: TraceRecord);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record(&self, _record: TraceRecord) {}
}

/// Writes one line per record to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl TraceSink for StderrSink {
    fn record(&self, record: TraceRecord) {
        eprintln!(
            "[tlspeek {}] {} {}",
            record.level.as_str(),
            record.event,
            record.details
        );
    }
}

/// Keeps records in memory, for tests and for callers that batch output.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<TraceRecord>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().clone()
    }

    /// Event names in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<&'static str> {
        self.records.lock().iter().map(|r| r.event).collect()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<TraceRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl TraceSink for MemorySink {
    fn record(&self, record: TraceRecord) {
        self.records.lock().push(record);
    }
}

static NULL_SINK: NullSink = NullSink;

/// A sink plus the filter in front of it. Details are built lazily, only for
/// records that pass the filter.
#[derive(Clone, Copy)]
pub struct Tracer<'a> {
    sink: &'a dyn TraceSink,
    filter: TraceFilter,
}

impl std::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    #[must_use]
    pub fn new(sink: &'a dyn TraceSink, filter: TraceFilter) -> Self {
        Self { sink, filter }
    }

    /// `sink` behind the process-wide `TLSPEEK_TRACE` filter.
    #[must_use]
    pub fn from_env(sink: &'a dyn TraceSink) -> Self {
        Self::new(sink, trace_filter())
    }

    #[must_use]
    pub fn silent() -> Tracer<'static> {
        Tracer {
            sink: &NULL_SINK,
            filter: TraceFilter::Off,
        }
    }

    pub fn debug(&self, event: &'static str, details: impl FnOnce() -> serde_json::Value) {
        self.emit(TraceLevel::Debug, event, details);
    }

    pub fn error(&self, event: &'static str, details: impl FnOnce() -> serde_json::Value) {
        self.emit(TraceLevel::Error, event, details);
    }

    fn emit(
        &self,
        level: TraceLevel,
        event: &'static str,
        details: impl FnOnce() -> serde_json::Value,
    ) {
        if self.filter.allows(level) {
            self.sink.record(TraceRecord {
                level,
                event,
                details: details(),
            });
        }
    }
}

/// Hex rendering used for addresses in record details.
#[must_use]
pub fn hex(value: u64) -> String {
    format!("{value:#x}")
}
