//! Live resolution against a running process.
//!
//! Each thread is captured once, then resolved against the process's memory.
//! Threads may exit between listing and capture; those show up as capture
//! failures and the remaining threads are still resolved.

use serde::Serialize;
use tlspeek_core::{ErrorKind, LibraryDescriptor, TlsKey, TraceSink, Tracer, pthread_getspecific_remote};
use tlspeek_membrane::process::ProcessMemory;
use tlspeek_membrane::ptrace::{capture_task, list_threads};
use tlspeek_membrane::{MetricsSnapshot, ReaderConfig};

use crate::runner::render_outcome;
use crate::stats::OutcomeStats;

/// What one thread resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadOutcome {
    pub tid: i32,
    /// `0x...` value or error kind name.
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    /// Human-readable failure, for capture and resolution errors alike.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Resolves a key for threads of one process.
pub struct LiveResolver<'s> {
    memory: ProcessMemory,
    tracer: Tracer<'s>,
    stats: OutcomeStats,
}

impl std::fmt::Debug for LiveResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveResolver")
            .field("pid", &self.memory.pid())
            .field("tracer", &self.tracer)
            .finish_non_exhaustive()
    }
}

impl<'s> LiveResolver<'s> {
    /// Open `pid` with the environment's read policy.
    pub fn open(pid: i32, sink: &'s dyn TraceSink) -> std::io::Result<Self> {
        Self::with_config(pid, ReaderConfig::from_env(), Tracer::from_env(sink))
    }

    pub fn with_config(pid: i32, config: ReaderConfig, tracer: Tracer<'s>) -> std::io::Result<Self> {
        Ok(Self {
            memory: ProcessMemory::with_config(pid, config)?,
            tracer,
            stats: OutcomeStats::new(),
        })
    }

    #[must_use]
    pub fn pid(&self) -> i32 {
        self.memory.pid()
    }

    /// Every thread of the process, in tid order.
    pub fn threads(&self) -> std::io::Result<Vec<i32>> {
        list_threads(self.memory.pid())
    }

    pub fn resolve_thread(&self, tid: i32, libc: &LibraryDescriptor, key: TlsKey) -> ThreadOutcome {
        let task = match capture_task(tid) {
            Ok(task) => task,
            Err(err) => {
                self.stats.observe_capture_failure();
                self.tracer
                    .error("live.capture_failed", || serde_json::json!({ "tid": tid, "error": err.to_string() }));
                return ThreadOutcome {
                    tid,
                    outcome: "CaptureFailure".to_string(),
                    kind: None,
                    message: Some(err.to_string()),
                };
            }
        };
        let result = pthread_getspecific_remote(&self.memory, &task, libc, key, &self.tracer);
        self.stats.observe(&result);
        ThreadOutcome {
            tid,
            outcome: render_outcome(&result),
            kind: result.as_ref().err().map(|e| e.kind()),
            message: result.err().map(|e| e.to_string()),
        }
    }

    pub fn resolve_all(&self, tids: &[i32], libc: &LibraryDescriptor, key: TlsKey) -> Vec<ThreadOutcome> {
        // Memory maps move while the target runs; reload once per sweep.
        if let Err(err) = self.memory.refresh_regions() {
            self.tracer
                .error("live.maps_refresh_failed", || serde_json::json!({ "error": err.to_string() }));
        }
        tids.iter()
            .map(|&tid| self.resolve_thread(tid, libc, key))
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> &OutcomeStats {
        &self.stats
    }

    #[must_use]
    pub fn read_metrics(&self) -> MetricsSnapshot {
        self.memory.metrics().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tlspeek_core::{MemorySink, TraceFilter};

    #[test]
    fn missing_thread_is_a_capture_failure() {
        let pid = std::process::id() as i32;
        let sink = MemorySink::new();
        let resolver =
            LiveResolver::with_config(pid, ReaderConfig::default(), Tracer::new(&sink, TraceFilter::Error))
                .unwrap();
        let libc = LibraryDescriptor::glibc(0x900, 0x310);

        let out = resolver.resolve_all(&[i32::MAX], &libc, TlsKey(0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].outcome, "CaptureFailure");
        assert!(out[0].message.is_some());
        assert_eq!(resolver.stats().snapshot().capture_failure, 1);
        assert!(sink.events().contains(&"live.capture_failed"));
        assert_eq!(resolver.read_metrics().attempted, 0);
    }

    #[test]
    fn own_threads_are_listed() {
        let pid = std::process::id() as i32;
        let resolver = LiveResolver::open(pid, &tlspeek_core::NullSink).unwrap();
        assert!(resolver.threads().unwrap().contains(&pid));
    }
}
