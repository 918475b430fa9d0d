//! Read-log wrapper around any [`MemoryReader`].

use parking_lot::Mutex;

use crate::error::ReadError;
use crate::metrics::ReadMetrics;
use crate::reader::MemoryReader;

/// One attempted read and how it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadEvent {
    pub addr: u64,
    pub len: usize,
    pub result: Result<(), ReadError>,
}

/// Forwards reads to `inner` and remembers every attempt in order.
#[derive(Debug)]
pub struct RecordingReader<R> {
    inner: R,
    events: Mutex<Vec<ReadEvent>>,
    metrics: ReadMetrics,
}

impl<R: MemoryReader> RecordingReader<R> {
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            events: Mutex::new(Vec::new()),
            metrics: ReadMetrics::new(),
        }
    }

    /// Copy of the log so far.
    #[must_use]
    pub fn events(&self) -> Vec<ReadEvent> {
        self.events.lock().clone()
    }

    /// Addresses read so far, in order.
    #[must_use]
    pub fn addresses(&self) -> Vec<u64> {
        self.events.lock().iter().map(|e| e.addr).collect()
    }

    /// Number of reads attempted so far.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Forget the log (metrics keep counting).
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    #[must_use]
    pub fn metrics(&self) -> &ReadMetrics {
        &self.metrics
    }
}

impl<R: MemoryReader> MemoryReader for RecordingReader<R> {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), ReadError> {
        let result = self.inner.read(addr, buf);
        self.metrics.observe(buf.len(), &result);
        self.events.lock().push(ReadEvent {
            addr,
            len: buf.len(),
            result,
        });
        result
    }
}
