//! Key validation and routing to the per-library recipe.

use serde_json::json;
use tlspeek_membrane::{MemoryReader, TaskView};

use crate::descriptor::{LibcVariant, LibraryDescriptor, TlsKey};
use crate::error::{ReadSite, ResolveError};
use crate::registers::read_register_state;
use crate::trace::{Tracer, hex};
use crate::{glibc, musl};

/// Resolve the value stored under `key` for the thread behind `task`.
///
/// The unassigned key (`-1`) is rejected before any register or memory
/// access. Otherwise the TLS base is read from `task` and the recipe for
/// `libc.variant` runs against `memory`. The first failing read ends the
/// call; no partial value is ever returned.
pub fn pthread_getspecific_remote<M, T>(
    memory: &M,
    task: &T,
    libc: &LibraryDescriptor,
    key: TlsKey,
    tracer: &Tracer<'_>,
) -> Result<u64, ResolveError>
where
    M: MemoryReader,
    T: TaskView + ?Sized,
{
    if key.is_unassigned() {
        tracer.debug("resolve.unassigned_key", || json!({ "key": key.0 }));
        return Err(ResolveError::InvalidKey);
    }

    let arch = task.arch();
    tracer.debug("resolve.start", || {
        json!({
            "arch": arch.as_str(),
            "variant": libc.variant.as_str(),
            "key": key.0,
            "pthread_size": hex(libc.pthread_size),
            "specific_block_offset": hex(libc.specific_block_offset),
        })
    });

    let regs = read_register_state(task, tracer)?;
    let value = match libc.variant {
        LibcVariant::Glibc => glibc::getspecific(memory, arch, regs, libc, key, tracer)?,
        LibcVariant::Musl => musl::getspecific(memory, arch, regs, libc, key, tracer)?,
    };

    tracer.debug("resolve.done", || json!({ "key": key.0, "value": hex(value) }));
    Ok(value)
}

/// A reader and tracer bundled for repeated resolutions.
///
/// Holds no per-call state; two calls with the same inputs against unchanged
/// memory return the same result.
#[derive(Debug)]
pub struct TlsResolver<'t, M> {
    memory: M,
    tracer: Tracer<'t>,
}

impl<M: MemoryReader> TlsResolver<'static, M> {
    /// Resolver that emits no trace records.
    #[must_use]
    pub fn new(memory: M) -> Self {
        Self {
            memory,
            tracer: Tracer::silent(),
        }
    }
}

impl<'t, M: MemoryReader> TlsResolver<'t, M> {
    #[must_use]
    pub fn with_tracer(memory: M, tracer: Tracer<'t>) -> Self {
        Self { memory, tracer }
    }

    #[must_use]
    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn resolve<T: TaskView + ?Sized>(
        &self,
        task: &T,
        libc: &LibraryDescriptor,
        key: TlsKey,
    ) -> Result<u64, ResolveError> {
        pthread_getspecific_remote(&self.memory, task, libc, key, &self.tracer)
    }
}

/// `base + delta` as a candidate address, or a read failure at `site`.
pub(crate) fn candidate(site: ReadSite, base: u64, delta: u64) -> Result<u64, ResolveError> {
    base.checked_add(delta)
        .ok_or(ResolveError::overflow(site))
}

/// One 8-byte bounded read attributed to `site`.
pub(crate) fn fetch_u64<M: MemoryReader>(
    memory: &M,
    site: ReadSite,
    addr: u64,
    tracer: &Tracer<'_>,
) -> Result<u64, ResolveError> {
    memory
        .read_u64(addr)
        .map_err(|source| read_failed(site, addr, source, tracer))
}

/// One `N`-word bounded read attributed to `site`.
pub(crate) fn fetch_words<M: MemoryReader, const N: usize>(
    memory: &M,
    site: ReadSite,
    addr: u64,
    tracer: &Tracer<'_>,
) -> Result<[u64; N], ResolveError> {
    memory
        .read_words::<N>(addr)
        .map_err(|source| read_failed(site, addr, source, tracer))
}

fn read_failed(
    site: ReadSite,
    addr: u64,
    source: tlspeek_membrane::ReadError,
    tracer: &Tracer<'_>,
) -> ResolveError {
    tracer.error("read.failed", || {
        json!({
            "site": site.as_str(),
            "addr": hex(addr),
            "reason": source.label(),
        })
    });
    ResolveError::read(site, Some(addr), source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{MemorySink, TraceFilter};
    use tlspeek_membrane::{Arch, RecordingReader, SavedTask, SnapshotMemory};

    #[test]
    fn unassigned_key_touches_nothing() {
        let rec = RecordingReader::new(SnapshotMemory::new());
        // A task whose register block is empty: any register read would fail.
        let task = SavedTask::from_block(
            Arch::X86_64,
            tlspeek_membrane::TaskLayout::for_arch(Arch::X86_64),
            Vec::new(),
        );
        for libc in [
            LibraryDescriptor::glibc(0x900, 0x310),
            LibraryDescriptor::musl(0xc8, 0x88),
        ] {
            let r = pthread_getspecific_remote(&rec, &task, &libc, TlsKey::UNASSIGNED, &Tracer::silent());
            assert_eq!(r, Err(ResolveError::InvalidKey));
        }
        assert_eq!(rec.read_count(), 0);
    }

    #[test]
    fn candidate_overflow_is_read_failure() {
        let err = candidate(ReadSite::ThreadSelf, u64::MAX - 4, 0x10).unwrap_err();
        assert_eq!(err, ResolveError::overflow(ReadSite::ThreadSelf));
    }

    #[test]
    fn resolver_emits_start_and_done() {
        let mem = SnapshotMemory::new()
            .with_words(0x7010, &[0x8000])
            .with_words(0x8310, &[0xAAAA, 0xBEEF]);
        let sink = MemorySink::new();
        let resolver = TlsResolver::with_tracer(mem, Tracer::new(&sink, TraceFilter::Debug));
        let task = SavedTask::synthetic(Arch::X86_64, 0x7000, 0);

        let v = resolver.resolve(&task, &LibraryDescriptor::glibc(0x900, 0x310), TlsKey(0));
        assert_eq!(v, Ok(0xBEEF));
        let events = sink.events();
        assert_eq!(events.first(), Some(&"resolve.start"));
        assert_eq!(events.last(), Some(&"resolve.done"));
    }
}
