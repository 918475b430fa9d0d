//! Integration test: end-to-end resolution against snapshot memory.
//!
//! Covers the reference glibc/musl layouts, key gating, fail-fast read
//! chains, and repeatability.
//!
//! Run: cargo test -p tlspeek-core --test resolve_scenarios_test

use std::cell::Cell;

use tlspeek_core::{
    Arch, ErrorKind, LibraryDescriptor, MemorySink, ReadSite, ResolveError, TlsKey, TlsResolver,
    TraceFilter, TraceLevel, Tracer, pthread_getspecific_remote,
};
use tlspeek_membrane::{MemoryReader, ReadError, RecordingReader, SavedTask, SnapshotMemory};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn glibc_image() -> SnapshotMemory {
    SnapshotMemory::new()
        .with_words(0x7010, &[0x8000])
        .with_words(0x8310, &[0xAAAA, 0xBEEF])
}

fn musl_image() -> SnapshotMemory {
    SnapshotMemory::new()
        .with_words(0x7000, &[0x9000])
        .with_words(0x9088, &[0xA000])
        .with_words(0xA018, &[0xCAFE])
}

fn x86_task(tls_base: u64) -> SavedTask {
    SavedTask::synthetic(Arch::X86_64, tls_base, 0)
}

/// Serves reads from `inner` until the `fail_at`-th read (0-based), which fails.
struct FailNth<R> {
    inner: R,
    fail_at: usize,
    seen: Cell<usize>,
}

impl<R: MemoryReader> MemoryReader for FailNth<R> {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), ReadError> {
        let n = self.seen.get();
        self.seen.set(n + 1);
        if n == self.fail_at {
            return Err(ReadError::Os(14));
        }
        self.inner.read(addr, buf)
    }
}

// ---------------------------------------------------------------------------
// Reference scenarios
// ---------------------------------------------------------------------------

#[test]
fn glibc_reference_layout() {
    let rec = RecordingReader::new(glibc_image());
    let libc = LibraryDescriptor::glibc(0x900, 0x310);
    let v = pthread_getspecific_remote(&rec, &x86_task(0x7000), &libc, TlsKey(0), &Tracer::silent());
    assert_eq!(v, Ok(0xBEEF));
    assert_eq!(rec.addresses(), vec![0x7010, 0x8310]);
}

#[test]
fn musl_reference_layout() {
    let rec = RecordingReader::new(musl_image());
    let libc = LibraryDescriptor::musl(0xc8, 0x88);
    let v = pthread_getspecific_remote(&rec, &x86_task(0x7000), &libc, TlsKey(3), &Tracer::silent());
    assert_eq!(v, Ok(0xCAFE));
    assert_eq!(rec.addresses(), vec![0x7000, 0x9088, 0xA018]);
}

#[test]
fn unassigned_key_reads_nothing_for_any_descriptor() {
    for libc in [
        LibraryDescriptor::glibc(0x900, 0x310),
        LibraryDescriptor::musl(0xc8, 0x88),
    ] {
        let rec = RecordingReader::new(glibc_image());
        let v = pthread_getspecific_remote(&rec, &x86_task(0x7000), &libc, TlsKey(-1), &Tracer::silent());
        assert_eq!(v, Err(ResolveError::InvalidKey));
        assert_eq!(rec.read_count(), 0);
    }
}

#[test]
fn glibc_key_beyond_first_block_reads_nothing() {
    let libc = LibraryDescriptor::glibc(0x900, 0x310);
    for key in [32, 40, 1023, i32::MAX] {
        let rec = RecordingReader::new(glibc_image());
        let err = pthread_getspecific_remote(&rec, &x86_task(0x7000), &libc, TlsKey(key), &Tracer::silent())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedKeyRange);
        assert_eq!(rec.read_count(), 0, "key {key}");
    }
}

// ---------------------------------------------------------------------------
// Address properties
// ---------------------------------------------------------------------------

#[test]
fn glibc_slot_address_follows_key() {
    let libc = LibraryDescriptor::glibc(0x900, 0x6c0);
    let thread_self = 0x5555_0000_u64;
    for key in 0..32_u64 {
        let slot = thread_self + 0x6c0 + key * 16;
        let mem = SnapshotMemory::new()
            .with_words(0x7010, &[thread_self])
            .with_words(slot, &[key, 0x1000 + key]);
        let rec = RecordingReader::new(mem);
        let v = pthread_getspecific_remote(
            &rec,
            &x86_task(0x7000),
            &libc,
            TlsKey(key as i32),
            &Tracer::silent(),
        );
        assert_eq!(v, Ok(0x1000 + key));
        assert_eq!(rec.addresses(), vec![0x7010, slot]);
    }
}

#[test]
fn musl_value_address_follows_key() {
    let libc = LibraryDescriptor::musl(0xc8, 0x80);
    for key in [0_u64, 1, 7, 127] {
        let mem = SnapshotMemory::new()
            .with_words(0x7000, &[0x9000])
            .with_words(0x9080, &[0x20_0000])
            .with_words(0x20_0000 + key * 8, &[0xD00D + key]);
        let rec = RecordingReader::new(mem);
        let v = pthread_getspecific_remote(
            &rec,
            &x86_task(0x7000),
            &libc,
            TlsKey(key as i32),
            &Tracer::silent(),
        );
        assert_eq!(v, Ok(0xD00D + key));
        assert_eq!(rec.addresses()[2], 0x20_0000 + key * 8);
    }
}

// ---------------------------------------------------------------------------
// Fail-fast
// ---------------------------------------------------------------------------

#[test]
fn glibc_any_failing_read_ends_the_chain() {
    let libc = LibraryDescriptor::glibc(0x900, 0x310);
    for (fail_at, site) in [(0, ReadSite::ThreadSelf), (1, ReadSite::SpecificSlot)] {
        let reader = RecordingReader::new(FailNth {
            inner: glibc_image(),
            fail_at,
            seen: Cell::new(0),
        });
        let err = pthread_getspecific_remote(&reader, &x86_task(0x7000), &libc, TlsKey(0), &Tracer::silent())
            .unwrap_err();
        assert!(
            matches!(err, ResolveError::ReadFailure { site: s, source: ReadError::Os(14), .. } if s == site),
            "fail_at={fail_at}: {err:?}"
        );
        assert_eq!(reader.read_count(), fail_at + 1);
    }
}

#[test]
fn musl_any_failing_read_ends_the_chain() {
    let libc = LibraryDescriptor::musl(0xc8, 0x88);
    let sites = [ReadSite::ThreadSelf, ReadSite::TsdBase, ReadSite::TsdValue];
    for (fail_at, site) in sites.into_iter().enumerate() {
        let reader = RecordingReader::new(FailNth {
            inner: musl_image(),
            fail_at,
            seen: Cell::new(0),
        });
        let err = pthread_getspecific_remote(&reader, &x86_task(0x7000), &libc, TlsKey(3), &Tracer::silent())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadFailure);
        assert!(matches!(err, ResolveError::ReadFailure { site: s, .. } if s == site));
        assert_eq!(reader.read_count(), fail_at + 1);
    }
}

#[test]
fn null_descriptor_pointer_is_read_failure_not_fault() {
    // Thread exited: the self-pointer slot now holds 0.
    let mem = SnapshotMemory::new().with_words(0x7010, &[0]);
    let rec = RecordingReader::new(mem);
    let libc = LibraryDescriptor::glibc(0x900, 0x310);
    let err = pthread_getspecific_remote(&rec, &x86_task(0x7000), &libc, TlsKey(0), &Tracer::silent())
        .unwrap_err();
    assert_eq!(
        err,
        ResolveError::ReadFailure {
            site: ReadSite::SpecificSlot,
            addr: Some(0x310),
            source: ReadError::NullPage { addr: 0x310 }
        }
    );
}

// ---------------------------------------------------------------------------
// Repeatability and tracing
// ---------------------------------------------------------------------------

#[test]
fn repeated_calls_agree() {
    let resolver = TlsResolver::new(musl_image());
    let libc = LibraryDescriptor::musl(0xc8, 0x88);
    let task = x86_task(0x7000);
    let first = resolver.resolve(&task, &libc, TlsKey(3));
    for _ in 0..8 {
        assert_eq!(resolver.resolve(&task, &libc, TlsKey(3)), first);
    }
    let miss = resolver.resolve(&task, &libc, TlsKey(4));
    assert_eq!(resolver.resolve(&task, &libc, TlsKey(4)), miss);
}

#[test]
fn trace_records_follow_the_chain() {
    let sink = MemorySink::new();
    let tracer = Tracer::new(&sink, TraceFilter::Debug);
    let libc = LibraryDescriptor::musl(0xc8, 0x88);
    let v = pthread_getspecific_remote(&musl_image(), &x86_task(0x7000), &libc, TlsKey(3), &tracer);
    assert_eq!(v, Ok(0xCAFE));
    assert_eq!(
        sink.events(),
        vec![
            "resolve.start",
            "registers.read",
            "musl.thread_self",
            "musl.tsd",
            "musl.value",
            "resolve.done",
        ]
    );
    assert!(sink.records().iter().all(|r| r.level == TraceLevel::Debug));
}

#[test]
fn error_filter_keeps_only_the_failure() {
    let sink = MemorySink::new();
    let tracer = Tracer::new(&sink, TraceFilter::Error);
    let libc = LibraryDescriptor::glibc(0x900, 0x310);
    let empty = SnapshotMemory::new();
    let err = pthread_getspecific_remote(&empty, &x86_task(0x7000), &libc, TlsKey(0), &tracer);
    assert!(err.is_err());
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event, "read.failed");
    assert_eq!(records[0].details["site"], "thread_self");
    assert_eq!(records[0].details["addr"], "0x7010");
}

#[test]
fn tracing_does_not_change_results() {
    let libc = LibraryDescriptor::glibc(0x900, 0x310);
    let task = x86_task(0x7000);
    let sink = MemorySink::new();
    for key in [-1, 0, 1, 40] {
        let quiet = pthread_getspecific_remote(&glibc_image(), &task, &libc, TlsKey(key), &Tracer::silent());
        let loud = pthread_getspecific_remote(
            &glibc_image(),
            &task,
            &libc,
            TlsKey(key),
            &Tracer::new(&sink, TraceFilter::Debug),
        );
        assert_eq!(quiet, loud, "key {key}");
    }
}

#[test]
fn aarch64_musl_via_dispatcher() {
    let tp = 0xffff_9000_1000_u64;
    let libc = LibraryDescriptor::musl(0xd0, 0xd0 - 88);
    let mem = SnapshotMemory::new()
        .with_words(tp - 88, &[0xB000])
        .with_words(0xB000, &[0x42]);
    let task = SavedTask::synthetic(Arch::Aarch64, tp, 0);
    let v = pthread_getspecific_remote(&mem, &task, &libc, TlsKey(0), &Tracer::silent());
    assert_eq!(v, Ok(0x42));
}
