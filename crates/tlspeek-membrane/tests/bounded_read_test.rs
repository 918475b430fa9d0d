//! Integration test: every reader enforces the same bounded-read policy.
//!
//! Snapshot and live process readers must agree on what is rejected before
//! any copy happens, and must report failure instead of faulting.
//!
//! Run: cargo test -p tlspeek-membrane --test bounded_read_test

use tlspeek_membrane::{
    MemoryReader, ReadError, ReadMode, ReaderConfig, RecordingReader, RegionMap, SnapshotMemory,
};

fn tight_config(mode: ReadMode) -> ReaderConfig {
    ReaderConfig { mode, max_read: 16 }
}

#[test]
fn snapshot_applies_policy_before_lookup() {
    let mem = SnapshotMemory::with_config(tight_config(ReadMode::Strict))
        .with_words(0x7000, &[1, 2, 3, 4, 5]);

    let mut big = [0_u8; 24];
    assert_eq!(
        mem.read(0x7000, &mut big),
        Err(ReadError::TooLarge { len: 24, max: 16 })
    );
    assert_eq!(mem.read_u64(0xff8), Err(ReadError::NullPage { addr: 0xff8 }));
    assert_eq!(mem.read_u64(u64::MAX - 3), Err(ReadError::AddressOverflow));
    assert_eq!(mem.read_words::<2>(0x7008), Ok([2, 3]));
}

#[test]
fn ranges_never_span_two_segments() {
    let mem = SnapshotMemory::new()
        .with_words(0x7000, &[0x11])
        .with_words(0x7008, &[0x22]);
    // Adjacent but separate segments: a 16-byte read at 0x7000 is not served.
    assert!(matches!(
        mem.read_words::<2>(0x7000),
        Err(ReadError::Unmapped { addr: 0x7000, len: 16 })
    ));
    assert_eq!(mem.read_u64(0x7008), Ok(0x22));
}

#[test]
fn recording_keeps_failed_attempts_in_order() {
    let rec = RecordingReader::new(SnapshotMemory::new().with_words(0x9000, &[7]));
    let _ = rec.read_u64(0x9000);
    let _ = rec.read_u64(0xA000);
    let _ = rec.read_u64(0x10);

    let events = rec.events();
    assert_eq!(rec.addresses(), vec![0x9000, 0xA000, 0x10]);
    assert!(events[0].result.is_ok());
    assert!(matches!(events[1].result, Err(ReadError::Unmapped { .. })));
    assert_eq!(events[2].result, Err(ReadError::NullPage { addr: 0x10 }));

    let snap = rec.metrics().snapshot();
    assert_eq!(snap.attempted, 3);
    assert_eq!(snap.succeeded, 1);
    assert_eq!(snap.mapping_rejections, 1);
    assert_eq!(snap.policy_rejections, 1);
    assert_eq!(snap.failed(), 2);
}

#[cfg(target_os = "linux")]
mod live {
    use super::*;
    use tlspeek_membrane::process::ProcessMemory;

    fn own_pid() -> i32 {
        std::process::id() as i32
    }

    #[test]
    fn own_maps_cover_own_heap() {
        let value = Box::new(0xA5A5_u64);
        let addr = &*value as *const u64 as u64;
        let map = RegionMap::for_pid(own_pid()).unwrap();
        assert!(!map.is_empty());
        assert_eq!(map.check_readable(addr, 8), Ok(()));
    }

    #[test]
    fn strict_and_permissive_agree_on_valid_reads() {
        let words: Box<[u64; 2]> = Box::new([0xDEAD, 0xBEEF]);
        let addr = words.as_ptr() as u64;

        for mode in [ReadMode::Strict, ReadMode::Permissive] {
            let mem = ProcessMemory::with_config(own_pid(), tight_config(mode)).unwrap();
            assert_eq!(mem.read_words::<2>(addr), Ok([0xDEAD, 0xBEEF]), "{mode:?}");
        }
    }

    #[test]
    fn permissive_reports_kernel_fault_as_os_error() {
        let mem = ProcessMemory::with_config(own_pid(), tight_config(ReadMode::Permissive)).unwrap();
        let err = mem.read_u64(0xffff_ffff_ffff_f000).unwrap_err();
        assert!(matches!(err, ReadError::Os(_)), "{err:?}");
        assert_eq!(mem.metrics().snapshot().os_failures, 1);
    }

    #[test]
    fn recording_wraps_live_reader() {
        let value = Box::new(0x42_u64);
        let addr = &*value as *const u64 as u64;
        let mem = ProcessMemory::with_config(own_pid(), ReaderConfig::default()).unwrap();
        let rec = RecordingReader::new(&mem);
        assert_eq!(rec.read_u64(addr), Ok(0x42));
        assert_eq!(rec.addresses(), vec![addr]);
        assert_eq!(mem.metrics().snapshot().succeeded, 1);
    }
}
