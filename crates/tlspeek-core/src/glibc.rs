//! glibc recipe: `THREAD_SELF->specific_1stblock[key].data`.
//!
//! Only keys in the first, inline block are handled. Keys 32 and above live
//! in lazily allocated second-level arrays, which would need a data-dependent
//! number of reads.

use serde_json::json;
use tlspeek_membrane::{Arch, MemoryReader};

use crate::abi::{self, DescriptorLocation, descriptor_location};
use crate::descriptor::{LibcVariant, LibraryDescriptor, TlsKey};
use crate::error::{ReadSite, ResolveError};
use crate::registers::ThreadRegisterState;
use crate::resolver::{candidate, fetch_u64, fetch_words};
use crate::trace::{Tracer, hex};

/// Index into `specific_1stblock`, or `UnsupportedKeyRange`.
pub fn first_block_index(key: TlsKey) -> Result<u64, ResolveError> {
    match key.index() {
        Some(index) if key.0 < abi::glibc::FIRST_BLOCK_KEYS => Ok(index),
        _ => Err(ResolveError::UnsupportedKeyRange {
            key: key.0,
            variant: LibcVariant::Glibc,
        }),
    }
}

/// Resolve `key` for a glibc thread.
///
/// x86_64 reads `tcbhead_t::self` at `tls_base + 0x10`, then the 16-byte
/// `pthread_key_data` record, and returns its `data` word. aarch64 places
/// `struct pthread` directly below the thread pointer and reads only the
/// `data` word.
pub fn getspecific<M: MemoryReader>(
    memory: &M,
    arch: Arch,
    regs: ThreadRegisterState,
    libc: &LibraryDescriptor,
    key: TlsKey,
    tracer: &Tracer<'_>,
) -> Result<u64, ResolveError> {
    let index = match first_block_index(key) {
        Ok(index) => index,
        Err(err) => {
            tracer.error("glibc.key_out_of_range", || {
                json!({ "key": key.0, "limit": abi::glibc::FIRST_BLOCK_KEYS })
            });
            return Err(err);
        }
    };
    let slot_delta = index
        .checked_mul(abi::glibc::KEY_DATA_SIZE)
        .and_then(|off| off.checked_add(libc.specific_block_offset))
        .ok_or(ResolveError::overflow(ReadSite::SpecificSlot))?;

    match descriptor_location(arch, LibcVariant::Glibc) {
        DescriptorLocation::SelfPointer { offset } => {
            let self_addr = candidate(ReadSite::ThreadSelf, regs.tls_base, offset)?;
            let thread_self = fetch_u64(memory, ReadSite::ThreadSelf, self_addr, tracer)?;
            tracer.debug("glibc.thread_self", || {
                json!({ "addr": hex(self_addr), "thread_self": hex(thread_self) })
            });

            let slot = candidate(ReadSite::SpecificSlot, thread_self, slot_delta)?;
            let [seq, value] = fetch_words::<M, 2>(memory, ReadSite::SpecificSlot, slot, tracer)?;
            tracer.debug("glibc.slot", || {
                json!({ "addr": hex(slot), "seq": hex(seq), "data": hex(value) })
            });
            Ok(value)
        }
        DescriptorLocation::BelowThreadPointer => {
            let thread_self = regs
                .tls_base
                .checked_sub(libc.pthread_size)
                .ok_or(ResolveError::overflow(ReadSite::ThreadSelf))?;
            let slot = candidate(ReadSite::SpecificSlot, thread_self, slot_delta)?;
            let data_addr = candidate(
                ReadSite::SpecificSlot,
                slot,
                abi::glibc::KEY_DATA_VALUE_OFFSET,
            )?;
            let value = fetch_u64(memory, ReadSite::SpecificSlot, data_addr, tracer)?;
            tracer.debug("glibc.slot", || {
                json!({
                    "thread_self": hex(thread_self),
                    "addr": hex(data_addr),
                    "data": hex(value),
                })
            });
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tlspeek_membrane::{ReadError, RecordingReader, SnapshotMemory};

    fn regs(tls_base: u64) -> ThreadRegisterState {
        ThreadRegisterState {
            tls_base,
            segment_index: 0,
        }
    }

    #[test]
    fn first_block_bounds() {
        assert_eq!(first_block_index(TlsKey(0)), Ok(0));
        assert_eq!(first_block_index(TlsKey(31)), Ok(31));
        assert!(first_block_index(TlsKey(32)).is_err());
        assert!(first_block_index(TlsKey(-5)).is_err());
    }

    #[test]
    fn x86_64_reads_self_then_record() {
        let libc = LibraryDescriptor::glibc(0x900, 0x310);
        let mem = SnapshotMemory::new()
            .with_words(0x7010, &[0x8000])
            .with_words(0x8310 + 5 * 16, &[0x1, 0xFACE]);
        let rec = RecordingReader::new(mem);

        let v = getspecific(&rec, Arch::X86_64, regs(0x7000), &libc, TlsKey(5), &Tracer::silent());
        assert_eq!(v, Ok(0xFACE));
        assert_eq!(rec.addresses(), vec![0x7010, 0x8360]);
        assert_eq!(rec.events()[1].len, 16);
    }

    #[test]
    fn aarch64_reads_data_word_below_thread_pointer() {
        let libc = LibraryDescriptor::glibc(0x700, 0x310);
        let tp = 0xffff_8000_2000_u64;
        let data_addr = tp - 0x700 + 0x310 + 2 * 16 + 8;
        let rec = RecordingReader::new(SnapshotMemory::new().with_words(data_addr, &[0x5150]));

        let v = getspecific(&rec, Arch::Aarch64, regs(tp), &libc, TlsKey(2), &Tracer::silent());
        assert_eq!(v, Ok(0x5150));
        assert_eq!(rec.addresses(), vec![data_addr]);
    }

    #[test]
    fn aarch64_pthread_size_above_tls_base_fails_without_reads() {
        let libc = LibraryDescriptor::glibc(0x9000, 0x310);
        let rec = RecordingReader::new(SnapshotMemory::new());
        let err = getspecific(&rec, Arch::Aarch64, regs(0x2000), &libc, TlsKey(0), &Tracer::silent())
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::ReadFailure {
                site: ReadSite::ThreadSelf,
                addr: None,
                source: ReadError::AddressOverflow
            }
        );
        assert_eq!(rec.read_count(), 0);
    }

    #[test]
    fn self_pointer_failure_stops_chain() {
        let libc = LibraryDescriptor::glibc(0x900, 0x310);
        let rec = RecordingReader::new(SnapshotMemory::new());
        let err = getspecific(&rec, Arch::X86_64, regs(0x7000), &libc, TlsKey(0), &Tracer::silent())
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::ReadFailure {
                site: ReadSite::ThreadSelf,
                addr: Some(0x7010),
                ..
            }
        ));
        assert_eq!(rec.read_count(), 1);
    }
}
