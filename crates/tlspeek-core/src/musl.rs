//! musl recipe: `__pthread_self()->tsd[key]`.
//!
//! `tsd` is a pointer to a flat array of `void *`, so the value is always two
//! pointer hops past the descriptor. There is no key range check: the slot
//! offset is the sign-extended key times the slot size, and a slot address
//! that leaves the address space fails as a read failure. The table bound
//! (`PTHREAD_KEYS_MAX`) is the detection service's responsibility.

use serde_json::json;
use tlspeek_membrane::{Arch, MemoryReader};

use crate::abi::{self, DescriptorLocation, descriptor_location};
use crate::descriptor::{LibcVariant, LibraryDescriptor, TlsKey};
use crate::error::{ReadSite, ResolveError};
use crate::registers::ThreadRegisterState;
use crate::resolver::{candidate, fetch_u64};
use crate::trace::{Tracer, hex};

/// Resolve `key` for a musl thread.
///
/// x86_64: read the descriptor pointer at `tls_base`, then `tsd`, then
/// `tsd[key]`. aarch64: the descriptor sits `pthread_size` bytes below the
/// thread pointer, so only `tsd` and `tsd[key]` are read.
pub fn getspecific<M: MemoryReader>(
    memory: &M,
    arch: Arch,
    regs: ThreadRegisterState,
    libc: &LibraryDescriptor,
    key: TlsKey,
    tracer: &Tracer<'_>,
) -> Result<u64, ResolveError> {
    let thread_self = match descriptor_location(arch, LibcVariant::Musl) {
        DescriptorLocation::SelfPointer { offset } => {
            let self_addr = candidate(ReadSite::ThreadSelf, regs.tls_base, offset)?;
            let thread_self = fetch_u64(memory, ReadSite::ThreadSelf, self_addr, tracer)?;
            tracer.debug("musl.thread_self", || {
                json!({ "addr": hex(self_addr), "thread_self": hex(thread_self) })
            });
            thread_self
        }
        DescriptorLocation::BelowThreadPointer => regs
            .tls_base
            .checked_sub(libc.pthread_size)
            .ok_or(ResolveError::overflow(ReadSite::ThreadSelf))?,
    };

    let tsd_field = candidate(ReadSite::TsdBase, thread_self, libc.specific_block_offset)?;
    let tsd = fetch_u64(memory, ReadSite::TsdBase, tsd_field, tracer)?;
    tracer.debug("musl.tsd", || {
        json!({ "addr": hex(tsd_field), "tsd": hex(tsd) })
    });

    let value_addr = slot_address(tsd, key)?;
    let value = fetch_u64(memory, ReadSite::TsdValue, value_addr, tracer)?;
    tracer.debug("musl.value", || {
        json!({ "addr": hex(value_addr), "value": hex(value) })
    });
    Ok(value)
}

/// `&tsd[key]`, with the key sign-extended as C pointer arithmetic does.
fn slot_address(tsd: u64, key: TlsKey) -> Result<u64, ResolveError> {
    // |i32| * 8 always fits in i64.
    let delta = i64::from(key.0) * abi::musl::TSD_SLOT_SIZE as i64;
    tsd.checked_add_signed(delta)
        .ok_or(ResolveError::overflow(ReadSite::TsdValue))
}
