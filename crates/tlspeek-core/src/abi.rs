//! Load-bearing ABI constants per C library and architecture.
//!
//! Each constant is tied to the library family and thread-pointer model it
//! was taken from. If a library changes one of these, add a new constant next
//! to the old one and select between them from the descriptor instead of
//! editing the value in place.

use tlspeek_membrane::Arch;

use crate::descriptor::LibcVariant;

/// glibc NPTL (stable since 2.3).
pub mod glibc {
    /// `PTHREAD_KEY_2NDLEVEL_SIZE`: keys below this live inline in
    /// `struct pthread::specific_1stblock`.
    pub const FIRST_BLOCK_KEYS: i32 = 32;

    /// `sizeof(struct pthread_key_data { uintptr_t seq; void *data; })`.
    pub const KEY_DATA_SIZE: u64 = 16;

    /// Offset of `data` inside `struct pthread_key_data`.
    pub const KEY_DATA_VALUE_OFFSET: u64 = 8;

    /// x86_64 (TLS_TCB_AT_TP): `tcbhead_t::self` is the third word after
    /// the thread pointer.
    pub const X86_64_SELF_OFFSET: u64 = 0x10;
}

/// musl (1.1 through 1.2.x).
pub mod musl {
    /// `struct pthread::tsd` is `void **`, one pointer per key.
    pub const TSD_SLOT_SIZE: u64 = 8;

    /// x86_64: `__pthread_self()` is `mov %fs:0`, the descriptor pointer is
    /// stored at the thread pointer itself.
    pub const X86_64_SELF_OFFSET: u64 = 0x0;
}

/// How the thread descriptor (`struct pthread`) is found from the TLS base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorLocation {
    /// TCB above the thread pointer: the descriptor address is stored in
    /// memory at `tls_base + offset` and must be read.
    SelfPointer { offset: u64 },
    /// TCB below the thread pointer: the descriptor starts
    /// `pthread_size` bytes before `tls_base`. No read needed.
    BelowThreadPointer,
}

/// Thread-pointer model for `variant` on `arch`.
#[must_use]
pub const fn descriptor_location(arch: Arch, variant: LibcVariant) -> DescriptorLocation {
    match (arch, variant) {
        (Arch::X86_64, LibcVariant::Glibc) => DescriptorLocation::SelfPointer {
            offset: glibc::X86_64_SELF_OFFSET,
        },
        (Arch::X86_64, LibcVariant::Musl) => DescriptorLocation::SelfPointer {
            offset: musl::X86_64_SELF_OFFSET,
        },
        (Arch::Aarch64, _) => DescriptorLocation::BelowThreadPointer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x86_64_reads_self_pointer() {
        assert_eq!(
            descriptor_location(Arch::X86_64, LibcVariant::Glibc),
            DescriptorLocation::SelfPointer { offset: 0x10 }
        );
        assert_eq!(
            descriptor_location(Arch::X86_64, LibcVariant::Musl),
            DescriptorLocation::SelfPointer { offset: 0 }
        );
    }

    #[test]
    fn aarch64_computes_descriptor() {
        for variant in [LibcVariant::Glibc, LibcVariant::Musl] {
            assert_eq!(
                descriptor_location(Arch::Aarch64, variant),
                DescriptorLocation::BelowThreadPointer
            );
        }
    }
}
