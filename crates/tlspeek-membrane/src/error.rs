//! Failure reasons for bounded reads.

use thiserror::Error;

/// Why a bounded read was refused. None of these is ever a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("address {addr:#x} is inside the null page")]
    NullPage { addr: u64 },
    #[error("read of {len} bytes exceeds the {max}-byte cap")]
    TooLarge { len: usize, max: usize },
    #[error("address arithmetic overflowed")]
    AddressOverflow,
    #[error("range {addr:#x}+{len} is not mapped")]
    Unmapped { addr: u64, len: usize },
    #[error("range {addr:#x}+{len} is mapped without read permission")]
    NotReadable { addr: u64, len: usize },
    #[error("short read at {addr:#x}: wanted {wanted}, got {got}")]
    ShortRead { addr: u64, wanted: usize, got: usize },
    #[error("os error {0}")]
    Os(i32),
    #[error("saved state field at offset {offset}+{len} is outside a {available}-byte block")]
    FieldOutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },
    #[error("saved state has no such field on this architecture")]
    FieldMissing,
}

impl ReadError {
    /// Stable short name, used as a metrics and log label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NullPage { .. } => "null_page",
            Self::TooLarge { .. } => "too_large",
            Self::AddressOverflow => "address_overflow",
            Self::Unmapped { .. } => "unmapped",
            Self::NotReadable { .. } => "not_readable",
            Self::ShortRead { .. } => "short_read",
            Self::Os(_) => "os",
            Self::FieldOutOfBounds { .. } => "field_out_of_bounds",
            Self::FieldMissing => "field_missing",
        }
    }
}
