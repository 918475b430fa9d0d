//! Saved register state of an observed thread.
//!
//! The host hands tlspeek an opaque view of a stopped (or sampled) thread's
//! saved CPU state. Fields are located structurally, by an offset/size pair
//! taken from a per-architecture [`TaskLayout`], and every access is bounds
//! checked against the saved block.

use crate::arch::Arch;
use crate::error::ReadError;

/// Fields the resolver needs from saved state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskField {
    /// Thread pointer / TLS base register.
    TlsBase,
    /// Segment selector paired with the TLS base (x86_64 only).
    SegmentIndex,
}

/// Location of one field inside a saved register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    pub offset: usize,
    pub size: usize,
}

/// Where each [`TaskField`] lives for a given architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLayout {
    pub tls_base: FieldSlot,
    pub segment_index: Option<FieldSlot>,
    /// Size of the complete saved block.
    pub block_size: usize,
}

/// x86_64 `struct user_regs_struct`: 27 words, `fs_base` is word 21, `fs` word 25.
pub const X86_64_USER_REGS: TaskLayout = TaskLayout {
    tls_base: FieldSlot {
        offset: 21 * 8,
        size: 8,
    },
    segment_index: Some(FieldSlot {
        offset: 25 * 8,
        size: 2,
    }),
    block_size: 27 * 8,
};

/// aarch64 `NT_ARM_TLS` regset: `tpidr_el0` is the first word.
pub const AARCH64_ARM_TLS: TaskLayout = TaskLayout {
    tls_base: FieldSlot { offset: 0, size: 8 },
    segment_index: None,
    block_size: 8,
};

impl TaskLayout {
    /// Default layout for `arch`.
    #[must_use]
    pub const fn for_arch(arch: Arch) -> Self {
        match arch {
            Arch::X86_64 => X86_64_USER_REGS,
            Arch::Aarch64 => AARCH64_ARM_TLS,
        }
    }

    #[must_use]
    pub fn slot(&self, field: TaskField) -> Option<FieldSlot> {
        match field {
            TaskField::TlsBase => Some(self.tls_base),
            TaskField::SegmentIndex => self.segment_index,
        }
    }
}

/// Read-only access to a thread's saved state.
pub trait TaskView {
    /// Architecture of the observed thread.
    fn arch(&self) -> Arch;

    /// Copy `field` into `out`. `out.len()` must equal the field's size.
    fn read_field(&self, field: TaskField, out: &mut [u8]) -> Result<(), ReadError>;
}

impl<T: TaskView + ?Sized> TaskView for &T {
    fn arch(&self) -> Arch {
        (**self).arch()
    }

    fn read_field(&self, field: TaskField, out: &mut [u8]) -> Result<(), ReadError> {
        (**self).read_field(field, out)
    }
}

/// Owned copy of a saved register block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedTask {
    arch: Arch,
    layout: TaskLayout,
    block: Vec<u8>,
}

impl SavedTask {
    /// Wrap a raw block captured with `layout`.
    #[must_use]
    pub fn from_block(arch: Arch, layout: TaskLayout, block: Vec<u8>) -> Self {
        Self {
            arch,
            layout,
            block,
        }
    }

    /// Synthesize a block for `arch` holding only the TLS fields.
    #[must_use]
    pub fn synthetic(arch: Arch, tls_base: u64, segment_index: u16) -> Self {
        let layout = TaskLayout::for_arch(arch);
        let mut block = vec![0_u8; layout.block_size];
        let base = layout.tls_base;
        block[base.offset..base.offset + base.size].copy_from_slice(&tls_base.to_le_bytes());
        if let Some(seg) = layout.segment_index {
            block[seg.offset..seg.offset + seg.size].copy_from_slice(&segment_index.to_le_bytes());
        }
        Self {
            arch,
            layout,
            block,
        }
    }

    #[must_use]
    pub fn layout(&self) -> TaskLayout {
        self.layout
    }

    #[must_use]
    pub fn block(&self) -> &[u8] {
        &self.block
    }
}

impl TaskView for SavedTask {
    fn arch(&self) -> Arch {
        self.arch
    }

    fn read_field(&self, field: TaskField, out: &mut [u8]) -> Result<(), ReadError> {
        let slot = self.layout.slot(field).ok_or(ReadError::FieldMissing)?;
        if out.len() != slot.size {
            return Err(ReadError::FieldOutOfBounds {
                offset: slot.offset,
                len: out.len(),
                available: slot.size,
            });
        }
        let src = slot
            .offset
            .checked_add(slot.size)
            .and_then(|end| self.block.get(slot.offset..end))
            .ok_or(ReadError::FieldOutOfBounds {
                offset: slot.offset,
                len: slot.size,
                available: self.block.len(),
            })?;
        out.copy_from_slice(src);
        Ok(())
    }
}
