//! TLS base and segment selector from a thread's saved state.

use serde_json::json;
use tlspeek_membrane::{Arch, TaskField, TaskView};

use crate::error::{ReadSite, ResolveError};
use crate::trace::{Tracer, hex};

/// Thread-pointer registers of the observed thread, read fresh per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadRegisterState {
    pub tls_base: u64,
    /// x86_64 `fs` selector; always 0 on aarch64.
    pub segment_index: u16,
}

/// Read [`ThreadRegisterState`] from `task`.
///
/// x86_64 reads `fs_base` and `fs`; aarch64 reads `tpidr_el0` only.
pub fn read_register_state<T: TaskView + ?Sized>(
    task: &T,
    tracer: &Tracer<'_>,
) -> Result<ThreadRegisterState, ResolveError> {
    let arch = task.arch();

    let mut base = [0_u8; 8];
    if let Err(source) = task.read_field(TaskField::TlsBase, &mut base) {
        tracer.error("registers.tls_base_failed", || {
            json!({ "arch": arch.as_str(), "error": source.to_string() })
        });
        return Err(ResolveError::read(ReadSite::TlsBase, None, source));
    }
    let tls_base = u64::from_le_bytes(base);

    let segment_index = match arch {
        Arch::X86_64 => {
            let mut seg = [0_u8; 2];
            if let Err(source) = task.read_field(TaskField::SegmentIndex, &mut seg) {
                tracer.error("registers.segment_index_failed", || {
                    json!({ "arch": arch.as_str(), "error": source.to_string() })
                });
                return Err(ResolveError::read(ReadSite::SegmentIndex, None, source));
            }
            u16::from_le_bytes(seg)
        }
        Arch::Aarch64 => 0,
    };

    tracer.debug("registers.read", || {
        json!({
            "arch": arch.as_str(),
            "tls_base": hex(tls_base),
            "segment_index": segment_index,
        })
    });
    Ok(ThreadRegisterState {
        tls_base,
        segment_index,
    })
}
