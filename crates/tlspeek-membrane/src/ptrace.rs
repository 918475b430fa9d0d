//! Saved register capture for live threads.
//!
//! A thread is seized, interrupted just long enough to copy its register set,
//! and released again. The copy becomes a [`SavedTask`] so the rest of
//! tlspeek never touches ptrace.

use std::io;

use thiserror::Error;

use crate::arch::Arch;
use crate::task::{SavedTask, TaskLayout};

const NT_PRSTATUS: usize = 1;
const NT_ARM_TLS: usize = 0x401;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("host architecture is not supported")]
    UnsupportedArch,
    #[error("seize tid {tid}: {source}")]
    Seize { tid: i32, source: io::Error },
    #[error("interrupt tid {tid}: {source}")]
    Interrupt { tid: i32, source: io::Error },
    #[error("wait for tid {tid}: {source}")]
    Wait { tid: i32, source: io::Error },
    #[error("register set of tid {tid}: {source}")]
    Registers { tid: i32, source: io::Error },
    #[error("register set of tid {tid} is {got} bytes, expected {wanted}")]
    ShortRegisters { tid: i32, wanted: usize, got: usize },
}

/// Detaches on drop so every exit path releases the thread.
struct Seized(i32);

impl Seized {
    fn new(tid: i32) -> Result<Self, CaptureError> {
        // SAFETY: PTRACE_SEIZE takes no addr/data payload.
        let rc = unsafe {
            libc::ptrace(
                libc::PTRACE_SEIZE,
                tid,
                std::ptr::null_mut::<libc::c_void>(),
                std::ptr::null_mut::<libc::c_void>(),
            )
        };
        if rc < 0 {
            return Err(CaptureError::Seize {
                tid,
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self(tid))
    }

    fn stop(&self) -> Result<(), CaptureError> {
        let tid = self.0;
        // SAFETY: PTRACE_INTERRUPT takes no addr/data payload.
        let rc = unsafe {
            libc::ptrace(
                libc::PTRACE_INTERRUPT,
                tid,
                std::ptr::null_mut::<libc::c_void>(),
                std::ptr::null_mut::<libc::c_void>(),
            )
        };
        if rc < 0 {
            return Err(CaptureError::Interrupt {
                tid,
                source: io::Error::last_os_error(),
            });
        }
        let mut status = 0;
        // SAFETY: `status` is a valid out-pointer for the duration of the call.
        let rc = unsafe { libc::waitpid(tid, &mut status, libc::__WALL) };
        if rc < 0 {
            return Err(CaptureError::Wait {
                tid,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn regset(&self, note: usize, block: &mut [u8]) -> Result<usize, CaptureError> {
        let tid = self.0;
        let mut iov = libc::iovec {
            iov_base: block.as_mut_ptr().cast::<libc::c_void>(),
            iov_len: block.len(),
        };
        // SAFETY: `iov` describes `block`, which outlives the call; the kernel
        // writes at most `iov_len` bytes and shrinks `iov_len` to the amount written.
        let rc = unsafe {
            libc::ptrace(
                libc::PTRACE_GETREGSET,
                tid,
                note as *mut libc::c_void,
                (&mut iov as *mut libc::iovec).cast::<libc::c_void>(),
            )
        };
        if rc < 0 {
            return Err(CaptureError::Registers {
                tid,
                source: io::Error::last_os_error(),
            });
        }
        Ok(iov.iov_len)
    }
}

impl Drop for Seized {
    fn drop(&mut self) {
        // SAFETY: PTRACE_DETACH with a null signal resumes the thread.
        unsafe {
            libc::ptrace(
                libc::PTRACE_DETACH,
                self.0,
                std::ptr::null_mut::<libc::c_void>(),
                std::ptr::null_mut::<libc::c_void>(),
            );
        }
    }
}

/// Capture the saved TLS registers of thread `tid`.
///
/// The caller needs ptrace permission over the target. The thread is stopped
/// only for the duration of one `PTRACE_GETREGSET`.
pub fn capture_task(tid: i32) -> Result<SavedTask, CaptureError> {
    let arch = Arch::host().ok_or(CaptureError::UnsupportedArch)?;
    let layout = TaskLayout::for_arch(arch);
    let note = match arch {
        Arch::X86_64 => NT_PRSTATUS,
        Arch::Aarch64 => NT_ARM_TLS,
    };

    let seized = Seized::new(tid)?;
    seized.stop()?;
    let mut block = vec![0_u8; layout.block_size];
    let got = seized.regset(note, &mut block)?;
    drop(seized);

    if got < layout.block_size {
        return Err(CaptureError::ShortRegisters {
            tid,
            wanted: layout.block_size,
            got,
        });
    }
    Ok(SavedTask::from_block(arch, layout, block))
}

/// Thread ids of `pid`, from `/proc/<pid>/task`.
pub fn list_threads(pid: i32) -> io::Result<Vec<i32>> {
    let mut tids: Vec<i32> = std::fs::read_dir(format!("/proc/{pid}/task"))?
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
        .collect();
    tids.sort_unstable();
    Ok(tids)
}
