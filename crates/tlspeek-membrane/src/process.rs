//! Live reads from another process via `process_vm_readv`.
//!
//! The syscall copies from the target's address space without stopping it
//! and reports `EFAULT` instead of faulting when a range is unmapped, so a
//! bad candidate address can never take down the observer.

use parking_lot::RwLock;

use crate::config::ReaderConfig;
use crate::error::ReadError;
use crate::metrics::ReadMetrics;
use crate::reader::{MemoryReader, check_request};
use crate::region::RegionMap;

/// Reader bound to one target process.
#[derive(Debug)]
pub struct ProcessMemory {
    pid: i32,
    config: ReaderConfig,
    regions: RwLock<RegionMap>,
    metrics: ReadMetrics,
}

impl ProcessMemory {
    /// Attach to `pid` with the process-wide configuration.
    pub fn open(pid: i32) -> std::io::Result<Self> {
        Self::with_config(pid, ReaderConfig::from_env())
    }

    /// Attach to `pid` with an explicit configuration. In strict mode the
    /// mapping table is loaded immediately.
    pub fn with_config(pid: i32, config: ReaderConfig) -> std::io::Result<Self> {
        let regions = if config.mode.checks_mappings() {
            RegionMap::for_pid(pid)?
        } else {
            RegionMap::new()
        };
        Ok(Self {
            pid,
            config,
            regions: RwLock::new(regions),
            metrics: ReadMetrics::new(),
        })
    }

    #[must_use]
    pub fn pid(&self) -> i32 {
        self.pid
    }

    #[must_use]
    pub fn config(&self) -> ReaderConfig {
        self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &ReadMetrics {
        &self.metrics
    }

    /// Reload the mapping table, e.g. after the target mapped new thread stacks.
    pub fn refresh_regions(&self) -> std::io::Result<()> {
        let fresh = RegionMap::for_pid(self.pid)?;
        *self.regions.write() = fresh;
        Ok(())
    }

    fn read_checked(&self, addr: u64, buf: &mut [u8]) -> Result<(), ReadError> {
        check_request(&self.config, addr, buf.len())?;
        if self.config.mode.checks_mappings() {
            self.regions.read().check_readable(addr, buf.len())?;
        }
        let remote_base = usize::try_from(addr).map_err(|_| ReadError::AddressOverflow)?;

        let local = libc::iovec {
            iov_base: buf.as_mut_ptr().cast::<libc::c_void>(),
            iov_len: buf.len(),
        };
        let remote = libc::iovec {
            iov_base: remote_base as *mut libc::c_void,
            iov_len: buf.len(),
        };
        // SAFETY: `local` describes `buf`, which is exclusively borrowed and
        // exactly `iov_len` bytes long. `remote` is only interpreted by the
        // kernel inside the target's address space; invalid ranges produce
        // EFAULT/ESRCH rather than touching our memory.
        let copied = unsafe { libc::process_vm_readv(self.pid, &local, 1, &remote, 1, 0) };
        if copied < 0 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(ReadError::Os(errno));
        }
        let got = copied as usize;
        if got != buf.len() {
            return Err(ReadError::ShortRead {
                addr,
                wanted: buf.len(),
                got,
            });
        }
        Ok(())
    }
}

impl MemoryReader for ProcessMemory {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), ReadError> {
        let result = self.read_checked(addr, buf);
        self.metrics.observe(buf.len(), &result);
        result
    }
}
