//! The bounded read capability.
//!
//! Pointer arithmetic elsewhere in tlspeek only produces candidate
//! addresses. Turning a candidate into bytes always goes through
//! [`MemoryReader::read`], which either fills the whole buffer or reports a
//! [`ReadError`]. Implementations never fault.

use crate::config::{NULL_PAGE_LIMIT, ReaderConfig};
use crate::error::ReadError;

/// A fallible, fixed-size copy from target memory.
pub trait MemoryReader {
    /// Copy `buf.len()` bytes starting at `addr` into `buf`.
    ///
    /// On error the contents of `buf` are unspecified and must not be used.
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), ReadError>;

    /// Read one little-endian 8-byte word.
    fn read_u64(&self, addr: u64) -> Result<u64, ReadError> {
        let mut raw = [0_u8; 8];
        self.read(addr, &mut raw)?;
        Ok(u64::from_le_bytes(raw))
    }

    /// Read `N` consecutive little-endian 8-byte words in a single copy.
    fn read_words<const N: usize>(&self, addr: u64) -> Result<[u64; N], ReadError>
    where
        Self: Sized,
    {
        let mut raw = vec![0_u8; N * 8];
        self.read(addr, &mut raw)?;
        let mut words = [0_u64; N];
        for (word, chunk) in words.iter_mut().zip(raw.chunks_exact(8)) {
            let mut bytes = [0_u8; 8];
            bytes.copy_from_slice(chunk);
            *word = u64::from_le_bytes(bytes);
        }
        Ok(words)
    }
}

impl<R: MemoryReader + ?Sized> MemoryReader for &R {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), ReadError> {
        (**self).read(addr, buf)
    }
}

/// Policy checks every reader applies before touching the target.
///
/// Returns the exclusive end address of the request.
pub fn check_request(config: &ReaderConfig, addr: u64, len: usize) -> Result<u64, ReadError> {
    if len > config.max_read {
        return Err(ReadError::TooLarge {
            len,
            max: config.max_read,
        });
    }
    if addr < NULL_PAGE_LIMIT {
        return Err(ReadError::NullPage { addr });
    }
    addr.checked_add(len as u64)
        .ok_or(ReadError::AddressOverflow)
}
