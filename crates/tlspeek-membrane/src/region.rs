//! Readable-range metadata for a target address space.

use crate::error::ReadError;

/// One mapped range of the target address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRegion {
    /// First address of the mapping.
    pub start: u64,
    /// Exclusive end address of the mapping.
    pub end: u64,
    /// Whether the mapping grants read permission.
    pub readable: bool,
}

impl MappedRegion {
    /// Returns true if `addr` lies inside `[start, end)`.
    #[must_use]
    pub fn contains(self, addr: u64) -> bool {
        (self.start..self.end).contains(&addr)
    }

    /// Returns true if `[addr, addr_end)` lies entirely inside this mapping.
    #[must_use]
    pub fn covers(self, addr: u64, addr_end: u64) -> bool {
        self.contains(addr) && addr_end <= self.end
    }

    /// Parse one line of `/proc/<pid>/maps`.
    ///
    /// ```text
    /// 7f1c2a000000-7f1c2a021000 rw-p 00000000 00:00 0
    /// ```
    #[must_use]
    pub fn parse_maps_line(line: &str) -> Option<Self> {
        let mut fields = line.split_ascii_whitespace();
        let range = fields.next()?;
        let perms = fields.next()?;
        let (start, end) = range.split_once('-')?;
        let start = u64::from_str_radix(start, 16).ok()?;
        let end = u64::from_str_radix(end, 16).ok()?;
        if end <= start {
            return None;
        }
        Some(Self {
            start,
            end,
            readable: perms.as_bytes().first() == Some(&b'r'),
        })
    }
}

/// Sorted, non-overlapping set of mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionMap {
    regions: Vec<MappedRegion>,
}

impl RegionMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the text of `/proc/<pid>/maps`. Malformed lines are skipped.
    #[must_use]
    pub fn from_maps(text: &str) -> Self {
        let mut map = Self::new();
        for region in text.lines().filter_map(MappedRegion::parse_maps_line) {
            map.insert(region);
        }
        map
    }

    /// Read and parse `/proc/<pid>/maps`.
    pub fn for_pid(pid: i32) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(format!("/proc/{pid}/maps"))?;
        Ok(Self::from_maps(&text))
    }

    /// Insert a mapping, keeping the list sorted by start address.
    pub fn insert(&mut self, region: MappedRegion) {
        let at = self
            .regions
            .partition_point(|existing| existing.start < region.start);
        self.regions.insert(at, region);
    }

    /// Look up the mapping containing `addr`, if any.
    #[must_use]
    pub fn lookup_containing(&self, addr: u64) -> Option<MappedRegion> {
        let idx = self.regions.partition_point(|r| r.start <= addr);
        let candidate = *self.regions.get(idx.checked_sub(1)?)?;
        candidate.contains(addr).then_some(candidate)
    }

    /// Check that `[addr, addr + len)` is readable within a single mapping.
    pub fn check_readable(&self, addr: u64, len: usize) -> Result<(), ReadError> {
        let end = addr
            .checked_add(len as u64)
            .ok_or(ReadError::AddressOverflow)?;
        match self.lookup_containing(addr) {
            Some(region) if !region.covers(addr, end) => Err(ReadError::Unmapped { addr, len }),
            Some(region) if !region.readable => Err(ReadError::NotReadable { addr, len }),
            Some(_) => Ok(()),
            None => Err(ReadError::Unmapped { addr, len }),
        }
    }

    /// Number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns true if there are no mappings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
