//! Linear memory of one instance: 32-bit index space, page-granular growth,
//! and bounds-checked little-endian access at 64-bit effective addresses.

use crate::error::Trap;
use crate::model::MemoryType;

/// Page size in bytes (64 KiB).
pub const PAGE_SIZE: usize = 64 * 1024;

/// Largest page count a 32-bit index space can address.
pub const MAX_PAGES: u32 = 65536;

#[derive(Debug, Clone)]
pub struct LinearMemory {
    buf: Vec<u8>,
    max: u32,
}

impl LinearMemory {
    pub fn new(ty: &MemoryType) -> Self {
        let max = ty.limits.max.unwrap_or(MAX_PAGES).min(MAX_PAGES);
        Self {
            buf: vec![0; ty.limits.min as usize * PAGE_SIZE],
            max,
        }
    }

    pub fn pages(&self) -> u32 {
        (self.buf.len() / PAGE_SIZE) as u32
    }

    pub fn max_pages(&self) -> u32 {
        self.max
    }

    /// Grow by `delta` pages, returning the previous size, or `None` when the
    /// result would exceed the maximum.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let prev = self.pages();
        let next = prev.checked_add(delta).filter(|&n| n <= self.max)?;
        self.buf.resize(next as usize * PAGE_SIZE, 0);
        Some(prev)
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    fn range(&self, addr: u64, len: usize) -> Result<std::ops::Range<usize>, Trap> {
        let oob = Trap::MemoryOutOfBounds { addr, len };
        let start = usize::try_from(addr).map_err(|_| oob.clone())?;
        match start.checked_add(len) {
            Some(end) if end <= self.buf.len() => Ok(start..end),
            _ => Err(oob),
        }
    }

    pub fn read(&self, addr: u64, len: usize) -> Result<&[u8], Trap> {
        let range = self.range(addr, len)?;
        Ok(&self.buf[range])
    }

    pub fn read_array<const N: usize>(&self, addr: u64) -> Result<[u8; N], Trap> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(addr, N)?);
        Ok(out)
    }

    pub fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), Trap> {
        let range = self.range(addr, bytes.len())?;
        self.buf[range].copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Limits;

    fn memory(min: u32, max: Option<u32>) -> LinearMemory {
        LinearMemory::new(&MemoryType {
            limits: Limits::new(min, max),
        })
    }

    #[test]
    fn grow_respects_maximum() {
        let mut m = memory(1, Some(2));
        assert_eq!(m.grow(1), Some(1));
        assert_eq!(m.pages(), 2);
        assert_eq!(m.grow(1), None);
        assert_eq!(m.grow(0), Some(2));
    }

    #[test]
    fn access_at_the_edge() {
        let mut m = memory(1, None);
        let last = PAGE_SIZE as u64 - 4;
        m.write(last, &7u32.to_le_bytes()).unwrap();
        assert_eq!(m.read_array::<4>(last).unwrap(), 7u32.to_le_bytes());
        assert_eq!(
            m.read(last + 1, 4),
            Err(Trap::MemoryOutOfBounds {
                addr: last + 1,
                len: 4
            })
        );
    }

    #[test]
    fn effective_address_does_not_wrap() {
        let m = memory(1, None);
        let addr = u32::MAX as u64 + 8;
        assert!(m.read(addr, 1).is_err());
    }
}
