//! Forward-only byte cursor with offset tracking.

use super::{BinaryReadError, Result};

/// Cursor over a borrowed byte slice.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Offset of the next unread byte.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or(BinaryReadError::UnexpectedEof { offset: self.pos })?;
        self.pos += 1;
        Ok(b)
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(BinaryReadError::Malformed {
            offset: self.pos,
            msg: "length overflows the address space",
        })?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(BinaryReadError::UnexpectedEof { offset: self.pos })?;
        self.pos = end;
        Ok(slice)
    }

    /// Read a fixed-size little-endian chunk.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.read_array::<4>().map(u32::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_the_offset() {
        let bytes = [9u8, 1, 2, 3, 0x04, 0x03, 0x02, 0x01];
        let mut c = Cursor::new(&bytes);
        assert_eq!(c.read_u8().unwrap(), 9);
        assert_eq!(c.read_bytes(3).unwrap(), &[1, 2, 3]);
        assert_eq!(c.offset(), 4);
        assert_eq!(c.read_u32_le().unwrap(), 0x0102_0304);
        assert!(c.is_eof());
        assert_eq!(
            c.read_u8().unwrap_err(),
            BinaryReadError::UnexpectedEof { offset: 8 }
        );
    }

    #[test]
    fn short_read_does_not_move() {
        let mut c = Cursor::new(&[1, 2]);
        assert!(c.read_bytes(3).is_err());
        assert_eq!(c.offset(), 0);
        assert_eq!(c.remaining(), 2);
    }
}
