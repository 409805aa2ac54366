//! Composite readers: length-prefixed byte vectors, names and vectors of items.

use super::{cursor::Cursor, leb128, BinaryReadError, Result};

pub fn read_len_prefixed_bytes<'a>(cur: &mut Cursor<'a>) -> Result<&'a [u8]> {
    let len = leb128::read_uleb_u32(cur)? as usize;
    cur.read_bytes(len)
}

/// Read a UTF-8 name.
pub fn read_name(cur: &mut Cursor) -> Result<String> {
    let offset = cur.offset();
    let bytes = read_len_prefixed_bytes(cur)?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| BinaryReadError::InvalidUtf8 { offset })
}

/// Read a count-prefixed vector, decoding each item with `item`.
pub fn read_vec<T, F>(cur: &mut Cursor, mut item: F) -> Result<Vec<T>>
where
    F: FnMut(&mut Cursor) -> Result<T>,
{
    let count = leb128::read_uleb_u32(cur)? as usize;
    // A count larger than the remaining input is malformed; do not trust it for allocation.
    let mut out = Vec::with_capacity(count.min(cur.remaining()));
    for _ in 0..count {
        out.push(item(cur)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_roundtrip_and_utf8_check() {
        let mut c = Cursor::new(&[0x03, b'a', b'b', b'i']);
        assert_eq!(read_name(&mut c).unwrap(), "abi");

        let mut c = Cursor::new(&[0x01, 0xFF]);
        assert_eq!(
            read_name(&mut c).unwrap_err(),
            BinaryReadError::InvalidUtf8 { offset: 0 }
        );
    }

    #[test]
    fn vector_of_bytes() {
        let mut c = Cursor::new(&[0x02, 0xAA, 0xBB]);
        let v = read_vec(&mut c, |c| c.read_u8()).unwrap();
        assert_eq!(v, vec![0xAA, 0xBB]);
    }
}
