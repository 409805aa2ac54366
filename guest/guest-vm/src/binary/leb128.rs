//! LEB128 variable-length integers, as used for every integer immediate in
//! the guest binary format. Decoders bound the encoded length by the target
//! width and reject values that do not fit.

use super::{cursor::Cursor, BinaryReadError, Result};

pub fn read_uleb_u32(cur: &mut Cursor) -> Result<u32> {
    read_unsigned(cur, 32).map(|v| v as u32)
}

pub fn read_uleb_u64(cur: &mut Cursor) -> Result<u64> {
    read_unsigned(cur, 64).map(|v| v as u64)
}

pub fn read_sleb_i32(cur: &mut Cursor) -> Result<i32> {
    read_signed(cur, 32).map(|v| v as i32)
}

pub fn read_sleb_i64(cur: &mut Cursor) -> Result<i64> {
    read_signed(cur, 64).map(|v| v as i64)
}

/// Maximum encoded length for an integer of `bits` width.
const fn max_len(bits: u32) -> u32 {
    (bits + 6) / 7
}

fn read_unsigned(cur: &mut Cursor, bits: u32) -> Result<u128> {
    let limit = max_len(bits);
    let mut value: u128 = 0;
    for i in 0..limit {
        let byte = cur.read_u8()?;
        value |= u128::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            if value >> bits != 0 {
                return Err(BinaryReadError::Leb128Overflow {
                    target_bits: bits as u8,
                    offset: cur.offset(),
                });
            }
            return Ok(value);
        }
    }
    Err(BinaryReadError::Leb128TooManyBytes {
        limit: limit as u8,
        offset: cur.offset(),
    })
}

fn read_signed(cur: &mut Cursor, bits: u32) -> Result<i128> {
    let limit = max_len(bits);
    let mut value: i128 = 0;
    for i in 0..limit {
        let byte = cur.read_u8()?;
        let shift = 7 * (i + 1);
        value |= i128::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            if byte & 0x40 != 0 {
                value |= -1i128 << shift;
            }
            let min = -(1i128 << (bits - 1));
            let max = (1i128 << (bits - 1)) - 1;
            if value < min || value > max {
                return Err(BinaryReadError::Leb128Overflow {
                    target_bits: bits as u8,
                    offset: cur.offset(),
                });
            }
            return Ok(value);
        }
    }
    Err(BinaryReadError::Leb128TooManyBytes {
        limit: limit as u8,
        offset: cur.offset(),
    })
}

/// Append the unsigned LEB128 encoding of `value` to `out`.
pub fn write_uleb_u32(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn write_sleb_i32(out: &mut Vec<u8>, value: i32) {
    write_sleb_i64(out, i64::from(value));
}

/// Append the signed LEB128 encoding of `value` to `out`.
pub fn write_sleb_i64(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_encodings() {
        let mut c = Cursor::new(&[0xE5, 0x8E, 0x26]);
        assert_eq!(read_uleb_u32(&mut c).unwrap(), 624_485);

        let mut c = Cursor::new(&[0xC0, 0xBB, 0x78]);
        assert_eq!(read_sleb_i32(&mut c).unwrap(), -123_456);

        let mut c = Cursor::new(&[0x7F]);
        assert_eq!(read_sleb_i64(&mut c).unwrap(), -1);
    }

    #[test]
    fn rejects_values_wider_than_target() {
        // 2^32 needs 33 bits
        let mut c = Cursor::new(&[0x80, 0x80, 0x80, 0x80, 0x10]);
        assert!(matches!(
            read_uleb_u32(&mut c),
            Err(BinaryReadError::Leb128Overflow { target_bits: 32, .. })
        ));

        let mut c = Cursor::new(&[0xFF; 6]);
        assert!(matches!(
            read_uleb_u32(&mut c),
            Err(BinaryReadError::Leb128TooManyBytes { limit: 5, .. })
        ));
    }

    #[test]
    fn encoders_emit_minimal_forms() {
        let mut out = Vec::new();
        write_uleb_u32(&mut out, 65_536);
        assert_eq!(out, [0x80, 0x80, 0x04]);

        out.clear();
        write_sleb_i32(&mut out, 64);
        assert_eq!(out, [0xC0, 0x00]);

        out.clear();
        write_sleb_i32(&mut out, -64);
        assert_eq!(out, [0x40]);
    }
}
