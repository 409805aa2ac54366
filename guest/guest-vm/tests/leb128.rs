#![allow(unused_doc_comments)]
use guest_vm::binary::cursor::Cursor;
use guest_vm::binary::leb128::{
    read_sleb_i32, read_sleb_i64, read_uleb_u32, write_sleb_i64, write_uleb_u32,
};
use proptest::prelude::*;

proptest! {
    /// Decoding arbitrary bytes never panics and never reads past five bytes.
    #[test]
    fn uleb_u32_is_total(bytes in proptest::collection::vec(any::<u8>(), 0..12)) {
        let mut c = Cursor::new(&bytes);
        if read_uleb_u32(&mut c).is_ok() {
            prop_assert!(c.offset() <= 5);
        }
    }

    /// Canonical encodings decode to the encoded value and consume all bytes.
    #[test]
    fn canonical_u32_decodes(v in any::<u32>()) {
        let mut out = Vec::new();
        write_uleb_u32(&mut out, v);
        let mut c = Cursor::new(&out);
        prop_assert_eq!(read_uleb_u32(&mut c).unwrap(), v);
        prop_assert!(c.is_eof());
    }

    #[test]
    fn canonical_i64_decodes(v in any::<i64>()) {
        let mut out = Vec::new();
        write_sleb_i64(&mut out, v);
        prop_assert!(out.len() <= 10);
        prop_assert_eq!(read_sleb_i64(&mut Cursor::new(&out)).unwrap(), v);
    }

    /// An i32 reader accepts exactly the i64 encodings that fit in 32 bits.
    #[test]
    fn sleb_i32_range(v in any::<i64>()) {
        let mut out = Vec::new();
        write_sleb_i64(&mut out, v);
        let got = read_sleb_i32(&mut Cursor::new(&out));
        match i32::try_from(v) {
            Ok(small) => prop_assert_eq!(got.unwrap(), small),
            Err(_) => prop_assert!(got.is_err()),
        }
    }
}
