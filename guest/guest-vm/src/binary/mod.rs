//! Low-level readers for the guest binary format: byte cursor, LEB128,
//! length-prefixed vectors and names, and the section-level module parser.
//!
//! Everything here reports [`BinaryReadError`]; [`crate::error::ParseError`]
//! wraps it for the public API.

pub mod cursor;
pub mod leb128;
pub mod reader;
pub mod sections;

use thiserror::Error;

/// Result alias for binary reading operations.
pub type Result<T> = core::result::Result<T, BinaryReadError>;

/// Errors raised while decoding a guest binary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryReadError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("LEB128 value does not fit in {target_bits} bits (offset {offset})")]
    Leb128Overflow { target_bits: u8, offset: usize },

    #[error("LEB128 value longer than {limit} bytes (offset {offset})")]
    Leb128TooManyBytes { limit: u8, offset: usize },

    #[error("name is not valid UTF-8 (offset {offset})")]
    InvalidUtf8 { offset: usize },

    #[error("malformed binary at offset {offset}: {msg}")]
    Malformed { offset: usize, msg: &'static str },
}
