//! Operand stack shared between the host and the guest it invokes.

use crate::error::Trap;
use crate::model::Value;

/// A stack of typed values. The interpreter runs guest code on top of the
/// caller's values and never pops below the height a call started at.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValueStack {
    values: Vec<Value>,
}

impl ValueStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn push(&mut self, v: Value) {
        self.values.push(v);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.values.pop()
    }

    pub fn peek(&self) -> Option<&Value> {
        self.values.last()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Drop everything above `height`; no-op if the stack is already lower.
    pub fn truncate(&mut self, height: usize) {
        self.values.truncate(height);
    }

    /// Pop a value, refusing to go below `floor`.
    #[inline]
    pub fn pop_above(&mut self, floor: usize) -> Result<Value, Trap> {
        if self.values.len() <= floor {
            return Err(Trap::Malformed("operand stack underflow"));
        }
        self.values
            .pop()
            .ok_or(Trap::Malformed("operand stack underflow"))
    }

    pub fn pop_i32(&mut self, floor: usize) -> Result<i32, Trap> {
        match self.pop_above(floor)? {
            Value::I32(v) => Ok(v),
            _ => Err(Trap::TypeMismatch("expected i32")),
        }
    }

    pub fn pop_i64(&mut self, floor: usize) -> Result<i64, Trap> {
        match self.pop_above(floor)? {
            Value::I64(v) => Ok(v),
            _ => Err(Trap::TypeMismatch("expected i64")),
        }
    }

    pub fn pop_f32(&mut self, floor: usize) -> Result<f32, Trap> {
        match self.pop_above(floor)? {
            Value::F32(b) => Ok(f32::from_bits(b)),
            _ => Err(Trap::TypeMismatch("expected f32")),
        }
    }

    pub fn pop_f64(&mut self, floor: usize) -> Result<f64, Trap> {
        match self.pop_above(floor)? {
            Value::F64(b) => Ok(f64::from_bits(b)),
            _ => Err(Trap::TypeMismatch("expected f64")),
        }
    }
}
