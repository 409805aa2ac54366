//! Global variable cell: declared type plus current value.

use crate::error::Trap;
use crate::model::{GlobalType, Value};

#[derive(Debug, Clone)]
pub struct GlobalCell {
    ty: GlobalType,
    value: Value,
}

impl GlobalCell {
    pub fn new(ty: GlobalType, init: Value) -> Self {
        Self { ty, value: init }
    }

    pub fn get(&self) -> Value {
        self.value
    }

    pub fn set(&mut self, v: Value) -> Result<(), Trap> {
        if !self.ty.mutable {
            return Err(Trap::Malformed("write to immutable global"));
        }
        if v.ty() != self.ty.val_type {
            return Err(Trap::TypeMismatch("global.set operand"));
        }
        self.value = v;
        Ok(())
    }

    pub fn ty(&self) -> &GlobalType {
        &self.ty
    }
}
