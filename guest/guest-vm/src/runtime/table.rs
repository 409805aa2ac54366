//! Funcref table holding function indices of the owning instance.

use crate::error::Trap;
use crate::model::{FuncIdx, TableType};

/// Largest table any module may declare, independent of host configuration.
pub const MAX_TABLE_ELEMS: u32 = 1 << 16;

#[derive(Debug, Clone, Default)]
pub struct Table {
    elems: Vec<Option<FuncIdx>>,
}

impl Table {
    pub fn new(ty: &TableType) -> Self {
        Self {
            elems: vec![None; ty.limits.min as usize],
        }
    }

    pub fn len(&self) -> u32 {
        self.elems.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Write `funcs` starting at `offset`; `None` if the run does not fit.
    pub fn init(&mut self, offset: u32, funcs: &[FuncIdx]) -> Option<()> {
        let start = offset as usize;
        let slots = self.elems.get_mut(start..start.checked_add(funcs.len())?)?;
        for (slot, &f) in slots.iter_mut().zip(funcs) {
            *slot = Some(f);
        }
        Some(())
    }

    pub fn get(&self, index: u32) -> Result<FuncIdx, Trap> {
        self.elems
            .get(index as usize)
            .copied()
            .flatten()
            .ok_or(Trap::UndefinedElement(index))
    }
}
