//! Ink price of each instruction class.

use serde::{Deserialize, Serialize};

use crate::vm::decode::Instr;

/// Ink charged before an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pricing {
    pub base: u64,
    pub memory_access: u64,
    pub call: u64,
    pub memory_grow: u64,
    /// Per declared local, charged when a guest frame is entered.
    pub local: u64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            base: 1,
            memory_access: 3,
            call: 5,
            memory_grow: 100,
            local: 1,
        }
    }
}

impl Pricing {
    pub fn cost(&self, instr: &Instr) -> u64 {
        match instr {
            Instr::Load { .. } | Instr::Store { .. } => self.memory_access,
            Instr::Call(_) | Instr::CallIndirect(_) => self.call,
            Instr::MemoryGrow => self.memory_grow,
            _ => self.base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_priced_separately() {
        let p = Pricing::default();
        assert_eq!(p.cost(&Instr::Nop), 1);
        assert_eq!(p.cost(&Instr::Load { op: 0x28, offset: 0 }), 3);
        assert_eq!(p.cost(&Instr::CallIndirect(0)), 5);
        assert_eq!(p.cost(&Instr::MemoryGrow), 100);
        assert_eq!(p.local, 1);
    }
}
