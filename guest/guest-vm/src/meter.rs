//! The contract between the interpreter and whoever accounts for its work.

use crate::error::Trap;

/// Metering hooks the interpreter calls while guest code runs.
///
/// `charge` is called with an instruction's price before the instruction
/// executes; `enter_frame` before every guest call frame is pushed and
/// `leave_frame` after it is popped. An error from either fallible hook
/// aborts the invocation with that trap. When an invocation traps, the
/// interpreter still calls `leave_frame` once for every frame it unwinds.
pub trait Checkpoint {
    fn charge(&mut self, ink: u64) -> Result<(), Trap>;
    fn enter_frame(&mut self) -> Result<(), Trap>;
    fn leave_frame(&mut self);
}

/// A checkpoint that never refuses.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unmetered;

impl Checkpoint for Unmetered {
    fn charge(&mut self, _ink: u64) -> Result<(), Trap> {
        Ok(())
    }

    fn enter_frame(&mut self) -> Result<(), Trap> {
        Ok(())
    }

    fn leave_frame(&mut self) {}
}
