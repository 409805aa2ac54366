//! Per-handle ink and call-depth budgets.
//!
//! These are the only counters the interpreter consults while a guest
//! runs. They are plain values owned by a linked module; the registry's
//! per-module lock is what serializes access to them.

use guest_vm::{Checkpoint, Trap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InkStatus {
    Ready,
    Exhausted,
}

/// Remaining computational budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InkMeter {
    remaining: i64,
    status: InkStatus,
    configured: bool,
}

impl Default for InkMeter {
    fn default() -> Self {
        Self {
            remaining: 0,
            status: InkStatus::Ready,
            configured: false,
        }
    }
}

impl InkMeter {
    /// Overwrite the budget. Clears exhaustion.
    pub fn set(&mut self, budget: i64) {
        self.remaining = budget;
        self.status = InkStatus::Ready;
        self.configured = true;
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn status(&self) -> InkStatus {
        self.status
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Deduct `cost`. A charge that would go below zero marks the meter
    /// exhausted and deducts nothing; so does any charge after that.
    pub fn charge(&mut self, cost: u64) -> Result<(), Trap> {
        if self.status == InkStatus::Exhausted {
            return Err(Trap::InkExhausted);
        }
        let cost = i64::try_from(cost).unwrap_or(i64::MAX);
        if cost > self.remaining {
            self.status = InkStatus::Exhausted;
            return Err(Trap::InkExhausted);
        }
        self.remaining -= cost;
        Ok(())
    }
}

/// Remaining call depth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackMeter {
    remaining: u32,
    configured: bool,
}

impl StackMeter {
    pub fn set(&mut self, limit: u32) {
        self.remaining = limit;
        self.configured = true;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn enter(&mut self) -> Result<(), Trap> {
        match self.remaining.checked_sub(1) {
            Some(left) => {
                self.remaining = left;
                Ok(())
            }
            None => Err(Trap::StackExhausted),
        }
    }

    pub fn leave(&mut self) {
        self.remaining = self.remaining.saturating_add(1);
    }

    /// Put back the depth recorded before a call, whatever happened in it.
    pub(crate) fn restore(&mut self, remaining: u32) {
        self.remaining = remaining;
    }
}

/// Both meters of one handle, borrowed for the length of a call.
pub(crate) struct GuestMeters<'m> {
    pub(crate) ink: &'m mut InkMeter,
    pub(crate) stack: &'m mut StackMeter,
}

impl Checkpoint for GuestMeters<'_> {
    fn charge(&mut self, ink: u64) -> Result<(), Trap> {
        self.ink.charge(ink)
    }

    fn enter_frame(&mut self) -> Result<(), Trap> {
        self.stack.enter()
    }

    fn leave_frame(&mut self) {
        self.stack.leave();
    }
}
