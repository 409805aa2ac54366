//! Guarded invocation of guest entry points.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use guest_vm::model::FuncIdx;
use guest_vm::{Trap, Value, ValueStack};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::HostError;
use crate::meter::GuestMeters;
use crate::registry::{LinkedModule, ModuleHandle, ModuleRegistry};

/// Recoverable fault kinds reported by a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum GuestFault {
    #[error("guest aborted with code {0}")]
    Abort(i32),
    #[error("illegal instruction")]
    IllegalInstruction,
    #[error("out of bounds memory access")]
    OutOfBounds,
    #[error("ink exhausted")]
    InkExhausted,
    #[error("call stack exhausted")]
    StackExhausted,
    #[error("arithmetic fault")]
    Arithmetic,
    #[error("bad indirect call")]
    BadIndirectCall,
    #[error("engine panicked: {0}")]
    Panicked(String),
}

impl From<Trap> for GuestFault {
    fn from(trap: Trap) -> Self {
        match trap {
            Trap::Abort(code) => GuestFault::Abort(code),
            Trap::Unreachable
            | Trap::IllegalOpcode(_)
            | Trap::TypeMismatch(_)
            | Trap::Malformed(_) => GuestFault::IllegalInstruction,
            Trap::MemoryOutOfBounds { .. } => GuestFault::OutOfBounds,
            Trap::InkExhausted => GuestFault::InkExhausted,
            Trap::StackExhausted => GuestFault::StackExhausted,
            Trap::DivideByZero | Trap::IntegerOverflow => GuestFault::Arithmetic,
            Trap::UndefinedElement(_) | Trap::IndirectCallTypeMismatch => {
                GuestFault::BadIndirectCall
            }
        }
    }
}

/// Outcome of one guarded call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvocationResult {
    /// The entry point returned, with its result if it declares one.
    Success(Option<Value>),
    Failure(GuestFault),
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, InvocationResult::Failure(_))
    }

    pub fn value(&self) -> Option<Value> {
        match self {
            InvocationResult::Success(v) => *v,
            _ => None,
        }
    }

    pub fn fault(&self) -> Option<&GuestFault> {
        match self {
            InvocationResult::Failure(f) => Some(f),
            _ => None,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Recovery boundary around one guest call.
///
/// Records the operand stack height on entry; whatever the guest does,
/// including a panic inside the engine, the stack is cut back to exactly
/// that height before the outcome is returned.
pub struct TrapGuard<'s> {
    operands: &'s mut ValueStack,
    height: usize,
}

impl<'s> TrapGuard<'s> {
    pub fn new(operands: &'s mut ValueStack) -> Self {
        let height = operands.len();
        Self { operands, height }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn run<F>(self, call: F) -> InvocationResult
    where
        F: FnOnce(&mut ValueStack) -> Result<Option<Value>, Trap>,
    {
        let operands = self.operands;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(&mut *operands)));
        operands.truncate(self.height);
        match outcome {
            Ok(Ok(value)) => InvocationResult::Success(value),
            Ok(Err(trap)) => InvocationResult::Failure(trap.into()),
            Err(payload) => InvocationResult::Failure(GuestFault::Panicked(panic_message(&*payload))),
        }
    }
}

/// Dispatches selectors of linked modules under a [`TrapGuard`].
pub struct Invoker<'r> {
    registry: &'r ModuleRegistry,
}

impl<'r> Invoker<'r> {
    pub fn new(registry: &'r ModuleRegistry) -> Self {
        Self { registry }
    }

    /// Call the entry point behind `selector`. Guest faults come back as
    /// `Ok(Failure(..))`; only usage errors are `Err`.
    pub fn call(
        &self,
        handle: ModuleHandle,
        selector: i32,
        operands: &mut ValueStack,
    ) -> Result<InvocationResult, HostError> {
        let linked = self.registry.get(handle)?;
        let func = linked
            .lock()
            .entry(selector)
            .ok_or(HostError::UnknownSelector { handle, selector })?;
        self.run(handle, &linked, func, operands, &format!("selector {selector}"))
    }

    /// Run the program's start function, if it has one.
    pub fn run_start(
        &self,
        handle: ModuleHandle,
        operands: &mut ValueStack,
    ) -> Result<InvocationResult, HostError> {
        let linked = self.registry.get(handle)?;
        let start = linked.lock().start();
        match start {
            Some(func) => self.run(handle, &linked, func, operands, "start"),
            None => Ok(InvocationResult::Success(None)),
        }
    }

    fn run(
        &self,
        handle: ModuleHandle,
        linked: &Mutex<LinkedModule>,
        func: FuncIdx,
        operands: &mut ValueStack,
        what: &str,
    ) -> Result<InvocationResult, HostError> {
        let pricing = self.registry.pricing();
        let mut module = linked.lock();
        if !module.is_configured() {
            return Err(HostError::Unconfigured(handle));
        }

        let (instance, ink, stack) = module.parts();
        let ink_before = ink.remaining();
        let depth_before = stack.remaining();
        let result = TrapGuard::new(operands).run(|ops| {
            let mut meters = GuestMeters {
                ink: &mut *ink,
                stack: &mut *stack,
            };
            instance.invoke(func, &[], ops, &mut meters, pricing)
        });
        stack.restore(depth_before);

        let ink_used = ink_before.saturating_sub(ink.remaining());
        match &result {
            InvocationResult::Failure(fault) => {
                warn!(%handle, call = what, %fault, ink_used, "guest call failed")
            }
            _ => debug!(%handle, call = what, ink_used, "guest call succeeded"),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_truncates_on_every_outcome() {
        let mut stack = ValueStack::new();
        stack.push(Value::I32(1));

        let ok = TrapGuard::new(&mut stack).run(|ops| {
            ops.push(Value::I32(2));
            Ok(Some(Value::I64(3)))
        });
        assert_eq!(ok, InvocationResult::Success(Some(Value::I64(3))));
        assert_eq!(stack.len(), 1);

        let trapped = TrapGuard::new(&mut stack).run(|ops| {
            ops.push(Value::I32(2));
            Err(Trap::MemoryOutOfBounds { addr: 9, len: 4 })
        });
        assert_eq!(trapped, InvocationResult::Failure(GuestFault::OutOfBounds));
        assert_eq!(stack.as_slice(), &[Value::I32(1)]);
    }

    #[test]
    fn guard_recovers_from_panics() {
        let mut stack = ValueStack::new();
        stack.push(Value::F32(7));
        let out = TrapGuard::new(&mut stack).run(|ops| {
            ops.push(Value::I32(0));
            panic!("engine bug");
        });
        assert_eq!(
            out,
            InvocationResult::Failure(GuestFault::Panicked("engine bug".into()))
        );
        assert_eq!(stack.as_slice(), &[Value::F32(7)]);
    }

    #[test]
    fn traps_map_to_fault_kinds() {
        assert_eq!(GuestFault::from(Trap::Unreachable), GuestFault::IllegalInstruction);
        assert_eq!(GuestFault::from(Trap::IllegalOpcode(0xFF)), GuestFault::IllegalInstruction);
        assert_eq!(GuestFault::from(Trap::Abort(3)), GuestFault::Abort(3));
        assert_eq!(GuestFault::from(Trap::DivideByZero), GuestFault::Arithmetic);
        assert_eq!(GuestFault::from(Trap::UndefinedElement(1)), GuestFault::BadIndirectCall);
        assert_eq!(GuestFault::from(Trap::StackExhausted), GuestFault::StackExhausted);
    }
}
