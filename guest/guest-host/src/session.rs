//! One embedding runtime's view of the registry.
//!
//! A session owns the handles it linked and the host operand stack that
//! guest calls run on top of. All operations are strictly sequenced through
//! `&mut self`; concurrency only exists between sessions sharing a registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use guest_vm::{Value, ValueStack};
use tracing::{debug, warn};

use crate::catalog::ModuleCatalog;
use crate::error::HostError;
use crate::hash::ContentHash;
use crate::invoke::{InvocationResult, Invoker};
use crate::meter::InkStatus;
use crate::registry::{ModuleHandle, ModuleRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing linked yet.
    Idle,
    /// At least one owned handle is missing a budget.
    Linked,
    /// Every owned handle has both budgets set.
    Configured,
    /// Internal: held while a guarded call runs. Calls borrow the session
    /// mutably and leave this state before returning, so `state()` never
    /// reports it.
    Invoking,
    /// Everything this session linked has been unlinked again.
    Unlinked,
    Halted,
}

#[derive(Debug)]
pub struct HostSession {
    registry: Arc<ModuleRegistry>,
    owned: BTreeSet<ModuleHandle>,
    operands: ValueStack,
    state: SessionState,
    ever_linked: bool,
}

impl HostSession {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            owned: BTreeSet::new(),
            operands: ValueStack::new(),
            state: SessionState::Idle,
            ever_linked: false,
        }
    }

    /// Session over a private registry for `catalog`.
    pub fn with_catalog(catalog: Arc<ModuleCatalog>) -> Self {
        Self::new(Arc::new(ModuleRegistry::new(catalog)))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Handles currently owned by this session, in link order.
    pub fn handles(&self) -> impl Iterator<Item = ModuleHandle> + '_ {
        self.owned.iter().copied()
    }

    fn ensure_open(&self, op: &'static str) -> Result<(), HostError> {
        match self.state {
            SessionState::Halted => Err(HostError::InvalidState {
                op,
                state: self.state,
            }),
            _ => Ok(()),
        }
    }

    fn ensure_owned(&self, handle: ModuleHandle) -> Result<(), HostError> {
        if self.owned.contains(&handle) {
            Ok(())
        } else {
            Err(HostError::InvalidHandle(handle))
        }
    }

    fn refresh_state(&mut self) {
        self.state = if self.owned.is_empty() {
            if self.ever_linked {
                SessionState::Unlinked
            } else {
                SessionState::Idle
            }
        } else {
            let configured = self.owned.iter().all(|&h| {
                self.registry
                    .get(h)
                    .map(|m| m.lock().is_configured())
                    .unwrap_or(false)
            });
            if configured {
                SessionState::Configured
            } else {
                SessionState::Linked
            }
        };
    }

    pub fn link(&mut self, digest: &ContentHash) -> Result<ModuleHandle, HostError> {
        self.ensure_open("link")?;
        let handle = self.registry.link(digest)?;
        self.owned.insert(handle);
        self.ever_linked = true;
        self.refresh_state();
        Ok(handle)
    }

    pub fn unlink(&mut self, handle: ModuleHandle) -> Result<(), HostError> {
        self.ensure_open("unlink")?;
        self.ensure_owned(handle)?;
        self.registry.unlink(handle)?;
        self.owned.remove(&handle);
        self.refresh_state();
        Ok(())
    }

    pub fn set_ink(&mut self, handle: ModuleHandle, budget: i64) -> Result<(), HostError> {
        self.ensure_open("set_ink")?;
        self.ensure_owned(handle)?;
        self.registry.get(handle)?.lock().ink_mut().set(budget);
        debug!(%handle, budget, "ink budget set");
        self.refresh_state();
        Ok(())
    }

    pub fn ink_left(&self, handle: ModuleHandle) -> Result<i64, HostError> {
        self.ensure_open("ink_left")?;
        self.ensure_owned(handle)?;
        Ok(self.registry.get(handle)?.lock().ink().remaining())
    }

    pub fn ink_status(&self, handle: ModuleHandle) -> Result<InkStatus, HostError> {
        self.ensure_open("ink_status")?;
        self.ensure_owned(handle)?;
        Ok(self.registry.get(handle)?.lock().ink().status())
    }

    pub fn set_stack(&mut self, handle: ModuleHandle, limit: u32) -> Result<(), HostError> {
        self.ensure_open("set_stack")?;
        self.ensure_owned(handle)?;
        self.registry.get(handle)?.lock().stack_mut().set(limit);
        debug!(%handle, limit, "stack limit set");
        self.refresh_state();
        Ok(())
    }

    pub fn stack_left(&self, handle: ModuleHandle) -> Result<u32, HostError> {
        self.ensure_open("stack_left")?;
        self.ensure_owned(handle)?;
        Ok(self.registry.get(handle)?.lock().stack().remaining())
    }

    /// Run the entry point behind `selector`. Guest faults are reported as
    /// `Ok(InvocationResult::Failure(..))` and leave the handle usable.
    pub fn call_entry(
        &mut self,
        handle: ModuleHandle,
        selector: i32,
    ) -> Result<InvocationResult, HostError> {
        self.ensure_open("call_entry")?;
        self.ensure_owned(handle)?;
        let registry = Arc::clone(&self.registry);
        self.state = SessionState::Invoking;
        let result = Invoker::new(&registry).call(handle, selector, &mut self.operands);
        self.refresh_state();
        result
    }

    /// Run the program's start function under the same guard and meters.
    pub fn run_start(&mut self, handle: ModuleHandle) -> Result<InvocationResult, HostError> {
        self.ensure_open("run_start")?;
        self.ensure_owned(handle)?;
        let registry = Arc::clone(&self.registry);
        self.state = SessionState::Invoking;
        let result = Invoker::new(&registry).run_start(handle, &mut self.operands);
        self.refresh_state();
        result
    }

    /// Close the session. Only allowed once everything it linked has been
    /// unlinked again.
    pub fn halt(&mut self) -> Result<(), HostError> {
        self.ensure_open("halt")?;
        match self.state {
            SessionState::Unlinked => {
                self.state = SessionState::Halted;
                self.operands.truncate(0);
                debug!("session halted");
                Ok(())
            }
            SessionState::Linked | SessionState::Configured => {
                Err(HostError::StillLinked(self.owned.len()))
            }
            state => Err(HostError::InvalidState { op: "halt", state }),
        }
    }

    pub fn push_operand(&mut self, value: Value) -> Result<(), HostError> {
        self.ensure_open("push_operand")?;
        self.operands.push(value);
        Ok(())
    }

    pub fn pop_operand(&mut self) -> Result<Option<Value>, HostError> {
        self.ensure_open("pop_operand")?;
        Ok(self.operands.pop())
    }

    pub fn operand_depth(&self) -> usize {
        self.operands.len()
    }

    pub fn operands(&self) -> &[Value] {
        self.operands.as_slice()
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        if self.owned.is_empty() {
            return;
        }
        warn!(
            leaked = self.owned.len(),
            "session dropped with modules still linked"
        );
        for handle in std::mem::take(&mut self.owned) {
            // already gone only if someone unlinked it behind our back
            let _ = self.registry.unlink(handle);
        }
    }
}
