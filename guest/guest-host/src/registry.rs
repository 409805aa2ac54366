//! Handle table of linked modules.
//!
//! The registry is shared between sessions. The table lock is only held to
//! look up, insert or remove a handle; running guest code holds the
//! per-module lock instead, so independent handles never contend.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use guest_vm::model::FuncIdx;
use guest_vm::{instantiate, Imports, Instance, Pricing};
use parking_lot::Mutex;
use tracing::debug;

use crate::catalog::{CatalogEntry, ModuleCatalog};
use crate::error::{HostError, LinkError};
use crate::hash::ContentHash;
use crate::imports::host_imports;
use crate::meter::{InkMeter, StackMeter};

/// Opaque reference to one linked instance. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleHandle(u32);

impl ModuleHandle {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live instance together with its budgets.
#[derive(Debug)]
pub struct LinkedModule {
    entry: Arc<CatalogEntry>,
    instance: Instance,
    ink: InkMeter,
    stack: StackMeter,
}

impl LinkedModule {
    pub fn digest(&self) -> ContentHash {
        self.entry.digest()
    }

    pub fn entry(&self, selector: i32) -> Option<FuncIdx> {
        self.entry.entry(selector)
    }

    pub fn start(&self) -> Option<FuncIdx> {
        self.entry.start()
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn ink(&self) -> &InkMeter {
        &self.ink
    }

    pub fn ink_mut(&mut self) -> &mut InkMeter {
        &mut self.ink
    }

    pub fn stack(&self) -> &StackMeter {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut StackMeter {
        &mut self.stack
    }

    /// Both budgets have been set at least once.
    pub fn is_configured(&self) -> bool {
        self.ink.is_configured() && self.stack.is_configured()
    }

    pub(crate) fn parts(&mut self) -> (&mut Instance, &mut InkMeter, &mut StackMeter) {
        (&mut self.instance, &mut self.ink, &mut self.stack)
    }
}

#[derive(Default)]
struct HandleTable {
    next: u32,
    linked: HashMap<ModuleHandle, Arc<Mutex<LinkedModule>>>,
}

pub struct ModuleRegistry {
    catalog: Arc<ModuleCatalog>,
    imports: Imports,
    table: Mutex<HandleTable>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("programs", &self.catalog.len())
            .field("linked", &self.len())
            .finish_non_exhaustive()
    }
}

impl ModuleRegistry {
    pub fn new(catalog: Arc<ModuleCatalog>) -> Self {
        Self::with_imports(catalog, host_imports())
    }

    /// Registry whose guests resolve imports against `imports` instead of
    /// the default `host` module.
    pub fn with_imports(catalog: Arc<ModuleCatalog>, imports: Imports) -> Self {
        Self {
            catalog,
            imports,
            table: Mutex::new(HandleTable::default()),
        }
    }

    /// Instantiate the program with `digest` and hand out a fresh handle.
    /// Both budgets start unset.
    pub fn link(&self, digest: &ContentHash) -> Result<ModuleHandle, LinkError> {
        let entry = self
            .catalog
            .get(digest)
            .ok_or(LinkError::UnknownDigest(*digest))?;
        let instance = instantiate(Arc::clone(entry.compiled()), &self.imports).map_err(
            |source| LinkError::Instantiate {
                digest: *digest,
                source,
            },
        )?;
        let module = LinkedModule {
            entry: Arc::clone(entry),
            instance,
            ink: InkMeter::default(),
            stack: StackMeter::default(),
        };

        let mut table = self.table.lock();
        let handle = ModuleHandle(table.next);
        table.next = table
            .next
            .checked_add(1)
            .ok_or(LinkError::HandlesExhausted)?;
        table.linked.insert(handle, Arc::new(Mutex::new(module)));
        drop(table);

        debug!(%handle, digest = %digest.short(), "linked module");
        Ok(handle)
    }

    /// Drop the instance behind `handle`. A call already running on it
    /// finishes first, since it holds the module lock.
    pub fn unlink(&self, handle: ModuleHandle) -> Result<(), HostError> {
        let removed = self.table.lock().linked.remove(&handle);
        match removed {
            Some(_) => {
                debug!(%handle, "unlinked module");
                Ok(())
            }
            None => Err(HostError::InvalidHandle(handle)),
        }
    }

    pub fn get(&self, handle: ModuleHandle) -> Result<Arc<Mutex<LinkedModule>>, HostError> {
        self.table
            .lock()
            .linked
            .get(&handle)
            .cloned()
            .ok_or(HostError::InvalidHandle(handle))
    }

    pub fn is_linked(&self, handle: ModuleHandle) -> bool {
        self.table.lock().linked.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.table.lock().linked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn catalog(&self) -> &Arc<ModuleCatalog> {
        &self.catalog
    }

    pub fn pricing(&self) -> &Pricing {
        self.catalog.pricing()
    }
}
