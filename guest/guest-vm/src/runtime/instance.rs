//! A live guest instance and the instantiation procedure that creates it.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::compile::CompiledModule;
use crate::error::{LinkError, Trap};
use crate::host::{HostFunc, ImportResolver};
use crate::meter::Checkpoint;
use crate::model::{ConstExpr, FuncIdx, FuncType, ImportDesc, Value};
use crate::runtime::{GlobalCell, LinearMemory, Table};
use crate::vm::interpreter::Machine;
use crate::vm::pricing::Pricing;
use crate::vm::stack::ValueStack;

/// Mutable state owned by one instance.
#[derive(Debug, Clone, Default)]
pub(crate) struct InstanceState {
    pub(crate) memory: Option<LinearMemory>,
    pub(crate) table: Option<Table>,
    pub(crate) globals: Vec<GlobalCell>,
}

pub struct Instance {
    module: Arc<CompiledModule>,
    host: Vec<Arc<HostFunc>>,
    state: InstanceState,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("host_funcs", &self.host.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Instance {
    pub fn module(&self) -> &Arc<CompiledModule> {
        &self.module
    }

    pub fn export_func(&self, name: &str) -> Option<FuncIdx> {
        self.module.export_func(name)
    }

    pub fn func_type(&self, func: FuncIdx) -> Option<&FuncType> {
        self.module.func_type(func)
    }

    pub fn memory(&self) -> Option<&LinearMemory> {
        self.state.memory.as_ref()
    }

    pub fn global(&self, index: u32) -> Option<Value> {
        self.state.globals.get(index as usize).map(GlobalCell::get)
    }

    /// Call `func` with `args`, running on top of `stack`.
    ///
    /// Values already on `stack` are never touched; on return (success or
    /// trap) the stack has exactly its entry height.
    pub fn invoke(
        &mut self,
        func: FuncIdx,
        args: &[Value],
        stack: &mut ValueStack,
        meter: &mut dyn Checkpoint,
        pricing: &Pricing,
    ) -> Result<Option<Value>, Trap> {
        let module = Arc::clone(&self.module);
        Machine::new(&module, &self.host, &mut self.state, stack, meter, pricing).invoke(func, args)
    }
}

fn eval_const(expr: ConstExpr, globals: &[GlobalCell]) -> Option<Value> {
    match expr {
        ConstExpr::GlobalGet(i) => globals.get(i as usize).map(GlobalCell::get),
        literal => literal.literal(),
    }
}

fn segment_offset(expr: ConstExpr, globals: &[GlobalCell]) -> Result<u32, LinkError> {
    match eval_const(expr, globals) {
        Some(Value::I32(v)) => Ok(v as u32),
        _ => Err(LinkError::InvalidInitializer),
    }
}

/// Create a fresh instance of `module`. Resolves function imports through
/// `resolver`, allocates memory, table and globals, and applies segments.
/// No guest code runs.
pub fn instantiate<R>(module: Arc<CompiledModule>, resolver: &R) -> Result<Instance, LinkError>
where
    R: ImportResolver + ?Sized,
{
    let m = module.module();

    let mut host = Vec::with_capacity(module.imported_funcs() as usize);
    for import in &m.imports {
        let unresolved = || LinkError::UnresolvedImport {
            module: import.module.clone(),
            name: import.name.clone(),
        };
        match import.desc {
            ImportDesc::Func(ty) => {
                let ty = m.types.get(ty as usize).ok_or_else(unresolved)?;
                let f = resolver
                    .resolve_func(&import.module, &import.name, ty)
                    .ok_or_else(unresolved)?;
                host.push(f);
            }
            _ => {
                return Err(LinkError::UnsupportedImport {
                    module: import.module.clone(),
                    name: import.name.clone(),
                })
            }
        }
    }

    let mut globals: Vec<GlobalCell> = Vec::with_capacity(m.globals.len());
    for g in &m.globals {
        let init = eval_const(g.init, &globals).ok_or(LinkError::InvalidInitializer)?;
        globals.push(GlobalCell::new(g.ty, init));
    }

    let mut table = m.tables.first().map(Table::new);
    for (segment, seg) in m.elements.iter().enumerate() {
        let offset = segment_offset(seg.offset, &globals)?;
        table
            .as_mut()
            .and_then(|t| t.init(offset, &seg.init))
            .ok_or(LinkError::ElemOutOfBounds { segment })?;
    }

    let mut memory = m.memories.first().map(LinearMemory::new);
    for (segment, seg) in m.data.iter().enumerate() {
        let offset = segment_offset(seg.offset, &globals)?;
        memory
            .as_mut()
            .ok_or(LinkError::DataOutOfBounds { segment })?
            .write(u64::from(offset), &seg.init)
            .map_err(|_| LinkError::DataOutOfBounds { segment })?;
    }

    trace!(
        host_funcs = host.len(),
        globals = globals.len(),
        memory_pages = memory.as_ref().map_or(0, LinearMemory::pages),
        table_len = table.as_ref().map_or(0, Table::len),
        "instantiated guest module"
    );

    Ok(Instance {
        module,
        host,
        state: InstanceState {
            memory,
            table,
            globals,
        },
    })
}
