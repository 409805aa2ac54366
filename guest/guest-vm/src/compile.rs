//! Validated, decoded guest module ready for instantiation.

use crate::error::{CompileError, ValidationError};
use crate::model::{ExportDesc, FuncIdx, FuncType, Module, ValType};
use crate::vm::decode::{decode_body, Instr};

/// Upper bound on parameters plus declared locals of one function.
pub const MAX_LOCALS: u64 = 50_000;

#[derive(Debug, Clone, PartialEq)]
pub struct FuncBody {
    /// Declared locals, not including parameters.
    pub locals: Vec<ValType>,
    pub code: Vec<Instr>,
}

/// An immutable compiled module. Share it behind an `Arc`; every instance
/// created from it gets its own memory, table and globals.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModule {
    module: Module,
    bodies: Vec<FuncBody>,
    imported: u32,
}

impl CompiledModule {
    /// Validate `module` and decode every function body.
    pub fn from_module(module: Module) -> Result<Self, CompileError> {
        crate::validate::validate_module(&module)?;
        let imported = module.imported_funcs();
        let mut bodies = Vec::with_capacity(module.codes.len());
        for (i, code) in module.codes.iter().enumerate() {
            let func = imported + i as u32;
            let params = module.func_type(func).map_or(0, |t| t.params.len() as u64);
            let declared: u64 = code.locals.iter().map(|d| u64::from(d.count)).sum();
            if params + declared > MAX_LOCALS {
                return Err(CompileError::Decode {
                    func,
                    offset: 0,
                    msg: "too many locals",
                });
            }
            let locals = code
                .locals
                .iter()
                .flat_map(|d| std::iter::repeat(d.val_type).take(d.count as usize))
                .collect();
            let code = decode_body(func, &code.body)?;
            check_references(&module, &code)?;
            bodies.push(FuncBody { locals, code });
        }
        Ok(Self {
            module,
            bodies,
            imported,
        })
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn imported_funcs(&self) -> u32 {
        self.imported
    }

    /// Body of function `func` in the combined index space; `None` for imports.
    pub fn body(&self, func: FuncIdx) -> Option<&FuncBody> {
        let defined = func.checked_sub(self.imported)?;
        self.bodies.get(defined as usize)
    }

    pub fn func_type(&self, func: FuncIdx) -> Option<&FuncType> {
        self.module.func_type(func)
    }

    pub fn export_func(&self, name: &str) -> Option<FuncIdx> {
        match self.module.export(name)? {
            ExportDesc::Func(f) => Some(f),
            _ => None,
        }
    }
}

/// Static index checks the decoder cannot do alone.
fn check_references(m: &Module, code: &[Instr]) -> Result<(), ValidationError> {
    let funcs = m.total_funcs();
    let globals = m.total_globals();
    let has_memory = m.total_memories() > 0;
    for instr in code {
        match *instr {
            Instr::Call(f) if f >= funcs => return Err(ValidationError::FuncOutOfRange(f)),
            Instr::CallIndirect(ty) if ty as usize >= m.types.len() => {
                return Err(ValidationError::TypeOutOfRange(ty))
            }
            Instr::CallIndirect(_) if m.total_tables() == 0 => {
                return Err(ValidationError::TableOutOfRange(0))
            }
            Instr::GlobalGet(g) | Instr::GlobalSet(g) if g >= globals => {
                return Err(ValidationError::GlobalOutOfRange(g))
            }
            Instr::Load { .. } | Instr::Store { .. } | Instr::MemorySize | Instr::MemoryGrow
                if !has_memory =>
            {
                return Err(ValidationError::MemoryOutOfRange(0))
            }
            _ => {}
        }
    }
    Ok(())
}
