//! Structural and index-space checks run on a parsed module before it is
//! compiled. Instruction-level typing is left to the interpreter, which
//! traps on operand mismatches instead of trusting the body.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::model::{
    ConstExpr, ExportDesc, GlobalType, ImportDesc, Limits, MemoryType, Module, TableType, ValType,
};
use crate::runtime::{MAX_PAGES, MAX_TABLE_ELEMS};

type VResult<T> = Result<T, ValidationError>;

fn check_limits(limits: &Limits) -> VResult<()> {
    match limits.max {
        Some(max) if max < limits.min => Err(ValidationError::InvalidLimits {
            min: limits.min,
            max,
        }),
        _ => Ok(()),
    }
}

fn check_table(t: &TableType) -> VResult<()> {
    check_limits(&t.limits)?;
    if t.limits.min > MAX_TABLE_ELEMS {
        return Err(ValidationError::TableLimit {
            minimum: t.limits.min,
            limit: MAX_TABLE_ELEMS,
        });
    }
    Ok(())
}

fn check_memory(mem: &MemoryType) -> VResult<()> {
    check_limits(&mem.limits)?;
    if mem.limits.min > MAX_PAGES {
        return Err(ValidationError::HeapLimit {
            minimum: mem.limits.min,
            limit: MAX_PAGES,
        });
    }
    Ok(())
}

/// Global types in the combined index space (imports first).
fn global_types(m: &Module) -> Vec<GlobalType> {
    m.imports
        .iter()
        .filter_map(|i| match i.desc {
            ImportDesc::Global(ty) => Some(ty),
            _ => None,
        })
        .chain(m.globals.iter().map(|g| g.ty))
        .collect()
}

/// Type of a constant expression. `global.get` may only read an immutable
/// global declared before `visible` (imports always qualify).
fn const_expr_type(expr: ConstExpr, globals: &[GlobalType], visible: usize) -> VResult<ValType> {
    Ok(match expr {
        ConstExpr::I32(_) => ValType::I32,
        ConstExpr::I64(_) => ValType::I64,
        ConstExpr::F32(_) => ValType::F32,
        ConstExpr::F64(_) => ValType::F64,
        ConstExpr::GlobalGet(idx) => {
            let ty = globals
                .get(idx as usize)
                .filter(|_| (idx as usize) < visible)
                .ok_or(ValidationError::GlobalOutOfRange(idx))?;
            if ty.mutable {
                return Err(ValidationError::MutableGlobalInConstExpr(idx));
            }
            ty.val_type
        }
    })
}

fn expect_type(expected: ValType, found: ValType) -> VResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(ValidationError::ConstExprType { expected, found })
    }
}

pub fn validate_module(m: &Module) -> VResult<()> {
    for (index, ty) in m.types.iter().enumerate() {
        if ty.results.len() > 1 {
            return Err(ValidationError::ResultArity {
                index: index as u32,
                arity: ty.results.len(),
            });
        }
    }

    let type_count = m.types.len() as u32;
    let imported_types = m.imports.iter().filter_map(|i| match i.desc {
        ImportDesc::Func(ty) => Some(ty),
        _ => None,
    });
    for ty in imported_types.chain(m.funcs.iter().copied()) {
        if ty >= type_count {
            return Err(ValidationError::TypeOutOfRange(ty));
        }
    }

    for import in &m.imports {
        match &import.desc {
            ImportDesc::Table(t) => check_table(t)?,
            ImportDesc::Memory(mem) => check_memory(mem)?,
            _ => {}
        }
    }
    if m.total_tables() > 1 {
        return Err(ValidationError::MultipleTables);
    }
    if m.total_memories() > 1 {
        return Err(ValidationError::MultipleMemories);
    }
    for t in &m.tables {
        check_table(t)?;
    }
    for mem in &m.memories {
        check_memory(mem)?;
    }

    let globals = global_types(m);
    let imported_globals = globals.len() - m.globals.len();
    for (i, g) in m.globals.iter().enumerate() {
        let found = const_expr_type(g.init, &globals, imported_globals + i)?;
        expect_type(g.ty.val_type, found)?;
    }

    let total_funcs = m.total_funcs();
    let mut names = HashSet::with_capacity(m.exports.len());
    for export in &m.exports {
        if !names.insert(export.name.as_str()) {
            return Err(ValidationError::DuplicateExport(export.name.clone()));
        }
        match export.desc {
            ExportDesc::Func(f) if f >= total_funcs => {
                return Err(ValidationError::FuncOutOfRange(f))
            }
            ExportDesc::Table(t) if t >= m.total_tables() => {
                return Err(ValidationError::TableOutOfRange(t))
            }
            ExportDesc::Memory(mem) if mem >= m.total_memories() => {
                return Err(ValidationError::MemoryOutOfRange(mem))
            }
            ExportDesc::Global(g) if g as usize >= globals.len() => {
                return Err(ValidationError::GlobalOutOfRange(g))
            }
            _ => {}
        }
    }

    if let Some(start) = m.start {
        let ty = m
            .func_type(start)
            .ok_or(ValidationError::FuncOutOfRange(start))?;
        if !ty.params.is_empty() || !ty.results.is_empty() {
            return Err(ValidationError::StartSignature(ty.clone()));
        }
    }

    for seg in &m.elements {
        if seg.table >= m.total_tables() {
            return Err(ValidationError::TableOutOfRange(seg.table));
        }
        expect_type(
            ValType::I32,
            const_expr_type(seg.offset, &globals, globals.len())?,
        )?;
        if let Some(&f) = seg.init.iter().find(|&&f| f >= total_funcs) {
            return Err(ValidationError::FuncOutOfRange(f));
        }
    }

    for seg in &m.data {
        if seg.memory >= m.total_memories() {
            return Err(ValidationError::MemoryOutOfRange(seg.memory));
        }
        expect_type(
            ValType::I32,
            const_expr_type(seg.offset, &globals, globals.len())?,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        DataSegment, ElementSegment, Export, FuncType, Global, MemoryType, TableType,
    };

    fn base() -> Module {
        Module {
            types: vec![FuncType::new(&[], &[ValType::I32]), FuncType::default()],
            funcs: vec![0, 1],
            codes: vec![Default::default(), Default::default()],
            ..Module::default()
        }
    }

    #[test]
    fn minimal_module_is_valid() {
        assert_eq!(validate_module(&base()), Ok(()));
    }

    #[test]
    fn multi_value_results_rejected() {
        let mut m = base();
        m.types.push(FuncType::new(&[], &[ValType::I32, ValType::I32]));
        assert_eq!(
            validate_module(&m),
            Err(ValidationError::ResultArity { index: 2, arity: 2 })
        );
    }

    #[test]
    fn function_type_out_of_range() {
        let mut m = base();
        m.funcs.push(9);
        assert_eq!(validate_module(&m), Err(ValidationError::TypeOutOfRange(9)));
    }

    #[test]
    fn duplicate_export_names() {
        let mut m = base();
        for f in 0..2 {
            m.exports.push(Export {
                name: "run".into(),
                desc: ExportDesc::Func(f),
            });
        }
        assert_eq!(
            validate_module(&m),
            Err(ValidationError::DuplicateExport("run".into()))
        );
    }

    #[test]
    fn start_must_be_nullary() {
        let mut m = base();
        m.start = Some(0);
        assert!(matches!(
            validate_module(&m),
            Err(ValidationError::StartSignature(_))
        ));
        m.start = Some(1);
        assert_eq!(validate_module(&m), Ok(()));
    }

    #[test]
    fn const_expr_cannot_read_mutable_global() {
        let mut m = base();
        m.globals.push(Global {
            ty: GlobalType::new(ValType::I32, true),
            init: ConstExpr::I32(0),
        });
        m.globals.push(Global {
            ty: GlobalType::new(ValType::I32, false),
            init: ConstExpr::GlobalGet(0),
        });
        assert_eq!(
            validate_module(&m),
            Err(ValidationError::MutableGlobalInConstExpr(0))
        );
    }

    #[test]
    fn global_initializer_type_checked() {
        let mut m = base();
        m.globals.push(Global {
            ty: GlobalType::new(ValType::I64, false),
            init: ConstExpr::I32(1),
        });
        assert_eq!(
            validate_module(&m),
            Err(ValidationError::ConstExprType {
                expected: ValType::I64,
                found: ValType::I32
            })
        );
    }

    #[test]
    fn segments_need_their_targets() {
        let mut m = base();
        m.data.push(DataSegment {
            memory: 0,
            offset: ConstExpr::I32(0),
            init: vec![1],
        });
        assert_eq!(validate_module(&m), Err(ValidationError::MemoryOutOfRange(0)));

        m.memories.push(MemoryType {
            limits: Limits::new(1, None),
        });
        assert_eq!(validate_module(&m), Ok(()));

        m.elements.push(ElementSegment {
            table: 0,
            offset: ConstExpr::I32(0),
            init: vec![0],
        });
        assert_eq!(validate_module(&m), Err(ValidationError::TableOutOfRange(0)));

        m.tables.push(TableType {
            limits: Limits::new(1, None),
        });
        assert_eq!(validate_module(&m), Ok(()));

        m.elements[0].init.push(5);
        assert_eq!(validate_module(&m), Err(ValidationError::FuncOutOfRange(5)));
    }

    #[test]
    fn huge_tables_and_memories_rejected() {
        let mut m = base();
        m.tables.push(TableType {
            limits: Limits::new(u32::MAX, None),
        });
        assert_eq!(
            validate_module(&m),
            Err(ValidationError::TableLimit {
                minimum: u32::MAX,
                limit: MAX_TABLE_ELEMS
            })
        );

        let mut m = base();
        m.memories.push(MemoryType {
            limits: Limits::new(MAX_PAGES + 1, None),
        });
        assert_eq!(
            validate_module(&m),
            Err(ValidationError::HeapLimit {
                minimum: MAX_PAGES + 1,
                limit: MAX_PAGES
            })
        );
    }

    #[test]
    fn inverted_limits_rejected() {
        let mut m = base();
        m.memories.push(MemoryType {
            limits: Limits::new(3, Some(2)),
        });
        assert_eq!(
            validate_module(&m),
            Err(ValidationError::InvalidLimits { min: 3, max: 2 })
        );
    }
}
