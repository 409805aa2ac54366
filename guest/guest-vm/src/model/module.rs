//! Module-level IR: declarations, function bodies, segments, and the
//! rewrites applied to a module before it is admitted for linking.

use super::types::{
    Export, ExportDesc, FuncIdx, FuncType, GlobalIdx, GlobalType, Import, ImportDesc, MemIdx,
    MemoryType, TableIdx, TableType, TypeIdx, ValType, Value,
};
use crate::error::ValidationError;

/// A run of `count` locals sharing one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDecl {
    pub count: u32,
    pub val_type: ValType,
}

/// Constant initializer expression, decoded at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    GlobalGet(GlobalIdx),
}

impl ConstExpr {
    /// The value of a literal initializer; `None` for `global.get`.
    pub fn literal(self) -> Option<Value> {
        match self {
            ConstExpr::I32(v) => Some(Value::I32(v)),
            ConstExpr::I64(v) => Some(Value::I64(v)),
            ConstExpr::F32(b) => Some(Value::F32(b)),
            ConstExpr::F64(b) => Some(Value::F64(b)),
            ConstExpr::GlobalGet(_) => None,
        }
    }
}

/// Locals and raw instruction bytes (including the final `end`) of one function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeBody {
    pub locals: Vec<LocalDecl>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

/// Active element segment writing function indices into a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSegment {
    pub table: TableIdx,
    pub offset: ConstExpr,
    pub init: Vec<FuncIdx>,
}

/// Active data segment writing bytes into a memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub memory: MemIdx,
    pub offset: ConstExpr,
    pub init: Vec<u8>,
}

/// Parsed, not yet instantiated, guest module.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type index of each defined (non-imported) function.
    pub funcs: Vec<TypeIdx>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<FuncIdx>,
    pub elements: Vec<ElementSegment>,
    pub codes: Vec<CodeBody>,
    pub data: Vec<DataSegment>,
}

impl Module {
    fn imported(&self, pick: impl Fn(&ImportDesc) -> bool) -> u32 {
        self.imports.iter().filter(|i| pick(&i.desc)).count() as u32
    }

    pub fn imported_funcs(&self) -> u32 {
        self.imported(|d| matches!(d, ImportDesc::Func(_)))
    }

    pub fn total_funcs(&self) -> u32 {
        self.imported_funcs() + self.funcs.len() as u32
    }

    pub fn total_tables(&self) -> u32 {
        self.imported(|d| matches!(d, ImportDesc::Table(_))) + self.tables.len() as u32
    }

    pub fn total_memories(&self) -> u32 {
        self.imported(|d| matches!(d, ImportDesc::Memory(_))) + self.memories.len() as u32
    }

    pub fn total_globals(&self) -> u32 {
        self.imported(|d| matches!(d, ImportDesc::Global(_))) + self.globals.len() as u32
    }

    /// Type index of function `func` in the combined (imports first) index space.
    pub fn func_type_idx(&self, func: FuncIdx) -> Option<TypeIdx> {
        let imported = self.imports.iter().filter_map(|i| match i.desc {
            ImportDesc::Func(ty) => Some(ty),
            _ => None,
        });
        let mut all = imported.chain(self.funcs.iter().copied());
        all.nth(func as usize)
    }

    pub fn func_type(&self, func: FuncIdx) -> Option<&FuncType> {
        self.func_type_idx(func)
            .and_then(|ty| self.types.get(ty as usize))
    }

    pub fn export(&self, name: &str) -> Option<ExportDesc> {
        self.exports.iter().find(|e| e.name == name).map(|e| e.desc)
    }

    /// Bound every memory's maximum size by `limit` pages.
    pub fn limit_heap(&mut self, limit: u32) -> Result<(), ValidationError> {
        if self.memories.len() > 1 {
            return Err(ValidationError::MultipleMemories);
        }
        for memory in &mut self.memories {
            let bound = memory.limits.max.unwrap_or(limit).min(limit);
            if memory.limits.min > bound {
                return Err(ValidationError::HeapLimit {
                    minimum: memory.limits.min,
                    limit: bound,
                });
            }
            memory.limits.max = Some(bound);
        }
        Ok(())
    }

    /// Bound every table's size by `limit` elements.
    pub fn limit_table(&mut self, limit: u32) -> Result<(), ValidationError> {
        for table in &mut self.tables {
            let bound = table.limits.max.unwrap_or(limit).min(limit);
            if table.limits.min > bound {
                return Err(ValidationError::TableLimit {
                    minimum: table.limits.min,
                    limit: bound,
                });
            }
            table.limits.max = Some(bound);
        }
        Ok(())
    }

    /// Turn the start function into a regular export called `name`, so that
    /// instantiation never runs guest code.
    pub fn move_start_function(&mut self, name: &str) -> Result<(), ValidationError> {
        if self.export(name).is_some() {
            return Err(ValidationError::ExportExists(name.to_owned()));
        }
        if let Some(start) = self.start.take() {
            self.exports.push(Export {
                name: name.to_owned(),
                desc: ExportDesc::Func(start),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Limits;

    fn with_memory(min: u32, max: Option<u32>) -> Module {
        Module {
            memories: vec![MemoryType {
                limits: Limits::new(min, max),
            }],
            ..Module::default()
        }
    }

    #[test]
    fn heap_limit_caps_maximum() {
        let mut m = with_memory(1, None);
        m.limit_heap(4).unwrap();
        assert_eq!(m.memories[0].limits.max, Some(4));

        let mut m = with_memory(1, Some(2));
        m.limit_heap(4).unwrap();
        assert_eq!(m.memories[0].limits.max, Some(2));
    }

    #[test]
    fn heap_limit_rejects_large_minimum() {
        let mut m = with_memory(8, None);
        assert_eq!(
            m.limit_heap(4),
            Err(ValidationError::HeapLimit { minimum: 8, limit: 4 })
        );
    }

    #[test]
    fn table_limit_bounds_declared_tables() {
        let mut m = Module {
            tables: vec![TableType {
                limits: Limits::new(2, None),
            }],
            ..Module::default()
        };
        m.limit_table(8).unwrap();
        assert_eq!(m.tables[0].limits.max, Some(8));

        m.tables[0].limits = Limits::new(u32::MAX, None);
        assert_eq!(
            m.limit_table(8),
            Err(ValidationError::TableLimit {
                minimum: u32::MAX,
                limit: 8
            })
        );
    }

    #[test]
    fn start_function_becomes_export() {
        let mut m = Module {
            start: Some(3),
            ..Module::default()
        };
        m.move_start_function("init").unwrap();
        assert_eq!(m.start, None);
        assert_eq!(m.export("init"), Some(ExportDesc::Func(3)));
        assert_eq!(
            m.move_start_function("init"),
            Err(ValidationError::ExportExists("init".into()))
        );
    }

    #[test]
    fn function_types_span_imports() {
        let m = Module {
            types: vec![FuncType::new(&[ValType::I32], &[]), FuncType::default()],
            imports: vec![Import {
                module: "host".into(),
                name: "abort".into(),
                desc: ImportDesc::Func(0),
            }],
            funcs: vec![1],
            ..Module::default()
        };
        assert_eq!(m.func_type_idx(0), Some(0));
        assert_eq!(m.func_type_idx(1), Some(1));
        assert_eq!(m.func_type_idx(2), None);
        assert_eq!(m.total_funcs(), 2);
    }
}
