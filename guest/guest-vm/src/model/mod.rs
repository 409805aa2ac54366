//! Guest module IR.

pub mod module;
pub mod types;

pub use module::{CodeBody, ConstExpr, DataSegment, ElementSegment, Global, LocalDecl, Module};
pub use types::{
    Export, ExportDesc, FuncIdx, FuncType, GlobalIdx, GlobalType, Import, ImportDesc, Limits,
    MemIdx, MemoryType, TableIdx, TableType, TypeIdx, ValType, Value,
};
