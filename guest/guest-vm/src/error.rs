//! Crate-level error types for guest-vm.

use thiserror::Error;

use crate::model::{FuncIdx, FuncType, GlobalIdx, MemIdx, TableIdx, TypeIdx, ValType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Binary(#[from] crate::binary::BinaryReadError),
}

/// Structural problems found after a successful parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("type index {0} out of range")]
    TypeOutOfRange(TypeIdx),

    #[error("function index {0} out of range")]
    FuncOutOfRange(FuncIdx),

    #[error("table index {0} out of range")]
    TableOutOfRange(TableIdx),

    #[error("memory index {0} out of range")]
    MemoryOutOfRange(MemIdx),

    #[error("global index {0} out of range")]
    GlobalOutOfRange(GlobalIdx),

    #[error("at most one memory is supported")]
    MultipleMemories,

    #[error("at most one table is supported")]
    MultipleTables,

    #[error("limits max {max} is below min {min}")]
    InvalidLimits { min: u32, max: u32 },

    #[error("type {index} returns {arity} values; at most one is supported")]
    ResultArity { index: TypeIdx, arity: usize },

    #[error("export name {0:?} is used more than once")]
    DuplicateExport(String),

    #[error("export {0:?} already exists")]
    ExportExists(String),

    #[error("start function must have type [] -> [], found {0}")]
    StartSignature(FuncType),

    #[error("constant expression reads mutable global {0}")]
    MutableGlobalInConstExpr(GlobalIdx),

    #[error("constant expression has type {found:?}, expected {expected:?}")]
    ConstExprType { expected: ValType, found: ValType },

    #[error("memory minimum of {minimum} pages exceeds the heap limit of {limit} pages")]
    HeapLimit { minimum: u32, limit: u32 },

    #[error("table minimum of {minimum} elements exceeds the limit of {limit}")]
    TableLimit { minimum: u32, limit: u32 },
}

/// Failure to turn bytes into an executable [`crate::CompiledModule`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("function {func}: malformed body at byte {offset}: {msg}")]
    Decode {
        func: FuncIdx,
        offset: usize,
        msg: &'static str,
    },
}

impl From<crate::binary::BinaryReadError> for CompileError {
    fn from(e: crate::binary::BinaryReadError) -> Self {
        CompileError::Parse(ParseError::Binary(e))
    }
}

/// Failure to instantiate a compiled module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("unresolved import: {module}.{name}")]
    UnresolvedImport { module: String, name: String },

    #[error("unsupported import kind for {module}.{name}; only functions may be imported")]
    UnsupportedImport { module: String, name: String },

    #[error("element segment {segment} does not fit in its table")]
    ElemOutOfBounds { segment: usize },

    #[error("data segment {segment} does not fit in memory")]
    DataOutOfBounds { segment: usize },

    #[error("initializer does not evaluate to a value of the declared type")]
    InvalidInitializer,
}

/// A fault raised while guest code runs. Traps always unwind the whole
/// invocation; they never resume.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    #[error("unreachable executed")]
    Unreachable,

    #[error("illegal opcode 0x{0:02x}")]
    IllegalOpcode(u8),

    #[error("out of bounds memory access at {addr} (+{len} bytes)")]
    MemoryOutOfBounds { addr: u64, len: usize },

    #[error("ink exhausted")]
    InkExhausted,

    #[error("call stack exhausted")]
    StackExhausted,

    #[error("guest aborted with code {0}")]
    Abort(i32),

    #[error("integer divide by zero")]
    DivideByZero,

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("undefined table element {0}")]
    UndefinedElement(u32),

    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,

    #[error("operand type mismatch: {0}")]
    TypeMismatch(&'static str),

    #[error("malformed code: {0}")]
    Malformed(&'static str),
}
