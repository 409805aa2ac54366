//! guest-vm: parser, validator and metered interpreter for sandboxed guest
//! modules in the WebAssembly MVP binary format.
//!
//! The pipeline is `parse` → (optional rewriting of the [`Module`]) →
//! [`CompiledModule::from_module`] → [`instantiate`] → [`Instance::invoke`].
//! Instantiation never runs guest code; every instruction executed by
//! `invoke` is first charged to a [`Checkpoint`].

pub mod binary;
pub mod builder;
pub mod compile;
pub mod error;
pub mod host;
pub mod meter;
pub mod model;
pub mod runtime;
pub mod validate;
pub mod vm;

pub use compile::CompiledModule;
pub use error::{CompileError, LinkError, ParseError, Trap, ValidationError};
pub use host::{HostFunc, ImportResolver, Imports};
pub use meter::{Checkpoint, Unmetered};
pub use model::{FuncType, Module, ValType, Value};
pub use runtime::{instantiate, Instance};
pub use vm::{Pricing, ValueStack};

/// Parse a binary into a [`Module`].
pub fn parse(bytes: &[u8]) -> Result<Module, ParseError> {
    Ok(binary::sections::parse_module(bytes)?)
}

/// Check the structural rules a module must satisfy before compilation.
pub fn validate(m: &Module) -> Result<(), ValidationError> {
    validate::validate_module(m)
}

/// Parse, validate and decode in one step.
pub fn compile(bytes: &[u8]) -> Result<CompiledModule, CompileError> {
    CompiledModule::from_module(parse(bytes)?)
}
