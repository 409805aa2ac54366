//! Instruction decoding, pricing and execution.

pub mod decode;
pub mod instructions;
pub mod interpreter;
pub mod numeric;
pub mod pricing;
pub mod stack;

pub use decode::Instr;
pub use pricing::Pricing;
pub use stack::ValueStack;
