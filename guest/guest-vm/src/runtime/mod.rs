//! Per-instance runtime state. Every instance owns its memory, table and
//! globals outright; nothing is shared between instances.

pub mod global;
pub mod instance;
pub mod memory;
pub mod table;

pub use global::GlobalCell;
pub use instance::{instantiate, Instance};
pub use memory::{LinearMemory, MAX_PAGES, PAGE_SIZE};
pub use table::{Table, MAX_TABLE_ELEMS};
