//! guest-host: the control layer that links guest programs by content
//! digest, meters them with ink and call-depth budgets, invokes their entry
//! points behind a recovery boundary, and unlinks them again.
//!
//! ```text
//! CatalogBuilder::insert(bytes) -> ContentHash
//!        │ build()
//!        ▼
//! ModuleCatalog ──► ModuleRegistry ──► HostSession
//!                   link / unlink       set_ink / set_stack
//!                                       call_entry ─► Invoker ─► TrapGuard
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod hash;
pub mod imports;
pub mod invoke;
pub mod meter;
pub mod registry;
pub mod session;

pub use catalog::{CatalogBuilder, CatalogEntry, ModuleCatalog};
pub use config::HostConfig;
pub use error::{CatalogError, ConfigError, HostError, LinkError};
pub use hash::{ContentHash, ParseHashError};
pub use imports::host_imports;
pub use invoke::{GuestFault, InvocationResult, Invoker, TrapGuard};
pub use meter::{InkMeter, InkStatus, StackMeter};
pub use registry::{LinkedModule, ModuleHandle, ModuleRegistry};
pub use session::{HostSession, SessionState};

pub use guest_vm::{Value, ValueStack};
