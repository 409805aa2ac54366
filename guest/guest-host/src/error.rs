//! Error types for the host control layer.
//!
//! Everything here is a usage error on the embedding side. Faults raised by
//! guest code are never errors; they come back as
//! [`crate::InvocationResult::Failure`].

use std::path::PathBuf;

use thiserror::Error;

use crate::hash::ContentHash;
use crate::registry::ModuleHandle;
use crate::session::SessionState;

/// A program could not be admitted to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("program does not compile: {0}")]
    Compile(#[from] guest_vm::CompileError),

    #[error("program rewrite failed: {0}")]
    Rewrite(#[from] guest_vm::ValidationError),

    #[error("entry point {name:?} must take no parameters and return at most one value, found {ty}")]
    EntrySignature { name: String, ty: guest_vm::FuncType },

    #[error("selector {selector} is exported twice ({first:?} and {second:?})")]
    DuplicateSelector {
        selector: i32,
        first: String,
        second: String,
    },
}

/// `link` failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("no program with digest {0} in the catalog")]
    UnknownDigest(ContentHash),

    #[error("failed to instantiate {digest}: {source}")]
    Instantiate {
        digest: ContentHash,
        #[source]
        source: guest_vm::LinkError,
    },

    #[error("module handle space exhausted")]
    HandlesExhausted,
}

/// A broken call sequence from the embedding runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("handle {0} is not linked")]
    InvalidHandle(ModuleHandle),

    #[error("handle {handle} has no entry point for selector {selector}")]
    UnknownSelector { handle: ModuleHandle, selector: i32 },

    #[error("handle {0} needs both ink and stack budgets set before it can be called")]
    Unconfigured(ModuleHandle),

    #[error("{op} is not allowed while the session is {state:?}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },

    #[error("cannot halt with {0} module(s) still linked")]
    StillLinked(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}
