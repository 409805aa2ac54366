//! Host functions offered to guests as function imports.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Trap;
use crate::model::{FuncType, Value};

/// Host function callable from guest code. Returns at most one value.
pub type HostFunc = dyn Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync;

/// Resolves function imports at instantiation time. Only functions can be
/// imported; tables, memories and globals always belong to the instance.
pub trait ImportResolver {
    fn resolve_func(&self, module: &str, name: &str, ty: &FuncType) -> Option<Arc<HostFunc>>;
}

/// Name-keyed set of host functions with their signatures.
#[derive(Default, Clone)]
pub struct Imports {
    funcs: HashMap<(String, String), (FuncType, Arc<HostFunc>)>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define<F>(&mut self, module: &str, name: &str, ty: FuncType, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync + 'static,
    {
        self.funcs
            .insert((module.to_owned(), name.to_owned()), (ty, Arc::new(f)));
        self
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

impl std::fmt::Debug for Imports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.funcs.keys()).finish()
    }
}

impl ImportResolver for Imports {
    /// A name matches only if the declared signature is identical.
    fn resolve_func(&self, module: &str, name: &str, ty: &FuncType) -> Option<Arc<HostFunc>> {
        let (declared, f) = self.funcs.get(&(module.to_owned(), name.to_owned()))?;
        (declared == ty).then(|| Arc::clone(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValType;

    #[test]
    fn resolution_checks_signature() {
        let mut imports = Imports::new();
        imports.define("env", "id", FuncType::new(&[ValType::I32], &[ValType::I32]), |a| {
            Ok(Some(a[0]))
        });
        let good = FuncType::new(&[ValType::I32], &[ValType::I32]);
        let bad = FuncType::new(&[ValType::I64], &[ValType::I32]);
        assert!(imports.resolve_func("env", "id", &good).is_some());
        assert!(imports.resolve_func("env", "id", &bad).is_none());
        assert!(imports.resolve_func("env", "other", &good).is_none());
    }
}
