//! Immutable, content-addressed table of admitted guest programs.
//!
//! Programs are compiled once when they are inserted. Linking only looks a
//! digest up here and instantiates the already compiled module.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use guest_vm::model::{ExportDesc, FuncIdx};
use guest_vm::{CompileError, CompiledModule, Pricing};
use tracing::debug;

use crate::config::HostConfig;
use crate::error::CatalogError;
use crate::hash::ContentHash;

/// One admitted program and its selector table.
#[derive(Debug)]
pub struct CatalogEntry {
    digest: ContentHash,
    compiled: Arc<CompiledModule>,
    entries: BTreeMap<i32, FuncIdx>,
    start: Option<FuncIdx>,
}

impl CatalogEntry {
    pub fn digest(&self) -> ContentHash {
        self.digest
    }

    pub fn compiled(&self) -> &Arc<CompiledModule> {
        &self.compiled
    }

    /// Function behind `selector`, if the program exports one.
    pub fn entry(&self, selector: i32) -> Option<FuncIdx> {
        self.entries.get(&selector).copied()
    }

    pub fn selectors(&self) -> impl Iterator<Item = i32> + '_ {
        self.entries.keys().copied()
    }

    /// The program's start function, exported under the configured name.
    pub fn start(&self) -> Option<FuncIdx> {
        self.start
    }
}

/// Collect `<prefix><n>` function exports into a selector table.
fn entry_table(
    compiled: &CompiledModule,
    prefix: &str,
) -> Result<BTreeMap<i32, FuncIdx>, CatalogError> {
    let mut table = BTreeMap::new();
    let mut names: BTreeMap<i32, &str> = BTreeMap::new();
    for export in &compiled.module().exports {
        let ExportDesc::Func(func) = export.desc else {
            continue;
        };
        let Some(selector) = export
            .name
            .strip_prefix(prefix)
            .and_then(|n| n.parse::<i32>().ok())
        else {
            continue;
        };
        let ty = compiled
            .func_type(func)
            .ok_or(CatalogError::Rewrite(guest_vm::ValidationError::FuncOutOfRange(func)))?;
        if !ty.params.is_empty() || ty.results.len() > 1 {
            return Err(CatalogError::EntrySignature {
                name: export.name.clone(),
                ty: ty.clone(),
            });
        }
        if let Some(first) = names.insert(selector, &export.name) {
            return Err(CatalogError::DuplicateSelector {
                selector,
                first: first.to_owned(),
                second: export.name.clone(),
            });
        }
        table.insert(selector, func);
    }
    Ok(table)
}

/// Collects programs, then freezes them into a [`ModuleCatalog`].
#[derive(Debug)]
pub struct CatalogBuilder {
    config: HostConfig,
    entries: HashMap<ContentHash, Arc<CatalogEntry>>,
}

impl CatalogBuilder {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    /// Compile `bytes` and add the program under its digest. Inserting the
    /// same bytes again returns the same digest and changes nothing.
    pub fn insert(&mut self, bytes: &[u8]) -> Result<ContentHash, CatalogError> {
        let digest = ContentHash::of(bytes);
        if self.entries.contains_key(&digest) {
            return Ok(digest);
        }

        let mut module = guest_vm::parse(bytes).map_err(CompileError::from)?;
        module.limit_heap(self.config.heap_bound_pages)?;
        module.limit_table(self.config.table_bound_elems)?;
        module.move_start_function(&self.config.start_export)?;
        let compiled = CompiledModule::from_module(module)?;
        let entries = entry_table(&compiled, &self.config.entry_prefix)?;
        let start = compiled.export_func(&self.config.start_export);

        debug!(
            digest = %digest.short(),
            entries = entries.len(),
            has_start = start.is_some(),
            "admitted guest program"
        );
        self.entries.insert(
            digest,
            Arc::new(CatalogEntry {
                digest,
                compiled: Arc::new(compiled),
                entries,
                start,
            }),
        );
        Ok(digest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> ModuleCatalog {
        ModuleCatalog {
            config: self.config,
            entries: self.entries,
        }
    }
}

#[derive(Debug)]
pub struct ModuleCatalog {
    config: HostConfig,
    entries: HashMap<ContentHash, Arc<CatalogEntry>>,
}

impl ModuleCatalog {
    pub fn get(&self, digest: &ContentHash) -> Option<&Arc<CatalogEntry>> {
        self.entries.get(digest)
    }

    pub fn contains(&self, digest: &ContentHash) -> bool {
        self.entries.contains_key(digest)
    }

    pub fn digests(&self) -> impl Iterator<Item = &ContentHash> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn pricing(&self) -> &Pricing {
        &self.config.pricing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guest_vm::builder::{Body, ModuleBuilder};
    use guest_vm::{FuncType, ValType};

    fn program(exports: &[&str], ty: FuncType) -> Vec<u8> {
        let mut b = ModuleBuilder::new();
        let f = b.func(&ty, &[], Body::new().op(0x01));
        for name in exports {
            b.export_func(name, f);
        }
        b.build()
    }

    #[test]
    fn entry_exports_become_selectors() {
        let mut builder = CatalogBuilder::new(HostConfig::default());
        let bytes = program(&["entry_1", "entry_-4", "helper", "entry_x"], FuncType::default());
        let digest = builder.insert(&bytes).unwrap();
        assert_eq!(builder.insert(&bytes).unwrap(), digest);
        assert_eq!(builder.len(), 1);

        let catalog = builder.build();
        let entry = catalog.get(&digest).unwrap();
        assert_eq!(entry.selectors().collect::<Vec<_>>(), vec![-4, 1]);
        assert_eq!(entry.entry(1), Some(0));
        assert_eq!(entry.entry(2), None);
        assert_eq!(entry.start(), None);
    }

    #[test]
    fn entries_must_be_nullary() {
        let mut builder = CatalogBuilder::new(HostConfig::default());
        let bytes = program(&["entry_1"], FuncType::new(&[ValType::I32], &[]));
        assert!(matches!(
            builder.insert(&bytes),
            Err(CatalogError::EntrySignature { .. })
        ));
    }

    #[test]
    fn selectors_must_be_unique() {
        let mut builder = CatalogBuilder::new(HostConfig::default());
        let bytes = program(&["entry_1", "entry_01"], FuncType::default());
        assert!(matches!(
            builder.insert(&bytes),
            Err(CatalogError::DuplicateSelector { selector: 1, .. })
        ));
    }

    #[test]
    fn oversized_heap_is_refused() {
        let mut b = ModuleBuilder::new();
        b.memory(4, None);
        let config = HostConfig {
            heap_bound_pages: 2,
            ..HostConfig::default()
        };
        let err = CatalogBuilder::new(config).insert(&b.build()).unwrap_err();
        assert_eq!(
            err,
            CatalogError::Rewrite(guest_vm::ValidationError::HeapLimit {
                minimum: 4,
                limit: 2
            })
        );
    }

    #[test]
    fn oversized_table_is_refused_before_linking() {
        let mut b = ModuleBuilder::new();
        b.table(u32::MAX, None);
        let f = b.func(&FuncType::default(), &[], Body::new());
        b.export_func("entry_1", f);

        let mut builder = CatalogBuilder::new(HostConfig::default());
        let err = builder.insert(&b.build()).unwrap_err();
        assert_eq!(
            err,
            CatalogError::Rewrite(guest_vm::ValidationError::TableLimit {
                minimum: u32::MAX,
                limit: 4096
            })
        );
        assert!(builder.is_empty());
    }

    #[test]
    fn table_without_maximum_gets_the_configured_one() {
        let mut b = ModuleBuilder::new();
        b.table(8, None);
        let config = HostConfig {
            table_bound_elems: 16,
            ..HostConfig::default()
        };
        let mut builder = CatalogBuilder::new(config);
        let digest = builder.insert(&b.build()).unwrap();
        let catalog = builder.build();
        let tables = &catalog.get(&digest).unwrap().compiled().module().tables;
        assert_eq!(tables[0].limits.max, Some(16));
    }

    #[test]
    fn garbage_is_refused() {
        let mut builder = CatalogBuilder::new(HostConfig::default());
        assert!(matches!(
            builder.insert(b"not a guest"),
            Err(CatalogError::Compile(_))
        ));
        assert!(builder.is_empty());
    }
}
