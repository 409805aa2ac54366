mod common;

use std::io::Write;
use std::sync::Arc;

use common::*;
use guest_host::{CatalogBuilder, CatalogError, ConfigError, HostConfig, HostSession};
use guest_vm::builder::{Body, ModuleBuilder};
use guest_vm::{FuncType, ValidationError};

#[test]
fn config_file_drives_pricing_and_entry_names() {
    init_tracing();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
heap_bound_pages = 4
entry_prefix = "run_"

[pricing]
base = 2
"#
    )
    .unwrap();
    let config = HostConfig::from_toml_file(file.path()).unwrap();
    assert_eq!(config.heap_bound_pages, 4);
    assert_eq!(config.start_export, "guest_start");

    let mut b = ModuleBuilder::new();
    let f = b.func(
        &FuncType::new(&[], &[guest_vm::ValType::I32]),
        &[],
        Body::new().i32_const(5),
    );
    b.export_func("run_3", f).export_func("entry_1", f);

    let mut catalog = CatalogBuilder::new(config);
    let digest = catalog.insert(&b.build()).unwrap();
    let catalog = Arc::new(catalog.build());
    assert_eq!(catalog.get(&digest).unwrap().selectors().collect::<Vec<_>>(), vec![3]);

    let mut session = HostSession::with_catalog(catalog);
    let h = session.link(&digest).unwrap();
    session.set_ink(h, 100).unwrap();
    session.set_stack(h, 4).unwrap();
    assert!(session.call_entry(h, 3).unwrap().is_success());
    // a constant and the end, two ink each
    assert_eq!(session.ink_left(h), Ok(96));
    assert!(session.call_entry(h, 1).is_err());
}

#[test]
fn heap_bound_from_config_rejects_large_memories() {
    let config = HostConfig::from_toml_str("heap_bound_pages = 2").unwrap();
    let mut b = ModuleBuilder::new();
    b.memory(3, None);
    let err = CatalogBuilder::new(config).insert(&b.build()).unwrap_err();
    assert_eq!(
        err,
        CatalogError::Rewrite(ValidationError::HeapLimit {
            minimum: 3,
            limit: 2
        })
    );
}

#[test]
fn missing_and_malformed_files_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(matches!(
        HostConfig::from_toml_file(&missing),
        Err(ConfigError::Read { path, .. }) if path == missing
    ));

    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "heap_bound_pages = \"many\"").unwrap();
    assert!(matches!(
        HostConfig::from_toml_file(&bad),
        Err(ConfigError::Parse(_))
    ));
}
