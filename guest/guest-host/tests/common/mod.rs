//! Shared guest program and session setup for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use guest_host::{CatalogBuilder, ContentHash, HostConfig, HostSession, ModuleCatalog};
use guest_vm::builder::{Body, ModuleBuilder};
use guest_vm::model::{ConstExpr, GlobalType};
use guest_vm::vm::instructions::op;
use guest_vm::{FuncType, ValType};

pub const RETURNS_42: i32 = 1;
pub const UNREACHABLE: i32 = 2;
pub const LOAD_PAST_END: i32 = 3;
pub const SPIN: i32 = 4;
pub const RECURSE: i32 = 5;
pub const ABORT_7: i32 = 6;
pub const MEMORY_ROUND_TRIP: i32 = 7;
pub const BUMP_COUNTER: i32 = 8;
pub const DIVIDE_BY_ZERO: i32 = 9;
pub const EMPTY_TABLE_SLOT: i32 = 10;
pub const ILLEGAL_OPCODE: i32 = 11;

/// Value the start function stores into the counter.
pub const START_COUNTER: i32 = 100;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One page of memory, a one-slot table, a mutable counter, a start
/// function and one entry point per behavior the tests exercise.
pub fn fixture_program() -> Vec<u8> {
    let nullary = FuncType::new(&[], &[]);
    let returns_i32 = FuncType::new(&[], &[ValType::I32]);

    let mut b = ModuleBuilder::new();
    let abort = b.import_func("host", "abort", &FuncType::new(&[ValType::I32], &[]));
    b.memory(1, Some(1));
    b.table(1, None);
    let counter = b.global(GlobalType::new(ValType::I32, true), ConstExpr::I32(0));

    let f = b.func(
        &returns_i32,
        &[],
        Body::new().i32_const(40).i32_const(2).op(op::I32_ADD),
    );
    b.export_func("entry_1", f);

    let f = b.func(&nullary, &[], Body::new().unreachable());
    b.export_func("entry_2", f);

    let f = b.func(
        &nullary,
        &[],
        Body::new().i32_const(65536).i32_load(0).drop_(),
    );
    b.export_func("entry_3", f);

    let f = b.func(&nullary, &[], Body::new().loop_().br(0).end());
    b.export_func("entry_4", f);

    // abort is function 0, so this is the fifth defined function
    let recurse = 5;
    let f = b.func(&nullary, &[], Body::new().call(recurse));
    assert_eq!(f, recurse);
    b.export_func("entry_5", f);

    let f = b.func(&nullary, &[], Body::new().i32_const(7).call(abort));
    b.export_func("entry_6", f);

    let f = b.func(
        &returns_i32,
        &[],
        Body::new()
            .i32_const(16)
            .i32_const(1234)
            .i32_store(0)
            .i32_const(16)
            .i32_load(0),
    );
    b.export_func("entry_7", f);

    let f = b.func(
        &returns_i32,
        &[],
        Body::new()
            .global_get(counter)
            .i32_const(1)
            .op(op::I32_ADD)
            .global_set(counter)
            .global_get(counter),
    );
    b.export_func("entry_8", f);

    let f = b.func(
        &returns_i32,
        &[],
        Body::new().i32_const(1).i32_const(0).op(op::I32_DIV_S),
    );
    b.export_func("entry_9", f);

    let slot_ty = b.type_index(&nullary);
    let f = b.func(&nullary, &[], Body::new().i32_const(0).call_indirect(slot_ty));
    b.export_func("entry_10", f);

    let f = b.func(&nullary, &[], Body::new().op(0xFF));
    b.export_func("entry_11", f);

    let start = b.func(
        &nullary,
        &[],
        Body::new().i32_const(START_COUNTER).global_set(counter),
    );
    b.start(start);

    b.build()
}

pub fn fixture_catalog() -> (Arc<ModuleCatalog>, ContentHash) {
    let mut builder = CatalogBuilder::new(HostConfig::default());
    let digest = builder
        .insert(&fixture_program())
        .expect("fixture program is admitted");
    (Arc::new(builder.build()), digest)
}

pub fn fixture_session() -> (HostSession, ContentHash) {
    init_tracing();
    let (catalog, digest) = fixture_catalog();
    (HostSession::with_catalog(catalog), digest)
}
