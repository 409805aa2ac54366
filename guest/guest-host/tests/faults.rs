mod common;

use common::*;
use guest_host::{GuestFault, HostSession, InkStatus, InvocationResult, ModuleHandle, Value};

fn configured(ink: i64, stack: u32) -> (HostSession, ModuleHandle) {
    let (mut session, digest) = fixture_session();
    let h = session.link(&digest).unwrap();
    session.set_ink(h, ink).unwrap();
    session.set_stack(h, stack).unwrap();
    (session, h)
}

fn fault(session: &mut HostSession, h: ModuleHandle, selector: i32) -> GuestFault {
    match session.call_entry(h, selector).unwrap() {
        InvocationResult::Failure(f) => f,
        other => panic!("selector {selector} returned {other:?}"),
    }
}

#[test]
fn every_fault_kind_is_recovered() {
    let (mut session, h) = configured(1 << 20, 256);
    let cases = [
        (UNREACHABLE, GuestFault::IllegalInstruction),
        (ILLEGAL_OPCODE, GuestFault::IllegalInstruction),
        (LOAD_PAST_END, GuestFault::OutOfBounds),
        (RECURSE, GuestFault::StackExhausted),
        (ABORT_7, GuestFault::Abort(7)),
        (DIVIDE_BY_ZERO, GuestFault::Arithmetic),
        (EMPTY_TABLE_SLOT, GuestFault::BadIndirectCall),
    ];
    for (selector, expected) in cases {
        assert_eq!(fault(&mut session, h, selector), expected, "selector {selector}");
        // the handle keeps working after each fault
        let ok = session.call_entry(h, RETURNS_42).unwrap();
        assert_eq!(ok, InvocationResult::Success(Some(Value::I32(42))));
    }
}

#[test]
fn ink_exhaustion_sticks_until_reset() {
    let (mut session, h) = configured(1000, 16);
    assert_eq!(fault(&mut session, h, SPIN), GuestFault::InkExhausted);
    assert_eq!(session.ink_status(h), Ok(InkStatus::Exhausted));
    // the spin loop costs one ink per instruction, so it drains exactly
    assert_eq!(session.ink_left(h), Ok(0));

    assert_eq!(fault(&mut session, h, RETURNS_42), GuestFault::InkExhausted);

    session.set_ink(h, 50).unwrap();
    assert_eq!(session.ink_status(h), Ok(InkStatus::Ready));
    assert!(session.call_entry(h, RETURNS_42).unwrap().is_success());
}

#[test]
fn oversized_charge_leaves_budget_untouched() {
    // i32.const then a load priced at 3 with only 2 ink left
    let (mut session, h) = configured(3, 16);
    assert_eq!(fault(&mut session, h, LOAD_PAST_END), GuestFault::InkExhausted);
    assert_eq!(session.ink_left(h), Ok(2));
}

#[test]
fn negative_budget_is_exhausted_on_first_instruction() {
    let (mut session, h) = configured(-5, 16);
    assert_eq!(session.ink_status(h), Ok(InkStatus::Ready));
    assert_eq!(fault(&mut session, h, RETURNS_42), GuestFault::InkExhausted);
    assert_eq!(session.ink_left(h), Ok(-5));
}

#[test]
fn stack_depth_is_restored_after_any_outcome() {
    let (mut session, h) = configured(1 << 20, 32);
    assert_eq!(fault(&mut session, h, RECURSE), GuestFault::StackExhausted);
    assert_eq!(session.stack_left(h), Ok(32));
    assert_eq!(fault(&mut session, h, ABORT_7), GuestFault::Abort(7));
    assert_eq!(session.stack_left(h), Ok(32));
    session.call_entry(h, RETURNS_42).unwrap();
    assert_eq!(session.stack_left(h), Ok(32));
}

#[test]
fn zero_stack_limit_refuses_the_entry_frame() {
    let (mut session, h) = configured(100, 0);
    assert_eq!(fault(&mut session, h, RETURNS_42), GuestFault::StackExhausted);
    assert_eq!(session.ink_left(h), Ok(100));
}

#[test]
fn sentinels_survive_every_fault() {
    let (mut session, h) = configured(1 << 16, 64);
    let sentinels = [
        Value::I32(i32::MIN),
        Value::F32(f32::to_bits(f32::NAN) | 1),
        Value::I64(-1),
    ];
    for selector in [
        UNREACHABLE,
        LOAD_PAST_END,
        SPIN,
        RECURSE,
        ABORT_7,
        DIVIDE_BY_ZERO,
        EMPTY_TABLE_SLOT,
    ] {
        session.set_ink(h, 1 << 16).unwrap();
        for v in sentinels {
            session.push_operand(v).unwrap();
        }
        assert!(session.call_entry(h, selector).unwrap().is_failure());
        assert_eq!(session.operands(), &sentinels[..], "selector {selector}");
        for _ in 0..sentinels.len() {
            session.pop_operand().unwrap();
        }
    }
}

#[test]
fn guest_memory_is_private_to_the_handle() {
    let (mut session, h) = configured(1000, 8);
    assert_eq!(
        session.call_entry(h, MEMORY_ROUND_TRIP).unwrap().value(),
        Some(Value::I32(1234))
    );
    let linked = session.registry().get(h).unwrap();
    let module = linked.lock();
    let memory = module.instance().memory().unwrap();
    assert_eq!(memory.read(16, 4).unwrap(), &1234i32.to_le_bytes());
}
