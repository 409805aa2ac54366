mod common;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;

use common::*;
use guest_host::{
    ContentHash, HostError, HostSession, LinkError, ModuleHandle, ModuleRegistry, Value,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn shared_registry() -> (Arc<ModuleRegistry>, ContentHash) {
    init_tracing();
    let (catalog, digest) = fixture_catalog();
    (Arc::new(ModuleRegistry::new(catalog)), digest)
}

#[test]
fn handles_are_never_reused() {
    let (registry, digest) = shared_registry();
    let mut seen = Vec::new();
    for _ in 0..50 {
        let h = registry.link(&digest).unwrap();
        assert!(seen.last().map_or(true, |&prev| h > prev));
        seen.push(h);
        registry.unlink(h).unwrap();
    }
    assert!(registry.is_empty());

    let stale = seen[0];
    assert_eq!(registry.unlink(stale), Err(HostError::InvalidHandle(stale)));
    assert!(registry.get(stale).is_err());
}

#[test]
fn unknown_digest_is_rejected() {
    let (registry, _) = shared_registry();
    let missing = ContentHash::from_bytes([7; 32]);
    assert_eq!(
        registry.link(&missing),
        Err(LinkError::UnknownDigest(missing))
    );
    assert!(registry.is_empty());
}

#[test]
fn sessions_cannot_touch_each_others_handles() {
    let (registry, digest) = shared_registry();
    let mut alice = HostSession::new(Arc::clone(&registry));
    let mut bob = HostSession::new(Arc::clone(&registry));

    let h = alice.link(&digest).unwrap();
    assert!(registry.is_linked(h));
    assert_eq!(bob.set_ink(h, 10), Err(HostError::InvalidHandle(h)));
    assert_eq!(bob.ink_left(h), Err(HostError::InvalidHandle(h)));
    assert_eq!(bob.call_entry(h, RETURNS_42), Err(HostError::InvalidHandle(h)));
    assert_eq!(bob.unlink(h), Err(HostError::InvalidHandle(h)));
    assert!(registry.is_linked(h));

    alice.unlink(h).unwrap();
    alice.halt().unwrap();
    // bob never linked anything, so there is nothing to unlink first
    assert!(bob.halt().is_err());
}

#[test]
fn concurrent_sessions_stay_independent() {
    let (registry, digest) = shared_registry();
    let workers: Vec<_> = (0..4u64)
        .map(|seed| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut session = HostSession::new(registry);
                let mut live: Vec<ModuleHandle> = Vec::new();
                let mut issued = Vec::new();
                let mut bumps = HashMap::new();

                for _ in 0..200 {
                    match rng.gen_range(0..4) {
                        0 | 1 if live.len() < 8 => {
                            let h = session.link(&digest).unwrap();
                            session.set_ink(h, 10_000).unwrap();
                            session.set_stack(h, 64).unwrap();
                            live.push(h);
                            issued.push(h);
                        }
                        2 if !live.is_empty() => {
                            let h = live.swap_remove(rng.gen_range(0..live.len()));
                            session.unlink(h).unwrap();
                            bumps.remove(&h);
                        }
                        _ if !live.is_empty() => {
                            let h = live[rng.gen_range(0..live.len())];
                            let count = bumps.entry(h).or_insert(0);
                            *count += 1;
                            let result = session.call_entry(h, BUMP_COUNTER).unwrap();
                            assert_eq!(result.value(), Some(Value::I32(*count)));
                        }
                        _ => {}
                    }
                }
                for h in live.drain(..) {
                    session.unlink(h).unwrap();
                }
                if !issued.is_empty() {
                    session.halt().unwrap();
                }
                issued
            })
        })
        .collect();

    let mut all = HashSet::new();
    for worker in workers {
        for h in worker.join().unwrap() {
            assert!(all.insert(h), "handle {h} issued twice");
        }
    }
    assert!(registry.is_empty());
}
