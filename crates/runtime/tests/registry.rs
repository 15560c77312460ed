//! Integration tests for the resource registry and its RAII guard.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::thread;

use hal_runtime::{ResourceGuard, ResourceKind, ResourceRegistry};

// ── Lifecycle ───────────────────────────────────────────────────────────────

#[test]
fn gpio17_add_twice_release_thrice_then_unregister() {
    let reg = ResourceRegistry::new();
    let id = reg.register_resource(ResourceKind::GpioPin, "GPIO17", 17);
    let before = reg.resource_count();

    assert_eq!(reg.add_ref(id), 2);
    assert_eq!(reg.add_ref(id), 3);
    assert_eq!(reg.release(id), 2);
    assert_eq!(reg.release(id), 1);
    assert_eq!(reg.release(id), 0);

    assert!(reg.unregister_resource(id));
    assert_eq!(reg.resource_count(), before - 1);
}

#[test]
fn in_use_flag_round_trips() {
    let reg = ResourceRegistry::new();
    let id = reg.register_resource(ResourceKind::I2cBus, "I2C1", 1);
    reg.set_in_use(id, true);
    assert!(reg.is_in_use(id));
    reg.set_in_use(id, false);
    assert!(!reg.is_in_use(id));
}

#[test]
fn duplicate_names_get_distinct_ids() {
    let reg = ResourceRegistry::new();
    let a = reg.register_resource(ResourceKind::GpioPin, "GPIO4", 4);
    let b = reg.register_resource(ResourceKind::GpioPin, "GPIO4", 4);
    assert_ne!(a, b);
    assert_eq!(reg.resource_count(), 2);
}

// ── Guard ───────────────────────────────────────────────────────────────────

#[test]
fn moved_guard_releases_exactly_once() {
    let reg = Arc::new(ResourceRegistry::new());
    let id = reg.register_resource(ResourceKind::SpiBus, "SPI0.0", 0);

    // Reference result: plain construct-then-drop
    drop(ResourceGuard::new(Arc::clone(&reg), id));
    let after_plain = reg.ref_count(id);

    let guard = ResourceGuard::new(Arc::clone(&reg), id);
    assert_eq!(reg.ref_count(id), 2);
    let moved = guard;
    let boxed = Box::new(moved);
    assert_eq!(reg.ref_count(id), 2);
    drop(boxed);

    assert_eq!(reg.ref_count(id), after_plain);
    assert_eq!(after_plain, 1);
}

#[test]
fn guard_moved_into_thread_releases_there() {
    let reg = Arc::new(ResourceRegistry::new());
    let id = reg.register_resource(ResourceKind::Timer, "TIMER1", 1);
    let guard = ResourceGuard::new(Arc::clone(&reg), id);
    thread::spawn(move || {
        assert_eq!(guard.id(), id);
    })
    .join()
    .unwrap();
    assert_eq!(reg.ref_count(id), 1);
}

// ── Concurrency ─────────────────────────────────────────────────────────────

#[test]
fn concurrent_registration_loses_nothing() {
    const THREADS: usize = 16;
    let reg = Arc::new(ResourceRegistry::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|n| {
            let reg = Arc::clone(&reg);
            thread::spawn(move || {
                let id = reg.register_resource(ResourceKind::GpioPin, format!("GPIO{n}"), n as u64);
                for _ in 0..100 {
                    reg.add_ref(id);
                    reg.release(id);
                }
                id
            })
        })
        .collect();
    let mut ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();

    assert_eq!(ids.len(), THREADS);
    assert_eq!(reg.resource_count(), THREADS);
    assert!(ids.iter().all(|&id| reg.ref_count(id) == 1));
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest::proptest! {
    /// N add_ref calls followed by N release calls restore the count.
    #[test]
    fn add_ref_release_are_inverse(extra in 0u32..8, n in 0u32..64) {
        let reg = ResourceRegistry::new();
        let id = reg.register_resource(ResourceKind::AdcChannel, "ADC0", 0);
        for _ in 0..extra {
            reg.add_ref(id);
        }
        let before = reg.ref_count(id);
        for _ in 0..n {
            reg.add_ref(id);
        }
        for _ in 0..n {
            reg.release(id);
        }
        proptest::prop_assert_eq!(reg.ref_count(id), before);
    }

    /// Unregister succeeds exactly when the count has reached zero.
    #[test]
    fn unregister_requires_zero_refcount(adds in 0u32..8, releases in 0u32..16) {
        let reg = ResourceRegistry::new();
        let id = reg.register_resource(ResourceKind::PwmChannel, "PWM0:0", 0);
        for _ in 0..adds {
            reg.add_ref(id);
        }
        for _ in 0..releases {
            reg.release(id);
        }
        let expected_zero = releases > adds;
        proptest::prop_assert_eq!(reg.ref_count(id) == 0, expected_zero);
        proptest::prop_assert_eq!(reg.unregister_resource(id), expected_zero);
    }
}
