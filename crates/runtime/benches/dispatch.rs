//! Criterion benchmarks for callback dispatch and registry churn.
//!
//! Run: cargo bench -p hal-runtime --bench dispatch
//!
//! Results show:
//!   gpio_fan_out/*  cost of one invoke against K handlers on one pin
//!   register_cycle  register + unregister round trip under the write lock
//!   registry_ref_cycle  add_ref + release on one resource

#![allow(
    clippy::unwrap_used, // benchmark helpers use unwrap for brevity
    clippy::expect_used,
    clippy::panic,
    missing_docs, // criterion_group! macro generates undocumented items
)]

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hal_platform::PinValue;
use hal_runtime::{CallbackDispatcher, ResourceKind, ResourceRegistry};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn dispatcher_with_handlers(pin: u8, count: usize, hits: &Arc<AtomicU64>) -> CallbackDispatcher {
    let d = CallbackDispatcher::new();
    for _ in 0..count {
        let hits = Arc::clone(hits);
        d.register_gpio_callback(
            pin,
            Arc::new(move |_, _| {
                hits.fetch_add(1, Ordering::Relaxed);
            }),
        );
    }
    d
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_gpio_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("gpio_fan_out");
    group.measurement_time(Duration::from_secs(5));
    for count in [1usize, 8, 64] {
        let hits = Arc::new(AtomicU64::new(0));
        let d = dispatcher_with_handlers(17, count, &hits);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(d.invoke_gpio_callback(17, PinValue::High)));
        });
    }
    group.finish();
}

fn bench_register_cycle(c: &mut Criterion) {
    let d = CallbackDispatcher::new();
    c.bench_function("register_cycle", |b| {
        b.iter(|| {
            let id = d.register_timer_callback(1, Arc::new(|| {}));
            black_box(d.unregister_timer_callback(id))
        });
    });
}

fn bench_registry_ref_cycle(c: &mut Criterion) {
    let registry = ResourceRegistry::new();
    let id = registry.register_resource(ResourceKind::GpioPin, "GPIO17", 17);
    c.bench_function("registry_ref_cycle", |b| {
        b.iter(|| {
            registry.add_ref(id);
            black_box(registry.release(id))
        });
    });
}

criterion_group!(benches, bench_gpio_fan_out, bench_register_cycle, bench_registry_ref_cycle);
criterion_main!(benches);
