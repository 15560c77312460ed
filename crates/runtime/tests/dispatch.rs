//! Integration tests for callback fan-out, isolation and concurrent use.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use hal_platform::PinValue;
use hal_runtime::{CallbackDispatcher, HalContext, ResourceKind};
use parking_lot::Mutex;

fn counting_gpio(d: &CallbackDispatcher, pin: u8, hits: &Arc<AtomicUsize>) -> u64 {
    let hits = Arc::clone(hits);
    d.register_gpio_callback(
        pin,
        Arc::new(move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

fn counting_timer(d: &CallbackDispatcher, timer: u32, hits: &Arc<AtomicUsize>) -> u64 {
    let hits = Arc::clone(hits);
    d.register_timer_callback(
        timer,
        Arc::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

// ── Fan-out ─────────────────────────────────────────────────────────────────

#[test]
fn k_handlers_on_one_pin_each_run_once() {
    let d = CallbackDispatcher::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..5 {
        let seen = Arc::clone(&seen);
        d.register_gpio_callback(22, Arc::new(move |pin, value| seen.lock().push((pin, value))));
    }
    assert_eq!(d.invoke_gpio_callback(22, PinValue::Low), 5);
    let seen = seen.lock();
    assert_eq!(seen.len(), 5);
    assert!(seen.iter().all(|&(pin, value)| pin == 22 && value == PinValue::Low));
}

#[test]
fn pin17_three_invocations() {
    let d = CallbackDispatcher::new();
    let count = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(PinValue::Low));
    {
        let count = Arc::clone(&count);
        let last = Arc::clone(&last);
        d.register_gpio_callback(
            17,
            Arc::new(move |_, value| {
                count.fetch_add(1, Ordering::SeqCst);
                *last.lock() = value;
            }),
        );
    }
    for _ in 0..3 {
        d.invoke_gpio_callback(17, PinValue::High);
    }
    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert_eq!(*last.lock(), PinValue::High);
}

// ── Isolation ───────────────────────────────────────────────────────────────

#[test]
fn gpio_keys_are_isolated() {
    let d = CallbackDispatcher::new();
    let on_17 = Arc::new(AtomicUsize::new(0));
    let on_27 = Arc::new(AtomicUsize::new(0));
    counting_gpio(&d, 17, &on_17);
    counting_gpio(&d, 27, &on_27);

    d.invoke_gpio_callback(17, PinValue::High);
    assert_eq!(on_17.load(Ordering::SeqCst), 1);
    assert_eq!(on_27.load(Ordering::SeqCst), 0);
}

#[test]
fn timer_keys_are_isolated() {
    let d = CallbackDispatcher::new();
    let t1 = Arc::new(AtomicUsize::new(0));
    let t2 = Arc::new(AtomicUsize::new(0));
    counting_timer(&d, 1, &t1);
    counting_timer(&d, 2, &t2);

    d.invoke_timer_callback(2);
    d.invoke_timer_callback(2);
    assert_eq!(t1.load(Ordering::SeqCst), 0);
    assert_eq!(t2.load(Ordering::SeqCst), 2);
}

#[test]
fn gpio_pin_and_timer_id_with_same_number_do_not_mix() {
    let d = CallbackDispatcher::new();
    let gpio = Arc::new(AtomicUsize::new(0));
    let timer = Arc::new(AtomicUsize::new(0));
    counting_gpio(&d, 1, &gpio);
    counting_timer(&d, 1, &timer);

    d.invoke_timer_callback(1);
    assert_eq!(gpio.load(Ordering::SeqCst), 0);
    assert_eq!(timer.load(Ordering::SeqCst), 1);
}

// ── Unregister / clear ──────────────────────────────────────────────────────

#[test]
fn unregister_only_affects_that_id() {
    let d = CallbackDispatcher::new();
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));
    let id_a = counting_gpio(&d, 5, &a);
    counting_gpio(&d, 5, &b);

    assert!(d.unregister_gpio_callback(id_a));
    assert!(!d.unregister_gpio_callback(id_a));
    d.invoke_gpio_callback(5, PinValue::High);
    assert_eq!(a.load(Ordering::SeqCst), 0);
    assert_eq!(b.load(Ordering::SeqCst), 1);
}

#[test]
fn clear_all_silences_every_key() {
    let d = CallbackDispatcher::new();
    let gpio = Arc::new(AtomicUsize::new(0));
    let timer = Arc::new(AtomicUsize::new(0));
    counting_gpio(&d, 17, &gpio);
    counting_gpio(&d, 27, &gpio);
    counting_timer(&d, 1, &timer);

    d.clear_all();
    assert_eq!(d.invoke_gpio_callback(17, PinValue::High), 0);
    assert_eq!(d.invoke_gpio_callback(27, PinValue::High), 0);
    assert_eq!(d.invoke_timer_callback(1), 0);
    assert_eq!(gpio.load(Ordering::SeqCst), 0);
    assert_eq!(timer.load(Ordering::SeqCst), 0);
    assert_eq!(d.gpio_callback_count() + d.timer_callback_count(), 0);
}

// ── Concurrency ─────────────────────────────────────────────────────────────

#[test]
fn concurrent_register_and_invoke_counts_match() {
    const THREADS: usize = 16;
    let ctx = HalContext::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|n| {
            let ctx = ctx.clone();
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let pin = u8::try_from(n).unwrap();
                barrier.wait();
                ctx.registry.register_resource(ResourceKind::GpioPin, format!("GPIO{pin}"), 0);
                ctx.dispatcher.register_gpio_callback(
                    pin,
                    Arc::new(move |_, _| {
                        calls.fetch_add(1, Ordering::SeqCst);
                    }),
                );
                ctx.dispatcher.invoke_gpio_callback(pin, PinValue::High)
            })
        })
        .collect();

    let delivered: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(delivered, THREADS);
    assert_eq!(calls.load(Ordering::SeqCst), THREADS);
    assert_eq!(ctx.registry.resource_count(), THREADS);
    assert_eq!(ctx.dispatcher.gpio_callback_count(), THREADS);
}

#[test]
fn slow_handler_does_not_block_registration() {
    let d = Arc::new(CallbackDispatcher::new());
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    {
        let entered = Arc::clone(&entered);
        let release = Arc::clone(&release);
        d.register_timer_callback(
            7,
            Arc::new(move || {
                entered.wait();
                release.wait();
            }),
        );
    }
    let invoker = {
        let d = Arc::clone(&d);
        thread::spawn(move || d.invoke_timer_callback(7))
    };
    entered.wait();
    // The handler is running; the write lock must still be available
    let id = d.register_timer_callback(8, Arc::new(|| {}));
    assert!(d.unregister_timer_callback(id));
    release.wait();
    assert_eq!(invoker.join().unwrap(), 1);
}
