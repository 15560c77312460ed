//! Callback dispatch
//!
//! Registers user handlers for GPIO edges (keyed by pin) and timer ticks
//! (keyed by timer id) and delivers events to them from monitor threads.
//!
//! Each table sits behind its own `RwLock`. Delivery follows a two-phase
//! protocol:
//!
//! 1. Copy the key's callback ids under the read lock, then drop the lock.
//! 2. For each id, re-take the read lock only long enough to clone the
//!    handler `Arc`, drop the lock, then call the handler.
//!
//! No handler ever runs while a table lock is held, so a handler may
//! register or unregister callbacks (which needs the write lock). Ids that
//! vanish between the two phases are skipped.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use hal_platform::{InterruptCallback, PinValue, TimerCallback};
use parking_lot::RwLock;

/// Callback registration identifier. `0` is never allocated.
pub type CallbackId = u64;

/// Timer key used by the timer table.
pub type TimerId = u32;

/// One keyed handler table: a primary map plus a per-key index that keeps
/// insertion order.
struct Table<K, C> {
    entries: HashMap<CallbackId, (K, C)>,
    by_key: HashMap<K, Vec<CallbackId>>,
}

impl<K: Copy + Eq + Hash, C: Clone> Table<K, C> {
    fn new() -> Self {
        Self { entries: HashMap::new(), by_key: HashMap::new() }
    }

    fn insert(&mut self, id: CallbackId, key: K, callback: C) {
        self.entries.insert(id, (key, callback));
        self.by_key.entry(key).or_default().push(id);
    }

    fn remove(&mut self, id: CallbackId) -> bool {
        let Some((key, _)) = self.entries.remove(&id) else {
            return false;
        };
        if let Some(ids) = self.by_key.get_mut(&key) {
            ids.retain(|&other| other != id);
            if ids.is_empty() {
                self.by_key.remove(&key);
            }
        }
        true
    }

    fn ids_for(&self, key: K) -> Vec<CallbackId> {
        self.by_key.get(&key).cloned().unwrap_or_default()
    }

    fn handler(&self, id: CallbackId) -> Option<C> {
        self.entries.get(&id).map(|(_, callback)| callback.clone())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.by_key.clear();
    }
}

/// Copy-then-release-then-invoke over one table. Returns the number of
/// handlers called.
fn deliver<K, C>(table: &RwLock<Table<K, C>>, key: K, mut call: impl FnMut(C)) -> usize
where
    K: Copy + Eq + Hash,
    C: Clone,
{
    let ids = table.read().ids_for(key);
    let mut delivered = 0usize;
    for id in ids {
        let handler = table.read().handler(id);
        match handler {
            Some(callback) => {
                call(callback);
                delivered = delivered.saturating_add(1);
            }
            None => tracing::trace!(callback_id = id, "callback vanished before delivery"),
        }
    }
    delivered
}

/// Registry of GPIO-interrupt and timer handlers.
///
/// Identifiers come from one counter shared by both tables, so a GPIO
/// callback id and a timer callback id never collide.
pub struct CallbackDispatcher {
    gpio: RwLock<Table<u8, InterruptCallback>>,
    timer: RwLock<Table<TimerId, TimerCallback>>,
    next_id: AtomicU64,
}

impl Default for CallbackDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackDispatcher")
            .field("gpio_callbacks", &self.gpio.read().len())
            .field("timer_callbacks", &self.timer.read().len())
            .finish_non_exhaustive()
    }
}

impl CallbackDispatcher {
    /// Create empty tables. Ids start at 1.
    pub fn new() -> Self {
        Self {
            gpio: RwLock::new(Table::new()),
            timer: RwLock::new(Table::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> CallbackId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // ── GPIO ────────────────────────────────────────────────────────────────

    /// Register a handler for edges on `pin`.
    pub fn register_gpio_callback(&self, pin: u8, callback: InterruptCallback) -> CallbackId {
        let mut table = self.gpio.write();
        let id = self.allocate_id();
        table.insert(id, pin, callback);
        tracing::trace!(pin, callback_id = id, "gpio callback registered");
        id
    }

    /// Remove a GPIO handler. Returns `false` for unknown ids.
    pub fn unregister_gpio_callback(&self, id: CallbackId) -> bool {
        self.gpio.write().remove(id)
    }

    /// Call every handler registered for `pin`, in registration order.
    ///
    /// Returns the number of handlers called.
    pub fn invoke_gpio_callback(&self, pin: u8, value: PinValue) -> usize {
        deliver(&self.gpio, pin, |callback| callback(pin, value))
    }

    /// Number of registered GPIO handlers.
    pub fn gpio_callback_count(&self) -> usize {
        self.gpio.read().len()
    }

    // ── Timer ───────────────────────────────────────────────────────────────

    /// Register a handler for ticks of `timer_id`.
    pub fn register_timer_callback(
        &self,
        timer_id: TimerId,
        callback: TimerCallback,
    ) -> CallbackId {
        let mut table = self.timer.write();
        let id = self.allocate_id();
        table.insert(id, timer_id, callback);
        tracing::trace!(timer_id, callback_id = id, "timer callback registered");
        id
    }

    /// Remove a timer handler. Returns `false` for unknown ids.
    pub fn unregister_timer_callback(&self, id: CallbackId) -> bool {
        self.timer.write().remove(id)
    }

    /// Call every handler registered for `timer_id`, in registration order.
    ///
    /// Returns the number of handlers called.
    pub fn invoke_timer_callback(&self, timer_id: TimerId) -> usize {
        deliver(&self.timer, timer_id, |callback| callback())
    }

    /// Number of registered timer handlers.
    pub fn timer_callback_count(&self) -> usize {
        self.timer.read().len()
    }

    /// Empty both tables.
    pub fn clear_all(&self) {
        self.gpio.write().clear();
        self.timer.write().clear();
    }
}
