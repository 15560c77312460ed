//! Resource registry
//!
//! A catalog of live hardware handles (pins, buses, channels) keyed by a
//! monotonically increasing identifier. Each record carries a reference count
//! and an in-use flag. Drivers hold only the identifier, never the record.
//!
//! Lookups of unknown identifiers return sentinels (`0`, `false`, `None`)
//! instead of errors so the registry can sit on real-time call paths.
//!
//! # Reference counting
//!
//! ```text
//! register  → refcount = 1, in_use = false
//! add_ref   → refcount + 1
//! release   → refcount - 1 (saturates at 0)
//! unregister succeeds only when refcount == 0
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// Registry identifier. `0` is never allocated and means "no resource".
pub type ResourceId = u64;

/// Kind of hardware handle a resource stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Raw file descriptor
    FileDescriptor,
    /// Exported GPIO line
    GpioPin,
    /// spidev bus/chip-select pair
    SpiBus,
    /// i2c-dev adapter
    I2cBus,
    /// tty device
    UartPort,
    /// sysfs PWM channel
    PwmChannel,
    /// Software timer
    Timer,
    /// IIO device
    AdcChannel,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FileDescriptor => "fd",
            Self::GpioPin => "gpio",
            Self::SpiBus => "spi",
            Self::I2cBus => "i2c",
            Self::UartPort => "uart",
            Self::PwmChannel => "pwm",
            Self::Timer => "timer",
            Self::AdcChannel => "adc",
        };
        f.write_str(s)
    }
}

/// Point-in-time copy of one registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceInfo {
    /// Registry identifier
    pub id: ResourceId,
    /// Handle kind
    pub kind: ResourceKind,
    /// Human-readable name, e.g. `GPIO17`
    pub name: String,
    /// Opaque handle value (pin number, fd, bus number)
    pub handle: u64,
    /// Reference count at snapshot time
    pub ref_count: u32,
    /// In-use flag at snapshot time
    pub in_use: bool,
}

struct ResourceRecord {
    kind: ResourceKind,
    name: String,
    handle: u64,
    ref_count: AtomicU32,
    in_use: AtomicBool,
}

impl ResourceRecord {
    fn snapshot(&self, id: ResourceId) -> ResourceInfo {
        ResourceInfo {
            id,
            kind: self.kind,
            name: self.name.clone(),
            handle: self.handle,
            ref_count: self.ref_count.load(Ordering::Acquire),
            in_use: self.in_use.load(Ordering::Acquire),
        }
    }
}

/// Thread-safe catalog of hardware resources.
///
/// A single lock serialises map mutation and every refcount
/// read-modify-write; no operation performs I/O while holding it.
pub struct ResourceRegistry {
    resources: Mutex<HashMap<ResourceId, ResourceRecord>>,
    next_id: AtomicU64,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resources", &self.resource_count())
            .finish_non_exhaustive()
    }
}

impl ResourceRegistry {
    /// Create an empty registry. Identifiers start at 1.
    pub fn new() -> Self {
        Self { resources: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    /// Record a new resource with refcount 1 and in-use cleared.
    ///
    /// Names and handles need not be unique; only the returned id is.
    pub fn register_resource(
        &self,
        kind: ResourceKind,
        name: impl Into<String>,
        handle: u64,
    ) -> ResourceId {
        let name = name.into();
        let mut resources = self.resources.lock();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(id, kind = %kind, name = %name, "resource registered");
        resources.insert(
            id,
            ResourceRecord {
                kind,
                name,
                handle,
                ref_count: AtomicU32::new(1),
                in_use: AtomicBool::new(false),
            },
        );
        id
    }

    /// Remove a resource whose refcount has reached zero.
    ///
    /// Returns `false` for unknown ids and for resources still referenced.
    pub fn unregister_resource(&self, id: ResourceId) -> bool {
        let mut resources = self.resources.lock();
        match resources.get(&id) {
            Some(record) if record.ref_count.load(Ordering::Acquire) == 0 => {
                resources.remove(&id);
                tracing::trace!(id, "resource unregistered");
                true
            }
            _ => false,
        }
    }

    /// Increment the refcount; returns the new count, or 0 for unknown ids.
    pub fn add_ref(&self, id: ResourceId) -> u32 {
        let resources = self.resources.lock();
        resources.get(&id).map_or(0, |record| {
            record.ref_count.fetch_add(1, Ordering::AcqRel).saturating_add(1)
        })
    }

    /// Decrement the refcount; returns the new count.
    ///
    /// Returns 0 for unknown ids and leaves a zero count untouched.
    pub fn release(&self, id: ResourceId) -> u32 {
        let resources = self.resources.lock();
        let Some(record) = resources.get(&id) else {
            return 0;
        };
        let current = record.ref_count.load(Ordering::Acquire);
        if current == 0 {
            return 0;
        }
        record.ref_count.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
    }

    /// Current refcount, or 0 for unknown ids.
    pub fn ref_count(&self, id: ResourceId) -> u32 {
        self.resources.lock().get(&id).map_or(0, |r| r.ref_count.load(Ordering::Acquire))
    }

    /// In-use flag, or `false` for unknown ids.
    pub fn is_in_use(&self, id: ResourceId) -> bool {
        self.resources.lock().get(&id).is_some_and(|r| r.in_use.load(Ordering::Acquire))
    }

    /// Set the in-use flag. Unknown ids are ignored.
    pub fn set_in_use(&self, id: ResourceId, in_use: bool) {
        if let Some(record) = self.resources.lock().get(&id) {
            record.in_use.store(in_use, Ordering::Release);
        }
    }

    /// Owned snapshot of one record.
    pub fn resource_info(&self, id: ResourceId) -> Option<ResourceInfo> {
        self.resources.lock().get(&id).map(|r| r.snapshot(id))
    }

    /// Snapshot of every record, ordered by id.
    pub fn snapshot(&self) -> Vec<ResourceInfo> {
        let mut all: Vec<ResourceInfo> =
            self.resources.lock().iter().map(|(id, r)| r.snapshot(*id)).collect();
        all.sort_unstable_by_key(|info| info.id);
        all
    }

    /// Number of registered resources.
    pub fn resource_count(&self) -> usize {
        self.resources.lock().len()
    }

    /// Drop every record regardless of refcount. Ids are not reused.
    pub fn clear_all(&self) {
        self.resources.lock().clear();
    }
}

/// Scoped reference over one resource.
///
/// Construction adds a reference (unless the id is 0); dropping releases it
/// exactly once. Moving the guard moves that obligation with it.
#[must_use = "dropping the guard releases the reference immediately"]
pub struct ResourceGuard {
    registry: Arc<ResourceRegistry>,
    id: ResourceId,
}

impl ResourceGuard {
    /// Take a reference on `id`.
    pub fn new(registry: Arc<ResourceRegistry>, id: ResourceId) -> Self {
        if id != 0 {
            registry.add_ref(id);
        }
        Self { registry, id }
    }

    /// Guarded resource id.
    pub fn id(&self) -> ResourceId {
        self.id
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if self.id != 0 {
            self.registry.release(self.id);
        }
    }
}

impl fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGuard").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn registration_starts_at_one_reference() {
        let reg = ResourceRegistry::new();
        let id = reg.register_resource(ResourceKind::GpioPin, "GPIO17", 17);
        assert_eq!(reg.ref_count(id), 1);
        assert!(!reg.is_in_use(id));
        assert!(!reg.unregister_resource(id), "referenced resource must stay");
        assert_eq!(reg.resource_count(), 1);
    }

    #[test]
    fn ids_are_monotonic_from_one() {
        let reg = ResourceRegistry::new();
        let a = reg.register_resource(ResourceKind::SpiBus, "SPI0.0", 0);
        let b = reg.register_resource(ResourceKind::SpiBus, "SPI0.0", 0);
        assert_eq!(a, 1);
        assert!(b > a);
    }

    #[test]
    fn unknown_ids_report_sentinels() {
        let reg = ResourceRegistry::new();
        assert_eq!(reg.add_ref(99), 0);
        assert_eq!(reg.release(99), 0);
        assert_eq!(reg.ref_count(99), 0);
        assert!(!reg.is_in_use(99));
        assert!(!reg.unregister_resource(99));
        assert!(reg.resource_info(99).is_none());
        reg.set_in_use(99, true);
    }

    #[test]
    fn release_does_not_underflow() {
        let reg = ResourceRegistry::new();
        let id = reg.register_resource(ResourceKind::Timer, "TIMER1", 1);
        assert_eq!(reg.release(id), 0);
        assert_eq!(reg.release(id), 0);
        assert_eq!(reg.ref_count(id), 0);
    }

    #[test]
    fn info_is_an_owned_snapshot() {
        let reg = ResourceRegistry::new();
        let id = reg.register_resource(ResourceKind::UartPort, "UART:/dev/ttyS0", 3);
        reg.set_in_use(id, true);
        let info = reg.resource_info(id).unwrap();
        assert_eq!(info.kind, ResourceKind::UartPort);
        assert_eq!(info.handle, 3);
        assert!(info.in_use);
        reg.release(id);
        assert!(reg.unregister_resource(id));
        // Snapshot outlives the record
        assert_eq!(info.name, "UART:/dev/ttyS0");
    }

    #[test]
    fn clear_all_empties_without_reusing_ids() {
        let reg = ResourceRegistry::new();
        let first = reg.register_resource(ResourceKind::AdcChannel, "ADC0", 0);
        reg.clear_all();
        assert_eq!(reg.resource_count(), 0);
        let second = reg.register_resource(ResourceKind::AdcChannel, "ADC0", 0);
        assert!(second > first);
    }

    #[test]
    fn guard_adds_and_releases_once() {
        let reg = Arc::new(ResourceRegistry::new());
        let id = reg.register_resource(ResourceKind::PwmChannel, "PWM0:0", 0);
        {
            let guard = ResourceGuard::new(Arc::clone(&reg), id);
            assert_eq!(guard.id(), id);
            assert_eq!(reg.ref_count(id), 2);
        }
        assert_eq!(reg.ref_count(id), 1);
    }

    #[test]
    fn guard_over_zero_id_is_inert() {
        let reg = Arc::new(ResourceRegistry::new());
        let id = reg.register_resource(ResourceKind::GpioPin, "GPIO4", 4);
        drop(ResourceGuard::new(Arc::clone(&reg), 0));
        assert_eq!(reg.ref_count(id), 1);
    }

    #[test]
    fn snapshot_is_ordered_by_id() {
        let reg = ResourceRegistry::new();
        for pin in 0..8u64 {
            reg.register_resource(ResourceKind::GpioPin, format!("GPIO{pin}"), pin);
        }
        let ids: Vec<_> = reg.snapshot().iter().map(|i| i.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 8);
    }
}
