//! GPIO driver with edge-interrupt monitoring
//!
//! Per-pin state machine:
//!
//! ```text
//! UNCONFIGURED ──set_direction / set_interrupt──▶ EXPORTED
//! EXPORTED ──set_interrupt──▶ EDGE_CONFIGURED ──monitor spawned──▶ MONITORING
//! MONITORING ──remove_interrupt──▶ EXPORTED (monitor exits after one wait)
//! any ──driver dropped──▶ torn down
//! ```
//!
//! Each monitored pin has one background thread that waits on the pin's
//! edge source with a bounded timeout and forwards every edge to the
//! [`CallbackDispatcher`](hal_runtime::CallbackDispatcher). The thread holds
//! a child of the driver's shutdown token, so both `remove_interrupt` and
//! driver teardown stop it within one wait.
//!
//! Teardown order is fixed: cancel, join every monitor, then unexport pins
//! and unregister resources and callbacks.

mod backend;

pub use backend::{EdgeEvents, GpioBackend, SysfsEdgeEvents, SysfsGpioBackend};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hal_platform::{
    EdgeTrigger, GpioInterface, HalError, InterruptCallback, PinDirection, PinValue,
};
use hal_runtime::{CallbackDispatcher, CallbackId, CancellationToken, HalContext, ResourceKind};
use parking_lot::Mutex;

use crate::claim::ResourceClaim;

/// Driver-side record of one pin.
struct PinInfo {
    claim: ResourceClaim,
    direction: PinDirection,
    exported: bool,
    interrupt_active: AtomicBool,
    callback_id: CallbackId,
    monitor: Option<CancellationToken>,
}

#[derive(Default)]
struct Monitors {
    active: HashMap<u8, JoinHandle<()>>,
    /// Monitors stopped by `remove_interrupt`, joined at teardown.
    retired: Vec<JoinHandle<()>>,
}

/// GPIO controller over a [`GpioBackend`].
///
/// Defaults to the sysfs backend; tests substitute an in-memory one.
pub struct GpioDriver<B: GpioBackend = SysfsGpioBackend> {
    backend: Arc<B>,
    ctx: HalContext,
    pins: Mutex<HashMap<u8, PinInfo>>,
    monitors: Mutex<Monitors>,
    shutdown: CancellationToken,
}

impl GpioDriver<SysfsGpioBackend> {
    /// sysfs-backed driver using `ctx.config.gpio_root`.
    pub fn new(ctx: HalContext) -> Self {
        let backend = SysfsGpioBackend::new(&ctx.config);
        Self::with_backend(ctx, backend)
    }
}

impl<B: GpioBackend> GpioDriver<B> {
    /// Driver over an explicit backend.
    pub fn with_backend(ctx: HalContext, backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            ctx,
            pins: Mutex::new(HashMap::new()),
            monitors: Mutex::new(Monitors::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Backend in use.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Registry id of a configured pin.
    pub fn resource_id(&self, pin: u8) -> Option<u64> {
        self.pins.lock().get(&pin).map(|info| info.claim.id())
    }

    /// Configured direction of a pin.
    pub fn direction(&self, pin: u8) -> Option<PinDirection> {
        self.pins.lock().get(&pin).map(|info| info.direction)
    }

    /// Whether an interrupt is configured on `pin`.
    pub fn is_interrupt_active(&self, pin: u8) -> bool {
        self.pins.lock().get(&pin).is_some_and(|info| info.interrupt_active.load(Ordering::Acquire))
    }

    /// Export `pin` and create its record if this is its first use.
    fn ensure_pin<'a>(
        &self,
        pins: &'a mut HashMap<u8, PinInfo>,
        pin: u8,
        direction: PinDirection,
    ) -> Result<&'a mut PinInfo, HalError> {
        if !pins.contains_key(&pin) {
            self.backend.export(pin)?;
            let claim = ResourceClaim::register(
                &self.ctx.registry,
                ResourceKind::GpioPin,
                format!("GPIO{pin}"),
                u64::from(pin),
            );
            tracing::debug!(pin, resource_id = claim.id(), "gpio exported");
            pins.insert(
                pin,
                PinInfo {
                    claim,
                    direction,
                    exported: true,
                    interrupt_active: AtomicBool::new(false),
                    callback_id: 0,
                    monitor: None,
                },
            );
        }
        pins.get_mut(&pin).ok_or(HalError::PinNotConfigured(pin))
    }

    fn exported_pin(pins: &HashMap<u8, PinInfo>, pin: u8) -> Result<&PinInfo, HalError> {
        pins.get(&pin).filter(|info| info.exported).ok_or(HalError::PinNotConfigured(pin))
    }

    fn spawn_monitor(
        &self,
        pin: u8,
        events: B::Events,
        token: CancellationToken,
    ) -> Result<JoinHandle<()>, HalError> {
        let dispatcher = Arc::clone(&self.ctx.dispatcher);
        let timeout = self.ctx.config.interrupt_poll_timeout();
        let name = format!("gpio{pin}-irq");
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || monitor_loop(pin, events, &dispatcher, &token, timeout))
            .map_err(|e| HalError::spawn(name, e))
    }
}

/// Body of a monitor thread.
fn monitor_loop<E: EdgeEvents>(
    pin: u8,
    mut events: E,
    dispatcher: &CallbackDispatcher,
    token: &CancellationToken,
    timeout: Duration,
) {
    tracing::debug!(pin, "interrupt monitor started");
    while !token.is_cancelled() {
        match events.wait(timeout) {
            Ok(Some(value)) => {
                if token.is_cancelled() {
                    break;
                }
                tracing::trace!(pin, value = %value, "edge");
                dispatcher.invoke_gpio_callback(pin, value);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(pin, error = %e, "edge wait failed, monitor exiting");
                break;
            }
        }
    }
    tracing::debug!(pin, "interrupt monitor exited");
}

impl<B: GpioBackend> GpioInterface for GpioDriver<B> {
    fn set_direction(&self, pin: u8, direction: PinDirection) -> Result<(), HalError> {
        let mut pins = self.pins.lock();
        let info = self.ensure_pin(&mut pins, pin, direction)?;
        info.direction = direction;
        self.backend.set_direction(pin, direction)?;
        self.ctx.registry.set_in_use(info.claim.id(), true);
        Ok(())
    }

    fn write(&self, pin: u8, value: PinValue) -> Result<(), HalError> {
        let pins = self.pins.lock();
        Self::exported_pin(&pins, pin)?;
        self.backend.write_value(pin, value)
    }

    fn read(&self, pin: u8) -> Result<PinValue, HalError> {
        let pins = self.pins.lock();
        Self::exported_pin(&pins, pin)?;
        self.backend.read_value(pin)
    }

    fn set_interrupt(
        &self,
        pin: u8,
        edge: EdgeTrigger,
        callback: InterruptCallback,
    ) -> Result<(), HalError> {
        let mut pins = self.pins.lock();
        let info = self.ensure_pin(&mut pins, pin, PinDirection::Input)?;

        self.backend.set_direction(pin, PinDirection::Input)?;
        info.direction = PinDirection::Input;
        self.backend.set_edge(pin, Some(edge))?;

        // A monitor that hit a read error has exited and must be replaced.
        // Open the edge source before touching the dispatcher so a failure
        // leaves no registration behind.
        let monitor_alive = info.interrupt_active.load(Ordering::Acquire)
            && self.monitors.lock().active.get(&pin).is_some_and(|h| !h.is_finished());
        let events = if monitor_alive { None } else { Some(self.backend.open_events(pin)?) };

        let previous = std::mem::replace(
            &mut info.callback_id,
            self.ctx.dispatcher.register_gpio_callback(pin, callback),
        );
        if previous != 0 {
            self.ctx.dispatcher.unregister_gpio_callback(previous);
        }

        if let Some(events) = events {
            if let Some(stale) = info.monitor.take() {
                stale.cancel();
            }
            let token = self.shutdown.child();
            match self.spawn_monitor(pin, events, token.clone()) {
                Ok(handle) => {
                    info.interrupt_active.store(true, Ordering::Release);
                    info.monitor = Some(token);
                    let mut monitors = self.monitors.lock();
                    monitors.retired.retain(|h| !h.is_finished());
                    if let Some(old) = monitors.active.insert(pin, handle) {
                        monitors.retired.push(old);
                    }
                }
                Err(e) => {
                    info.interrupt_active.store(false, Ordering::Release);
                    self.ctx.dispatcher.unregister_gpio_callback(info.callback_id);
                    info.callback_id = 0;
                    return Err(e);
                }
            }
        }
        tracing::debug!(pin, edge = %edge, callback_id = info.callback_id, "interrupt configured");
        Ok(())
    }

    fn remove_interrupt(&self, pin: u8) -> Result<(), HalError> {
        let mut pins = self.pins.lock();
        let info = pins
            .get_mut(&pin)
            .filter(|info| info.interrupt_active.load(Ordering::Acquire))
            .ok_or(HalError::InvalidState("no interrupt configured on pin"))?;

        let edge_result = self.backend.set_edge(pin, None);
        info.interrupt_active.store(false, Ordering::Release);
        if let Some(token) = info.monitor.take() {
            token.cancel();
        }
        if info.callback_id != 0 {
            self.ctx.dispatcher.unregister_gpio_callback(info.callback_id);
            info.callback_id = 0;
        }
        {
            let mut monitors = self.monitors.lock();
            if let Some(handle) = monitors.active.remove(&pin) {
                monitors.retired.push(handle);
            }
        }
        tracing::debug!(pin, "interrupt removed");
        edge_result
    }

    fn set_debounce(&self, pin: u8, debounce_ms: u32) -> Result<(), HalError> {
        let pins = self.pins.lock();
        Self::exported_pin(&pins, pin)?;
        self.backend.set_debounce(pin, debounce_ms)
    }
}

impl<B: GpioBackend> Drop for GpioDriver<B> {
    fn drop(&mut self) {
        self.shutdown.cancel();

        let monitors = std::mem::take(&mut *self.monitors.lock());
        for handle in monitors.active.into_values().chain(monitors.retired) {
            if handle.join().is_err() {
                tracing::warn!("interrupt monitor panicked");
            }
        }

        for (pin, info) in self.pins.lock().drain() {
            if info.exported {
                if let Err(e) = self.backend.unexport(pin) {
                    tracing::warn!(pin, error = %e, "unexport failed");
                }
            }
            if info.callback_id != 0 {
                self.ctx.dispatcher.unregister_gpio_callback(info.callback_id);
            }
            // Dropping `info.claim` releases and unregisters the resource
        }
    }
}
