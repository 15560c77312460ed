//! In-memory backends that never touch the kernel
//!
//! [`MockGpioBackend`] stands in for sysfs under the real [`GpioDriver`]
//! state machine, with edges injected from the test. [`MockHal`] builds a
//! full peripheral set whose buses loop data back in memory; its timer is
//! the real [`LinuxTimer`] since that needs no kernel interface.

#![cfg(any(test, feature = "mock"))]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hal_platform::{
    AdcConfig, AdcInterface, AdcReadCallback, AdcResolution, EdgeTrigger, GpioInterface, Hal,
    HalError, I2cInterface, PinDirection, PinValue, Polarity, PwmInterface, RealtimePolicy,
    RealtimeState, SpiInterface, SpiMode, TimerInterface, UartConfig, UartInterface,
};
use hal_runtime::{HalContext, ResourceKind};
use parking_lot::Mutex;

use crate::claim::ResourceClaim;
use crate::gpio::{EdgeEvents, GpioBackend, GpioDriver};
use crate::LinuxTimer;

fn not_found(what: &str) -> HalError {
    HalError::io(format!("mock/{what}"), io::Error::from(io::ErrorKind::NotFound))
}

// ── GPIO ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MockPin {
    exported: bool,
    export_count: usize,
    direction: Option<PinDirection>,
    value: PinValue,
    edge: Option<EdgeTrigger>,
    debounce_ms: u32,
    /// `None` on the channel stands for a failed read of `value`.
    events: Option<Sender<Option<PinValue>>>,
    open_events_count: usize,
}

#[derive(Default)]
struct MockGpioState {
    pins: HashMap<u8, MockPin>,
    fail_exports: bool,
}

/// In-memory [`GpioBackend`]. Clones share state, so a test can keep a
/// handle for inspection after handing the backend to a driver.
#[derive(Clone, Default)]
pub struct MockGpioBackend {
    state: Arc<Mutex<MockGpioState>>,
}

impl MockGpioBackend {
    /// Backend with no pins exported.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later export fail with a permission error.
    pub fn fail_exports(&self, fail: bool) {
        self.state.lock().fail_exports = fail;
    }

    /// Drive `pin` to `value` and, when edge detection is armed, raise an
    /// edge event. Returns whether an event was queued.
    pub fn inject_edge(&self, pin: u8, value: PinValue) -> bool {
        let mut state = self.state.lock();
        let entry = state.pins.entry(pin).or_default();
        entry.value = value;
        match (&entry.edge, &entry.events) {
            (Some(_), Some(tx)) => tx.send(Some(value)).is_ok(),
            _ => false,
        }
    }

    /// Make the next wait on `pin`'s open edge source fail with an I/O error.
    pub fn fail_edge_source(&self, pin: u8) -> bool {
        let state = self.state.lock();
        state.pins.get(&pin).and_then(|p| p.events.as_ref()).is_some_and(|tx| tx.send(None).is_ok())
    }

    /// Whether `pin` is currently exported.
    pub fn is_exported(&self, pin: u8) -> bool {
        self.state.lock().pins.get(&pin).is_some_and(|p| p.exported)
    }

    /// Number of exports performed on `pin`.
    pub fn export_count(&self, pin: u8) -> usize {
        self.state.lock().pins.get(&pin).map_or(0, |p| p.export_count)
    }

    /// Number of edge sources opened on `pin`.
    pub fn open_events_count(&self, pin: u8) -> usize {
        self.state.lock().pins.get(&pin).map_or(0, |p| p.open_events_count)
    }

    /// Edge mode last written, `None` when disabled.
    pub fn edge(&self, pin: u8) -> Option<EdgeTrigger> {
        self.state.lock().pins.get(&pin).and_then(|p| p.edge)
    }

    /// Direction last written.
    pub fn direction(&self, pin: u8) -> Option<PinDirection> {
        self.state.lock().pins.get(&pin).and_then(|p| p.direction)
    }

    /// Debounce last written.
    pub fn debounce_ms(&self, pin: u8) -> u32 {
        self.state.lock().pins.get(&pin).map_or(0, |p| p.debounce_ms)
    }

    fn with_exported<T>(
        &self,
        pin: u8,
        f: impl FnOnce(&mut MockPin) -> T,
    ) -> Result<T, HalError> {
        let mut state = self.state.lock();
        match state.pins.get_mut(&pin) {
            Some(p) if p.exported => Ok(f(p)),
            _ => Err(not_found("gpio")),
        }
    }
}

/// Edge source fed by [`MockGpioBackend::inject_edge`].
pub struct MockEdgeEvents {
    rx: Receiver<Option<PinValue>>,
}

impl EdgeEvents for MockEdgeEvents {
    fn wait(&mut self, timeout: Duration) -> Result<Option<PinValue>, HalError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Some(value)) => Ok(Some(value)),
            Ok(None) => {
                Err(HalError::io("mock/gpio/value", io::Error::from_raw_os_error(libc::EIO)))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                // Pin unexported underneath the monitor; behave like an idle line
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

impl GpioBackend for MockGpioBackend {
    type Events = MockEdgeEvents;

    fn export(&self, pin: u8) -> Result<(), HalError> {
        let mut state = self.state.lock();
        if state.fail_exports {
            return Err(HalError::io(
                "mock/gpio/export",
                io::Error::from(io::ErrorKind::PermissionDenied),
            ));
        }
        let entry = state.pins.entry(pin).or_default();
        entry.exported = true;
        entry.export_count = entry.export_count.saturating_add(1);
        Ok(())
    }

    fn unexport(&self, pin: u8) -> Result<(), HalError> {
        self.with_exported(pin, |p| {
            p.exported = false;
            p.edge = None;
            p.events = None;
        })
    }

    fn set_direction(&self, pin: u8, direction: PinDirection) -> Result<(), HalError> {
        self.with_exported(pin, |p| p.direction = Some(direction))
    }

    fn write_value(&self, pin: u8, value: PinValue) -> Result<(), HalError> {
        self.with_exported(pin, |p| p.value = value)
    }

    fn read_value(&self, pin: u8) -> Result<PinValue, HalError> {
        self.with_exported(pin, |p| p.value)
    }

    fn set_edge(&self, pin: u8, edge: Option<EdgeTrigger>) -> Result<(), HalError> {
        self.with_exported(pin, |p| p.edge = edge)
    }

    fn set_debounce(&self, pin: u8, debounce_ms: u32) -> Result<(), HalError> {
        self.with_exported(pin, |p| p.debounce_ms = debounce_ms)
    }

    fn open_events(&self, pin: u8) -> Result<MockEdgeEvents, HalError> {
        self.with_exported(pin, |p| {
            let (tx, rx) = mpsc::channel();
            p.events = Some(tx);
            p.open_events_count = p.open_events_count.saturating_add(1);
            MockEdgeEvents { rx }
        })
    }
}

// ── Buses ───────────────────────────────────────────────────────────────────

/// Registry membership shared by the mock peripherals.
#[derive(Default)]
struct MockClaim(Mutex<Option<ResourceClaim>>);

impl MockClaim {
    fn register(&self, ctx: &HalContext, kind: ResourceKind, name: String, handle: u64) {
        *self.0.lock() = Some(ResourceClaim::register(&ctx.registry, kind, name, handle));
    }

    fn check(&self) -> Result<(), HalError> {
        if self.0.lock().is_some() {
            Ok(())
        } else {
            Err(HalError::NotInitialized)
        }
    }
}

/// SPI device that echoes the transmitted bytes.
pub struct MockSpi {
    ctx: HalContext,
    claim: MockClaim,
    last_tx: Mutex<Vec<u8>>,
}

impl MockSpi {
    /// Unopened device.
    pub fn new(ctx: HalContext) -> Self {
        Self { ctx, claim: MockClaim::default(), last_tx: Mutex::new(Vec::new()) }
    }
}

impl SpiInterface for MockSpi {
    fn init(
        &self,
        bus: u8,
        chip_select: u8,
        _speed_hz: u32,
        _mode: SpiMode,
    ) -> Result<(), HalError> {
        let name = format!("spidev{bus}.{chip_select}");
        self.claim.register(&self.ctx, ResourceKind::SpiBus, name, u64::from(bus));
        Ok(())
    }

    fn transfer(&self, tx: &[u8], rx: &mut [u8]) -> Result<(), HalError> {
        self.claim.check()?;
        let rx =
            rx.get_mut(..tx.len()).ok_or(HalError::InvalidArgument("short receive buffer"))?;
        rx.copy_from_slice(tx);
        *self.last_tx.lock() = tx.to_vec();
        Ok(())
    }

    fn write(&self, data: &[u8]) -> Result<(), HalError> {
        self.claim.check()?;
        *self.last_tx.lock() = data.to_vec();
        Ok(())
    }

    fn read(&self, buffer: &mut [u8]) -> Result<(), HalError> {
        self.claim.check()?;
        buffer.fill(0);
        Ok(())
    }

    fn set_speed(&self, _speed_hz: u32) -> Result<(), HalError> {
        self.claim.check()
    }

    fn set_mode(&self, _mode: SpiMode) -> Result<(), HalError> {
        self.claim.check()
    }
}

/// I2C adapter whose targets are byte queues keyed by address.
pub struct MockI2c {
    ctx: HalContext,
    claim: MockClaim,
    address: Mutex<Option<u8>>,
    targets: Mutex<HashMap<u8, VecDeque<u8>>>,
}

impl MockI2c {
    /// Unopened adapter.
    pub fn new(ctx: HalContext) -> Self {
        Self {
            ctx,
            claim: MockClaim::default(),
            address: Mutex::new(None),
            targets: Mutex::new(HashMap::new()),
        }
    }

    fn selected(&self) -> Result<u8, HalError> {
        self.claim.check()?;
        (*self.address.lock()).ok_or(HalError::InvalidState("no I2C device address selected"))
    }
}

impl I2cInterface for MockI2c {
    fn init(&self, bus: u8) -> Result<(), HalError> {
        let name = format!("i2c-{bus}");
        self.claim.register(&self.ctx, ResourceKind::I2cBus, name, u64::from(bus));
        Ok(())
    }

    fn set_device_address(&self, address: u8) -> Result<(), HalError> {
        self.claim.check()?;
        *self.address.lock() = Some(address);
        Ok(())
    }

    fn write(&self, data: &[u8]) -> Result<(), HalError> {
        let address = self.selected()?;
        self.targets.lock().entry(address).or_default().extend(data);
        Ok(())
    }

    fn read(&self, buffer: &mut [u8]) -> Result<(), HalError> {
        let address = self.selected()?;
        let mut targets = self.targets.lock();
        let queue = targets.entry(address).or_default();
        for byte in buffer.iter_mut() {
            *byte = queue.pop_front().unwrap_or(0xFF);
        }
        Ok(())
    }

    fn write_read(
        &self,
        address: u8,
        write: &[u8],
        read_len: usize,
    ) -> Result<Vec<u8>, HalError> {
        self.set_device_address(address)?;
        self.write(write)?;
        let mut buffer = vec![0u8; read_len];
        self.read(&mut buffer)?;
        Ok(buffer)
    }

    fn set_speed(&self, _speed_hz: u32) -> Result<(), HalError> {
        self.claim.check()
    }
}

/// Serial port whose transmit side feeds its own receive queue.
pub struct MockUart {
    ctx: HalContext,
    claim: MockClaim,
    queue: Mutex<VecDeque<u8>>,
}

impl MockUart {
    /// Unopened port.
    pub fn new(ctx: HalContext) -> Self {
        Self { ctx, claim: MockClaim::default(), queue: Mutex::new(VecDeque::new()) }
    }
}

impl UartInterface for MockUart {
    fn init(&self, device: &str, _config: UartConfig) -> Result<(), HalError> {
        self.claim.register(&self.ctx, ResourceKind::UartPort, device.to_owned(), 0);
        Ok(())
    }

    fn write(&self, data: &[u8]) -> Result<(), HalError> {
        self.claim.check()?;
        self.queue.lock().extend(data);
        Ok(())
    }

    fn read(&self, buffer: &mut [u8]) -> Result<usize, HalError> {
        self.claim.check()?;
        let mut queue = self.queue.lock();
        let n = buffer.len().min(queue.len());
        for (slot, byte) in buffer.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn available(&self) -> Result<usize, HalError> {
        self.claim.check()?;
        Ok(self.queue.lock().len())
    }

    fn flush(&self) -> Result<(), HalError> {
        self.claim.check()?;
        self.queue.lock().clear();
        Ok(())
    }

    fn drain(&self) -> Result<(), HalError> {
        self.claim.check()
    }

    fn set_config(&self, _config: UartConfig) -> Result<(), HalError> {
        self.claim.check()
    }
}

#[derive(Default, Clone, Copy)]
struct PwmSettings {
    period_ns: u64,
    duty_ns: u64,
    enabled: bool,
    polarity: Polarity,
}

/// PWM channel holding its settings in memory.
pub struct MockPwm {
    ctx: HalContext,
    claim: MockClaim,
    settings: Mutex<PwmSettings>,
}

impl MockPwm {
    /// Unexported channel.
    pub fn new(ctx: HalContext) -> Self {
        Self { ctx, claim: MockClaim::default(), settings: Mutex::new(PwmSettings::default()) }
    }

    fn update(
        &self,
        f: impl FnOnce(&mut PwmSettings) -> Result<(), HalError>,
    ) -> Result<(), HalError> {
        self.claim.check()?;
        f(&mut self.settings.lock())
    }
}

impl PwmInterface for MockPwm {
    fn init(&self, chip: u8, channel: u8) -> Result<(), HalError> {
        let handle = (u64::from(chip) << 8) | u64::from(channel);
        let name = format!("PWM{chip}.{channel}");
        self.claim.register(&self.ctx, ResourceKind::PwmChannel, name, handle);
        Ok(())
    }

    fn enable(&self, enable: bool) -> Result<(), HalError> {
        self.update(|s| {
            s.enabled = enable;
            Ok(())
        })
    }

    fn set_period(&self, period_ns: u64) -> Result<(), HalError> {
        self.update(|s| {
            s.period_ns = period_ns;
            Ok(())
        })
    }

    fn set_duty_cycle(&self, duty_ns: u64) -> Result<(), HalError> {
        self.update(|s| {
            if duty_ns > s.period_ns {
                return Err(HalError::InvalidArgument("duty cycle exceeds period"));
            }
            s.duty_ns = duty_ns;
            Ok(())
        })
    }

    fn set_duty_cycle_percent(&self, percent: f32) -> Result<(), HalError> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(HalError::InvalidArgument("duty cycle percent outside 0..=100"));
        }
        let period = self.period();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let duty = (period as f64 * f64::from(percent) / 100.0) as u64;
        self.set_duty_cycle(duty.min(period))
    }

    fn set_polarity(&self, polarity: Polarity) -> Result<(), HalError> {
        self.update(|s| {
            s.polarity = polarity;
            Ok(())
        })
    }

    fn period(&self) -> u64 {
        self.settings.lock().period_ns
    }

    fn duty_cycle(&self) -> u64 {
        self.settings.lock().duty_ns
    }

    fn is_enabled(&self) -> bool {
        self.settings.lock().enabled
    }
}

/// ADC returning a ramp and counting reads.
pub struct MockAdc {
    ctx: HalContext,
    claim: MockClaim,
    config: Mutex<AdcConfig>,
    reads: Arc<AtomicU64>,
}

impl MockAdc {
    /// Unopened device sharing `reads` with its [`MockHal`].
    pub fn new(ctx: HalContext, reads: Arc<AtomicU64>) -> Self {
        Self { ctx, claim: MockClaim::default(), config: Mutex::new(AdcConfig::default()), reads }
    }
}

impl AdcInterface for MockAdc {
    fn init(&self, device: u8, config: AdcConfig) -> Result<(), HalError> {
        *self.config.lock() = config;
        let name = format!("ADC{device}");
        self.claim.register(&self.ctx, ResourceKind::AdcChannel, name, u64::from(device));
        Ok(())
    }

    fn enable_channel(&self, _channel: u8) -> Result<(), HalError> {
        self.claim.check()
    }

    fn disable_channel(&self, _channel: u8) -> Result<(), HalError> {
        self.claim.check()
    }

    fn read(&self, _channel: u8) -> Result<u16, HalError> {
        self.claim.check()?;
        let n = self.reads.fetch_add(1, Ordering::Relaxed);
        let max = u64::from(self.config.lock().resolution.max_value());
        Ok(u16::try_from(n % max.saturating_add(1)).unwrap_or(u16::MAX))
    }

    fn read_multiple(&self, channels: &[u8]) -> Result<Vec<u16>, HalError> {
        channels.iter().map(|&c| self.read(c)).collect()
    }

    fn start_continuous(&self, channel: u8, callback: AdcReadCallback) -> Result<(), HalError> {
        // One synchronous sample stands in for the sampling thread
        callback(self.read(channel)?);
        Ok(())
    }

    fn stop_continuous(&self) -> Result<(), HalError> {
        self.claim.check()
    }

    fn set_resolution(&self, resolution: AdcResolution) -> Result<(), HalError> {
        self.claim.check()?;
        self.config.lock().resolution = resolution;
        Ok(())
    }

    fn set_sampling_rate(&self, rate_hz: u32) -> Result<(), HalError> {
        self.claim.check()?;
        self.config.lock().sampling_rate = rate_hz;
        Ok(())
    }

    fn read_voltage(&self, channel: u8, reference_voltage: f32) -> Result<f32, HalError> {
        let raw = self.read(channel)?;
        Ok(self.config.lock().resolution.to_voltage(raw, reference_voltage))
    }
}

// ── Factory ─────────────────────────────────────────────────────────────────

/// [`Hal`] whose peripherals live in memory.
///
/// Scheduling calls are recorded instead of applied.
pub struct MockHal {
    ctx: HalContext,
    gpio: MockGpioBackend,
    adc_reads: Arc<AtomicU64>,
    policy: Mutex<RealtimePolicy>,
}

impl MockHal {
    /// Factory over `ctx`.
    pub fn new(ctx: HalContext) -> Self {
        Self {
            ctx,
            gpio: MockGpioBackend::new(),
            adc_reads: Arc::new(AtomicU64::new(0)),
            policy: Mutex::new(RealtimePolicy::None),
        }
    }

    /// Backend shared by every GPIO driver this factory creates.
    pub fn gpio_backend(&self) -> &MockGpioBackend {
        &self.gpio
    }

    /// ADC reads across every ADC this factory created.
    pub fn adc_reads(&self) -> u64 {
        self.adc_reads.load(Ordering::Relaxed)
    }
}

impl Hal for MockHal {
    fn init(&self) -> Result<(), HalError> {
        Ok(())
    }

    fn shutdown(&self) {}

    fn configure_realtime(&self, priority: i32) -> Result<(), HalError> {
        if priority <= 0 {
            return Err(HalError::InvalidArgument("real-time priority must be positive"));
        }
        *self.policy.lock() = RealtimePolicy::Fifo;
        Ok(())
    }

    fn is_realtime_configured(&self) -> bool {
        self.realtime_state() == RealtimeState::Running
    }

    fn realtime_state(&self) -> RealtimeState {
        match *self.policy.lock() {
            RealtimePolicy::Fifo => RealtimeState::Running,
            RealtimePolicy::Invalid => RealtimeState::Error,
            RealtimePolicy::None | RealtimePolicy::RoundRobin => RealtimeState::NotRunning,
        }
    }

    fn set_realtime_policy(&self, policy: RealtimePolicy) -> RealtimePolicy {
        *self.policy.lock() = policy;
        policy
    }

    fn realtime_policy(&self) -> RealtimePolicy {
        *self.policy.lock()
    }

    fn create_gpio(&self) -> Box<dyn GpioInterface> {
        Box::new(GpioDriver::with_backend(self.ctx.clone(), self.gpio.clone()))
    }

    fn create_spi(&self) -> Box<dyn SpiInterface> {
        Box::new(MockSpi::new(self.ctx.clone()))
    }

    fn create_i2c(&self) -> Box<dyn I2cInterface> {
        Box::new(MockI2c::new(self.ctx.clone()))
    }

    fn create_uart(&self) -> Box<dyn UartInterface> {
        Box::new(MockUart::new(self.ctx.clone()))
    }

    fn create_pwm(&self) -> Box<dyn PwmInterface> {
        Box::new(MockPwm::new(self.ctx.clone()))
    }

    fn create_timer(&self) -> Box<dyn TimerInterface> {
        Box::new(LinuxTimer::new(self.ctx.clone()))
    }

    fn create_adc(&self) -> Box<dyn AdcInterface> {
        Box::new(MockAdc::new(self.ctx.clone(), Arc::clone(&self.adc_reads)))
    }
}
