//! Lifecycle orchestrator
//!
//! ```text
//! Idle ──start()──▶ Running ──stop()──▶ Stopped ──start()──▶ Running
//! ```
//!
//! `start` spawns one worker that brings up a bundle of peripherals through
//! the [`Hal`] factory and then samples the ADC until asked to stop. The
//! worker releases the control lock around every sample so `stop` is never
//! starved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hal_platform::{
    AdcConfig, AdcInterface, AdcResolution, GpioInterface, Hal, HalError, I2cInterface,
    PwmInterface, SpiInterface, SpiMode, TimerInterface, TimerMode, UartConfig, UartInterface,
};
use parking_lot::{Condvar, Mutex, MutexGuard};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Never started
    #[default]
    Idle,
    /// Worker thread sampling
    Running,
    /// Worker joined after `stop`
    Stopped,
}

/// Peripheral bundle brought up by the worker.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Priority for `SCHED_FIFO`; failure to apply it is logged, not fatal
    pub realtime_priority: i32,
    /// IIO device number
    pub adc_device: u8,
    /// ADC configuration
    pub adc_config: AdcConfig,
    /// Channel sampled by the loop
    pub adc_channel: u8,
    /// spidev bus
    pub spi_bus: u8,
    /// spidev chip select
    pub spi_chip_select: u8,
    /// SPI clock
    pub spi_speed_hz: u32,
    /// SPI mode
    pub spi_mode: SpiMode,
    /// i2c-dev bus
    pub i2c_bus: u8,
    /// Serial device path
    pub uart_device: String,
    /// Serial line settings
    pub uart_config: UartConfig,
    /// PWM chip
    pub pwm_chip: u8,
    /// PWM channel
    pub pwm_channel: u8,
    /// GPIO pin read once at startup
    pub gpio_pin: u8,
    /// Timer mode
    pub timer_mode: TimerMode,
    /// Pause between samples, spent without the control lock
    pub sample_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            realtime_priority: 10,
            adc_device: 0,
            adc_config: AdcConfig {
                resolution: AdcResolution::Bits12,
                sampling_rate: 3300,
                continuous_mode: true,
            },
            adc_channel: 0,
            spi_bus: 1,
            spi_chip_select: 0,
            spi_speed_hz: 1_000_000,
            spi_mode: SpiMode::Mode0,
            i2c_bus: 2,
            uart_device: "/dev/ttyS0".to_owned(),
            uart_config: UartConfig::default(),
            pwm_chip: 3,
            pwm_channel: 1,
            gpio_pin: 4,
            timer_mode: TimerMode::Periodic,
            sample_interval: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Default)]
struct Control {
    state: EngineState,
    stop_requested: bool,
}

#[derive(Default)]
struct Shared {
    control: Mutex<Control>,
    stopped: Condvar,
    samples: AtomicU64,
}

/// Peripherals owned by the worker for the lifetime of one run.
struct Bundle {
    adc: Box<dyn AdcInterface>,
    _spi: Box<dyn SpiInterface>,
    _i2c: Box<dyn I2cInterface>,
    _uart: Box<dyn UartInterface>,
    _pwm: Box<dyn PwmInterface>,
    _gpio: Box<dyn GpioInterface>,
    _timer: Box<dyn TimerInterface>,
}

fn log_failure(peripheral: &'static str, result: Result<(), HalError>) {
    if let Err(e) = result {
        tracing::warn!(peripheral, error = %e, "peripheral bring-up failed");
    }
}

impl Bundle {
    fn bring_up(hal: &dyn Hal, config: &EngineConfig) -> Self {
        if let Err(e) = hal.configure_realtime(config.realtime_priority) {
            tracing::warn!(error = %e, "real-time mode unavailable");
        }

        let adc = hal.create_adc();
        log_failure("adc", adc.init(config.adc_device, config.adc_config));

        let spi = hal.create_spi();
        log_failure(
            "spi",
            spi.init(config.spi_bus, config.spi_chip_select, config.spi_speed_hz, config.spi_mode),
        );

        let i2c = hal.create_i2c();
        log_failure("i2c", i2c.init(config.i2c_bus));

        let uart = hal.create_uart();
        log_failure("uart", uart.init(&config.uart_device, config.uart_config));

        let pwm = hal.create_pwm();
        log_failure("pwm", pwm.init(config.pwm_chip, config.pwm_channel));

        let gpio = hal.create_gpio();
        log_failure("gpio", gpio.read(config.gpio_pin).map(|_| ()));

        let timer = hal.create_timer();
        log_failure("timer", timer.init(config.timer_mode));

        Self { adc, _spi: spi, _i2c: i2c, _uart: uart, _pwm: pwm, _gpio: gpio, _timer: timer }
    }
}

/// Starts, runs and stops the peripheral bundle on a worker thread.
pub struct HalStateEngine {
    hal: Arc<dyn Hal>,
    config: Arc<EngineConfig>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HalStateEngine {
    /// Idle engine over `hal`.
    pub fn new(hal: Arc<dyn Hal>, config: EngineConfig) -> Self {
        Self {
            hal,
            config: Arc::new(config),
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker. No-op while running.
    pub fn start(&self) -> Result<&Self, HalError> {
        let mut worker = self.worker.lock();
        {
            let mut control = self.shared.control.lock();
            if control.state == EngineState::Running {
                return Ok(self);
            }
            control.stop_requested = false;
            control.state = EngineState::Running;
        }

        let hal = Arc::clone(&self.hal);
        let config = Arc::clone(&self.config);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("hal-engine".to_owned())
            .spawn(move || engine_loop(hal.as_ref(), &config, &shared));
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                tracing::info!("engine started");
                Ok(self)
            }
            Err(e) => {
                self.shared.control.lock().state = EngineState::Stopped;
                Err(HalError::spawn("hal-engine", e))
            }
        }
    }

    /// Request stop, wake waiters and join the worker. No-op unless running.
    pub fn stop(&self) -> &Self {
        let mut worker = self.worker.lock();
        {
            let mut control = self.shared.control.lock();
            if control.state != EngineState::Running {
                return self;
            }
            control.stop_requested = true;
            self.shared.stopped.notify_all();
        }
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                tracing::error!("engine worker panicked");
            }
        }
        self.shared.control.lock().state = EngineState::Stopped;
        tracing::info!(samples = self.samples_taken(), "engine stopped");
        self
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        self.shared.control.lock().state
    }

    /// Block until a stop has been requested.
    pub fn wait_for_stop(&self) {
        let mut control = self.shared.control.lock();
        self.shared.stopped.wait_while(&mut control, |c| !c.stop_requested);
    }

    /// Successful ADC samples since construction.
    pub fn samples_taken(&self) -> u64 {
        self.shared.samples.load(Ordering::Relaxed)
    }

    /// Bundle configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for HalStateEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn engine_loop(hal: &dyn Hal, config: &EngineConfig, shared: &Shared) {
    let bundle = Bundle::bring_up(hal, config);
    tracing::debug!("engine sampling");

    let mut control = shared.control.lock();
    while !control.stop_requested {
        MutexGuard::unlocked(&mut control, || {
            match bundle.adc.read(config.adc_channel) {
                Ok(_) => {
                    shared.samples.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => tracing::trace!(error = %e, "adc sample failed"),
            }
            thread::sleep(config.sample_interval);
        });
    }
    drop(control);
    // Peripherals are torn down on the worker that created them
    drop(bundle);
}
