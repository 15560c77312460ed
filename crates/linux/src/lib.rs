//! Linux drivers for the HAL peripheral traits
//!
//! | Peripheral | Kernel interface                         | Driver            |
//! |------------|------------------------------------------|-------------------|
//! | GPIO       | `/sys/class/gpio`, `poll(2)` on `value`  | [`GpioDriver`]    |
//! | SPI        | `/dev/spidevB.C`, `SPI_IOC_*` ioctls      | [`LinuxSpi`]      |
//! | I2C        | `/dev/i2c-N`, `I2C_SLAVE` ioctl          | [`LinuxI2c`]      |
//! | UART       | tty device, termios                      | [`LinuxUart`]     |
//! | PWM        | `/sys/class/pwm`                         | [`LinuxPwm`]      |
//! | Timer      | `CLOCK_MONOTONIC`, worker thread         | [`LinuxTimer`]    |
//! | ADC        | `/sys/bus/iio/devices`                   | [`LinuxAdc`]      |
//!
//! [`create_hal`] returns the factory for the current platform, and
//! [`HalStateEngine`] runs a whole peripheral bundle on a worker thread.
//! Every driver registers what it opens with the [`HalContext`] registry and
//! releases it on drop.
//!
//! The drivers also implement the `embedded-hal` 1.0 and `embedded-io`
//! traits (see [`embedded`]), so generic device crates run unchanged.
//!
//! With the `mock` feature, [`mocks`] provides an in-memory GPIO backend and
//! peripheral set for tests that must not touch the kernel.
//!
//! [`HalContext`]: hal_runtime::HalContext

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::print_stdout)]
#![allow(clippy::doc_markdown)] // sysfs paths in doc comments
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod adc;
mod claim;
pub mod embedded;
mod engine;
mod gpio;
mod hal;
mod i2c;
#[cfg(any(test, feature = "mock"))]
pub mod mocks;
mod pwm;
mod spi;
mod sysfs;
mod timer;
mod uart;

pub use adc::LinuxAdc;
pub use embedded::{EmbeddedError, GpioPin};
pub use engine::{EngineConfig, EngineState, HalStateEngine};
pub use gpio::{EdgeEvents, GpioBackend, GpioDriver, SysfsEdgeEvents, SysfsGpioBackend};
pub use hal::{create_hal, LinuxHal, DEFAULT_REALTIME_PRIORITY};
pub use i2c::LinuxI2c;
pub use pwm::LinuxPwm;
pub use spi::LinuxSpi;
pub use timer::LinuxTimer;
pub use uart::LinuxUart;
