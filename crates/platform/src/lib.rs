//! Hardware Abstraction Layer (HAL) platform types for Linux hosts
//!
//! This crate provides the trait-based peripheral abstractions shared by the
//! runtime services and the Linux drivers, enabling application code to drive
//! embedded peripherals without knowing which kernel subsystem backs them.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (demos, orchestrator)
//!         ↓
//! Linux drivers (hal-linux: sysfs, spidev, i2c-dev, termios, IIO)
//!         ↓
//! Runtime services (hal-runtime: resource registry, callback dispatch)
//!         ↓
//! Platform types (this crate - traits, value types, errors, config)
//! ```
//!
//! # Abstraction Levels
//!
//! ## Factory
//! - [`Hal`] - creates peripheral driver objects and manages real-time scheduling
//!
//! ## Peripherals
//! - [`gpio`] - pin direction, value and edge interrupts
//! - [`peripheral`] - SPI, I2C, UART abstractions
//! - [`pwm`] - PWM channel control
//! - [`timer`] - one-shot and periodic software timers
//! - [`adc`] - IIO analog inputs, one-shot and continuous
//!
//! # Example
//!
//! ```no_run
//! use hal_platform::{GpioInterface, HalError, PinDirection, PinValue};
//!
//! fn blink(gpio: &dyn GpioInterface, pin: u8) -> Result<(), HalError> {
//!     gpio.set_direction(pin, PinDirection::Output)?;
//!     gpio.write(pin, PinValue::High)?;
//!     gpio.write(pin, PinValue::Low)
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::print_stdout)] // prefer tracing over println! in lib code
// Pedantic lints suppressed for this HAL crate:
#![allow(clippy::doc_markdown)] // sysfs paths and register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod adc;
pub mod config;
pub mod error;
pub mod gpio;
pub mod hal;
pub mod peripheral;
pub mod pwm;
pub mod timer;

pub use config::HalConfig;
pub use error::HalError;
pub use hal::{Hal, HalType, RealtimePolicy, RealtimeState};

// Re-export GPIO types
pub use gpio::{EdgeTrigger, GpioInterface, InterruptCallback, PinDirection, PinValue};

// Re-export peripheral types
pub use peripheral::{
    DataBits, I2cInterface, Parity, SpiInterface, SpiMode, StopBits, UartConfig, UartInterface,
};

pub use adc::{AdcConfig, AdcInterface, AdcReadCallback, AdcResolution};
pub use pwm::{Polarity, PwmInterface};
pub use timer::{TimerCallback, TimerInterface, TimerMode};
