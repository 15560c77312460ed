//! HAL factory trait and platform selection

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    AdcInterface, GpioInterface, HalError, I2cInterface, PwmInterface, SpiInterface,
    TimerInterface, UartInterface,
};

/// Platform requested from the factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HalType {
    /// Pick the platform of the running host
    Auto,
    /// Linux sysfs / character-device backend
    #[default]
    Linux,
    /// Placeholder for an unrecognised platform; never constructible
    Invalid,
}

impl fmt::Display for HalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Linux => f.write_str("linux"),
            Self::Invalid => f.write_str("invalid"),
        }
    }
}

/// Process scheduling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RealtimePolicy {
    /// Normal time-sharing scheduler
    #[default]
    None,
    /// `SCHED_FIFO`
    Fifo,
    /// `SCHED_RR`
    RoundRobin,
    /// The last policy change failed
    Invalid,
}

/// Outcome of the last real-time configuration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RealtimeState {
    /// Real-time scheduling is active
    Running,
    /// Real-time scheduling has not been configured
    #[default]
    NotRunning,
    /// Configuration was attempted and failed
    Error,
}

/// Peripheral factory and process-level scheduling control.
///
/// Every `create_*` method returns a fresh, uninitialised driver object.
pub trait Hal: Send + Sync {
    /// Bring up platform-level state.
    fn init(&self) -> Result<(), HalError>;

    /// Release platform-level state; drivers already handed out keep working.
    fn shutdown(&self);

    /// Switch the process to `SCHED_FIFO` at `priority` and lock its memory.
    fn configure_realtime(&self, priority: i32) -> Result<(), HalError>;

    /// Whether [`Hal::configure_realtime`] succeeded.
    fn is_realtime_configured(&self) -> bool;

    /// State of the last real-time configuration attempt.
    fn realtime_state(&self) -> RealtimeState;

    /// Apply a scheduling policy, returning the policy now in effect.
    fn set_realtime_policy(&self, policy: RealtimePolicy) -> RealtimePolicy;

    /// Scheduling policy last applied.
    fn realtime_policy(&self) -> RealtimePolicy;

    /// Create a GPIO controller
    fn create_gpio(&self) -> Box<dyn GpioInterface>;
    /// Create an SPI device
    fn create_spi(&self) -> Box<dyn SpiInterface>;
    /// Create an I2C adapter
    fn create_i2c(&self) -> Box<dyn I2cInterface>;
    /// Create a UART port
    fn create_uart(&self) -> Box<dyn UartInterface>;
    /// Create a PWM channel
    fn create_pwm(&self) -> Box<dyn PwmInterface>;
    /// Create a software timer
    fn create_timer(&self) -> Box<dyn TimerInterface>;
    /// Create an ADC
    fn create_adc(&self) -> Box<dyn AdcInterface>;
}
