//! PWM channel abstraction
//!
//! Times are in nanoseconds, matching the sysfs `period` and `duty_cycle`
//! attributes.

use std::fmt;

use crate::HalError;

/// Output polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// Active high
    #[default]
    Normal,
    /// Active low
    Inversed,
}

impl Polarity {
    /// Keyword understood by the kernel `polarity` attribute.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Inversed => "inversed",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PWM channel operations.
pub trait PwmInterface: Send + Sync {
    /// Export `channel` of `pwmchip<chip>`.
    fn init(&self, chip: u8, channel: u8) -> Result<(), HalError>;

    /// Enable or disable the output.
    fn enable(&self, enable: bool) -> Result<(), HalError>;

    /// Set the period. Briefly disables an enabled output while applying it.
    fn set_period(&self, period_ns: u64) -> Result<(), HalError>;

    /// Set the active time; may not exceed the period.
    fn set_duty_cycle(&self, duty_ns: u64) -> Result<(), HalError>;

    /// Set the active time as a percentage (`0..=100`) of the period.
    fn set_duty_cycle_percent(&self, percent: f32) -> Result<(), HalError>;

    /// Set output polarity. Briefly disables an enabled output while applying it.
    fn set_polarity(&self, polarity: Polarity) -> Result<(), HalError>;

    /// Current period in nanoseconds.
    fn period(&self) -> u64;

    /// Current duty cycle in nanoseconds.
    fn duty_cycle(&self) -> u64;

    /// Whether the output is enabled.
    fn is_enabled(&self) -> bool;
}
