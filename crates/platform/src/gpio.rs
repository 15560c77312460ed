//! GPIO and pin abstraction layer
//!
//! Provides pin direction and value control with edge-interrupt support.
//! Interrupt callbacks are reference counted so the dispatcher can copy a
//! handler out of its table and invoke it after the table lock is released.

use std::fmt;
use std::sync::Arc;

use crate::HalError;

/// Handler invoked with `(pin, value)` when an edge interrupt fires.
pub type InterruptCallback = Arc<dyn Fn(u8, PinValue) + Send + Sync>;

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinDirection {
    /// Pin is read by the host
    Input,
    /// Pin is driven by the host
    Output,
}

impl PinDirection {
    /// Keyword understood by the kernel `direction` attribute.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "in",
            Self::Output => "out",
        }
    }
}

impl fmt::Display for PinDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pin logic value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PinValue {
    /// Low (logic 0)
    #[default]
    Low,
    /// High (logic 1)
    High,
}

impl PinValue {
    /// Parse the first byte of a kernel `value` attribute (`'1'` is high).
    pub fn from_ascii(byte: u8) -> Self {
        Self::from(byte == b'1')
    }

    /// ASCII digit written to a kernel `value` attribute.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "0",
            Self::High => "1",
        }
    }
}

impl From<bool> for PinValue {
    fn from(value: bool) -> Self {
        if value {
            Self::High
        } else {
            Self::Low
        }
    }
}

impl From<PinValue> for bool {
    fn from(value: PinValue) -> Self {
        matches!(value, PinValue::High)
    }
}

impl fmt::Display for PinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("LOW"),
            Self::High => f.write_str("HIGH"),
        }
    }
}

/// External interrupt configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeTrigger {
    /// Trigger on rising edge
    Rising,
    /// Trigger on falling edge
    Falling,
    /// Trigger on both edges
    Both,
}

impl EdgeTrigger {
    /// Keyword understood by the kernel `edge` attribute.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for EdgeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GPIO controller operations.
///
/// Methods take `&self`: implementations serialise access with an internal
/// per-instance lock so one controller can be shared between threads.
pub trait GpioInterface: Send + Sync {
    /// Configure `pin` as input or output, exporting it on first use.
    fn set_direction(&self, pin: u8, direction: PinDirection) -> Result<(), HalError>;

    /// Drive an exported pin.
    fn write(&self, pin: u8, value: PinValue) -> Result<(), HalError>;

    /// Sample an exported pin.
    fn read(&self, pin: u8) -> Result<PinValue, HalError>;

    /// Configure edge detection on `pin` and deliver edges to `callback`.
    ///
    /// Starts at most one monitor thread per pin.
    fn set_interrupt(
        &self,
        pin: u8,
        edge: EdgeTrigger,
        callback: InterruptCallback,
    ) -> Result<(), HalError>;

    /// Disable edge detection and unregister the pin's callback.
    fn remove_interrupt(&self, pin: u8) -> Result<(), HalError>;

    /// Set the hardware debounce time of an exported pin.
    fn set_debounce(&self, pin: u8, debounce_ms: u32) -> Result<(), HalError>;
}
