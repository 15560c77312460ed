//! Analog input abstraction
//!
//! Channels map to the IIO `in_voltage<N>_raw` attributes of one device.

use std::sync::Arc;

use crate::HalError;

/// Handler invoked with each raw sample of a continuous read.
pub type AdcReadCallback = Arc<dyn Fn(u16) + Send + Sync>;

/// Converter resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdcResolution {
    /// 8-bit samples
    Bits8,
    /// 10-bit samples
    Bits10,
    /// 12-bit samples
    #[default]
    Bits12,
    /// 16-bit samples
    Bits16,
}

impl AdcResolution {
    /// Sample width in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bits8 => 8,
            Self::Bits10 => 10,
            Self::Bits12 => 12,
            Self::Bits16 => 16,
        }
    }

    /// Full-scale raw value (`2^bits - 1`).
    pub const fn max_value(self) -> u16 {
        match self {
            Self::Bits8 => 0x00FF,
            Self::Bits10 => 0x03FF,
            Self::Bits12 => 0x0FFF,
            Self::Bits16 => 0xFFFF,
        }
    }

    /// Scale a raw sample to volts against `reference_voltage`.
    pub fn to_voltage(self, raw: u16, reference_voltage: f32) -> f32 {
        f32::from(raw) / f32::from(self.max_value()) * reference_voltage
    }
}

/// ADC configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcConfig {
    /// Sample width
    pub resolution: AdcResolution,
    /// Samples per second; 0 means "driver default" (1 kHz continuous loop)
    pub sampling_rate: u32,
    /// Informational; continuous reads are started explicitly
    pub continuous_mode: bool,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self { resolution: AdcResolution::Bits12, sampling_rate: 1000, continuous_mode: false }
    }
}

/// ADC operations.
pub trait AdcInterface: Send + Sync {
    /// Bind to `iio:device<device>`; fails if the device has no `name` attribute.
    fn init(&self, device: u8, config: AdcConfig) -> Result<(), HalError>;

    /// Enable a channel in the buffered scan set.
    fn enable_channel(&self, channel: u8) -> Result<(), HalError>;

    /// Disable a channel in the buffered scan set.
    fn disable_channel(&self, channel: u8) -> Result<(), HalError>;

    /// Read one raw sample.
    fn read(&self, channel: u8) -> Result<u16, HalError>;

    /// Read one raw sample from each channel, in order.
    fn read_multiple(&self, channels: &[u8]) -> Result<Vec<u16>, HalError>;

    /// Sample `channel` on a background thread at the configured rate.
    fn start_continuous(&self, channel: u8, callback: AdcReadCallback) -> Result<(), HalError>;

    /// Stop and join the continuous sampling thread.
    fn stop_continuous(&self) -> Result<(), HalError>;

    /// Change the resolution used for voltage conversion.
    fn set_resolution(&self, resolution: AdcResolution) -> Result<(), HalError>;

    /// Write the device `sampling_frequency` attribute.
    fn set_sampling_rate(&self, rate_hz: u32) -> Result<(), HalError>;

    /// Read one sample and scale it to volts.
    fn read_voltage(&self, channel: u8, reference_voltage: f32) -> Result<f32, HalError>;
}
