//! Peripheral abstraction layer
//!
//! Provides trait-based abstractions for the byte-oriented buses (SPI, I2C, UART).
//! The Linux drivers implement these over the spidev, i2c-dev and termios
//! character devices; `hal-linux` additionally exposes embedded-hal adapters.

use crate::HalError;

/// SPI modes (CPOL, CPHA)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpiMode {
    /// Mode 0: CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// Mode 1: CPOL=0, CPHA=1
    Mode1,
    /// Mode 2: CPOL=1, CPHA=0
    Mode2,
    /// Mode 3: CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    /// Kernel `SPI_MODE_n` bit pattern (`CPHA` is bit 0, `CPOL` is bit 1).
    pub const fn bits(self) -> u8 {
        match self {
            Self::Mode0 => 0,
            Self::Mode1 => 1,
            Self::Mode2 => 2,
            Self::Mode3 => 3,
        }
    }
}

/// SPI peripheral abstraction
pub trait SpiInterface: Send + Sync {
    /// Open `/dev/spidev<bus>.<cs>` and apply speed, mode and 8 bits per word.
    fn init(&self, bus: u8, chip_select: u8, speed_hz: u32, mode: SpiMode)
        -> Result<(), HalError>;

    /// Transfer data (full duplex). `rx` must be at least as long as `tx`.
    fn transfer(&self, tx: &[u8], rx: &mut [u8]) -> Result<(), HalError>;

    /// Write data (half duplex)
    fn write(&self, data: &[u8]) -> Result<(), HalError>;

    /// Read data (half duplex)
    fn read(&self, buffer: &mut [u8]) -> Result<(), HalError>;

    /// Change the clock frequency of an initialised bus.
    fn set_speed(&self, speed_hz: u32) -> Result<(), HalError>;

    /// Change the clock polarity/phase of an initialised bus.
    fn set_mode(&self, mode: SpiMode) -> Result<(), HalError>;
}

/// I2C peripheral abstraction
///
/// A target address must be selected with [`I2cInterface::set_device_address`]
/// before any transfer.
pub trait I2cInterface: Send + Sync {
    /// Open `/dev/i2c-<bus>`.
    fn init(&self, bus: u8) -> Result<(), HalError>;

    /// Select the 7-bit target address for subsequent transfers.
    fn set_device_address(&self, address: u8) -> Result<(), HalError>;

    /// Write to device
    fn write(&self, data: &[u8]) -> Result<(), HalError>;

    /// Read from device
    fn read(&self, buffer: &mut [u8]) -> Result<(), HalError>;

    /// Select `address`, write `write`, then read `read_len` bytes.
    fn write_read(&self, address: u8, write: &[u8], read_len: usize)
        -> Result<Vec<u8>, HalError>;

    /// Request a bus clock in Hz.
    fn set_speed(&self, speed_hz: u32) -> Result<(), HalError>;
}

/// UART configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits
    pub data_bits: DataBits,
    /// Parity
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
    /// RTS/CTS hardware flow control
    pub flow_control: bool,
}

impl Default for UartConfig {
    /// 9600 baud, 8N1, no flow control.
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: false,
        }
    }
}

/// Data bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 5 data bits
    Five,
    /// 6 data bits
    Six,
    /// 7 data bits
    Seven,
    /// 8 data bits
    #[default]
    Eight,
}

/// Parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit
    #[default]
    One,
    /// 2 stop bits
    Two,
}

/// UART peripheral abstraction
pub trait UartInterface: Send + Sync {
    /// Open a tty device in raw mode and apply `config`.
    fn init(&self, device: &str, config: UartConfig) -> Result<(), HalError>;

    /// Write data, returning once all bytes are queued.
    fn write(&self, data: &[u8]) -> Result<(), HalError>;

    /// Read up to `buffer.len()` bytes, waiting at most one second for the
    /// first byte. Returns the number of bytes copied (0 on timeout).
    fn read(&self, buffer: &mut [u8]) -> Result<usize, HalError>;

    /// Bytes waiting in the receive queue.
    fn available(&self) -> Result<usize, HalError>;

    /// Discard unread input and untransmitted output.
    fn flush(&self) -> Result<(), HalError>;

    /// Block until all queued output has been transmitted.
    fn drain(&self) -> Result<(), HalError>;

    /// Reconfigure an open port.
    fn set_config(&self, config: UartConfig) -> Result<(), HalError>;
}
