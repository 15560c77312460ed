//! `embedded-hal` 1.0 and `embedded-io` adapters
//!
//! Lets generic device drivers from the embedded ecosystem run on top of
//! the Linux peripherals. Errors are wrapped in [`EmbeddedError`], which
//! maps each [`HalError`] onto the ecosystem's error kinds.

use std::fmt;

use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::i2c::{self, I2c, NoAcknowledgeSource, Operation};
use embedded_hal::pwm::{self, SetDutyCycle};
use embedded_hal::spi::{self, SpiBus};
use hal_platform::{
    GpioInterface, HalError, I2cInterface, PinDirection, PinValue, PwmInterface, SpiInterface,
    UartInterface,
};

use crate::{LinuxI2c, LinuxPwm, LinuxSpi, LinuxUart};

/// [`HalError`] as seen through the ecosystem traits.
#[derive(Debug)]
pub struct EmbeddedError(pub HalError);

impl fmt::Display for EmbeddedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for EmbeddedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<HalError> for EmbeddedError {
    fn from(err: HalError) -> Self {
        Self(err)
    }
}

impl digital::Error for EmbeddedError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

impl spi::Error for EmbeddedError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

impl i2c::Error for EmbeddedError {
    fn kind(&self) -> i2c::ErrorKind {
        match self.0.raw_os_error() {
            Some(libc::ENXIO | libc::EREMOTEIO) => {
                i2c::ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
            }
            Some(libc::EAGAIN) => i2c::ErrorKind::ArbitrationLoss,
            Some(libc::EIO) => i2c::ErrorKind::Bus,
            _ => i2c::ErrorKind::Other,
        }
    }
}

impl pwm::Error for EmbeddedError {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

impl embedded_io::Error for EmbeddedError {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind;
        match &self.0 {
            HalError::InvalidArgument(_) => ErrorKind::InvalidInput,
            HalError::NotInitialized | HalError::InvalidState(_) => ErrorKind::NotConnected,
            _ => match self.0.raw_os_error() {
                Some(libc::ENOENT) => ErrorKind::NotFound,
                Some(libc::EACCES | libc::EPERM) => ErrorKind::PermissionDenied,
                Some(libc::EINTR) => ErrorKind::Interrupted,
                Some(libc::ETIMEDOUT) => ErrorKind::TimedOut,
                _ => ErrorKind::Other,
            },
        }
    }
}

// ── GPIO ────────────────────────────────────────────────────────────────────

/// One pin of a GPIO controller as an `embedded-hal` pin.
pub struct GpioPin<'a, G: GpioInterface + ?Sized> {
    gpio: &'a G,
    pin: u8,
}

impl<'a, G: GpioInterface + ?Sized> GpioPin<'a, G> {
    /// Configure `pin` as an output.
    pub fn output(gpio: &'a G, pin: u8) -> Result<Self, HalError> {
        gpio.set_direction(pin, PinDirection::Output)?;
        Ok(Self { gpio, pin })
    }

    /// Configure `pin` as an input.
    pub fn input(gpio: &'a G, pin: u8) -> Result<Self, HalError> {
        gpio.set_direction(pin, PinDirection::Input)?;
        Ok(Self { gpio, pin })
    }

    /// Pin number.
    pub fn pin(&self) -> u8 {
        self.pin
    }
}

impl<G: GpioInterface + ?Sized> digital::ErrorType for GpioPin<'_, G> {
    type Error = EmbeddedError;
}

impl<G: GpioInterface + ?Sized> OutputPin for GpioPin<'_, G> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(self.gpio.write(self.pin, PinValue::Low)?)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(self.gpio.write(self.pin, PinValue::High)?)
    }
}

impl<G: GpioInterface + ?Sized> InputPin for GpioPin<'_, G> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.gpio.read(self.pin)? == PinValue::High)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.gpio.read(self.pin)? == PinValue::Low)
    }
}

// ── SPI ─────────────────────────────────────────────────────────────────────

impl spi::ErrorType for LinuxSpi {
    type Error = EmbeddedError;
}

impl SpiBus<u8> for LinuxSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        if words.is_empty() {
            return Ok(());
        }
        Ok(SpiInterface::read(self, words)?)
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        if words.is_empty() {
            return Ok(());
        }
        Ok(SpiInterface::write(self, words)?)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let len = read.len().max(write.len());
        if len == 0 {
            return Ok(());
        }
        // Clock out zeros past the end of `write`, drop bytes past `read`
        let mut tx = write.to_vec();
        tx.resize(len, 0);
        let mut rx = vec![0u8; len];
        SpiInterface::transfer(self, &tx, &mut rx)?;
        for (dst, src) in read.iter_mut().zip(rx) {
            *dst = src;
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        if words.is_empty() {
            return Ok(());
        }
        let tx = words.to_vec();
        Ok(SpiInterface::transfer(self, &tx, words)?)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        // spidev transfers complete inside the ioctl
        Ok(())
    }
}

// ── I2C ─────────────────────────────────────────────────────────────────────

impl i2c::ErrorType for LinuxI2c {
    type Error = EmbeddedError;
}

impl I2c for LinuxI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.set_device_address(address)?;
        for op in operations {
            match op {
                Operation::Read(buffer) => I2cInterface::read(self, buffer)?,
                Operation::Write(bytes) => I2cInterface::write(self, bytes)?,
            }
        }
        Ok(())
    }
}

// ── PWM ─────────────────────────────────────────────────────────────────────

impl pwm::ErrorType for LinuxPwm {
    type Error = EmbeddedError;
}

impl SetDutyCycle for LinuxPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        let period = self.period();
        let scaled = u128::from(period)
            .saturating_mul(u128::from(duty))
            .checked_div(u128::from(u16::MAX))
            .unwrap_or(0);
        let duty_ns = u64::try_from(scaled).unwrap_or(period);
        Ok(PwmInterface::set_duty_cycle(self, duty_ns)?)
    }
}

// ── UART ────────────────────────────────────────────────────────────────────

impl embedded_io::ErrorType for LinuxUart {
    type Error = EmbeddedError;
}

impl embedded_io::Read for LinuxUart {
    /// Blocks until at least one byte is available.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = UartInterface::read(self, buf)?;
            if n > 0 {
                return Ok(n);
            }
        }
    }
}

impl embedded_io::Write for LinuxUart {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        UartInterface::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(self.drain()?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::gpio::GpioDriver;
    use crate::mocks::MockGpioBackend;
    use hal_runtime::HalContext;
    use std::io;

    #[test]
    fn gpio_pin_drives_backend() {
        let backend = MockGpioBackend::new();
        let gpio = GpioDriver::with_backend(HalContext::default(), backend.clone());
        let mut led = GpioPin::output(&gpio, 18).unwrap();
        led.set_high().unwrap();
        assert!(led.is_high().unwrap());
        led.set_low().unwrap();
        assert!(led.is_low().unwrap());
        assert_eq!(backend.direction(18), Some(PinDirection::Output));
    }

    #[test]
    fn gpio_pin_works_through_trait_object() {
        let gpio: Box<dyn GpioInterface> =
            Box::new(GpioDriver::with_backend(HalContext::default(), MockGpioBackend::new()));
        let mut button = GpioPin::input(gpio.as_ref(), 2).unwrap();
        assert!(button.is_low().unwrap());
        assert_eq!(button.pin(), 2);
    }

    #[test]
    fn i2c_nack_maps_to_no_acknowledge() {
        let nack = io::Error::from_raw_os_error(libc::ENXIO);
        let err = EmbeddedError(HalError::io("/dev/i2c-1", nack));
        assert!(matches!(i2c::Error::kind(&err), i2c::ErrorKind::NoAcknowledge(_)));
        let other = EmbeddedError(HalError::NotInitialized);
        assert!(matches!(i2c::Error::kind(&other), i2c::ErrorKind::Other));
    }

    #[test]
    fn io_kinds_follow_errno() {
        use embedded_io::{Error, ErrorKind};
        let denied = io::Error::from_raw_os_error(libc::EACCES);
        let err = EmbeddedError(HalError::io("/dev/ttyS0", denied));
        assert_eq!(Error::kind(&err), ErrorKind::PermissionDenied);
        let bad = EmbeddedError(HalError::InvalidArgument("empty UART write"));
        assert_eq!(Error::kind(&bad), ErrorKind::InvalidInput);
    }
}
