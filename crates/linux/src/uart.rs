//! termios serial port driver
//!
//! The port runs in raw mode with `VMIN = 0` and `VTIME = 10`, so a read
//! returns whatever has arrived once the first byte is in, or nothing after
//! one second.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use hal_platform::{DataBits, HalError, Parity, StopBits, UartConfig, UartInterface};
use hal_runtime::{HalContext, ResourceKind};
use parking_lot::Mutex;

use crate::claim::ResourceClaim;

/// Map a baud rate to its termios constant. Unsupported rates fall back to
/// 115200.
pub(crate) fn baud_constant(baud_rate: u32) -> libc::speed_t {
    match baud_rate {
        9600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        230_400 => libc::B230400,
        460_800 => libc::B460800,
        500_000 => libc::B500000,
        576_000 => libc::B576000,
        921_600 => libc::B921600,
        1_000_000 => libc::B1000000,
        1_152_000 => libc::B1152000,
        1_500_000 => libc::B1500000,
        2_000_000 => libc::B2000000,
        2_500_000 => libc::B2500000,
        3_000_000 => libc::B3000000,
        3_500_000 => libc::B3500000,
        4_000_000 => libc::B4000000,
        _ => libc::B115200,
    }
}

/// Apply `config` to a termios structure read from the port.
pub(crate) fn apply_config(options: &mut libc::termios, config: &UartConfig) {
    options.c_cflag &= !libc::CSIZE;
    options.c_cflag |= match config.data_bits {
        DataBits::Five => libc::CS5,
        DataBits::Six => libc::CS6,
        DataBits::Seven => libc::CS7,
        DataBits::Eight => libc::CS8,
    };
    match config.stop_bits {
        StopBits::One => options.c_cflag &= !libc::CSTOPB,
        StopBits::Two => options.c_cflag |= libc::CSTOPB,
    }
    match config.parity {
        Parity::None => options.c_cflag &= !libc::PARENB,
        Parity::Even => {
            options.c_cflag |= libc::PARENB;
            options.c_cflag &= !libc::PARODD;
        }
        Parity::Odd => options.c_cflag |= libc::PARENB | libc::PARODD,
    }
    if config.flow_control {
        options.c_cflag |= libc::CRTSCTS;
    } else {
        options.c_cflag &= !libc::CRTSCTS;
    }
    options.c_cflag |= libc::CLOCAL | libc::CREAD;
    options.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ECHOE | libc::ISIG);
    options.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY | libc::ICRNL | libc::INLCR);
    options.c_oflag &= !libc::OPOST;
    if let Some(vmin) = options.c_cc.get_mut(libc::VMIN) {
        *vmin = 0;
    }
    // Tenths of a second
    if let Some(vtime) = options.c_cc.get_mut(libc::VTIME) {
        *vtime = 10;
    }
}

struct OpenUart {
    file: File,
    path: PathBuf,
    config: UartConfig,
    _claim: ResourceClaim,
}

impl OpenUart {
    fn os_error(&self) -> HalError {
        HalError::io(&self.path, std::io::Error::last_os_error())
    }

    fn configure(&mut self, config: UartConfig) -> Result<(), HalError> {
        let fd = self.file.as_raw_fd();
        // SAFETY: termios is plain old data; tcgetattr fully initialises it
        // before it is read.
        let mut options: libc::termios = unsafe { std::mem::zeroed() };
        // SAFETY: `fd` is open for the lifetime of `self.file` and `options`
        // is a valid, writable termios.
        if unsafe { libc::tcgetattr(fd, &mut options) } != 0 {
            return Err(self.os_error());
        }
        let speed = baud_constant(config.baud_rate);
        // SAFETY: `options` is a valid termios and `speed` a termios constant.
        if unsafe { libc::cfsetispeed(&mut options, speed) } != 0
            // SAFETY: as above
            || unsafe { libc::cfsetospeed(&mut options, speed) } != 0
        {
            return Err(self.os_error());
        }
        apply_config(&mut options, &config);
        // SAFETY: `fd` is open and `options` is fully initialised.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &options) } != 0 {
            return Err(self.os_error());
        }
        self.config = config;
        Ok(())
    }
}

/// [`UartInterface`] over a tty device.
pub struct LinuxUart {
    ctx: HalContext,
    state: Mutex<Option<OpenUart>>,
}

impl LinuxUart {
    /// Unopened port.
    pub fn new(ctx: HalContext) -> Self {
        Self { ctx, state: Mutex::new(None) }
    }

    /// Configuration currently applied.
    pub fn config(&self) -> Option<UartConfig> {
        self.state.lock().as_ref().map(|uart| uart.config)
    }

    fn with_open<T>(
        &self,
        f: impl FnOnce(&mut OpenUart) -> Result<T, HalError>,
    ) -> Result<T, HalError> {
        let mut state = self.state.lock();
        let uart = state.as_mut().ok_or(HalError::NotInitialized)?;
        f(uart)
    }
}

impl UartInterface for LinuxUart {
    fn init(&self, device: &str, config: UartConfig) -> Result<(), HalError> {
        let path = PathBuf::from(device);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NDELAY)
            .open(&path)
            .map_err(|e| HalError::io(&path, e))?;
        // Back to blocking reads now that open cannot hang on DCD
        // SAFETY: the descriptor is open and F_SETFL takes an integer.
        if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETFL, 0) } < 0 {
            return Err(HalError::io(&path, std::io::Error::last_os_error()));
        }
        let fd = u64::try_from(file.as_raw_fd()).unwrap_or(0);
        let claim =
            ResourceClaim::register(&self.ctx.registry, ResourceKind::UartPort, device, fd);
        let mut uart = OpenUart { file, path, config, _claim: claim };
        uart.configure(config)?;
        tracing::info!(device, baud = config.baud_rate, "uart opened");
        *self.state.lock() = Some(uart);
        Ok(())
    }

    fn write(&self, data: &[u8]) -> Result<(), HalError> {
        if data.is_empty() {
            return Err(HalError::InvalidArgument("empty UART write"));
        }
        self.with_open(|uart| uart.file.write_all(data).map_err(|e| HalError::io(&uart.path, e)))
    }

    fn read(&self, buffer: &mut [u8]) -> Result<usize, HalError> {
        if buffer.is_empty() {
            return Err(HalError::InvalidArgument("empty UART read buffer"));
        }
        self.with_open(|uart| uart.file.read(buffer).map_err(|e| HalError::io(&uart.path, e)))
    }

    fn available(&self) -> Result<usize, HalError> {
        self.with_open(|uart| {
            let mut pending: libc::c_int = 0;
            // SAFETY: FIONREAD writes one c_int through the pointer.
            let ret = unsafe {
                libc::ioctl(
                    uart.file.as_raw_fd(),
                    libc::FIONREAD,
                    &mut pending as *mut libc::c_int,
                )
            };
            if ret < 0 {
                return Err(uart.os_error());
            }
            Ok(usize::try_from(pending).unwrap_or(0))
        })
    }

    fn flush(&self) -> Result<(), HalError> {
        self.with_open(|uart| {
            // SAFETY: the descriptor is open for the duration of the call.
            if unsafe { libc::tcflush(uart.file.as_raw_fd(), libc::TCIOFLUSH) } != 0 {
                return Err(uart.os_error());
            }
            Ok(())
        })
    }

    fn drain(&self) -> Result<(), HalError> {
        self.with_open(|uart| {
            // SAFETY: the descriptor is open for the duration of the call.
            if unsafe { libc::tcdrain(uart.file.as_raw_fd()) } != 0 {
                return Err(uart.os_error());
            }
            Ok(())
        })
    }

    fn set_config(&self, config: UartConfig) -> Result<(), HalError> {
        self.with_open(|uart| uart.configure(config))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn blank_termios() -> libc::termios {
        // SAFETY: all-zero is a valid termios
        unsafe { std::mem::zeroed() }
    }

    #[test]
    fn unsupported_baud_falls_back() {
        assert_eq!(baud_constant(9600), libc::B9600);
        assert_eq!(baud_constant(921_600), libc::B921600);
        assert_eq!(baud_constant(12_345), libc::B115200);
        assert_eq!(baud_constant(115_200), libc::B115200);
    }

    #[test]
    fn seven_e_two_with_flow_control() {
        let mut t = blank_termios();
        let cfg = UartConfig {
            baud_rate: 19_200,
            data_bits: DataBits::Seven,
            parity: Parity::Even,
            stop_bits: StopBits::Two,
            flow_control: true,
        };
        apply_config(&mut t, &cfg);
        assert_eq!(t.c_cflag & libc::CSIZE, libc::CS7);
        assert_ne!(t.c_cflag & libc::PARENB, 0);
        assert_eq!(t.c_cflag & libc::PARODD, 0);
        assert_ne!(t.c_cflag & libc::CSTOPB, 0);
        assert_ne!(t.c_cflag & libc::CRTSCTS, 0);
    }

    #[test]
    fn eight_n_one_is_raw() {
        let mut t = blank_termios();
        t.c_lflag = libc::ICANON | libc::ECHO;
        t.c_cflag = libc::PARENB | libc::CSTOPB;
        apply_config(&mut t, &UartConfig::default());
        assert_eq!(t.c_cflag & libc::CSIZE, libc::CS8);
        assert_eq!(t.c_cflag & (libc::PARENB | libc::CSTOPB), 0);
        assert_eq!(t.c_lflag & (libc::ICANON | libc::ECHO), 0);
        assert_eq!(t.c_cc.get(libc::VTIME).copied(), Some(10));
        assert_eq!(t.c_cc.get(libc::VMIN).copied(), Some(0));
    }

    #[test]
    fn non_tty_fails_without_registration() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ttyFAKE");
        std::fs::write(&file, "").unwrap();
        let ctx = HalContext::default();
        let uart = LinuxUart::new(ctx.clone());
        assert!(uart.init(file.to_str().unwrap(), UartConfig::default()).is_err());
        assert_eq!(ctx.registry.resource_count(), 0);
        assert!(matches!(uart.available(), Err(HalError::NotInitialized)));
    }
}
