//! spidev driver (`/dev/spidevB.C`)

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use hal_platform::{HalError, SpiInterface, SpiMode};
use hal_runtime::{HalContext, ResourceKind};
use parking_lot::Mutex;

use crate::claim::ResourceClaim;

// ── spidev ioctl numbers ────────────────────────────────────────────────────
//
// `_IOW('k', nr, size)` from <linux/spi/spidev.h>; libc does not export them.

const SPI_IOC_MAGIC: u32 = b'k' as u32;
const IOC_WRITE: u32 = 1;

#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
const fn spi_iow(nr: u32, size: usize) -> libc::Ioctl {
    ((IOC_WRITE << 30) | ((size as u32) << 16) | (SPI_IOC_MAGIC << 8) | nr) as libc::Ioctl
}

const SPI_IOC_WR_MODE: libc::Ioctl = spi_iow(1, std::mem::size_of::<u8>());
const SPI_IOC_WR_BITS_PER_WORD: libc::Ioctl = spi_iow(3, std::mem::size_of::<u8>());
const SPI_IOC_WR_MAX_SPEED_HZ: libc::Ioctl = spi_iow(4, std::mem::size_of::<u32>());
const SPI_IOC_MESSAGE_1: libc::Ioctl = spi_iow(0, std::mem::size_of::<SpiIocTransfer>());

/// `struct spi_ioc_transfer`
#[repr(C)]
#[derive(Default)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

const _: () = assert!(std::mem::size_of::<SpiIocTransfer>() == 32);

const BITS_PER_WORD: u8 = 8;

struct OpenSpi {
    file: File,
    path: PathBuf,
    speed_hz: u32,
    mode: SpiMode,
    _claim: ResourceClaim,
}

impl OpenSpi {
    fn ioctl_write<T>(&self, request: libc::Ioctl, value: &T) -> Result<(), HalError> {
        // SAFETY: `request` is a spidev `_IOW` request whose size matches
        // `T`, and `value` outlives the call.
        let ret =
            unsafe { libc::ioctl(self.file.as_raw_fd(), request, value as *const T) };
        if ret < 0 {
            return Err(HalError::io(&self.path, std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// One full-duplex message. Either buffer may be absent.
    fn message(
        &self,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
        len: usize,
    ) -> Result<(), HalError> {
        if len == 0 {
            return Err(HalError::InvalidArgument("zero-length SPI transfer"));
        }
        let mut xfer = SpiIocTransfer {
            tx_buf: tx.map_or(0, |b| b.as_ptr() as u64),
            rx_buf: rx.map_or(0, |b| b.as_mut_ptr() as u64),
            len: u32::try_from(len)
                .map_err(|_| HalError::InvalidArgument("SPI transfer too long"))?,
            bits_per_word: BITS_PER_WORD,
            ..SpiIocTransfer::default()
        };
        // SAFETY: `xfer` points at buffers of at least `len` bytes that stay
        // borrowed for the duration of the ioctl.
        let ret = unsafe {
            libc::ioctl(self.file.as_raw_fd(), SPI_IOC_MESSAGE_1, &mut xfer as *mut SpiIocTransfer)
        };
        if ret < 0 {
            return Err(HalError::io(&self.path, std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

/// [`SpiInterface`] over the spidev character device.
pub struct LinuxSpi {
    ctx: HalContext,
    state: Mutex<Option<OpenSpi>>,
}

impl LinuxSpi {
    /// Unopened device.
    pub fn new(ctx: HalContext) -> Self {
        Self { ctx, state: Mutex::new(None) }
    }

    /// Current clock, once open.
    pub fn speed_hz(&self) -> Option<u32> {
        self.state.lock().as_ref().map(|spi| spi.speed_hz)
    }

    /// Current mode, once open.
    pub fn mode(&self) -> Option<SpiMode> {
        self.state.lock().as_ref().map(|spi| spi.mode)
    }

    fn with_open<T>(
        &self,
        f: impl FnOnce(&mut OpenSpi) -> Result<T, HalError>,
    ) -> Result<T, HalError> {
        let mut state = self.state.lock();
        let spi = state.as_mut().ok_or(HalError::NotInitialized)?;
        f(spi)
    }
}

impl SpiInterface for LinuxSpi {
    fn init(
        &self,
        bus: u8,
        chip_select: u8,
        speed_hz: u32,
        mode: SpiMode,
    ) -> Result<(), HalError> {
        let path = self.ctx.config.dev_root.join(format!("spidev{bus}.{chip_select}"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| HalError::io(&path, e))?;
        let fd = u64::try_from(file.as_raw_fd()).unwrap_or(0);
        let claim = ResourceClaim::register(
            &self.ctx.registry,
            ResourceKind::SpiBus,
            path.display().to_string(),
            fd,
        );
        let spi = OpenSpi { file, path, speed_hz, mode, _claim: claim };
        spi.ioctl_write(SPI_IOC_WR_MODE, &mode.bits())?;
        spi.ioctl_write(SPI_IOC_WR_BITS_PER_WORD, &BITS_PER_WORD)?;
        spi.ioctl_write(SPI_IOC_WR_MAX_SPEED_HZ, &speed_hz)?;

        tracing::info!(path = %spi.path.display(), speed_hz, mode = spi.mode.bits(), "spi opened");
        *self.state.lock() = Some(spi);
        Ok(())
    }

    fn transfer(&self, tx: &[u8], rx: &mut [u8]) -> Result<(), HalError> {
        let rx = rx
            .get_mut(..tx.len())
            .ok_or(HalError::InvalidArgument("SPI receive buffer shorter than transmit"))?;
        self.with_open(|spi| spi.message(Some(tx), Some(rx), tx.len()))
    }

    fn write(&self, data: &[u8]) -> Result<(), HalError> {
        self.with_open(|spi| spi.message(Some(data), None, data.len()))
    }

    fn read(&self, buffer: &mut [u8]) -> Result<(), HalError> {
        let len = buffer.len();
        self.with_open(|spi| spi.message(None, Some(buffer), len))
    }

    fn set_speed(&self, speed_hz: u32) -> Result<(), HalError> {
        self.with_open(|spi| {
            spi.ioctl_write(SPI_IOC_WR_MAX_SPEED_HZ, &speed_hz)?;
            spi.speed_hz = speed_hz;
            Ok(())
        })
    }

    fn set_mode(&self, mode: SpiMode) -> Result<(), HalError> {
        self.with_open(|spi| {
            spi.ioctl_write(SPI_IOC_WR_MODE, &mode.bits())?;
            spi.mode = mode;
            Ok(())
        })
    }
}
