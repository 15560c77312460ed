//! Kernel-facing half of the GPIO driver

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hal_platform::{EdgeTrigger, HalConfig, HalError, PinDirection, PinValue};

use crate::sysfs;

/// Blocking source of edge events for one pin.
pub trait EdgeEvents: Send + 'static {
    /// Wait up to `timeout` for an edge.
    ///
    /// Returns the pin value after the edge, or `None` on timeout.
    fn wait(&mut self, timeout: Duration) -> Result<Option<PinValue>, HalError>;
}

/// Pin-level operations the GPIO driver needs from the kernel.
pub trait GpioBackend: Send + Sync + 'static {
    /// Edge source returned by [`GpioBackend::open_events`]
    type Events: EdgeEvents;

    /// Make `pin` available to user space.
    fn export(&self, pin: u8) -> Result<(), HalError>;
    /// Return `pin` to the kernel.
    fn unexport(&self, pin: u8) -> Result<(), HalError>;
    /// Configure direction.
    fn set_direction(&self, pin: u8, direction: PinDirection) -> Result<(), HalError>;
    /// Drive an output.
    fn write_value(&self, pin: u8, value: PinValue) -> Result<(), HalError>;
    /// Sample the line.
    fn read_value(&self, pin: u8) -> Result<PinValue, HalError>;
    /// Select edge detection; `None` disables it.
    fn set_edge(&self, pin: u8, edge: Option<EdgeTrigger>) -> Result<(), HalError>;
    /// Hardware debounce in milliseconds.
    fn set_debounce(&self, pin: u8, debounce_ms: u32) -> Result<(), HalError>;
    /// Open an edge-event source with any pending event already cleared.
    fn open_events(&self, pin: u8) -> Result<Self::Events, HalError>;
}

/// `/sys/class/gpio` backend.
#[derive(Debug, Clone)]
pub struct SysfsGpioBackend {
    root: PathBuf,
    settle: Duration,
}

impl SysfsGpioBackend {
    /// Backend rooted at `config.gpio_root`.
    pub fn new(config: &HalConfig) -> Self {
        Self { root: config.gpio_root.clone(), settle: config.export_settle() }
    }

    fn pin_dir(&self, pin: u8) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn attr(&self, pin: u8, name: &str) -> PathBuf {
        self.pin_dir(pin).join(name)
    }
}

impl GpioBackend for SysfsGpioBackend {
    type Events = SysfsEdgeEvents;

    fn export(&self, pin: u8) -> Result<(), HalError> {
        sysfs::export(&self.root.join("export"), &self.pin_dir(pin), pin, self.settle)
    }

    fn unexport(&self, pin: u8) -> Result<(), HalError> {
        sysfs::write_attr(&self.root.join("unexport"), pin)
    }

    fn set_direction(&self, pin: u8, direction: PinDirection) -> Result<(), HalError> {
        sysfs::write_attr(&self.attr(pin, "direction"), direction)
    }

    fn write_value(&self, pin: u8, value: PinValue) -> Result<(), HalError> {
        sysfs::write_attr(&self.attr(pin, "value"), value.as_str())
    }

    fn read_value(&self, pin: u8) -> Result<PinValue, HalError> {
        let text = sysfs::read_attr(&self.attr(pin, "value"))?;
        Ok(PinValue::from_ascii(text.bytes().next().unwrap_or(b'0')))
    }

    fn set_edge(&self, pin: u8, edge: Option<EdgeTrigger>) -> Result<(), HalError> {
        let keyword = edge.map_or("none", EdgeTrigger::as_str);
        sysfs::write_attr(&self.attr(pin, "edge"), keyword)
    }

    fn set_debounce(&self, pin: u8, debounce_ms: u32) -> Result<(), HalError> {
        sysfs::write_attr(&self.attr(pin, "debounce"), debounce_ms)
    }

    fn open_events(&self, pin: u8) -> Result<SysfsEdgeEvents, HalError> {
        SysfsEdgeEvents::open(&self.attr(pin, "value"))
    }
}

/// `poll(2)` on a sysfs `value` attribute.
///
/// The kernel signals an edge with `POLLPRI`; the value is re-read from
/// offset 0 to acknowledge it.
#[derive(Debug)]
pub struct SysfsEdgeEvents {
    file: File,
    path: PathBuf,
}

impl SysfsEdgeEvents {
    fn open(path: &Path) -> Result<Self, HalError> {
        let file = File::open(path).map_err(|e| HalError::io(path, e))?;
        let mut events = Self { file, path: path.to_path_buf() };
        // Clear whatever edge is already pending
        events.read_current()?;
        Ok(events)
    }

    fn read_current(&mut self) -> Result<Option<PinValue>, HalError> {
        let mut buf = [0u8; 3];
        self.file.seek(SeekFrom::Start(0)).map_err(|e| HalError::io(&self.path, e))?;
        let n = self.file.read(&mut buf).map_err(|e| HalError::io(&self.path, e))?;
        Ok(buf.get(..n).and_then(|b| b.first()).map(|&b| PinValue::from_ascii(b)))
    }
}

impl EdgeEvents for SysfsEdgeEvents {
    fn wait(&mut self, timeout: Duration) -> Result<Option<PinValue>, HalError> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLPRI | libc::POLLERR,
            revents: 0,
        };
        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
        // SAFETY: `pfd` is a valid pollfd for the duration of the call and
        // the count matches the single element passed.
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(HalError::io(&self.path, err));
        }
        if ret == 0 || pfd.revents & libc::POLLPRI == 0 {
            return Ok(None);
        }
        self.read_current()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::fs;

    fn fake_gpio_tree(pin: u8) -> (tempfile::TempDir, SysfsGpioBackend) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("gpio");
        let pin_dir = root.join(format!("gpio{pin}"));
        fs::create_dir_all(&pin_dir).unwrap();
        for attr in ["direction", "value", "edge", "debounce"] {
            fs::write(pin_dir.join(attr), "0\n").unwrap();
        }
        fs::write(root.join("export"), "").unwrap();
        fs::write(root.join("unexport"), "").unwrap();
        let backend = SysfsGpioBackend::new(&HalConfig::rooted_at(dir.path()));
        (dir, backend)
    }

    #[test]
    fn attributes_use_kernel_keywords() {
        let (dir, backend) = fake_gpio_tree(17);
        let pin_dir = dir.path().join("gpio/gpio17");

        backend.export(17).unwrap();
        backend.set_direction(17, PinDirection::Output).unwrap();
        backend.write_value(17, PinValue::High).unwrap();
        backend.set_edge(17, Some(EdgeTrigger::Falling)).unwrap();

        assert_eq!(fs::read_to_string(pin_dir.join("direction")).unwrap(), "out");
        assert_eq!(backend.read_value(17).unwrap(), PinValue::High);
        assert_eq!(fs::read_to_string(pin_dir.join("edge")).unwrap(), "falling");

        backend.set_edge(17, None).unwrap();
        assert_eq!(fs::read_to_string(pin_dir.join("edge")).unwrap(), "none");
    }

    #[test]
    fn unexport_writes_pin_number() {
        let (dir, backend) = fake_gpio_tree(5);
        backend.unexport(5).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("gpio/unexport")).unwrap(), "5");
    }

    #[test]
    fn missing_pin_directory_is_an_io_error() {
        let (_dir, backend) = fake_gpio_tree(5);
        let err = backend.set_direction(6, PinDirection::Input).unwrap_err();
        assert!(matches!(err, HalError::Io { .. }));
        assert!(backend.open_events(6).is_err());
    }
}
