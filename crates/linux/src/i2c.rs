//! i2c-dev driver (`/dev/i2c-N`)

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use hal_platform::{HalError, I2cInterface};
use hal_runtime::{HalContext, ResourceKind};
use parking_lot::Mutex;

use crate::claim::ResourceClaim;
use crate::sysfs;

/// `I2C_SLAVE` from <linux/i2c-dev.h>
const I2C_SLAVE: libc::Ioctl = 0x0703;

struct OpenI2c {
    file: File,
    path: PathBuf,
    bus: u8,
    address: Option<u8>,
    _claim: ResourceClaim,
}

impl OpenI2c {
    fn select(&mut self, address: u8) -> Result<(), HalError> {
        if address > 0x7F {
            return Err(HalError::InvalidArgument("I2C address must be 7-bit"));
        }
        // SAFETY: I2C_SLAVE takes the address by value; no memory is shared.
        let ret =
            unsafe { libc::ioctl(self.file.as_raw_fd(), I2C_SLAVE, libc::c_ulong::from(address)) };
        if ret < 0 {
            return Err(HalError::io(&self.path, std::io::Error::last_os_error()));
        }
        self.address = Some(address);
        Ok(())
    }

    fn require_address(&self) -> Result<u8, HalError> {
        self.address.ok_or(HalError::InvalidState("no I2C device address selected"))
    }

    fn write(&mut self, data: &[u8]) -> Result<(), HalError> {
        self.require_address()?;
        self.file.write_all(data).map_err(|e| HalError::io(&self.path, e))
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), HalError> {
        self.require_address()?;
        self.file.read_exact(buffer).map_err(|e| HalError::io(&self.path, e))
    }
}

/// [`I2cInterface`] over the i2c-dev character device.
pub struct LinuxI2c {
    ctx: HalContext,
    state: Mutex<Option<OpenI2c>>,
}

impl LinuxI2c {
    /// Unopened adapter.
    pub fn new(ctx: HalContext) -> Self {
        Self { ctx, state: Mutex::new(None) }
    }

    /// Selected target address.
    pub fn device_address(&self) -> Option<u8> {
        self.state.lock().as_ref().and_then(|i2c| i2c.address)
    }

    fn with_open<T>(
        &self,
        f: impl FnOnce(&mut OpenI2c) -> Result<T, HalError>,
    ) -> Result<T, HalError> {
        let mut state = self.state.lock();
        let i2c = state.as_mut().ok_or(HalError::NotInitialized)?;
        f(i2c)
    }
}

impl I2cInterface for LinuxI2c {
    fn init(&self, bus: u8) -> Result<(), HalError> {
        let path = self.ctx.config.dev_root.join(format!("i2c-{bus}"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| HalError::io(&path, e))?;
        let fd = u64::try_from(file.as_raw_fd()).unwrap_or(0);
        let claim = ResourceClaim::register(
            &self.ctx.registry,
            ResourceKind::I2cBus,
            path.display().to_string(),
            fd,
        );
        tracing::info!(path = %path.display(), "i2c opened");
        *self.state.lock() = Some(OpenI2c { file, path, bus, address: None, _claim: claim });
        Ok(())
    }

    fn set_device_address(&self, address: u8) -> Result<(), HalError> {
        self.with_open(|i2c| i2c.select(address))
    }

    fn write(&self, data: &[u8]) -> Result<(), HalError> {
        self.with_open(|i2c| i2c.write(data))
    }

    fn read(&self, buffer: &mut [u8]) -> Result<(), HalError> {
        self.with_open(|i2c| i2c.read(buffer))
    }

    fn write_read(
        &self,
        address: u8,
        write: &[u8],
        read_len: usize,
    ) -> Result<Vec<u8>, HalError> {
        self.with_open(|i2c| {
            i2c.select(address)?;
            i2c.write(write)?;
            let mut buffer = vec![0u8; read_len];
            i2c.read(&mut buffer)?;
            Ok(buffer)
        })
    }

    fn set_speed(&self, speed_hz: u32) -> Result<(), HalError> {
        self.with_open(|i2c| {
            let adapter = self.ctx.config.i2c_adapter_root.join(format!("i2c-{}", i2c.bus));
            sysfs::write_attr(&adapter.join("speed"), speed_hz)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use hal_platform::HalConfig;
    use std::fs;

    /// Fake `/dev/i2c-1` as a regular file plus the adapter speed attribute.
    fn fake_bus() -> (tempfile::TempDir, HalContext) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("dev")).unwrap();
        fs::write(dir.path().join("dev/i2c-1"), "").unwrap();
        fs::create_dir_all(dir.path().join("i2c-adapter/i2c-1")).unwrap();
        fs::write(dir.path().join("i2c-adapter/i2c-1/speed"), "").unwrap();
        let ctx = HalContext::new(HalConfig::rooted_at(dir.path()));
        (dir, ctx)
    }

    #[test]
    fn init_registers_bus() {
        let (_dir, ctx) = fake_bus();
        let i2c = LinuxI2c::new(ctx.clone());
        i2c.init(1).unwrap();
        let info = ctx.registry.snapshot();
        assert_eq!(info.len(), 1);
        assert_eq!(info.first().unwrap().kind, ResourceKind::I2cBus);
        assert!(info.first().unwrap().name.ends_with("i2c-1"));
        drop(i2c);
        assert_eq!(ctx.registry.resource_count(), 0);
    }

    #[test]
    fn transfers_require_an_address() {
        let (_dir, ctx) = fake_bus();
        let i2c = LinuxI2c::new(ctx);
        i2c.init(1).unwrap();
        assert!(matches!(i2c.write(&[0x01]), Err(HalError::InvalidState(_))));
        let mut buf = [0u8; 1];
        assert!(matches!(i2c.read(&mut buf), Err(HalError::InvalidState(_))));
        assert!(i2c.device_address().is_none());
    }

    #[test]
    fn address_ioctl_fails_on_non_adapter() {
        let (_dir, ctx) = fake_bus();
        let i2c = LinuxI2c::new(ctx);
        i2c.init(1).unwrap();
        assert!(matches!(i2c.set_device_address(0x48), Err(HalError::Io { .. })));
        assert!(matches!(i2c.set_device_address(0x80), Err(HalError::InvalidArgument(_))));
    }

    #[test]
    fn speed_written_to_adapter_attribute() {
        let (dir, ctx) = fake_bus();
        let i2c = LinuxI2c::new(ctx);
        assert!(matches!(i2c.set_speed(100_000), Err(HalError::NotInitialized)));
        i2c.init(1).unwrap();
        i2c.set_speed(400_000).unwrap();
        let speed = fs::read_to_string(dir.path().join("i2c-adapter/i2c-1/speed")).unwrap();
        assert_eq!(speed, "400000");
    }
}
