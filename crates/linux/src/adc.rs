//! IIO ADC driver (`/sys/bus/iio/devices/iio:deviceN`)

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hal_platform::{AdcConfig, AdcInterface, AdcReadCallback, AdcResolution, HalError};
use hal_runtime::{CancellationToken, HalContext, ResourceKind};
use parking_lot::Mutex;

use crate::claim::ResourceClaim;
use crate::sysfs;

/// Sample period for a rate in Hz; 1 ms when the rate is zero.
///
/// Never shorter than 1 µs, so rates above 1 MHz cannot spin the sampler.
pub(crate) fn sample_period(rate_hz: u32) -> Duration {
    match rate_hz {
        0 => Duration::from_millis(1),
        rate => Duration::from_micros((1_000_000 / u64::from(rate)).max(1)),
    }
}

fn raw_attr(device_dir: &Path, channel: u8) -> PathBuf {
    device_dir.join(format!("in_voltage{channel}_raw"))
}

struct OpenAdc {
    device_dir: PathBuf,
    config: AdcConfig,
    _claim: ResourceClaim,
}

impl OpenAdc {
    fn scan_enable(&self, channel: u8, on: bool) -> Result<(), HalError> {
        let attr = self.device_dir.join("scan_elements").join(format!("in_voltage{channel}_en"));
        sysfs::write_attr(&attr, u8::from(on))
    }
}

struct Sampler {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// [`AdcInterface`] over the Industrial I/O sysfs interface.
pub struct LinuxAdc {
    ctx: HalContext,
    state: Mutex<Option<OpenAdc>>,
    sampler: Mutex<Option<Sampler>>,
    sampling: Arc<AtomicBool>,
}

impl LinuxAdc {
    /// Unopened device.
    pub fn new(ctx: HalContext) -> Self {
        Self {
            ctx,
            state: Mutex::new(None),
            sampler: Mutex::new(None),
            sampling: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Active configuration, once initialised.
    pub fn config(&self) -> Option<AdcConfig> {
        self.state.lock().as_ref().map(|adc| adc.config)
    }

    /// Whether a continuous sampling thread is running.
    pub fn is_sampling(&self) -> bool {
        self.sampling.load(Ordering::Acquire)
    }

    fn device_dir(&self) -> Result<PathBuf, HalError> {
        self.state.lock().as_ref().map(|adc| adc.device_dir.clone()).ok_or(HalError::NotInitialized)
    }

    fn with_open<T>(
        &self,
        f: impl FnOnce(&mut OpenAdc) -> Result<T, HalError>,
    ) -> Result<T, HalError> {
        let mut state = self.state.lock();
        let adc = state.as_mut().ok_or(HalError::NotInitialized)?;
        f(adc)
    }

    fn halt(&self) -> bool {
        let Some(sampler) = self.sampler.lock().take() else {
            return false;
        };
        sampler.token.cancel();
        if sampler.handle.join().is_err() {
            tracing::warn!("adc sampling thread panicked");
        }
        self.sampling.store(false, Ordering::Release);
        true
    }
}

impl AdcInterface for LinuxAdc {
    fn init(&self, device: u8, config: AdcConfig) -> Result<(), HalError> {
        let device_dir = self.ctx.config.iio_root.join(format!("iio:device{device}"));
        let name = sysfs::read_attr(&device_dir.join("name"))?;
        let claim = ResourceClaim::register(
            &self.ctx.registry,
            ResourceKind::AdcChannel,
            format!("ADC{device}"),
            u64::from(device),
        );
        tracing::info!(device, name = %name, bits = config.resolution.bits(), "adc opened");
        *self.state.lock() = Some(OpenAdc { device_dir, config, _claim: claim });
        Ok(())
    }

    fn enable_channel(&self, channel: u8) -> Result<(), HalError> {
        self.with_open(|adc| adc.scan_enable(channel, true))
    }

    fn disable_channel(&self, channel: u8) -> Result<(), HalError> {
        self.with_open(|adc| adc.scan_enable(channel, false))
    }

    fn read(&self, channel: u8) -> Result<u16, HalError> {
        let device_dir = self.device_dir()?;
        sysfs::read_parsed(&raw_attr(&device_dir, channel))
    }

    fn read_multiple(&self, channels: &[u8]) -> Result<Vec<u16>, HalError> {
        channels.iter().map(|&channel| self.read(channel)).collect()
    }

    fn start_continuous(&self, channel: u8, callback: AdcReadCallback) -> Result<(), HalError> {
        let (device_dir, rate) =
            self.with_open(|adc| Ok((adc.device_dir.clone(), adc.config.sampling_rate)))?;
        let mut sampler = self.sampler.lock();
        if self.sampling.load(Ordering::Acquire) {
            return Err(HalError::InvalidState("continuous sampling already running"));
        }
        // Reap a sampler whose thread has already exited
        if let Some(old) = sampler.take() {
            old.token.cancel();
            if old.handle.join().is_err() {
                tracing::warn!("adc sampling thread panicked");
            }
        }

        let token = CancellationToken::new();
        let worker_token = token.clone();
        let sampling = Arc::clone(&self.sampling);
        let period = sample_period(rate);
        let attr = raw_attr(&device_dir, channel);
        let name = format!("adc-sample-{channel}");

        self.sampling.store(true, Ordering::Release);
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            tracing::debug!(channel, "adc sampling started");
            loop {
                match sysfs::read_parsed::<u16>(&attr) {
                    Ok(value) => callback(value),
                    Err(e) => tracing::debug!(channel, error = %e, "adc sample skipped"),
                }
                if !worker_token.sleep(period) {
                    break;
                }
            }
            sampling.store(false, Ordering::Release);
            tracing::debug!(channel, "adc sampling stopped");
        });
        match spawned {
            Ok(handle) => {
                *sampler = Some(Sampler { token, handle });
                Ok(())
            }
            Err(e) => {
                self.sampling.store(false, Ordering::Release);
                Err(HalError::spawn(name, e))
            }
        }
    }

    fn stop_continuous(&self) -> Result<(), HalError> {
        if self.halt() {
            Ok(())
        } else {
            Err(HalError::InvalidState("continuous sampling not running"))
        }
    }

    fn set_resolution(&self, resolution: AdcResolution) -> Result<(), HalError> {
        self.with_open(|adc| {
            adc.config.resolution = resolution;
            Ok(())
        })
    }

    fn set_sampling_rate(&self, rate_hz: u32) -> Result<(), HalError> {
        self.with_open(|adc| {
            sysfs::write_attr(&adc.device_dir.join("sampling_frequency"), rate_hz)?;
            adc.config.sampling_rate = rate_hz;
            Ok(())
        })
    }

    fn read_voltage(&self, channel: u8, reference_voltage: f32) -> Result<f32, HalError> {
        let raw = self.read(channel)?;
        let resolution = self.with_open(|adc| Ok(adc.config.resolution))?;
        Ok(resolution.to_voltage(raw, reference_voltage))
    }
}

impl Drop for LinuxAdc {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn sample_period_follows_rate() {
        assert_eq!(sample_period(0), Duration::from_millis(1));
        assert_eq!(sample_period(1_000), Duration::from_millis(1));
        assert_eq!(sample_period(3_300), Duration::from_micros(303));
    }

    #[test]
    fn rates_above_one_megahertz_clamp_to_one_microsecond() {
        assert_eq!(sample_period(1_000_000), Duration::from_micros(1));
        assert_eq!(sample_period(2_000_000), Duration::from_micros(1));
        assert_eq!(sample_period(u32::MAX), Duration::from_micros(1));
    }

    #[test]
    fn uninitialised_adc_rejects_io() {
        let adc = LinuxAdc::new(HalContext::default());
        assert!(matches!(adc.read(0), Err(HalError::NotInitialized)));
        assert!(adc.start_continuous(0, Arc::new(|_| {})).is_err());
        assert!(matches!(adc.stop_continuous(), Err(HalError::InvalidState(_))));
    }
}
