//! sysfs PWM driver (`/sys/class/pwm/pwmchipN/pwmM`)

use std::path::{Path, PathBuf};

use hal_platform::{HalError, Polarity, PwmInterface};
use hal_runtime::{HalContext, ResourceKind};
use parking_lot::Mutex;

use crate::claim::ResourceClaim;
use crate::sysfs;

struct OpenPwm {
    chip_dir: PathBuf,
    channel_dir: PathBuf,
    channel: u8,
    period_ns: u64,
    duty_ns: u64,
    enabled: bool,
    polarity: Polarity,
    claim: Option<ResourceClaim>,
}

impl OpenPwm {
    fn attr(&self, name: &str) -> PathBuf {
        self.channel_dir.join(name)
    }

    fn write_enable(&self, on: bool) -> Result<(), HalError> {
        sysfs::write_attr(&self.attr("enable"), u8::from(on))
    }

    /// Run `f` with the output disabled, restoring it afterwards.
    fn with_output_paused(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), HalError>,
    ) -> Result<(), HalError> {
        let was_enabled = self.enabled;
        if was_enabled {
            self.write_enable(false)?;
        }
        let result = f(self);
        if was_enabled {
            if let Err(e) = self.write_enable(true) {
                tracing::warn!(error = %e, "failed to re-enable pwm output");
                self.enabled = false;
                return result.and(Err(e));
            }
        }
        result
    }
}

impl Drop for OpenPwm {
    fn drop(&mut self) {
        if self.enabled {
            if let Err(e) = self.write_enable(false) {
                tracing::warn!(error = %e, "failed to disable pwm output");
            }
        }
        drop(self.claim.take());
        if let Err(e) = sysfs::write_attr(&self.chip_dir.join("unexport"), self.channel) {
            tracing::warn!(error = %e, "pwm unexport failed");
        }
    }
}

fn read_or_zero(path: &Path) -> u64 {
    sysfs::read_parsed(path).unwrap_or(0)
}

/// [`PwmInterface`] over the sysfs PWM class.
pub struct LinuxPwm {
    ctx: HalContext,
    state: Mutex<Option<OpenPwm>>,
}

impl LinuxPwm {
    /// Unexported channel.
    pub fn new(ctx: HalContext) -> Self {
        Self { ctx, state: Mutex::new(None) }
    }

    /// Polarity last applied.
    pub fn polarity(&self) -> Polarity {
        self.state.lock().as_ref().map_or(Polarity::Normal, |pwm| pwm.polarity)
    }

    fn with_open<T>(
        &self,
        f: impl FnOnce(&mut OpenPwm) -> Result<T, HalError>,
    ) -> Result<T, HalError> {
        let mut state = self.state.lock();
        let pwm = state.as_mut().ok_or(HalError::NotInitialized)?;
        f(pwm)
    }
}

impl PwmInterface for LinuxPwm {
    fn init(&self, chip: u8, channel: u8) -> Result<(), HalError> {
        let chip_dir = self.ctx.config.pwm_root.join(format!("pwmchip{chip}"));
        let channel_dir = chip_dir.join(format!("pwm{channel}"));
        sysfs::export(
            &chip_dir.join("export"),
            &channel_dir,
            channel,
            self.ctx.config.export_settle(),
        )?;

        let claim = ResourceClaim::register(
            &self.ctx.registry,
            ResourceKind::PwmChannel,
            format!("PWM{chip}.{channel}"),
            (u64::from(chip) << 8) | u64::from(channel),
        );
        let pwm = OpenPwm {
            period_ns: read_or_zero(&channel_dir.join("period")),
            duty_ns: read_or_zero(&channel_dir.join("duty_cycle")),
            enabled: read_or_zero(&channel_dir.join("enable")) != 0,
            polarity: Polarity::Normal,
            chip_dir,
            channel_dir,
            channel,
            claim: Some(claim),
        };
        tracing::info!(chip, channel, period_ns = pwm.period_ns, "pwm exported");
        *self.state.lock() = Some(pwm);
        Ok(())
    }

    fn enable(&self, enable: bool) -> Result<(), HalError> {
        self.with_open(|pwm| {
            pwm.write_enable(enable)?;
            pwm.enabled = enable;
            Ok(())
        })
    }

    fn set_period(&self, period_ns: u64) -> Result<(), HalError> {
        self.with_open(|pwm| {
            pwm.with_output_paused(|pwm| {
                sysfs::write_attr(&pwm.attr("period"), period_ns)?;
                pwm.period_ns = period_ns;
                Ok(())
            })
        })
    }

    fn set_duty_cycle(&self, duty_ns: u64) -> Result<(), HalError> {
        self.with_open(|pwm| {
            if duty_ns > pwm.period_ns {
                return Err(HalError::InvalidArgument("duty cycle exceeds period"));
            }
            sysfs::write_attr(&pwm.attr("duty_cycle"), duty_ns)?;
            pwm.duty_ns = duty_ns;
            Ok(())
        })
    }

    fn set_duty_cycle_percent(&self, percent: f32) -> Result<(), HalError> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(HalError::InvalidArgument("duty cycle percent outside 0..=100"));
        }
        let period = self.period();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let duty = (period as f64 * f64::from(percent) / 100.0) as u64;
        self.set_duty_cycle(duty.min(period))
    }

    fn set_polarity(&self, polarity: Polarity) -> Result<(), HalError> {
        self.with_open(|pwm| {
            pwm.with_output_paused(|pwm| {
                sysfs::write_attr(&pwm.attr("polarity"), polarity)?;
                pwm.polarity = polarity;
                Ok(())
            })
        })
    }

    fn period(&self) -> u64 {
        self.state.lock().as_ref().map_or(0, |pwm| pwm.period_ns)
    }

    fn duty_cycle(&self) -> u64 {
        self.state.lock().as_ref().map_or(0, |pwm| pwm.duty_ns)
    }

    fn is_enabled(&self) -> bool {
        self.state.lock().as_ref().is_some_and(|pwm| pwm.enabled)
    }
}
