//! Linux platform factory and process scheduling

use hal_platform::{
    AdcInterface, GpioInterface, Hal, HalError, HalType, I2cInterface, PwmInterface,
    RealtimePolicy, RealtimeState, SpiInterface, TimerInterface, UartInterface,
};
use hal_runtime::HalContext;

use crate::{GpioDriver, LinuxAdc, LinuxI2c, LinuxPwm, LinuxSpi, LinuxTimer, LinuxUart};

/// Priority used by [`Hal::set_realtime_policy`] for the real-time classes.
pub const DEFAULT_REALTIME_PRIORITY: i32 = 10;

/// Build the HAL for `hal_type`.
///
/// `Linux` and `Auto` both produce a [`LinuxHal`]; anything else is
/// [`HalError::UnsupportedPlatform`].
pub fn create_hal(hal_type: HalType, ctx: HalContext) -> Result<Box<dyn Hal>, HalError> {
    match hal_type {
        HalType::Linux | HalType::Auto => Ok(Box::new(LinuxHal::new(ctx))),
        HalType::Invalid => Err(HalError::UnsupportedPlatform(hal_type)),
    }
}

/// [`Hal`] for Linux hosts: sysfs and character-device drivers.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal {
    ctx: HalContext,
}

impl LinuxHal {
    /// Factory handing `ctx` to every driver it creates.
    pub fn new(ctx: HalContext) -> Self {
        Self { ctx }
    }

    /// Shared services used by the drivers.
    pub fn context(&self) -> &HalContext {
        &self.ctx
    }
}

fn set_scheduler(policy: libc::c_int, priority: i32) -> Result<(), HalError> {
    let param = libc::sched_param { sched_priority: priority };
    // SAFETY: pid 0 is the calling process and `param` is valid for the call.
    if unsafe { libc::sched_setscheduler(0, policy, &param) } == -1 {
        return Err(HalError::last_os_error("sched_setscheduler"));
    }
    Ok(())
}

fn current_scheduler() -> Result<(libc::c_int, i32), HalError> {
    // SAFETY: pid 0 is the calling process.
    let policy = unsafe { libc::sched_getscheduler(0) };
    if policy == -1 {
        return Err(HalError::last_os_error("sched_getscheduler"));
    }
    let mut param = libc::sched_param { sched_priority: 0 };
    // SAFETY: `param` is a valid, writable sched_param.
    if unsafe { libc::sched_getparam(0, &mut param) } == -1 {
        return Err(HalError::last_os_error("sched_getparam"));
    }
    Ok((policy, param.sched_priority))
}

impl Hal for LinuxHal {
    fn init(&self) -> Result<(), HalError> {
        tracing::info!(gpio_root = %self.ctx.config.gpio_root.display(), "linux hal initialised");
        Ok(())
    }

    fn shutdown(&self) {
        tracing::info!(resources = self.ctx.registry.resource_count(), "linux hal shut down");
    }

    fn configure_realtime(&self, priority: i32) -> Result<(), HalError> {
        set_scheduler(libc::SCHED_FIFO, priority)?;
        // SAFETY: mlockall takes flags only.
        if unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) } == -1 {
            return Err(HalError::last_os_error("mlockall"));
        }
        tracing::info!(priority, "real-time scheduling enabled");
        Ok(())
    }

    fn is_realtime_configured(&self) -> bool {
        self.realtime_state() == RealtimeState::Running
    }

    fn realtime_state(&self) -> RealtimeState {
        match current_scheduler() {
            Ok((libc::SCHED_FIFO, priority)) if priority > 0 => RealtimeState::Running,
            Ok(_) => RealtimeState::NotRunning,
            Err(e) => {
                tracing::warn!(error = %e, "cannot query scheduler");
                RealtimeState::Error
            }
        }
    }

    fn set_realtime_policy(&self, policy: RealtimePolicy) -> RealtimePolicy {
        let result = match policy {
            RealtimePolicy::Fifo => self.configure_realtime(DEFAULT_REALTIME_PRIORITY),
            RealtimePolicy::RoundRobin => set_scheduler(libc::SCHED_RR, DEFAULT_REALTIME_PRIORITY),
            RealtimePolicy::None => set_scheduler(libc::SCHED_OTHER, 0),
            RealtimePolicy::Invalid => return RealtimePolicy::Invalid,
        };
        match result {
            Ok(()) => policy,
            Err(e) => {
                tracing::warn!(error = %e, "scheduling policy change failed");
                RealtimePolicy::Invalid
            }
        }
    }

    fn realtime_policy(&self) -> RealtimePolicy {
        match current_scheduler() {
            Ok((libc::SCHED_FIFO, _)) => RealtimePolicy::Fifo,
            Ok((libc::SCHED_RR, _)) => RealtimePolicy::RoundRobin,
            Ok((libc::SCHED_OTHER, _)) => RealtimePolicy::None,
            Ok(_) => RealtimePolicy::Invalid,
            Err(e) => {
                tracing::warn!(error = %e, "cannot query scheduler");
                RealtimePolicy::Invalid
            }
        }
    }

    fn create_gpio(&self) -> Box<dyn GpioInterface> {
        Box::new(GpioDriver::new(self.ctx.clone()))
    }

    fn create_spi(&self) -> Box<dyn SpiInterface> {
        Box::new(LinuxSpi::new(self.ctx.clone()))
    }

    fn create_i2c(&self) -> Box<dyn I2cInterface> {
        Box::new(LinuxI2c::new(self.ctx.clone()))
    }

    fn create_uart(&self) -> Box<dyn UartInterface> {
        Box::new(LinuxUart::new(self.ctx.clone()))
    }

    fn create_pwm(&self) -> Box<dyn PwmInterface> {
        Box::new(LinuxPwm::new(self.ctx.clone()))
    }

    fn create_timer(&self) -> Box<dyn TimerInterface> {
        Box::new(LinuxTimer::new(self.ctx.clone()))
    }

    fn create_adc(&self) -> Box<dyn AdcInterface> {
        Box::new(LinuxAdc::new(self.ctx.clone()))
    }
}
