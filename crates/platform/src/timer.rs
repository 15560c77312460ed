//! Software timer abstraction

use std::sync::Arc;

use crate::HalError;

/// Handler invoked on every timer expiry.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// Timer firing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerMode {
    /// Fire once, then stop
    OneShot,
    /// Fire every interval until stopped
    #[default]
    Periodic,
}

/// Timer operations.
///
/// Intervals are in microseconds.
pub trait TimerInterface: Send + Sync {
    /// Select the firing mode.
    fn init(&self, mode: TimerMode) -> Result<(), HalError>;

    /// Start firing `callback` every `interval_us`.
    ///
    /// Fails if the timer is already running or the interval is zero.
    fn start(&self, interval_us: u32, callback: TimerCallback) -> Result<(), HalError>;

    /// Stop and join the timer thread.
    fn stop(&self) -> Result<(), HalError>;

    /// Restart the elapsed-time reference.
    fn reset(&self) -> Result<(), HalError>;

    /// Change the interval; rejected while running.
    fn set_interval(&self, interval_us: u32) -> Result<(), HalError>;

    /// Configured interval in microseconds.
    fn interval(&self) -> u32;

    /// Whether the timer thread is active.
    fn is_running(&self) -> bool;

    /// Microseconds since start or the last reset.
    fn elapsed_us(&self) -> u64;

    /// Monotonic clock reading in microseconds.
    fn current_time_us(&self) -> u64;
}
