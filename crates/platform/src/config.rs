//! Runtime configuration
//!
//! Kernel interface roots and timing constants used by every driver. The
//! defaults point at the real kernel; tests override the roots with a
//! temporary directory tree.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::HalError;

/// Default sysfs GPIO class root
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";
/// Default sysfs PWM class root
pub const DEFAULT_PWM_ROOT: &str = "/sys/class/pwm";
/// Default IIO bus root
pub const DEFAULT_IIO_ROOT: &str = "/sys/bus/iio/devices";
/// Default I2C adapter class root
pub const DEFAULT_I2C_ADAPTER_ROOT: &str = "/sys/class/i2c-adapter";
/// Default device node directory
pub const DEFAULT_DEV_ROOT: &str = "/dev";

/// Paths and timing used by the Linux drivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    /// Directory holding `export`, `unexport` and `gpio<N>/`
    pub gpio_root: PathBuf,
    /// Directory holding `pwmchip<N>/`
    pub pwm_root: PathBuf,
    /// Directory holding `iio:device<N>/`
    pub iio_root: PathBuf,
    /// Directory holding `i2c-<N>/` adapter attributes
    pub i2c_adapter_root: PathBuf,
    /// Directory holding `spidev*`, `i2c-*` and tty nodes
    pub dev_root: PathBuf,
    /// Upper bound of one edge-event wait in the interrupt monitor
    pub interrupt_poll_timeout_ms: u64,
    /// Delay after writing `export` before the pin directory is usable
    pub export_settle_ms: u64,
    /// Sampling period of the resource visualizer
    pub visualizer_interval_ms: u64,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            gpio_root: PathBuf::from(DEFAULT_GPIO_ROOT),
            pwm_root: PathBuf::from(DEFAULT_PWM_ROOT),
            iio_root: PathBuf::from(DEFAULT_IIO_ROOT),
            i2c_adapter_root: PathBuf::from(DEFAULT_I2C_ADAPTER_ROOT),
            dev_root: PathBuf::from(DEFAULT_DEV_ROOT),
            interrupt_poll_timeout_ms: 100,
            export_settle_ms: 10,
            visualizer_interval_ms: 500,
        }
    }
}

impl HalConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, HalError> {
        serde_json::from_str(json).map_err(|e| HalError::Config(e.to_string()))
    }

    /// Defaults overridden by `HAL_*` environment variables.
    ///
    /// Recognised: `HAL_GPIO_ROOT`, `HAL_PWM_ROOT`, `HAL_IIO_ROOT`,
    /// `HAL_I2C_ADAPTER_ROOT`, `HAL_DEV_ROOT`, `HAL_INTERRUPT_POLL_MS`.
    pub fn from_env() -> Result<Self, HalError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`HalConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HalError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let roots = [
            ("HAL_GPIO_ROOT", &mut cfg.gpio_root),
            ("HAL_PWM_ROOT", &mut cfg.pwm_root),
            ("HAL_IIO_ROOT", &mut cfg.iio_root),
            ("HAL_I2C_ADAPTER_ROOT", &mut cfg.i2c_adapter_root),
            ("HAL_DEV_ROOT", &mut cfg.dev_root),
        ];
        for (key, slot) in roots {
            if let Some(value) = lookup(key) {
                *slot = PathBuf::from(value);
            }
        }
        if let Some(ms) = lookup("HAL_INTERRUPT_POLL_MS") {
            cfg.interrupt_poll_timeout_ms = ms
                .trim()
                .parse()
                .map_err(|_| HalError::Config(format!("HAL_INTERRUPT_POLL_MS={ms}")))?;
        }
        Ok(cfg)
    }

    /// Every kernel root redirected under `base` (`base/gpio`, `base/pwm`, ...).
    ///
    /// Intended for fake sysfs trees in tests and simulators.
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            gpio_root: base.join("gpio"),
            pwm_root: base.join("pwm"),
            iio_root: base.join("iio"),
            i2c_adapter_root: base.join("i2c-adapter"),
            dev_root: base.join("dev"),
            ..Self::default()
        }
    }

    /// Edge wait bound as a [`Duration`].
    pub fn interrupt_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.interrupt_poll_timeout_ms)
    }

    /// Post-export settle delay as a [`Duration`].
    pub fn export_settle(&self) -> Duration {
        Duration::from_millis(self.export_settle_ms)
    }

    /// Visualizer sampling period as a [`Duration`].
    pub fn visualizer_interval(&self) -> Duration {
        Duration::from_millis(self.visualizer_interval_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_point_at_kernel() {
        let cfg = HalConfig::default();
        assert_eq!(cfg.gpio_root, PathBuf::from("/sys/class/gpio"));
        assert_eq!(cfg.interrupt_poll_timeout(), Duration::from_millis(100));
        assert_eq!(cfg.export_settle(), Duration::from_millis(10));
        assert_eq!(cfg.visualizer_interval(), Duration::from_millis(500));
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let cfg = HalConfig::from_json(r#"{ "gpio_root": "/tmp/gpio" }"#).unwrap();
        assert_eq!(cfg.gpio_root, PathBuf::from("/tmp/gpio"));
        assert_eq!(cfg.pwm_root, PathBuf::from(DEFAULT_PWM_ROOT));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = HalConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, HalError::Config(_)));
    }

    #[test]
    fn lookup_overrides_roots_and_poll_timeout() {
        let vars: HashMap<&str, &str> =
            [("HAL_GPIO_ROOT", "/fake/gpio"), ("HAL_INTERRUPT_POLL_MS", "25")].into();
        let cfg = HalConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(cfg.gpio_root, PathBuf::from("/fake/gpio"));
        assert_eq!(cfg.interrupt_poll_timeout_ms, 25);
        assert_eq!(cfg.dev_root, PathBuf::from(DEFAULT_DEV_ROOT));
    }

    #[test]
    fn unparsable_poll_timeout_is_rejected() {
        let result =
            HalConfig::from_lookup(|k| (k == "HAL_INTERRUPT_POLL_MS").then(|| "soon".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn rooted_at_moves_every_root() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = HalConfig::rooted_at(tmp.path());
        assert!(cfg.gpio_root.starts_with(tmp.path()));
        assert!(cfg.iio_root.starts_with(tmp.path()));
        assert!(cfg.dev_root.starts_with(tmp.path()));
    }
}
