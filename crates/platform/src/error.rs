//! HAL error type

use std::io;
use std::path::PathBuf;

use crate::HalType;

/// Errors reported by HAL drivers and the factory.
///
/// Registry and dispatch operations do not use this type; they report
/// absence through sentinel values (`false`, `0`, `None`).
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    /// A kernel interface (sysfs attribute, character device, ioctl) failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Device node or sysfs attribute that was accessed
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// A process-level system call (scheduler, memory locking) failed
    #[error("{call} failed: {source}")]
    Syscall {
        /// Name of the call
        call: &'static str,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Operation requires `init` first
    #[error("peripheral not initialized")]
    NotInitialized,

    /// Argument outside the accepted range
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Operation not allowed in the current state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The factory was asked for a platform it cannot build
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(HalType),

    /// Pin has not been configured with `set_direction`
    #[error("GPIO pin {0} not configured")]
    PinNotConfigured(u8),

    /// A background thread could not be started
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        /// Thread name
        name: String,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Malformed configuration input
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HalError {
    /// Wrap an OS error with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Capture `errno` after a failed system call.
    pub fn last_os_error(call: &'static str) -> Self {
        Self::Syscall { call, source: io::Error::last_os_error() }
    }

    /// Wrap a thread spawn failure.
    pub fn spawn(name: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn { name: name.into(), source }
    }

    /// OS error code when this is an I/O failure.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } | Self::Syscall { source, .. } | Self::Spawn { source, .. } => {
                source.raw_os_error()
            }
            _ => None,
        }
    }
}
