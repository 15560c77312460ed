//! sysfs attribute access
//!
//! Attributes are opened without `O_CREAT`: writing to an attribute the
//! kernel has not created is an error, in a real sysfs and in a fake tree.
//! `O_TRUNC` is harmless on sysfs and keeps fake trees byte-exact.

use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use hal_platform::HalError;

/// Write `value` to an existing attribute in a single `write(2)`.
pub(crate) fn write_attr(path: &Path, value: impl Display) -> Result<(), HalError> {
    let text = value.to_string();
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .and_then(|mut file| file.write_all(text.as_bytes()))
        .map_err(|e| HalError::io(path, e))
}

/// Read an attribute with surrounding whitespace removed.
pub(crate) fn read_attr(path: &Path) -> Result<String, HalError> {
    fs::read_to_string(path).map(|s| s.trim().to_owned()).map_err(|e| HalError::io(path, e))
}

/// Read and parse a numeric attribute.
pub(crate) fn read_parsed<T: FromStr>(path: &Path) -> Result<T, HalError> {
    let text = read_attr(path)?;
    text.parse().map_err(|_| {
        let msg = format!("unparsable value '{text}'");
        HalError::io(path, io::Error::new(io::ErrorKind::InvalidData, msg))
    })
}

/// Write `index` to an `export` attribute unless `node` already exists,
/// then give udev `settle` to create the node's attributes.
pub(crate) fn export(
    export_attr: &Path,
    node: &Path,
    index: u8,
    settle: Duration,
) -> Result<(), HalError> {
    if node.exists() {
        tracing::trace!(node = %node.display(), "already exported");
        return Ok(());
    }
    write_attr(export_attr, index)?;
    thread::sleep(settle);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn write_requires_existing_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let attr = dir.path().join("value");
        assert!(write_attr(&attr, 1).is_err());

        fs::write(&attr, "").unwrap();
        write_attr(&attr, 1).unwrap();
        assert_eq!(read_attr(&attr).unwrap(), "1");
    }

    #[test]
    fn parse_failure_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let attr = dir.path().join("period");
        fs::write(&attr, "abc\n").unwrap();
        let err = read_parsed::<u64>(&attr).unwrap_err();
        assert!(err.to_string().contains("period"));
    }

    #[test]
    fn export_skips_existing_node() {
        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("gpio4");
        fs::create_dir(&node).unwrap();
        // No export attribute: would fail if written
        export(&dir.path().join("export"), &node, 4, Duration::ZERO).unwrap();
    }
}
