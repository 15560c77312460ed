//! ADC driver against a fake IIO device tree.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hal_linux::LinuxAdc;
use hal_platform::{AdcConfig, AdcInterface, AdcResolution, HalConfig, HalError};
use hal_runtime::HalContext;
use tempfile::TempDir;

struct Tree {
    _dir: TempDir,
    device: PathBuf,
    ctx: HalContext,
}

fn tree() -> Tree {
    let dir = tempfile::tempdir().unwrap();
    let device = dir.path().join("iio").join("iio:device0");
    fs::create_dir_all(device.join("scan_elements")).unwrap();
    fs::write(device.join("name"), "ads1015\n").unwrap();
    fs::write(device.join("in_voltage0_raw"), "2048\n").unwrap();
    fs::write(device.join("in_voltage1_raw"), "100\n").unwrap();
    fs::write(device.join("sampling_frequency"), "1600\n").unwrap();
    fs::write(device.join("scan_elements/in_voltage0_en"), "0\n").unwrap();
    Tree { device, ctx: HalContext::new(HalConfig::rooted_at(dir.path())), _dir: dir }
}

fn attr(path: &Path) -> String {
    fs::read_to_string(path).unwrap().trim().to_owned()
}

fn opened(t: &Tree) -> LinuxAdc {
    let adc = LinuxAdc::new(t.ctx.clone());
    adc.init(0, AdcConfig::default()).unwrap();
    adc
}

#[test]
fn missing_device_registers_nothing() {
    let t = tree();
    let adc = LinuxAdc::new(t.ctx.clone());
    assert!(adc.init(3, AdcConfig::default()).is_err());
    assert_eq!(t.ctx.registry.resource_count(), 0);
    assert!(adc.config().is_none());
}

#[test]
fn reads_raw_and_scaled_values() {
    let t = tree();
    let adc = opened(&t);
    assert_eq!(t.ctx.registry.resource_count(), 1);

    assert_eq!(adc.read(0).unwrap(), 2048);
    assert_eq!(adc.read_multiple(&[0, 1]).unwrap(), vec![2048, 100]);
    assert!(adc.read(5).is_err());

    let volts = adc.read_voltage(0, 3.3).unwrap();
    assert!((volts - 1.650_4).abs() < 0.001, "got {volts}");

    adc.set_resolution(AdcResolution::Bits16).unwrap();
    let volts = adc.read_voltage(0, 3.3).unwrap();
    assert!((volts - 0.103_1).abs() < 0.001, "got {volts}");
}

#[test]
fn channel_enable_and_rate_write_attributes() {
    let t = tree();
    let adc = opened(&t);

    adc.enable_channel(0).unwrap();
    assert_eq!(attr(&t.device.join("scan_elements/in_voltage0_en")), "1");
    adc.disable_channel(0).unwrap();
    assert_eq!(attr(&t.device.join("scan_elements/in_voltage0_en")), "0");
    // No scan element for channel 1 in this device
    assert!(adc.enable_channel(1).is_err());

    adc.set_sampling_rate(1000).unwrap();
    assert_eq!(attr(&t.device.join("sampling_frequency")), "1000");
    assert_eq!(adc.config().unwrap().sampling_rate, 1000);
}

#[test]
fn continuous_sampling_until_stopped() {
    let t = tree();
    let adc = opened(&t);
    let samples = Arc::new(AtomicU64::new(0));
    let last = Arc::new(AtomicU64::new(0));
    let callback = {
        let samples = Arc::clone(&samples);
        let last = Arc::clone(&last);
        Arc::new(move |value: u16| {
            last.store(u64::from(value), Ordering::SeqCst);
            samples.fetch_add(1, Ordering::SeqCst);
        })
    };

    adc.start_continuous(0, callback.clone()).unwrap();
    assert!(adc.is_sampling());
    assert!(matches!(adc.start_continuous(0, callback), Err(HalError::InvalidState(_))));

    let deadline = Instant::now() + Duration::from_secs(2);
    while samples.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(samples.load(Ordering::SeqCst) >= 3);
    assert_eq!(last.load(Ordering::SeqCst), 2048);

    adc.stop_continuous().unwrap();
    assert!(!adc.is_sampling());
    let after = samples.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(samples.load(Ordering::SeqCst), after);
    assert!(matches!(adc.stop_continuous(), Err(HalError::InvalidState(_))));
}

#[test]
fn drop_stops_sampling_and_unregisters() {
    let t = tree();
    let adc = opened(&t);
    adc.start_continuous(1, Arc::new(|_| {})).unwrap();
    drop(adc);
    assert_eq!(t.ctx.registry.resource_count(), 0);
}
