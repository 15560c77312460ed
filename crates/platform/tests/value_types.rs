//! Integration tests for the shared value types and configuration.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use hal_platform::{
    EdgeTrigger, HalConfig, HalError, HalType, PinDirection, PinValue, Polarity, UartConfig,
};

// ── Kernel keywords ─────────────────────────────────────────────────────────

#[test]
fn direction_keywords() {
    assert_eq!(PinDirection::Input.to_string(), "in");
    assert_eq!(PinDirection::Output.to_string(), "out");
}

#[test]
fn value_digits() {
    assert_eq!(PinValue::High.as_str(), "1");
    assert_eq!(PinValue::Low.as_str(), "0");
    assert_eq!(PinValue::default(), PinValue::Low);
}

#[test]
fn edge_and_polarity_keywords() {
    assert_eq!(EdgeTrigger::Both.to_string(), "both");
    assert_eq!(Polarity::Inversed.to_string(), "inversed");
    assert_eq!(Polarity::default(), Polarity::Normal);
}

// ── Configuration ───────────────────────────────────────────────────────────

#[test]
fn config_round_trips_through_json() {
    let mut cfg = HalConfig::default();
    cfg.visualizer_interval_ms = 250;
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(HalConfig::from_json(&json).unwrap(), cfg);
}

#[test]
fn default_uart_is_9600() {
    assert_eq!(UartConfig::default().baud_rate, 9600);
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[test]
fn pin_error_names_pin() {
    assert_eq!(HalError::PinNotConfigured(17).to_string(), "GPIO pin 17 not configured");
}

#[test]
fn unsupported_platform_names_selector() {
    let msg = HalError::UnsupportedPlatform(HalType::Invalid).to_string();
    assert!(msg.contains("invalid"));
}
