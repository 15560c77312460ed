//! Blink an LED and optionally log edges on a second pin.
//!
//! ```text
//! RUST_LOG=debug cargo run -p hal-linux --example gpio_blink -- --pin 17 --watch 27
//! ```
//!
//! Kernel roots come from the `HAL_*` environment variables, so the demo can
//! run against a fake sysfs tree.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use embedded_hal::digital::OutputPin;
use hal_linux::{create_hal, GpioPin};
use hal_platform::{EdgeTrigger, HalConfig, HalType};
use hal_runtime::{HalContext, ResourceVisualizer};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Toggle a GPIO output through the sysfs driver")]
struct Args {
    /// Output pin
    #[arg(long, default_value_t = 17)]
    pin: u8,
    /// Number of on/off cycles
    #[arg(long, default_value_t = 10)]
    count: u32,
    /// Half-period in milliseconds
    #[arg(long, default_value_t = 250)]
    half_period_ms: u64,
    /// Input pin whose edges are logged while blinking
    #[arg(long)]
    watch: Option<u8>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let ctx = HalContext::new(HalConfig::from_env().context("reading HAL_* variables")?);
    let hal = create_hal(HalType::Auto, ctx.clone())?;
    let gpio = hal.create_gpio();

    let edges = Arc::new(AtomicU64::new(0));
    if let Some(watch) = args.watch {
        let seen = Arc::clone(&edges);
        gpio.set_interrupt(
            watch,
            EdgeTrigger::Both,
            Arc::new(move |pin, value| {
                seen.fetch_add(1, Ordering::Relaxed);
                tracing::info!(pin, value = %value, "edge");
            }),
        )
        .with_context(|| format!("arming GPIO{watch}"))?;
    }

    let mut led = GpioPin::output(gpio.as_ref(), args.pin)
        .with_context(|| format!("configuring GPIO{} as output", args.pin))?;
    let half_period = Duration::from_millis(args.half_period_ms);
    for cycle in 0..args.count {
        led.set_high()?;
        thread::sleep(half_period);
        led.set_low()?;
        thread::sleep(half_period);
        tracing::debug!(cycle, "blink");
    }

    let visualizer = ResourceVisualizer::new(Arc::clone(&ctx.registry));
    visualizer.gather_resource_data();
    visualizer.build_resource_graph();
    tracing::info!(edges = edges.load(Ordering::Relaxed), "done\n{}", visualizer.render_graph());

    if let Some(watch) = args.watch {
        gpio.remove_interrupt(watch)?;
    }
    Ok(())
}
