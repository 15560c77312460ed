//! Run a software timer and report tick jitter.
//!
//! ```text
//! cargo run -p hal-linux --example timer_demo -- --interval-us 1000 --ticks 500
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Parser;
use hal_linux::{create_hal, DEFAULT_REALTIME_PRIORITY};
use hal_platform::{HalType, TimerCallback, TimerMode};
use hal_runtime::HalContext;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Measure software timer tick spacing")]
struct Args {
    /// Tick interval in microseconds
    #[arg(long, default_value_t = 1000)]
    interval_us: u32,
    /// Ticks to collect before stopping
    #[arg(long, default_value_t = 200)]
    ticks: usize,
    /// Fire once instead of periodically
    #[arg(long)]
    one_shot: bool,
    /// Request SCHED_FIFO first (needs CAP_SYS_NICE)
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();
    if args.interval_us == 0 {
        bail!("--interval-us must be positive");
    }

    let hal = create_hal(HalType::Auto, HalContext::default())?;
    if args.realtime {
        if let Err(e) = hal.configure_realtime(DEFAULT_REALTIME_PRIORITY) {
            tracing::warn!(error = %e, "continuing without real-time scheduling");
        }
    }

    let timer = hal.create_timer();
    let mode = if args.one_shot { TimerMode::OneShot } else { TimerMode::Periodic };
    timer.init(mode)?;

    let stamps = Arc::new(Mutex::new(Vec::with_capacity(args.ticks)));
    let clock = hal.create_timer();
    let callback: TimerCallback = {
        let stamps = Arc::clone(&stamps);
        Arc::new(move || stamps.lock().push(clock.current_time_us()))
    };
    timer.start(args.interval_us, callback)?;

    let wanted = if args.one_shot { 1 } else { args.ticks };
    let budget = u64::from(args.interval_us)
        .saturating_mul(u64::try_from(wanted).unwrap_or(u64::MAX))
        .saturating_mul(4);
    let deadline = Instant::now() + Duration::from_micros(budget) + Duration::from_secs(1);
    while stamps.lock().len() < wanted && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    timer.stop()?;

    let stamps = stamps.lock();
    let gaps: Vec<u64> =
        stamps.iter().zip(stamps.iter().skip(1)).map(|(a, b)| b.saturating_sub(*a)).collect();
    let (min, max) = (gaps.iter().min().copied(), gaps.iter().max().copied());
    tracing::info!(
        ticks = stamps.len(),
        elapsed_us = timer.elapsed_us(),
        min_gap_us = min.unwrap_or(0),
        max_gap_us = max.unwrap_or(0),
        "timer finished"
    );
    Ok(())
}
