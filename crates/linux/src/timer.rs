//! Software timer on a dedicated thread
//!
//! Ticks are delivered through the [`CallbackDispatcher`] under the timer's
//! id, never by calling the user closure directly, so a handler can stop its
//! own timer from inside the tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hal_platform::{HalError, TimerCallback, TimerInterface, TimerMode};
use hal_runtime::{
    CallbackDispatcher, CallbackId, CancellationToken, HalContext, ResourceKind, TimerId,
};
use parking_lot::Mutex;

use crate::claim::ResourceClaim;

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
    callback_id: CallbackId,
    /// Cleared by the thread itself when it leaves the tick loop.
    running: Arc<AtomicBool>,
}

impl Worker {
    fn is_live(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct TimerState {
    claim: Option<ResourceClaim>,
    timer_id: TimerId,
    mode: TimerMode,
    interval_us: u32,
    epoch: Option<Instant>,
    worker: Option<Worker>,
    /// Threads that stopped themselves from a tick and still need a join.
    unjoined: Vec<JoinHandle<()>>,
}

/// [`TimerInterface`] backed by `std::thread` and the monotonic clock.
pub struct LinuxTimer {
    ctx: HalContext,
    state: Mutex<TimerState>,
}

impl LinuxTimer {
    /// Uninitialised timer.
    pub fn new(ctx: HalContext) -> Self {
        Self { ctx, state: Mutex::new(TimerState::default()) }
    }

    /// Dispatcher key of this timer, once initialised.
    pub fn timer_id(&self) -> Option<TimerId> {
        let state = self.state.lock();
        state.claim.as_ref().map(|_| state.timer_id)
    }

    /// Mode selected at init.
    pub fn mode(&self) -> TimerMode {
        self.state.lock().mode
    }

    /// Cancel the worker, join it, then drop its dispatcher registration.
    fn halt(&self) -> bool {
        let worker = self.state.lock().worker.take();
        let Some(worker) = worker else {
            return false;
        };
        self.retire(worker);
        true
    }

    fn retire(&self, worker: Worker) {
        worker.token.cancel();
        worker.running.store(false, Ordering::Release);
        self.join(worker.handle);
        self.ctx.dispatcher.unregister_timer_callback(worker.callback_id);
    }

    /// Join `handle`, or park it when called from that very thread.
    fn join(&self, handle: JoinHandle<()>) {
        if handle.thread().id() == thread::current().id() {
            self.state.lock().unjoined.push(handle);
        } else if handle.join().is_err() {
            tracing::warn!("timer thread panicked");
        }
    }

    fn join_parked(&self) {
        let parked = std::mem::take(&mut self.state.lock().unjoined);
        for handle in parked {
            self.join(handle);
        }
    }

    #[cfg(test)]
    fn unjoined_threads(&self) -> usize {
        self.state.lock().unjoined.len()
    }
}

fn tick_loop(
    timer_id: TimerId,
    mode: TimerMode,
    period: Duration,
    dispatcher: &CallbackDispatcher,
    token: &CancellationToken,
    running: &AtomicBool,
) {
    let mut next = Instant::now().checked_add(period);
    while let Some(deadline) = next {
        if !token.sleep(deadline.saturating_duration_since(Instant::now())) {
            break;
        }
        dispatcher.invoke_timer_callback(timer_id);
        if mode == TimerMode::OneShot {
            break;
        }
        next = deadline.checked_add(period);
    }
    running.store(false, Ordering::Release);
    tracing::debug!(timer_id, "timer thread exited");
}

impl TimerInterface for LinuxTimer {
    fn init(&self, mode: TimerMode) -> Result<(), HalError> {
        let mut state = self.state.lock();
        if state.worker.as_ref().is_some_and(Worker::is_live) {
            return Err(HalError::InvalidState("timer is running"));
        }
        if state.claim.is_none() {
            let claim =
                ResourceClaim::register(&self.ctx.registry, ResourceKind::Timer, "Timer", 0);
            state.timer_id = TimerId::try_from(claim.id())
                .map_err(|_| HalError::InvalidState("timer id space exhausted"))?;
            state.claim = Some(claim);
        }
        state.mode = mode;
        tracing::debug!(timer_id = state.timer_id, "timer initialised");
        Ok(())
    }

    fn start(&self, interval_us: u32, callback: TimerCallback) -> Result<(), HalError> {
        if interval_us == 0 {
            return Err(HalError::InvalidArgument("timer interval must be non-zero"));
        }
        // The running check and the new worker are published under one lock,
        // so concurrent starts cannot both pass.
        let mut state = self.state.lock();
        if state.worker.as_ref().is_some_and(Worker::is_live) {
            return Err(HalError::InvalidState("timer already running"));
        }
        if state.claim.is_none() {
            return Err(HalError::NotInitialized);
        }
        let timer_id = state.timer_id;
        let mode = state.mode;
        let callback_id = self.ctx.dispatcher.register_timer_callback(timer_id, callback);

        let token = CancellationToken::new();
        let dispatcher = Arc::clone(&self.ctx.dispatcher);
        let running = Arc::new(AtomicBool::new(true));
        let (worker_token, worker_running) = (token.clone(), Arc::clone(&running));
        let period = Duration::from_micros(u64::from(interval_us));
        let name = format!("hal-timer-{timer_id}");

        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            tick_loop(timer_id, mode, period, &dispatcher, &worker_token, &worker_running);
        });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.ctx.dispatcher.unregister_timer_callback(callback_id);
                return Err(HalError::spawn(name, e));
            }
        };

        state.interval_us = interval_us;
        state.epoch = Some(Instant::now());
        // A finished one-shot is reaped once the lock is released
        let finished = state.worker.replace(Worker { token, handle, callback_id, running });
        drop(state);
        if let Some(finished) = finished {
            self.retire(finished);
        }
        self.join_parked();
        tracing::debug!(timer_id, interval_us, "timer started");
        Ok(())
    }

    fn stop(&self) -> Result<(), HalError> {
        if self.halt() {
            tracing::debug!("timer stopped");
        }
        Ok(())
    }

    fn reset(&self) -> Result<(), HalError> {
        if self.state.lock().claim.is_none() {
            return Err(HalError::NotInitialized);
        }
        self.halt();
        self.state.lock().epoch = Some(Instant::now());
        Ok(())
    }

    fn set_interval(&self, interval_us: u32) -> Result<(), HalError> {
        if interval_us == 0 {
            return Err(HalError::InvalidArgument("timer interval must be non-zero"));
        }
        let mut state = self.state.lock();
        if state.worker.as_ref().is_some_and(Worker::is_live) {
            return Err(HalError::InvalidState("cannot change interval while running"));
        }
        state.interval_us = interval_us;
        Ok(())
    }

    fn interval(&self) -> u32 {
        self.state.lock().interval_us
    }

    fn is_running(&self) -> bool {
        self.state.lock().worker.as_ref().is_some_and(Worker::is_live)
    }

    fn elapsed_us(&self) -> u64 {
        self.state
            .lock()
            .epoch
            .map_or(0, |epoch| u64::try_from(epoch.elapsed().as_micros()).unwrap_or(u64::MAX))
    }

    fn current_time_us(&self) -> u64 {
        let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
        // SAFETY: `ts` is a valid, writable timespec and CLOCK_MONOTONIC is
        // always available on Linux.
        let ret = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        if ret != 0 {
            return 0;
        }
        let secs = u64::try_from(ts.tv_sec).unwrap_or(0);
        let micros = u64::try_from(ts.tv_nsec).unwrap_or(0) / 1_000;
        secs.saturating_mul(1_000_000).saturating_add(micros)
    }
}

impl Drop for LinuxTimer {
    fn drop(&mut self) {
        self.halt();
        self.join_parked();
    }
}
