//! The event worker: one long-lived thread that demultiplexes the interrupt
//! status register into per-display vsync/commit events.
//!
//! The loop has two wake sources: the activation/stop condvar and a periodic
//! poll tick. While idle it blocks on the condvar; while active it runs one
//! `poll_pass` then sleeps on `wait_timeout` so deactivation or finalize
//! interrupts the sleep promptly. An in-flight pass always runs to
//! completion before the worker observes a stop request.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use visor_regs::{irq_bits, mmio, DISPLAY_COUNT};

use crate::device::Shared;
use crate::display::{ema_update, DisplayState};
use crate::lock;

/// Poll cadence while active.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_micros(1500);

/// If a display that has seen at least one vsync goes silent for this long,
/// its period estimate is forced back to the nominal refresh period.
pub(crate) const SILENCE_TIMEOUT: Duration = Duration::from_micros(1_000_000);

#[derive(Debug, Default)]
pub(crate) struct WorkerState {
    pub(crate) active: bool,
    pub(crate) stopping: bool,
}

/// Activation flag + wake condvar shared between the worker and the
/// lifecycle controller.
#[derive(Debug, Default)]
pub(crate) struct WorkerControl {
    pub(crate) state: Mutex<WorkerState>,
    pub(crate) wake: Condvar,
}

impl WorkerControl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_active(&self, active: bool) {
        let mut st = lock(&self.state);
        st.active = active;
        self.wake.notify_all();
    }

    /// Request worker exit and force-signal the idle wait so the thread sees
    /// the request without waiting out a poll interval.
    pub(crate) fn stop(&self) {
        let mut st = lock(&self.state);
        st.stopping = true;
        self.wake.notify_all();
    }
}

fn wait<'a>(cond: &Condvar, guard: MutexGuard<'a, WorkerState>) -> MutexGuard<'a, WorkerState> {
    match cond.wait(guard) {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn wait_timeout<'a>(
    cond: &Condvar,
    guard: MutexGuard<'a, WorkerState>,
    dur: Duration,
) -> MutexGuard<'a, WorkerState> {
    match cond.wait_timeout(guard, dur) {
        Ok((g, _)) => g,
        Err(poisoned) => poisoned.into_inner().0,
    }
}

pub(crate) fn run(shared: std::sync::Arc<Shared>) {
    tracing::debug!("event worker started");
    loop {
        {
            let mut st = lock(&shared.worker.state);
            while !st.active && !st.stopping {
                st = wait(&shared.worker.wake, st);
            }
            if st.stopping {
                break;
            }
        }

        poll_pass(&shared, Instant::now());

        let st = lock(&shared.worker.state);
        if st.stopping {
            break;
        }
        let st = wait_timeout(&shared.worker.wake, st, POLL_INTERVAL);
        if st.stopping {
            break;
        }
    }
    tracing::debug!("event worker stopped");
}

/// One active iteration: read-and-clear the interrupt status register,
/// dispatch per-display handlers, then apply silence recovery.
///
/// `now` is injected so tests can drive synthetic time.
pub(crate) fn poll_pass(shared: &Shared, now: Instant) {
    let status = shared.regs.read(mmio::IRQ_STATUS);
    if status != 0 {
        // Acknowledge exactly the bits we are about to handle; events latched
        // between the read and this write stay pending for the next pass.
        shared.regs.write(mmio::IRQ_STATUS, status);
        for d in 0..DISPLAY_COUNT {
            if status & irq_bits::vsync(d) != 0 {
                handle_vsync(&shared.displays[d], now);
            }
        }
        for d in 0..DISPLAY_COUNT {
            if status & irq_bits::commit(d) != 0 {
                handle_commit(&shared.displays[d], now);
            }
        }
    }

    let hz = lock(&shared.config).target_refresh_hz;
    let nominal_us = 1_000_000 / u64::from(hz);
    for display in &shared.displays {
        let mut stats = lock(&display.stats);
        if let Some(last) = stats.last_vsync {
            if now.saturating_duration_since(last) > SILENCE_TIMEOUT {
                stats.vsync_period_us = nominal_us;
            }
        }
    }
}

fn handle_vsync(display: &DisplayState, now: Instant) {
    let mut stats = lock(&display.stats);
    stats.frame_counter += 1;
    if let Some(prev) = stats.last_vsync {
        let diff_us = now.saturating_duration_since(prev).as_micros() as u64;
        stats.vsync_period_us = ema_update(stats.vsync_period_us, diff_us);
    }
    stats.last_vsync = Some(now);
    drop(stats);
    display.vsync.signal();
}

fn handle_commit(display: &DisplayState, now: Instant) {
    let mut stats = lock(&display.stats);
    if let Some(prev) = stats.last_commit {
        let diff_us = now.saturating_duration_since(prev).as_micros() as u64;
        stats.commit_latency_us = ema_update(stats.commit_latency_us, diff_us);
    }
    stats.last_commit = Some(now);
    drop(stats);
    display.commit.signal();
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::Config;
    use crate::hw::{CoherentAllocator, SimAllocator, SimWindow};

    fn test_shared() -> (Shared, Arc<SimWindow>) {
        let window = Arc::new(SimWindow::new());
        let shared = Shared::new(
            Arc::clone(&window) as _,
            Arc::new(SimAllocator::new()) as Arc<dyn CoherentAllocator>,
            Config::default(),
        );
        (shared, window)
    }

    #[test]
    fn vsync_updates_counter_and_ema() {
        let (shared, window) = test_shared();
        let t0 = Instant::now();

        window.raise_vsync(0);
        poll_pass(&shared, t0);
        // First vsync: counter only, no gap to average yet. Period stays at
        // the nominal 90Hz seed.
        let stats = *lock(&shared.displays[0].stats);
        assert_eq!(stats.frame_counter, 1);
        assert_eq!(stats.vsync_period_us, 11_111);

        window.raise_vsync(0);
        poll_pass(&shared, t0 + Duration::from_micros(11_100));
        let stats = *lock(&shared.displays[0].stats);
        assert_eq!(stats.frame_counter, 2);
        assert_eq!(stats.vsync_period_us, (11_111 * 7 + 11_100) / 8);
        assert_eq!(stats.vsync_period_us, 11_098);

        // Display 1 untouched.
        assert_eq!(lock(&shared.displays[1].stats).frame_counter, 0);
    }

    #[test]
    fn commit_latency_tracks_its_own_timestamps() {
        let (shared, window) = test_shared();
        let t0 = Instant::now();

        window.raise_commit(1);
        poll_pass(&shared, t0);
        window.raise_commit(1);
        poll_pass(&shared, t0 + Duration::from_micros(8_000));

        let stats = *lock(&shared.displays[1].stats);
        assert_eq!(stats.commit_latency_us, 8_000 / 8);
        // Commit events never touch the frame counter.
        assert_eq!(stats.frame_counter, 0);
    }

    #[test]
    fn pass_clears_handled_status_bits() {
        let (shared, window) = test_shared();
        window.raise_vsync(0);
        window.raise_commit(0);
        poll_pass(&shared, Instant::now());
        use crate::hw::RegisterWindow;
        assert_eq!(window.read(mmio::IRQ_STATUS), 0);
    }

    #[test]
    fn silence_forces_period_to_nominal_refresh() {
        let (shared, window) = test_shared();
        let t0 = Instant::now();

        window.raise_vsync(0);
        poll_pass(&shared, t0);
        window.raise_vsync(0);
        poll_pass(&shared, t0 + Duration::from_micros(20_000));
        let drifted = lock(&shared.displays[0].stats).vsync_period_us;
        assert_ne!(drifted, 11_111);

        // Under a second of silence: estimate untouched.
        poll_pass(&shared, t0 + Duration::from_millis(500));
        assert_eq!(lock(&shared.displays[0].stats).vsync_period_us, drifted);

        // Over a second: forced back to 1_000_000 / 90.
        poll_pass(&shared, t0 + Duration::from_secs(2));
        assert_eq!(lock(&shared.displays[0].stats).vsync_period_us, 11_111);
    }

    #[test]
    fn silence_recovery_ignores_displays_that_never_synced() {
        let (shared, _window) = test_shared();
        poll_pass(&shared, Instant::now() + Duration::from_secs(5));
        let stats = *lock(&shared.displays[0].stats);
        assert_eq!(stats.frame_counter, 0);
        assert!(stats.last_vsync.is_none());
    }
}
