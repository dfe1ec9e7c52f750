//! Per-display state: bounds-checked indexing, rolling timing statistics,
//! and the wait points callers block on.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::lock;

pub use visor_regs::DISPLAY_COUNT;

/// Bounds-checked display index. All per-display operations go through this,
/// so an out-of-range index is rejected in exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayIndex(usize);

impl DisplayIndex {
    pub fn new(index: usize) -> Result<Self> {
        if index < DISPLAY_COUNT {
            Ok(Self(index))
        } else {
            Err(Error::InvalidArgument)
        }
    }

    pub fn get(self) -> usize {
        self.0
    }
}

/// Rolling timing statistics for one display. Written exclusively by the
/// event worker; read by callers through snapshot accessors.
#[derive(Debug, Clone, Copy)]
pub struct DisplayStats {
    /// Monotonic vsync count. Never reset while the device context lives;
    /// disable/enable pauses it without clearing it.
    pub frame_counter: u64,
    pub last_vsync: Option<Instant>,
    pub last_commit: Option<Instant>,
    /// EMA estimate of the inter-vsync period, microseconds.
    pub vsync_period_us: u64,
    /// EMA estimate of the commit latency, microseconds.
    pub commit_latency_us: u64,
}

impl DisplayStats {
    pub(crate) fn new(nominal_period_us: u64) -> Self {
        Self {
            frame_counter: 0,
            last_vsync: None,
            last_commit: None,
            vsync_period_us: nominal_period_us,
            commit_latency_us: 0,
        }
    }
}

/// Fixed-weight recursive average: 7/8 history, 1/8 new sample, integer
/// division.
pub(crate) fn ema_update(prev: u64, sample: u64) -> u64 {
    (prev * 7 + sample) / 8
}

/// Broadcast wait point. `signal` releases every current waiter; `wait`
/// blocks until the next signal after entry, bounded by `timeout`.
#[derive(Debug, Default)]
pub(crate) struct EventGate {
    seq: Mutex<u64>,
    cond: Condvar,
}

impl EventGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn signal(&self) {
        let mut seq = lock(&self.seq);
        *seq = seq.wrapping_add(1);
        self.cond.notify_all();
    }

    pub(crate) fn wait(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut seq = lock(&self.seq);
        let entry = *seq;
        while *seq == entry {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            let (guard, _) = match self.cond.wait_timeout(seq, deadline - now) {
                Ok(v) => v,
                Err(poisoned) => poisoned.into_inner(),
            };
            seq = guard;
        }
        Ok(())
    }
}

/// One display's slice of the device context: its statistics and the two
/// wait points (vsync, commit).
pub(crate) struct DisplayState {
    pub(crate) stats: Mutex<DisplayStats>,
    pub(crate) vsync: EventGate,
    pub(crate) commit: EventGate,
}

impl DisplayState {
    pub(crate) fn new(nominal_period_us: u64) -> Self {
        Self {
            stats: Mutex::new(DisplayStats::new(nominal_period_us)),
            vsync: EventGate::new(),
            commit: EventGate::new(),
        }
    }
}
