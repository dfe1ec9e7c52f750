//! Timing and synchronization core for the Visor dual-display VR output
//! controller.
//!
//! This crate owns the controller's VR-specific operating configuration
//! (display mode, multi-display sync role, correction modes, low-persistence
//! strobing, latency bypass), a background worker that demultiplexes
//! hardware vsync/commit interrupts into per-display statistics and wait
//! points, the lifecycle of device-visible correction buffers, and the
//! enable/disable/suspend/resume state machine.
//!
//! Hardware is reached through the seams in [`hw`]; the bit-exact register
//! layout lives in `visor-regs`. The shipped `Sim*` types model the
//! controller's register file, so the whole control plane runs (and is
//! tested) without real hardware.

#![forbid(unsafe_code)]

mod config;
mod device;
mod display;
mod error;
mod hw;
mod resource;
mod worker;

pub use config::{ChromaticMode, Config, DisplayMode, DistortionMode, MotionCompMode, SyncRole};
pub use device::{Visor, WAIT_TIMEOUT};
pub use display::{DisplayIndex, DisplayStats, DISPLAY_COUNT};
pub use error::{Error, Result};
pub use hw::{
    sim_log, Clock, CoherentAllocator, DmaBuffer, HwResources, RegisterWindow, ResetLine,
    SimAllocator, SimClock, SimLog, SimReset, SimWindow,
};

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the guard if a holder panicked. Register and
/// statistics state stays internally consistent because every critical
/// section completes its register write before releasing.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
