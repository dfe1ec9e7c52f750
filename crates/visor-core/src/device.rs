//! The device context and lifecycle controller.
//!
//! `Visor` owns the whole timing core: it brings the hardware up (clocks,
//! reset pulse, initial register programming), runs the event worker, and
//! exposes the caller-facing configuration, correction-resource, wait, and
//! statistics surface. Setters may be called from arbitrary threads; the
//! configuration and the correction slots each sit behind a mutex that is
//! held across the associated register write, while per-display statistics
//! have their own finer-grained locks owned by the worker.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use visor_regs::{core_control, mmio, DISPLAY_COUNT};

use crate::config::{
    ChromaticMode, Config, DisplayMode, DistortionMode, MotionCompMode, SyncRole,
};
use crate::display::{DisplayIndex, DisplayState, DisplayStats};
use crate::error::{Error, Result};
use crate::hw::{Clock, CoherentAllocator, HwResources, RegisterWindow, ResetLine};
use crate::lock;
use crate::resource::CorrectionSlots;
use crate::worker::{self, WorkerControl};

/// Bound on `wait_for_vsync` / `wait_for_commit`.
pub const WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// State shared between caller threads and the event worker.
///
/// Lock order, where multiple guards are held: `config` before `slots`
/// (setters and resource calls), `config` before a display's `stats`
/// (worker). `slots` and `stats` are never held together.
pub(crate) struct Shared {
    pub(crate) regs: Arc<dyn RegisterWindow>,
    pub(crate) allocator: Arc<dyn CoherentAllocator>,
    pub(crate) config: Mutex<Config>,
    pub(crate) displays: [DisplayState; DISPLAY_COUNT],
    pub(crate) slots: Mutex<CorrectionSlots>,
    pub(crate) worker: WorkerControl,
}

impl Shared {
    pub(crate) fn new(
        regs: Arc<dyn RegisterWindow>,
        allocator: Arc<dyn CoherentAllocator>,
        config: Config,
    ) -> Self {
        let nominal_us = 1_000_000 / u64::from(config.target_refresh_hz);
        Self {
            regs,
            allocator,
            config: Mutex::new(config),
            displays: std::array::from_fn(|_| DisplayState::new(nominal_us)),
            slots: Mutex::new(CorrectionSlots::new()),
            worker: WorkerControl::new(),
        }
    }
}

/// The dual-display VR output controller's timing and synchronization core.
///
/// Created by [`Visor::init`], torn down by [`Visor::fini`] or drop.
/// Lifecycle transitions take `&mut self`; configuration, resource, wait and
/// statistics calls take `&self` and are safe to invoke concurrently.
pub struct Visor {
    shared: Arc<Shared>,
    clocks: Vec<Box<dyn Clock>>,
    _reset: Box<dyn ResetLine>,
    worker: Option<JoinHandle<()>>,
    enabled: bool,
    suspended: bool,
}

impl Visor {
    /// Bring the controller up: enable clocks in order (rolling back in
    /// strict reverse order if one fails), pulse reset, program every
    /// configuration register from `config`, and start the event worker in
    /// its idle state. The device is left disabled.
    pub fn init(hw: HwResources, config: Config) -> Result<Self> {
        if config.target_refresh_hz == 0 {
            return Err(Error::InvalidArgument);
        }

        let HwResources {
            window,
            mut clocks,
            mut reset,
            allocator,
        } = hw;

        for i in 0..clocks.len() {
            if let Err(err) = clocks[i].enable() {
                tracing::warn!(
                    clock = clocks[i].name(),
                    "clock enable failed, rolling back"
                );
                for rolled in clocks[..i].iter_mut().rev() {
                    rolled.disable();
                }
                return Err(err);
            }
        }

        reset.assert();
        reset.deassert();

        config.program(window.as_ref());

        let shared = Arc::new(Shared::new(window, allocator, config));
        let worker = {
            let shared = Arc::clone(&shared);
            match std::thread::Builder::new()
                .name("visor-evt".into())
                .spawn(move || worker::run(shared))
            {
                Ok(handle) => handle,
                Err(_) => {
                    for clk in clocks.iter_mut().rev() {
                        clk.disable();
                    }
                    return Err(Error::HardwareInitFailure("event worker spawn failed"));
                }
            }
        };

        tracing::info!("visor timing core initialized");
        Ok(Self {
            shared,
            clocks,
            _reset: reset,
            worker: Some(worker),
            enabled: false,
            suspended: false,
        })
    }

    /// Set the hardware enable bit and wake the event worker. No-op on an
    /// already-enabled device.
    pub fn enable(&mut self) -> Result<()> {
        if self.enabled {
            return Ok(());
        }
        self.shared
            .regs
            .write(mmio::CORE_CONTROL, core_control::ENABLE);
        self.shared.worker.set_active(true);
        self.enabled = true;
        tracing::info!("visor enabled");
        Ok(())
    }

    /// Park the event worker and clear the hardware enable bit. No-op on an
    /// already-disabled device. Statistics and the frame counters are
    /// retained.
    pub fn disable(&mut self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.shared.worker.set_active(false);
        self.shared.regs.write(mmio::CORE_CONTROL, 0);
        self.enabled = false;
        tracing::info!("visor disabled");
        Ok(())
    }

    /// `disable` plus the suspended flag. Configuration registers are not
    /// saved; the hardware is assumed to retain them across a software
    /// disable (see `resume`).
    pub fn suspend(&mut self) -> Result<()> {
        if self.suspended {
            return Ok(());
        }
        self.disable()?;
        self.suspended = true;
        Ok(())
    }

    /// `enable` plus clearing the suspended flag. Deliberately does not
    /// re-program configuration registers; only the top-level enable bit is
    /// touched.
    pub fn resume(&mut self) -> Result<()> {
        if !self.suspended {
            return Ok(());
        }
        self.enable()?;
        self.suspended = false;
        Ok(())
    }

    /// Tear the controller down. Equivalent to dropping it.
    pub fn fini(self) {}

    // --- configuration -----------------------------------------------------

    /// Set the operating mode from its raw ABI value. Recomputes the
    /// low-persistence, async-commit, and direct-mode registers, which all
    /// derive from the mode (jointly with the stored duty and fast-path
    /// flags).
    pub fn set_mode(&self, raw: u32) -> Result<()> {
        let mode = DisplayMode::from_raw(raw)?;
        let mut cfg = lock(&self.shared.config);
        cfg.mode = mode;
        let regs = self.shared.regs.as_ref();
        regs.write(mmio::LOW_PERSIST, cfg.low_persist_value());
        regs.write(mmio::ASYNC_COMMIT, cfg.async_commit_value());
        regs.write(mmio::DIRECT_MODE, cfg.direct_mode_value());
        Ok(())
    }

    pub fn set_sync_role(&self, raw: u32) -> Result<()> {
        let role = SyncRole::from_raw(raw)?;
        let mut cfg = lock(&self.shared.config);
        cfg.sync_role = role;
        self.shared
            .regs
            .write(mmio::SYNC_CONTROL, cfg.sync_control_value());
        Ok(())
    }

    /// Set the distortion-correction mode. Republishes (or zeroes) the
    /// per-display coefficient address registers: a held map becomes visible
    /// when switching into Mesh/Custom and invisible when switching out.
    pub fn set_distortion_mode(&self, raw: u32) -> Result<()> {
        let mode = DistortionMode::from_raw(raw)?;
        let mut cfg = lock(&self.shared.config);
        cfg.distortion_mode = mode;
        let regs = self.shared.regs.as_ref();
        regs.write(mmio::DISTORTION_CONTROL, cfg.distortion_control_value());
        lock(&self.shared.slots).republish_distortion(&cfg, regs);
        Ok(())
    }

    pub fn set_chromatic_mode(&self, raw: u32) -> Result<()> {
        let mode = ChromaticMode::from_raw(raw)?;
        let mut cfg = lock(&self.shared.config);
        cfg.chromatic_mode = mode;
        let regs = self.shared.regs.as_ref();
        regs.write(mmio::CHROMATIC_CONTROL, cfg.chromatic_control_value());
        lock(&self.shared.slots).republish_chromatic(&cfg, regs);
        Ok(())
    }

    pub fn set_motion_comp_mode(&self, raw: u32) -> Result<()> {
        let mode = MotionCompMode::from_raw(raw)?;
        let mut cfg = lock(&self.shared.config);
        cfg.motion_comp_mode = mode;
        let regs = self.shared.regs.as_ref();
        regs.write(mmio::MOTION_CONTROL, cfg.motion_control_value());
        lock(&self.shared.slots).republish_motion(&cfg, regs);
        Ok(())
    }

    /// Set low-persistence strobing. `duty` is a percentage and is clamped
    /// to 100, never rejected. While the device mode is `LowPersistence`
    /// the strobe register stays forced on regardless of `enable`.
    pub fn set_low_persistence(&self, enable: bool, duty: u32) -> Result<()> {
        let mut cfg = lock(&self.shared.config);
        cfg.low_persistence = enable;
        cfg.duty = duty.min(100);
        self.shared
            .regs
            .write(mmio::LOW_PERSIST, cfg.low_persist_value());
        Ok(())
    }

    /// Toggle the direct-mode fast path. The direct-mode register derives
    /// from `{mode, fast_path}` jointly, so this rewrites it whenever the
    /// device is in Direct mode.
    pub fn set_fast_path(&self, enable: bool) -> Result<()> {
        let mut cfg = lock(&self.shared.config);
        cfg.fast_path = enable;
        if cfg.mode == DisplayMode::Direct {
            self.shared
                .regs
                .write(mmio::DIRECT_MODE, cfg.direct_mode_value());
        }
        Ok(())
    }

    /// Set all four low-latency bypass switches in one register update.
    pub fn set_bypass(
        &self,
        composition: bool,
        distortion: bool,
        chromatic: bool,
        motion: bool,
    ) -> Result<()> {
        let mut cfg = lock(&self.shared.config);
        cfg.bypass_composition = composition;
        cfg.bypass_distortion = distortion;
        cfg.bypass_chromatic = chromatic;
        cfg.bypass_motion = motion;
        self.shared
            .regs
            .write(mmio::LATENCY_CONTROL, cfg.latency_control_value());
        Ok(())
    }

    /// Set the motion-to-photon latency budget (microseconds).
    pub fn set_max_latency(&self, us: u32) -> Result<()> {
        let mut cfg = lock(&self.shared.config);
        cfg.max_latency_us = us;
        self.shared
            .regs
            .write(mmio::LATENCY_CONTROL, cfg.latency_control_value());
        Ok(())
    }

    /// Set the nominal refresh rate used by the silence-recovery heuristic.
    /// Zero is rejected.
    pub fn set_target_refresh(&self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(Error::InvalidArgument);
        }
        lock(&self.shared.config).target_refresh_hz = hz;
        Ok(())
    }

    /// Snapshot of the current configuration, for diagnostics surfaces.
    pub fn config(&self) -> Config {
        *lock(&self.shared.config)
    }

    // --- correction resources ----------------------------------------------

    /// Replace display `display`'s distortion map. The new buffer is
    /// allocated and populated first; its address is published only while
    /// the distortion mode consumes a map, and the previous buffer is freed
    /// after the swap, inside the same critical section.
    pub fn set_distortion_map(&self, display: usize, bytes: &[u8]) -> Result<()> {
        let idx = DisplayIndex::new(display)?;
        if bytes.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let buf = self.shared.allocator.alloc(bytes)?;
        let cfg = lock(&self.shared.config);
        let mut slots = lock(&self.shared.slots);
        if cfg.distortion_mode.consumes_map() {
            self.shared
                .regs
                .write(mmio::distortion_coef_addr(idx.get()), buf.device_addr());
        }
        let previous = slots.distortion[idx.get()].replace(buf);
        drop(slots);
        drop(cfg);
        if previous.is_some() {
            tracing::debug!(display = idx.get(), "replaced distortion map");
        }
        Ok(())
    }

    /// Replace display `display`'s chromatic-aberration map. Same contract
    /// as [`Visor::set_distortion_map`].
    pub fn set_chromatic_map(&self, display: usize, bytes: &[u8]) -> Result<()> {
        let idx = DisplayIndex::new(display)?;
        if bytes.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let buf = self.shared.allocator.alloc(bytes)?;
        let cfg = lock(&self.shared.config);
        let mut slots = lock(&self.shared.slots);
        if cfg.chromatic_mode.consumes_map() {
            self.shared
                .regs
                .write(mmio::chromatic_coef_addr(idx.get()), buf.device_addr());
        }
        let previous = slots.chromatic[idx.get()].replace(buf);
        drop(slots);
        drop(cfg);
        if previous.is_some() {
            tracing::debug!(display = idx.get(), "replaced chromatic map");
        }
        Ok(())
    }

    /// Replace the shared motion-vector buffer. Published for any
    /// motion-compensation mode other than `None`.
    pub fn set_motion_vectors(&self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let buf = self.shared.allocator.alloc(bytes)?;
        let cfg = lock(&self.shared.config);
        let mut slots = lock(&self.shared.slots);
        if cfg.motion_comp_mode.consumes_map() {
            self.shared
                .regs
                .write(mmio::MOTION_VEC_ADDR, buf.device_addr());
        }
        let previous = slots.motion.replace(buf);
        drop(slots);
        drop(cfg);
        if previous.is_some() {
            tracing::debug!("replaced motion vectors");
        }
        Ok(())
    }

    // --- waits and statistics ----------------------------------------------

    /// Block until the next vsync on `display`, bounded at 100ms. Every
    /// concurrent waiter is released by one event.
    pub fn wait_for_vsync(&self, display: usize) -> Result<()> {
        let idx = DisplayIndex::new(display)?;
        self.shared.displays[idx.get()].vsync.wait(WAIT_TIMEOUT)
    }

    /// Block until the next commit acknowledgment on `display`, bounded at
    /// 100ms.
    pub fn wait_for_commit(&self, display: usize) -> Result<()> {
        let idx = DisplayIndex::new(display)?;
        self.shared.displays[idx.get()].commit.wait(WAIT_TIMEOUT)
    }

    /// Current EMA estimate of the inter-vsync period, microseconds.
    pub fn get_vsync_period(&self, display: usize) -> Result<u64> {
        Ok(self.display_stats(display)?.vsync_period_us)
    }

    /// Current EMA estimate of the commit latency, microseconds.
    pub fn get_commit_latency(&self, display: usize) -> Result<u64> {
        Ok(self.display_stats(display)?.commit_latency_us)
    }

    /// Monotonic vsync count for `display`.
    pub fn frame_count(&self, display: usize) -> Result<u64> {
        Ok(self.display_stats(display)?.frame_counter)
    }

    /// Snapshot of a display's statistics, for diagnostics surfaces.
    pub fn display_stats(&self, display: usize) -> Result<DisplayStats> {
        let idx = DisplayIndex::new(display)?;
        Ok(*lock(&self.shared.displays[idx.get()].stats))
    }
}

impl Drop for Visor {
    fn drop(&mut self) {
        self.shared.worker.stop();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.shared.regs.write(mmio::CORE_CONTROL, 0);
        lock(&self.shared.slots).clear();
        for clk in self.clocks.iter_mut().rev() {
            clk.disable();
        }
        tracing::info!("visor finalized");
    }
}
