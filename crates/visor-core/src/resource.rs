//! Correction-resource slots: per-display distortion and chromatic maps plus
//! the shared motion-vector buffer.
//!
//! A slot holds at most one live device-visible buffer. Replacement follows
//! publish-then-free: the new buffer is allocated and populated before the
//! slots lock is taken, the address register is rewritten (when the current
//! mode consumes a map), and only then is the previous buffer dropped, all
//! inside the same critical section as the register write.

use visor_regs::{mmio, DISPLAY_COUNT};

use crate::config::Config;
use crate::hw::{DmaBuffer, RegisterWindow};

#[derive(Default)]
pub(crate) struct CorrectionSlots {
    pub(crate) distortion: [Option<DmaBuffer>; DISPLAY_COUNT],
    pub(crate) chromatic: [Option<DmaBuffer>; DISPLAY_COUNT],
    pub(crate) motion: Option<DmaBuffer>,
}

impl CorrectionSlots {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Drop every held buffer. Finalize-only; address registers are dead at
    /// that point because the device is disabled.
    pub(crate) fn clear(&mut self) {
        self.distortion = Default::default();
        self.chromatic = Default::default();
        self.motion = None;
    }

    /// Rewrite both distortion address registers from the current mode and
    /// held buffers: the held address when the mode consumes a map, zero
    /// otherwise.
    pub(crate) fn republish_distortion(&self, cfg: &Config, regs: &dyn RegisterWindow) {
        for d in 0..DISPLAY_COUNT {
            let addr = if cfg.distortion_mode.consumes_map() {
                self.distortion[d].as_ref().map_or(0, DmaBuffer::device_addr)
            } else {
                0
            };
            regs.write(mmio::distortion_coef_addr(d), addr);
        }
    }

    pub(crate) fn republish_chromatic(&self, cfg: &Config, regs: &dyn RegisterWindow) {
        for d in 0..DISPLAY_COUNT {
            let addr = if cfg.chromatic_mode.consumes_map() {
                self.chromatic[d].as_ref().map_or(0, DmaBuffer::device_addr)
            } else {
                0
            };
            regs.write(mmio::chromatic_coef_addr(d), addr);
        }
    }

    pub(crate) fn republish_motion(&self, cfg: &Config, regs: &dyn RegisterWindow) {
        let addr = if cfg.motion_comp_mode.consumes_map() {
            self.motion.as_ref().map_or(0, DmaBuffer::device_addr)
        } else {
            0
        };
        regs.write(mmio::MOTION_VEC_ADDR, addr);
    }
}
