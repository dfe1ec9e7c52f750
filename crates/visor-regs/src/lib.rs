//! MMIO register layout and bit definitions for the Visor dual-display VR
//! output controller.
//!
//! The controller exposes a single 32-bit register window. Offsets and bit
//! positions here are the interoperability contract: anything that pokes the
//! hardware (or the simulated window in `visor-core`) goes through these
//! constants. This crate is constants and offset arithmetic only; register
//! *semantics* (what gets composed into each register and when) live in
//! `visor-core`.

#![forbid(unsafe_code)]

/// Number of display pipes the controller drives.
pub const DISPLAY_COUNT: usize = 2;

/// Size of the register window in bytes.
pub const REG_WINDOW_BYTES: u32 = 0x100;

/// Register byte offsets.
pub mod mmio {
    /// Top-level controller enable.
    pub const CORE_CONTROL: u32 = 0x000;
    /// Interrupt status; write-1-to-clear. See [`crate::irq_bits`].
    pub const IRQ_STATUS: u32 = 0x004;

    pub const SYNC_CONTROL: u32 = 0x010;
    pub const LOW_PERSIST: u32 = 0x014;
    pub const LATENCY_CONTROL: u32 = 0x018;
    pub const ASYNC_COMMIT: u32 = 0x01c;
    pub const DIRECT_MODE: u32 = 0x020;

    pub const DISTORTION_CONTROL: u32 = 0x030;
    const DISTORTION_COEF_ADDR_BASE: u32 = 0x034;
    pub const CHROMATIC_CONTROL: u32 = 0x040;
    const CHROMATIC_COEF_ADDR_BASE: u32 = 0x044;
    pub const MOTION_CONTROL: u32 = 0x050;
    pub const MOTION_VEC_ADDR: u32 = 0x054;

    /// Distortion coefficient-buffer address register for display `display`.
    pub fn distortion_coef_addr(display: usize) -> u32 {
        debug_assert!(display < super::DISPLAY_COUNT);
        DISTORTION_COEF_ADDR_BASE + 4 * display as u32
    }

    /// Chromatic coefficient-buffer address register for display `display`.
    pub fn chromatic_coef_addr(display: usize) -> u32 {
        debug_assert!(display < super::DISPLAY_COUNT);
        CHROMATIC_COEF_ADDR_BASE + 4 * display as u32
    }
}

/// `IRQ_STATUS` bit assignments.
///
/// Vsync events occupy the low byte (one bit per display); commit events the
/// second byte, offset by 8.
pub mod irq_bits {
    pub const COMMIT_SHIFT: u32 = 8;

    pub fn vsync(display: usize) -> u32 {
        debug_assert!(display < super::DISPLAY_COUNT);
        1 << display
    }

    pub fn commit(display: usize) -> u32 {
        debug_assert!(display < super::DISPLAY_COUNT);
        1 << (COMMIT_SHIFT + display as u32)
    }
}

/// `CORE_CONTROL` bits.
pub mod core_control {
    pub const ENABLE: u32 = 1 << 0;
}

/// `SYNC_CONTROL` bits.
///
/// `MASTER | SLAVE` set together selects an external timing reference.
pub mod sync_control {
    pub const ENABLE: u32 = 1 << 0;
    pub const MASTER: u32 = 1 << 1;
    pub const SLAVE: u32 = 1 << 2;
    pub const VSYNC: u32 = 1 << 4;
    pub const HSYNC: u32 = 1 << 5;
    pub const PHASE_SHIFT: u32 = 8;
    pub const PHASE_MASK: u32 = 0xff << PHASE_SHIFT;

    pub fn phase(value: u32) -> u32 {
        (value << PHASE_SHIFT) & PHASE_MASK
    }
}

/// `LOW_PERSIST` bits. Duty cycle is a percentage, 0..=100.
pub mod low_persist {
    pub const ENABLE: u32 = 1 << 0;
    pub const DUTY_SHIFT: u32 = 8;
    pub const DUTY_MASK: u32 = 0xff << DUTY_SHIFT;

    pub fn duty(percent: u32) -> u32 {
        (percent << DUTY_SHIFT) & DUTY_MASK
    }
}

/// `LATENCY_CONTROL` bits: low-latency bypass switches for individual
/// pipeline stages, plus the motion-to-photon latency budget in the upper
/// half-word (microseconds, saturated at 0xffff).
pub mod latency_control {
    pub const BYPASS_COMPOSITION: u32 = 1 << 0;
    pub const BYPASS_DISTORTION: u32 = 1 << 1;
    pub const BYPASS_CHROMATIC: u32 = 1 << 2;
    pub const BYPASS_MOTION: u32 = 1 << 3;
    pub const MAX_LATENCY_SHIFT: u32 = 16;
    pub const MAX_LATENCY_MASK: u32 = 0xffff << MAX_LATENCY_SHIFT;

    pub fn max_latency(us: u32) -> u32 {
        us.min(0xffff) << MAX_LATENCY_SHIFT
    }
}

/// `ASYNC_COMMIT` bits.
pub mod async_commit {
    pub const ENABLE: u32 = 1 << 0;
}

/// `DIRECT_MODE` bits.
pub mod direct_mode {
    pub const ENABLE: u32 = 1 << 0;
    pub const FAST_PATH: u32 = 1 << 1;
}

/// Shared field layout of the three correction control registers
/// (`DISTORTION_CONTROL`, `CHROMATIC_CONTROL`, `MOTION_CONTROL`).
pub mod correction_control {
    pub const ENABLE: u32 = 1 << 0;
    pub const MODE_SHIFT: u32 = 4;
    pub const MODE_MASK: u32 = 0x7 << MODE_SHIFT;

    pub fn mode(raw: u32) -> u32 {
        (raw << MODE_SHIFT) & MODE_MASK
    }
}
