//! Operating configuration and its register derivations.
//!
//! `Config` is the in-memory image of every software-controlled operating
//! axis. Each enum's raw discriminant is ABI: values arrive from the
//! composition pipeline as `u32` and are validated through `from_raw`, which
//! rejects the sentinel count and anything above it. The `*_value` methods
//! derive register contents from the whole configuration, so interacting
//! axes (`{mode, fast_path}` driving `DIRECT_MODE`, mode forcing
//! `LOW_PERSIST`) are recomputed from one place.

use visor_regs::{
    async_commit, correction_control, direct_mode, latency_control, low_persist, mmio,
    sync_control, DISPLAY_COUNT,
};

use crate::error::{Error, Result};
use crate::hw::RegisterWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Normal = 0,
    LowPersistence = 1,
    Direct = 2,
    Async = 3,
}

impl DisplayMode {
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(Self::Normal),
            1 => Ok(Self::LowPersistence),
            2 => Ok(Self::Direct),
            3 => Ok(Self::Async),
            _ => Err(Error::InvalidArgument),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRole {
    Independent = 0,
    Master = 1,
    Slave = 2,
    External = 3,
}

impl SyncRole {
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(Self::Independent),
            1 => Ok(Self::Master),
            2 => Ok(Self::Slave),
            3 => Ok(Self::External),
            _ => Err(Error::InvalidArgument),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistortionMode {
    None = 0,
    Barrel = 1,
    Pincushion = 2,
    Mesh = 3,
    Custom = 4,
}

impl DistortionMode {
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(Self::None),
            1 => Ok(Self::Barrel),
            2 => Ok(Self::Pincushion),
            3 => Ok(Self::Mesh),
            4 => Ok(Self::Custom),
            _ => Err(Error::InvalidArgument),
        }
    }

    /// Mesh and Custom consume an externally supplied coefficient map;
    /// Barrel and Pincushion are fixed-function.
    pub fn consumes_map(self) -> bool {
        matches!(self, Self::Mesh | Self::Custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaticMode {
    None = 0,
    Rgb = 1,
    Custom = 2,
}

impl ChromaticMode {
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(Self::None),
            1 => Ok(Self::Rgb),
            2 => Ok(Self::Custom),
            _ => Err(Error::InvalidArgument),
        }
    }

    pub fn consumes_map(self) -> bool {
        matches!(self, Self::Custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCompMode {
    None = 0,
    Predict = 1,
    Extrapolate = 2,
}

impl MotionCompMode {
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(Self::None),
            1 => Ok(Self::Predict),
            2 => Ok(Self::Extrapolate),
            _ => Err(Error::InvalidArgument),
        }
    }

    pub fn consumes_map(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Full operating configuration. Copyable value type; the live instance sits
/// behind the device mutex and every setter holds that mutex across both the
/// field update and the derived register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub mode: DisplayMode,
    pub sync_role: SyncRole,
    pub distortion_mode: DistortionMode,
    pub chromatic_mode: ChromaticMode,
    pub motion_comp_mode: MotionCompMode,
    pub low_persistence: bool,
    /// Strobe duty cycle in percent, clamped to 0..=100 by the setter.
    pub duty: u32,
    pub fast_path: bool,
    pub bypass_composition: bool,
    pub bypass_distortion: bool,
    pub bypass_chromatic: bool,
    pub bypass_motion: bool,
    pub target_refresh_hz: u32,
    pub max_latency_us: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: DisplayMode::Normal,
            sync_role: SyncRole::Independent,
            distortion_mode: DistortionMode::None,
            chromatic_mode: ChromaticMode::None,
            motion_comp_mode: MotionCompMode::None,
            low_persistence: false,
            duty: 50,
            fast_path: false,
            bypass_composition: false,
            bypass_distortion: false,
            bypass_chromatic: false,
            bypass_motion: false,
            target_refresh_hz: 90,
            max_latency_us: 20_000,
        }
    }
}

impl Config {
    pub(crate) fn sync_control_value(&self) -> u32 {
        let mut v = sync_control::ENABLE
            | sync_control::VSYNC
            | sync_control::HSYNC
            | sync_control::phase(0);
        match self.sync_role {
            SyncRole::Independent => {}
            SyncRole::Master => v |= sync_control::MASTER,
            SyncRole::Slave => v |= sync_control::SLAVE,
            SyncRole::External => v |= sync_control::MASTER | sync_control::SLAVE,
        }
        v
    }

    /// Low-persistence strobing is forced on while the device mode is
    /// `LowPersistence`, using the stored duty, even if the standalone flag
    /// is clear.
    pub(crate) fn low_persist_value(&self) -> u32 {
        let strobing = self.low_persistence || self.mode == DisplayMode::LowPersistence;
        if strobing {
            low_persist::ENABLE | low_persist::duty(self.duty)
        } else {
            0
        }
    }

    pub(crate) fn latency_control_value(&self) -> u32 {
        let mut v = 0;
        if self.bypass_composition {
            v |= latency_control::BYPASS_COMPOSITION;
        }
        if self.bypass_distortion {
            v |= latency_control::BYPASS_DISTORTION;
        }
        if self.bypass_chromatic {
            v |= latency_control::BYPASS_CHROMATIC;
        }
        if self.bypass_motion {
            v |= latency_control::BYPASS_MOTION;
        }
        v | latency_control::max_latency(self.max_latency_us)
    }

    pub(crate) fn async_commit_value(&self) -> u32 {
        if self.mode == DisplayMode::Async {
            async_commit::ENABLE
        } else {
            0
        }
    }

    /// `{mode, fast_path}` is a joint key: the register is non-zero only in
    /// Direct mode, and then reflects the stored fast-path flag.
    pub(crate) fn direct_mode_value(&self) -> u32 {
        if self.mode != DisplayMode::Direct {
            return 0;
        }
        let mut v = direct_mode::ENABLE;
        if self.fast_path {
            v |= direct_mode::FAST_PATH;
        }
        v
    }

    pub(crate) fn distortion_control_value(&self) -> u32 {
        Self::correction_value(self.distortion_mode as u32)
    }

    pub(crate) fn chromatic_control_value(&self) -> u32 {
        Self::correction_value(self.chromatic_mode as u32)
    }

    pub(crate) fn motion_control_value(&self) -> u32 {
        Self::correction_value(self.motion_comp_mode as u32)
    }

    fn correction_value(raw_mode: u32) -> u32 {
        if raw_mode == 0 {
            return 0;
        }
        correction_control::ENABLE | correction_control::mode(raw_mode)
    }

    /// Program every configuration register. Used once at init; individual
    /// setters rewrite only their affected registers afterwards.
    pub(crate) fn program(&self, regs: &dyn RegisterWindow) {
        regs.write(mmio::SYNC_CONTROL, self.sync_control_value());
        regs.write(mmio::LOW_PERSIST, self.low_persist_value());
        regs.write(mmio::LATENCY_CONTROL, self.latency_control_value());
        regs.write(mmio::ASYNC_COMMIT, self.async_commit_value());
        regs.write(mmio::DIRECT_MODE, self.direct_mode_value());
        regs.write(mmio::DISTORTION_CONTROL, self.distortion_control_value());
        regs.write(mmio::CHROMATIC_CONTROL, self.chromatic_control_value());
        regs.write(mmio::MOTION_CONTROL, self.motion_control_value());
        for d in 0..DISPLAY_COUNT {
            regs.write(mmio::distortion_coef_addr(d), 0);
            regs.write(mmio::chromatic_coef_addr(d), 0);
        }
        regs.write(mmio::MOTION_VEC_ADDR, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_sentinel_and_above() {
        assert!(DisplayMode::from_raw(3).is_ok());
        assert_eq!(DisplayMode::from_raw(4), Err(Error::InvalidArgument));
        assert_eq!(SyncRole::from_raw(4), Err(Error::InvalidArgument));
        assert!(DistortionMode::from_raw(4).is_ok());
        assert_eq!(DistortionMode::from_raw(5), Err(Error::InvalidArgument));
        assert_eq!(ChromaticMode::from_raw(3), Err(Error::InvalidArgument));
        assert_eq!(MotionCompMode::from_raw(3), Err(Error::InvalidArgument));
        assert_eq!(DisplayMode::from_raw(u32::MAX), Err(Error::InvalidArgument));
    }

    #[test]
    fn sync_control_role_bits() {
        let base = sync_control::ENABLE | sync_control::VSYNC | sync_control::HSYNC;
        let mut cfg = Config::default();
        assert_eq!(cfg.sync_control_value(), base);
        cfg.sync_role = SyncRole::Master;
        assert_eq!(cfg.sync_control_value(), base | sync_control::MASTER);
        cfg.sync_role = SyncRole::Slave;
        assert_eq!(cfg.sync_control_value(), base | sync_control::SLAVE);
        cfg.sync_role = SyncRole::External;
        assert_eq!(
            cfg.sync_control_value(),
            base | sync_control::MASTER | sync_control::SLAVE
        );
    }

    #[test]
    fn low_persistence_mode_forces_strobing_with_stored_duty() {
        let mut cfg = Config {
            low_persistence: false,
            duty: 30,
            ..Config::default()
        };
        assert_eq!(cfg.low_persist_value(), 0);
        cfg.mode = DisplayMode::LowPersistence;
        assert_eq!(
            cfg.low_persist_value(),
            low_persist::ENABLE | low_persist::duty(30)
        );
    }

    #[test]
    fn direct_mode_register_derives_from_mode_and_fast_path_jointly() {
        let mut cfg = Config {
            fast_path: true,
            ..Config::default()
        };
        // fast_path alone must not light up the register.
        assert_eq!(cfg.direct_mode_value(), 0);
        cfg.mode = DisplayMode::Direct;
        assert_eq!(
            cfg.direct_mode_value(),
            direct_mode::ENABLE | direct_mode::FAST_PATH
        );
        cfg.fast_path = false;
        assert_eq!(cfg.direct_mode_value(), direct_mode::ENABLE);
    }

    #[test]
    fn correction_controls_disable_cleanly_for_mode_none() {
        let mut cfg = Config::default();
        assert_eq!(cfg.distortion_control_value(), 0);
        cfg.distortion_mode = DistortionMode::Mesh;
        assert_eq!(
            cfg.distortion_control_value(),
            correction_control::ENABLE | correction_control::mode(3)
        );
        cfg.motion_comp_mode = MotionCompMode::Extrapolate;
        assert_eq!(
            cfg.motion_control_value(),
            correction_control::ENABLE | correction_control::mode(2)
        );
    }
}
