use pretty_assertions::assert_eq;
use visor_core::{
    ChromaticMode, Config, DisplayMode, DistortionMode, Error, HwResources, MotionCompMode,
    RegisterWindow, SyncRole, Visor,
};
use visor_regs::{async_commit, direct_mode, latency_control, low_persist, mmio, sync_control};

fn sim_visor() -> (Visor, std::sync::Arc<visor_core::SimWindow>) {
    let (hw, window) = HwResources::sim();
    (Visor::init(hw, Config::default()).expect("init"), window)
}

#[test]
fn duty_above_100_is_clamped_never_rejected() {
    let (visor, window) = sim_visor();

    visor.set_low_persistence(true, 150).expect("set");
    assert_eq!(visor.config().duty, 100);
    assert_eq!(
        window.read(mmio::LOW_PERSIST),
        low_persist::ENABLE | low_persist::duty(100)
    );

    visor.set_low_persistence(true, 70).expect("set");
    assert_eq!(visor.config().duty, 70);
    assert_eq!(
        window.read(mmio::LOW_PERSIST),
        low_persist::ENABLE | low_persist::duty(70)
    );

    visor.set_low_persistence(false, 0).expect("set");
    assert_eq!(window.read(mmio::LOW_PERSIST), 0);
}

#[test]
fn sentinel_mode_values_are_rejected_and_leave_registers_unchanged() {
    let (visor, window) = sim_visor();

    visor
        .set_distortion_mode(DistortionMode::Pincushion as u32)
        .expect("set");
    let programmed = window.read(mmio::DISTORTION_CONTROL);
    assert_ne!(programmed, 0);

    // 5 is DISTORTION_MAX, the first invalid value.
    assert_eq!(visor.set_distortion_mode(5), Err(Error::InvalidArgument));
    assert_eq!(visor.set_distortion_mode(u32::MAX), Err(Error::InvalidArgument));
    assert_eq!(window.read(mmio::DISTORTION_CONTROL), programmed);
    assert_eq!(visor.config().distortion_mode, DistortionMode::Pincushion);

    assert_eq!(visor.set_mode(4), Err(Error::InvalidArgument));
    assert_eq!(visor.set_sync_role(4), Err(Error::InvalidArgument));
    assert_eq!(visor.set_chromatic_mode(3), Err(Error::InvalidArgument));
    assert_eq!(visor.set_motion_comp_mode(3), Err(Error::InvalidArgument));
}

#[test]
fn low_persistence_mode_forces_strobing_with_stored_duty() {
    let (visor, window) = sim_visor();

    visor.set_low_persistence(false, 35).expect("store duty");
    assert_eq!(window.read(mmio::LOW_PERSIST), 0);

    visor
        .set_mode(DisplayMode::LowPersistence as u32)
        .expect("set mode");
    assert_eq!(
        window.read(mmio::LOW_PERSIST),
        low_persist::ENABLE | low_persist::duty(35)
    );

    // Leaving the mode drops the forced strobe again.
    visor.set_mode(DisplayMode::Normal as u32).expect("set mode");
    assert_eq!(window.read(mmio::LOW_PERSIST), 0);
}

#[test]
fn direct_mode_register_follows_mode_and_fast_path_jointly() {
    let (visor, window) = sim_visor();

    // fast_path stored while not in Direct mode: register untouched.
    visor.set_fast_path(true).expect("set");
    assert_eq!(window.read(mmio::DIRECT_MODE), 0);

    visor.set_mode(DisplayMode::Direct as u32).expect("set mode");
    assert_eq!(
        window.read(mmio::DIRECT_MODE),
        direct_mode::ENABLE | direct_mode::FAST_PATH
    );

    visor.set_fast_path(false).expect("set");
    assert_eq!(window.read(mmio::DIRECT_MODE), direct_mode::ENABLE);

    visor.set_mode(DisplayMode::Normal as u32).expect("set mode");
    assert_eq!(window.read(mmio::DIRECT_MODE), 0);
}

#[test]
fn async_mode_drives_the_async_commit_register() {
    let (visor, window) = sim_visor();
    visor.set_mode(DisplayMode::Async as u32).expect("set mode");
    assert_eq!(window.read(mmio::ASYNC_COMMIT), async_commit::ENABLE);
    visor.set_mode(DisplayMode::Normal as u32).expect("set mode");
    assert_eq!(window.read(mmio::ASYNC_COMMIT), 0);
}

#[test]
fn sync_role_external_sets_master_and_slave_bits() {
    let (visor, window) = sim_visor();
    visor
        .set_sync_role(SyncRole::External as u32)
        .expect("set role");
    let v = window.read(mmio::SYNC_CONTROL);
    assert_ne!(v & sync_control::MASTER, 0);
    assert_ne!(v & sync_control::SLAVE, 0);
}

#[test]
fn bypass_bundle_and_latency_budget_share_the_latency_register() {
    let (visor, window) = sim_visor();

    visor.set_bypass(true, false, true, false).expect("set");
    let v = window.read(mmio::LATENCY_CONTROL);
    assert_ne!(v & latency_control::BYPASS_COMPOSITION, 0);
    assert_eq!(v & latency_control::BYPASS_DISTORTION, 0);
    assert_ne!(v & latency_control::BYPASS_CHROMATIC, 0);
    assert_eq!(v & latency_control::BYPASS_MOTION, 0);
    // Default 20ms budget survives a bypass update.
    assert_eq!(v & latency_control::MAX_LATENCY_MASK, latency_control::max_latency(20_000));

    visor.set_max_latency(5_000).expect("set");
    let v = window.read(mmio::LATENCY_CONTROL);
    assert_eq!(v & latency_control::MAX_LATENCY_MASK, latency_control::max_latency(5_000));
    // And the bypass bits survive a budget update.
    assert_ne!(v & latency_control::BYPASS_COMPOSITION, 0);
}

#[test]
fn target_refresh_rejects_zero() {
    let (visor, _window) = sim_visor();
    assert_eq!(visor.set_target_refresh(0), Err(Error::InvalidArgument));
    visor.set_target_refresh(72).expect("set");
    assert_eq!(visor.config().target_refresh_hz, 72);
}

#[test]
fn chromatic_and_motion_modes_round_trip_through_config() {
    let (visor, _window) = sim_visor();
    visor
        .set_chromatic_mode(ChromaticMode::Rgb as u32)
        .expect("set");
    visor
        .set_motion_comp_mode(MotionCompMode::Predict as u32)
        .expect("set");
    let cfg = visor.config();
    assert_eq!(cfg.chromatic_mode, ChromaticMode::Rgb);
    assert_eq!(cfg.motion_comp_mode, MotionCompMode::Predict);
}
