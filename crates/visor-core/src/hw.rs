//! Hardware seams and their simulated implementations.
//!
//! The timing core touches hardware through three narrow traits: a mapped
//! register window, clock/reset handles owned by platform code, and a
//! coherent allocator for device-visible correction buffers. The `Sim*`
//! types are a register-file model of the controller: plain storage for
//! control registers, write-1-to-clear for the interrupt status register,
//! and injectors that latch vsync/commit bits the way the hardware would.

use std::sync::{Arc, Mutex};

use visor_regs::{irq_bits, mmio, REG_WINDOW_BYTES};

use crate::error::{Error, Result};
use crate::lock;

/// 32-bit MMIO register window. Reads and writes cannot fail observably.
pub trait RegisterWindow: Send + Sync {
    fn read(&self, offset: u32) -> u32;
    fn write(&self, offset: u32, value: u32);
}

/// A gateable hardware clock, owned by platform code outside this core.
pub trait Clock: Send + Sync {
    fn name(&self) -> &str;
    fn enable(&mut self) -> Result<()>;
    fn disable(&mut self);
}

/// Active-low reset line; init pulses it low then releases it.
pub trait ResetLine: Send + Sync {
    fn assert(&mut self);
    fn deassert(&mut self);
}

/// A device-visible allocation holding correction coefficients. The device
/// address is what gets published to a coefficient-address register; the
/// host-side copy is retained for the lifetime of the buffer.
#[derive(Debug)]
pub struct DmaBuffer {
    device_addr: u32,
    data: Vec<u8>,
}

impl DmaBuffer {
    pub fn new(device_addr: u32, data: Vec<u8>) -> Self {
        Self { device_addr, data }
    }

    pub fn device_addr(&self) -> u32 {
        self.device_addr
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }
}

/// Allocator for device-visible coefficient buffers.
pub trait CoherentAllocator: Send + Sync {
    /// Allocate a buffer sized to `payload` and copy `payload` into it.
    fn alloc(&self, payload: &[u8]) -> Result<DmaBuffer>;
}

/// Everything `Visor::init` needs from the platform: the register window,
/// the ordered clock list, the reset line, and the buffer allocator.
pub struct HwResources {
    pub window: Arc<dyn RegisterWindow>,
    pub clocks: Vec<Box<dyn Clock>>,
    pub reset: Box<dyn ResetLine>,
    pub allocator: Arc<dyn CoherentAllocator>,
}

/// Shared call log used by the simulated clocks/reset so tests can assert
/// bring-up and teardown ordering.
pub type SimLog = Arc<Mutex<Vec<String>>>;

pub fn sim_log() -> SimLog {
    Arc::new(Mutex::new(Vec::new()))
}

impl HwResources {
    /// A fully simulated controller: two clocks, a reset line, a bump
    /// allocator, and a register-file window. Returns the window separately
    /// so tests can raise events and inspect registers.
    pub fn sim() -> (Self, Arc<SimWindow>) {
        let window = Arc::new(SimWindow::new());
        let log = sim_log();
        let hw = Self {
            window: Arc::clone(&window) as Arc<dyn RegisterWindow>,
            clocks: vec![
                Box::new(SimClock::new("core", Arc::clone(&log))),
                Box::new(SimClock::new("pixel", Arc::clone(&log))),
            ],
            reset: Box::new(SimReset::new(log)),
            allocator: Arc::new(SimAllocator::new()),
        };
        (hw, window)
    }
}

/// Register-file model of the controller's MMIO window.
///
/// Control registers are plain storage. `IRQ_STATUS` is write-1-to-clear;
/// event injectors OR bits into it the way the hardware latches them.
#[derive(Debug)]
pub struct SimWindow {
    regs: Mutex<Vec<u32>>,
}

impl Default for SimWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWindow {
    pub fn new() -> Self {
        Self {
            regs: Mutex::new(vec![0u32; (REG_WINDOW_BYTES / 4) as usize]),
        }
    }

    fn index(offset: u32) -> usize {
        debug_assert_eq!(offset % 4, 0, "unaligned register access");
        debug_assert!(offset < REG_WINDOW_BYTES);
        (offset / 4) as usize
    }

    /// Latch a pending vsync event for `display`.
    pub fn raise_vsync(&self, display: usize) {
        self.raise(irq_bits::vsync(display));
    }

    /// Latch a pending commit event for `display`.
    pub fn raise_commit(&self, display: usize) {
        self.raise(irq_bits::commit(display));
    }

    pub fn raise(&self, bits: u32) {
        lock(&self.regs)[Self::index(mmio::IRQ_STATUS)] |= bits;
    }
}

impl RegisterWindow for SimWindow {
    fn read(&self, offset: u32) -> u32 {
        lock(&self.regs)[Self::index(offset)]
    }

    fn write(&self, offset: u32, value: u32) {
        let mut regs = lock(&self.regs);
        let idx = Self::index(offset);
        if offset == mmio::IRQ_STATUS {
            regs[idx] &= !value;
        } else {
            regs[idx] = value;
        }
    }
}

/// Simulated clock; records enable/disable calls and can be armed to fail
/// bring-up for rollback tests.
pub struct SimClock {
    name: &'static str,
    fail_enable: bool,
    log: SimLog,
}

impl SimClock {
    pub fn new(name: &'static str, log: SimLog) -> Self {
        Self {
            name,
            fail_enable: false,
            log,
        }
    }

    pub fn failing(name: &'static str, log: SimLog) -> Self {
        Self {
            name,
            fail_enable: true,
            log,
        }
    }
}

impl Clock for SimClock {
    fn name(&self) -> &str {
        self.name
    }

    fn enable(&mut self) -> Result<()> {
        if self.fail_enable {
            lock(&self.log).push(format!("{}:enable-failed", self.name));
            return Err(Error::HardwareInitFailure("clock enable failed"));
        }
        lock(&self.log).push(format!("{}:enable", self.name));
        Ok(())
    }

    fn disable(&mut self) {
        lock(&self.log).push(format!("{}:disable", self.name));
    }
}

/// Simulated reset line; records the pulse into the shared log.
pub struct SimReset {
    log: SimLog,
}

impl SimReset {
    pub fn new(log: SimLog) -> Self {
        Self { log }
    }
}

impl ResetLine for SimReset {
    fn assert(&mut self) {
        lock(&self.log).push("reset:assert".to_owned());
    }

    fn deassert(&mut self) {
        lock(&self.log).push("reset:deassert".to_owned());
    }
}

/// Bump allocator handing out device addresses in a flat 32-bit space.
/// Addresses are never zero, so a published address register reading zero
/// always means "no buffer".
pub struct SimAllocator {
    next_addr: Mutex<u32>,
    fail_next: Mutex<bool>,
}

impl Default for SimAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimAllocator {
    pub fn new() -> Self {
        Self {
            next_addr: Mutex::new(0x1000),
            fail_next: Mutex::new(false),
        }
    }

    /// Make the next `alloc` call fail with `OutOfMemory`.
    pub fn fail_next(&self) {
        *lock(&self.fail_next) = true;
    }
}

impl CoherentAllocator for SimAllocator {
    fn alloc(&self, payload: &[u8]) -> Result<DmaBuffer> {
        let mut fail = lock(&self.fail_next);
        if *fail {
            *fail = false;
            return Err(Error::OutOfMemory);
        }
        drop(fail);

        let mut next = lock(&self.next_addr);
        let addr = *next;
        let span = (payload.len() as u32).next_multiple_of(0x100).max(0x100);
        *next = next.checked_add(span).ok_or(Error::OutOfMemory)?;
        Ok(DmaBuffer::new(addr, payload.to_vec()))
    }
}
