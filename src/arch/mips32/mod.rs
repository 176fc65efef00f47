//! MIPS32 implementation
//!
//! CP0 accesses use inline assembly. The exception vector itself (register
//! save/restore, `eret`) lives in the boot assembly; it builds a
//! [`TrapFrame`] on the kernel stack and calls [`_trap_entry`].

use core::arch::asm;
use core::ptr::{read_volatile, write_volatile};

use spin::Once;

use super::Hal;
use crate::config::{ConfigError, PlatformConfig, Segments};
use crate::console::Console;
use crate::kern::{CooperativeScheduler, Kernel, TrapFrame, TrapOutcome};
use crate::klog::ConsoleLogger;

/// MIPS32 processor with memory-mapped peripherals
pub struct Mips32 {
    _private: (),
}

impl Mips32 {
    /// # Safety
    ///
    /// Only one instance may exist, and every address later passed to it
    /// must be mapped on this platform.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }

    /// Data cache line size in bytes, from CP0 Config1.DL
    fn dcache_line_size() -> usize {
        let config1: u32;
        unsafe {
            asm!("mfc0 {0}, $16, 1", out(reg) config1);
        }
        let dl = (config1 >> 10) & 0x7;
        if dl == 0 {
            0
        } else {
            2 << dl
        }
    }
}

impl Hal for Mips32 {
    fn proc_id(&self) -> u32 {
        let ebase: u32;
        unsafe {
            asm!("mfc0 {0}, $15, 1", out(reg) ebase);
        }
        ebase
    }

    fn proc_time(&self) -> u32 {
        let count: u32;
        unsafe {
            asm!("mfc0 {0}, $9", out(reg) count);
        }
        count
    }

    fn read32(&self, addr: usize) -> u32 {
        unsafe { read_volatile(addr as *const u32) }
    }

    fn write32(&self, addr: usize, value: u32) {
        unsafe { write_volatile(addr as *mut u32, value) }
    }

    fn read8(&self, addr: usize) -> u8 {
        unsafe { read_volatile(addr as *const u8) }
    }

    fn write8(&self, addr: usize, value: u8) {
        unsafe { write_volatile(addr as *mut u8, value) }
    }

    fn dcache_invalidate(&self, addr: usize, len: usize) {
        let line = Self::dcache_line_size();
        if line == 0 || len == 0 {
            return;
        }
        let end = addr.saturating_add(len);
        let mut p = addr & !(line - 1);
        while p < end {
            unsafe {
                // Hit_Invalidate_D
                asm!("cache 0x11, 0({0})", in(reg) p);
            }
            match p.checked_add(line) {
                Some(next) => p = next,
                None => break,
            }
        }
    }

    fn relax(&self) {
        unsafe {
            asm!("nop");
        }
    }

    fn wait(&self) {
        unsafe {
            asm!("wait");
        }
    }
}

// ============================================================================
// Boot glue
// ============================================================================

static KERNEL: Once<Kernel<Mips32, CooperativeScheduler>> = Once::new();
static HAL: Mips32 = unsafe { Mips32::new() };
static LOGGER: Once<ConsoleLogger<'static, Mips32>> = Once::new();

/// Build the kernel and install the console logger
///
/// Called once by the boot processor before any task runs. Later calls
/// return the kernel built by the first one.
pub fn boot(
    config: PlatformConfig,
    sched: CooperativeScheduler,
) -> Result<&'static Kernel<Mips32, CooperativeScheduler>, ConfigError> {
    if let Some(kernel) = KERNEL.get() {
        return Ok(kernel);
    }

    let tty = config.segments.tty;
    let logger = LOGGER.call_once(|| ConsoleLogger::new(&HAL, tty, log::LevelFilter::Info));
    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level());
    }

    // SAFETY: the only other instance is `HAL`, used by the logger for
    // console output only
    let kernel = Kernel::new(unsafe { Mips32::new() }, sched, config)?;
    let kernel = KERNEL.call_once(|| kernel);
    kernel.init();
    Ok(kernel)
}

pub(crate) fn hal() -> &'static Mips32 {
    &HAL
}

/// Kernel console for paths that cannot rely on the kernel being built
pub(crate) fn console() -> Console<'static, Mips32> {
    let tty = KERNEL
        .get()
        .map_or(Segments::REFERENCE.tty, |k| k.config().segments.tty);
    Console::new(&HAL, tty)
}

/// Per-processor initialisation, run by each processor after [`boot`]
#[no_mangle]
pub extern "C" fn _processor_init() {
    if let Some(kernel) = KERNEL.get() {
        kernel.init_processor();
    }
}

/// Entry from the exception vector
///
/// # Safety
///
/// `frame` points to the saved register frame of the interrupted context.
#[no_mangle]
pub unsafe extern "C" fn _trap_entry(frame: *mut TrapFrame) {
    let Some(kernel) = KERNEL.get() else {
        loop {
            HAL.wait();
        }
    };
    let frame = unsafe { &mut *frame };
    if let TrapOutcome::Halted(_) = kernel.trap(frame) {
        loop {
            kernel.hal().wait();
        }
    }
}
