//! Register access layer
//!
//! Each peripheral class exposes a file of 32-bit registers. Banked classes
//! (one instance per processor or per terminal) place instance `n` at
//! `segment + n * span` words; singletons sit at the segment base.

use super::{DriverError, DriverResult};
use crate::arch::Hal;

// ============================================================================
// Register Layouts
// ============================================================================

/// Block device (IOC) registers
pub mod ioc {
    pub const BUFFER: u32 = 0;
    pub const LBA: u32 = 1;
    pub const COUNT: u32 = 2;
    pub const OP: u32 = 3;
    pub const STATUS: u32 = 4;
    pub const IRQ_ENABLE: u32 = 5;
    pub const SIZE: u32 = 6;
    pub const BLOCK_SIZE: u32 = 7;
    pub const SPAN: u32 = 8;

    pub const OP_NOOP: u32 = 0;
    pub const OP_READ: u32 = 1;
    pub const OP_WRITE: u32 = 2;

    pub const STATUS_IDLE: u32 = 0;
    pub const STATUS_BUSY: u32 = 1;
    pub const STATUS_READ_SUCCESS: u32 = 2;
    pub const STATUS_WRITE_SUCCESS: u32 = 3;
    pub const STATUS_READ_ERROR: u32 = 4;
    pub const STATUS_WRITE_ERROR: u32 = 5;
    pub const STATUS_ERROR: u32 = 6;
}

/// DMA engine registers
pub mod dma {
    pub const SRC: u32 = 0;
    pub const DST: u32 = 1;
    /// Transfer length on write, transfer status on read
    pub const LEN: u32 = 2;
    /// Any write acknowledges the IRQ
    pub const RESET: u32 = 3;
    pub const IRQ_DISABLE: u32 = 4;
    pub const END: u32 = 5;
    pub const SPAN: u32 = 8;
}

/// GCD coprocessor registers
pub mod gcd {
    pub const OPA: u32 = 0;
    pub const OPB: u32 = 1;
    pub const START: u32 = 2;
    pub const STATUS: u32 = 3;
    pub const END: u32 = 4;
}

/// Interrupt concentrator registers
pub mod icu {
    pub const INT: u32 = 0;
    pub const MASK: u32 = 1;
    pub const MASK_SET: u32 = 2;
    pub const MASK_CLEAR: u32 = 3;
    /// Lowest active unmasked line, 32 when none
    pub const IT_VECTOR: u32 = 4;
    pub const END: u32 = 5;
    pub const SPAN: u32 = 8;
}

/// Timer registers
pub mod timer {
    pub const VALUE: u32 = 0;
    pub const MODE: u32 = 1;
    pub const PERIOD: u32 = 2;
    pub const RESETIRQ: u32 = 3;
    pub const SPAN: u32 = 4;
}

/// Terminal registers
pub mod tty {
    pub const WRITE: u32 = 0;
    pub const STATUS: u32 = 1;
    pub const READ: u32 = 2;
    pub const CONFIG: u32 = 3;
    pub const SPAN: u32 = 4;

    /// A character is waiting in `READ`
    pub const STATUS_READ_READY: u32 = 0x1;
    /// `WRITE` cannot accept a character
    pub const STATUS_WRITE_BUSY: u32 = 0x2;
}

// ============================================================================
// Register Files
// ============================================================================

/// Shape of one peripheral class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFile {
    pub name: &'static str,
    /// Number of addressable registers
    pub count: u32,
    /// Distance in words between two instances
    pub span: u32,
}

impl RegisterFile {
    pub const TIMER: Self = Self::new("timer", timer::SPAN, timer::SPAN);
    pub const TTY: Self = Self::new("tty", tty::SPAN, tty::SPAN);
    pub const ICU: Self = Self::new("icu", icu::END, icu::SPAN);
    pub const GCD: Self = Self::new("gcd", gcd::END, gcd::END);
    pub const DMA: Self = Self::new("dma", dma::END, dma::SPAN);
    pub const IOC: Self = Self::new("ioc", ioc::SPAN, ioc::SPAN);

    pub const fn new(name: &'static str, count: u32, span: u32) -> Self {
        Self { name, count, span }
    }

    /// Byte offset of instance `instance` from the segment base
    pub const fn instance_offset(&self, instance: u32) -> usize {
        instance as usize * self.span as usize * 4
    }
}

// ============================================================================
// Memory-Mapped Access
// ============================================================================

/// One instance of a register file
pub struct Mmio<'a, H: Hal> {
    hal: &'a H,
    base: usize,
    regs: RegisterFile,
}

impl<'a, H: Hal> Mmio<'a, H> {
    /// Instance `instance` of `regs` in the segment at `segment`
    pub fn banked(hal: &'a H, regs: RegisterFile, segment: usize, instance: u32) -> Self {
        Self {
            hal,
            base: segment + regs.instance_offset(instance),
            regs,
        }
    }

    /// The only instance of `regs`, at the segment base
    pub fn singleton(hal: &'a H, regs: RegisterFile, segment: usize) -> Self {
        Self::banked(hal, regs, segment, 0)
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn register_file(&self) -> RegisterFile {
        self.regs
    }

    /// Physical address of register `index`
    pub fn address(&self, index: u32) -> DriverResult<usize> {
        if index >= self.regs.count {
            return Err(DriverError::OutOfRange {
                index,
                count: self.regs.count,
            });
        }
        Ok(self.base + index as usize * 4)
    }

    pub fn read(&self, index: u32) -> DriverResult<u32> {
        let addr = self.address(index)?;
        Ok(self.hal.read32(addr))
    }

    pub fn write(&self, index: u32, value: u32) -> DriverResult<()> {
        let addr = self.address(index)?;
        self.hal.write32(addr, value);
        Ok(())
    }
}
