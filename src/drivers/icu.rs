//! Interrupt concentrator driver

use super::regs::{icu, Mmio, RegisterFile};
use super::DriverResult;
use crate::arch::Hal;
use crate::types::ProcId;

/// Value of `IT_VECTOR` when no unmasked line is active
pub const IRQ_NONE: u32 = 32;

/// The interrupt concentrator of one processor
pub struct Icu<'a, H: Hal> {
    regs: Mmio<'a, H>,
}

impl<'a, H: Hal> Icu<'a, H> {
    pub fn new(hal: &'a H, segment: usize, proc_id: ProcId) -> Self {
        Self {
            regs: Mmio::banked(hal, RegisterFile::ICU, segment, proc_id.0),
        }
    }

    pub fn read(&self, index: u32) -> DriverResult<u32> {
        self.regs.read(index)
    }

    pub fn write(&self, index: u32, value: u32) -> DriverResult<()> {
        self.regs.write(index, value)
    }

    /// Highest priority active line, `None` when nothing is pending
    pub fn pending_line(&self) -> DriverResult<Option<u32>> {
        let line = self.regs.read(icu::IT_VECTOR)?;
        Ok((line < IRQ_NONE).then_some(line))
    }

    pub fn unmask(&self, lines: u32) -> DriverResult<()> {
        self.regs.write(icu::MASK_SET, lines)
    }

    pub fn mask(&self, lines: u32) -> DriverResult<()> {
        self.regs.write(icu::MASK_CLEAR, lines)
    }
}
