//! GCD coprocessor driver
//!
//! A single shared coprocessor with plain register access. Callers write
//! `OPA` and `OPB`, start it, poll `STATUS` and read the result back from
//! `OPA`.

use super::regs::{Mmio, RegisterFile};
use super::DriverResult;
use crate::arch::Hal;

pub struct Gcd<'a, H: Hal> {
    regs: Mmio<'a, H>,
}

impl<'a, H: Hal> Gcd<'a, H> {
    pub fn new(hal: &'a H, segment: usize) -> Self {
        Self {
            regs: Mmio::singleton(hal, RegisterFile::GCD, segment),
        }
    }

    pub fn read(&self, index: u32) -> DriverResult<u32> {
        self.regs.read(index)
    }

    pub fn write(&self, index: u32, value: u32) -> DriverResult<()> {
        self.regs.write(index, value)
    }
}
