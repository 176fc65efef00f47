//! Kernel console
//!
//! Kernel text goes to terminal 0, one character per write to its `WRITE`
//! register. The status register is not consulted: kernel messages are
//! rare and must get out even when the terminal reports busy.

use core::fmt;

use crate::arch::Hal;
use crate::drivers::regs::tty;
use crate::types::ProcId;

/// Console writer on terminal 0
pub struct Console<'a, H: Hal> {
    hal: &'a H,
    tty_segment: usize,
}

impl<'a, H: Hal> Console<'a, H> {
    pub fn new(hal: &'a H, tty_segment: usize) -> Self {
        Self { hal, tty_segment }
    }

    /// Write a byte to the console
    pub fn write_byte(&mut self, byte: u8) {
        self.hal
            .write32(self.tty_segment + tty::WRITE as usize * 4, byte as u32);
    }

    /// Write a string to the console
    pub fn putk(&mut self, s: &str) {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
    }

    /// Final message of a processor that stops for good
    pub fn exit_banner(&mut self, proc_id: ProcId, cycle: u32) {
        let _ = fmt::Write::write_fmt(
            self,
            format_args!("\n\n!!! Exit Processor {} at cycle {} !!!\n", proc_id, cycle),
        );
    }
}

impl<H: Hal> fmt::Write for Console<'_, H> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.putk(s);
        Ok(())
    }
}
