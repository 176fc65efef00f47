//! Terminal driver
//!
//! A multi-port terminal controller with one register bank per terminal.
//! Writes and direct reads poll `STATUS` and never block; the buffered
//! read consumes the character the receive ISR left in the terminal's
//! [`TtyInbox`].
//!
//! Known limitation: the inbox holds one character. A second character
//! received before the first is read replaces it.

use log::warn;

use super::regs::{tty, Mmio, RegisterFile};
use super::DriverResult;
use crate::arch::Hal;
use crate::kern::state::TtyInbox;
use crate::types::TtyId;

pub struct Terminal<'a, H: Hal> {
    hal: &'a H,
    regs: Mmio<'a, H>,
    inbox: &'a TtyInbox,
    id: TtyId,
}

impl<'a, H: Hal> Terminal<'a, H> {
    pub fn new(hal: &'a H, segment: usize, id: TtyId, inbox: &'a TtyInbox) -> Self {
        Self {
            hal,
            regs: Mmio::banked(hal, RegisterFile::TTY, segment, id.0),
            inbox,
            id,
        }
    }

    pub fn id(&self) -> TtyId {
        self.id
    }

    /// Copy up to `length` characters from `buffer` to the terminal
    ///
    /// Stops at the first poll that finds the terminal busy. Returns the
    /// number of characters written.
    pub fn write(&self, buffer: u32, length: u32) -> DriverResult<u32> {
        let mut written = 0;
        while written < length {
            if self.regs.read(tty::STATUS)? & tty::STATUS_WRITE_BUSY != 0 {
                break;
            }
            let c = self.hal.read8(buffer.wrapping_add(written) as usize);
            self.regs.write(tty::WRITE, c as u32)?;
            written += 1;
        }
        Ok(written)
    }

    /// Read one character straight from the `READ` register
    ///
    /// Returns `false` without touching `buffer` when none is ready.
    pub fn read(&self, buffer: u32) -> DriverResult<bool> {
        if self.regs.read(tty::STATUS)? & tty::STATUS_READ_READY == 0 {
            return Ok(false);
        }
        let c = self.regs.read(tty::READ)? as u8;
        self.hal.write8(buffer as usize, c);
        Ok(true)
    }

    /// Take the character buffered by the receive ISR
    pub fn read_irq(&self, buffer: u32) -> bool {
        match self.inbox.take() {
            Some(c) => {
                self.hal.write8(buffer as usize, c);
                true
            }
            None => false,
        }
    }

    /// Receive ISR: move the character from `READ` to the inbox
    pub fn isr_get(&self) -> DriverResult<()> {
        let c = self.regs.read(tty::READ)? as u8;
        if self.inbox.push(c) {
            warn!(
                "{}: input overrun, character lost ({} so far)",
                self.id,
                self.inbox.overruns()
            );
        }
        Ok(())
    }
}
