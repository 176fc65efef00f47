//! Block device driver
//!
//! The device is shared by every task in the system. A transfer call takes
//! the system-wide lock, programs the device and returns at once. The
//! device IRQ runs [`BlockDevice::isr`], which records the status and sets
//! `done`. [`BlockDevice::completed`] spins on `done`, reports the status
//! and releases the lock.
//!
//! The lock spins without backoff. A task that issues a second transfer
//! before completing the first spins forever on its own lock.

use core::num::NonZeroU32;

use log::debug;

use super::regs::{ioc, Mmio, RegisterFile};
use super::{check_user_range, DriverError, DriverResult};
use crate::arch::Hal;
use crate::kern::state::IocState;

pub struct BlockDevice<'a, H: Hal> {
    hal: &'a H,
    regs: Mmio<'a, H>,
    state: &'a IocState,
    no_hard_cc: bool,
}

impl<'a, H: Hal> BlockDevice<'a, H> {
    pub fn new(hal: &'a H, segment: usize, state: &'a IocState, no_hard_cc: bool) -> Self {
        Self {
            hal,
            regs: Mmio::singleton(hal, RegisterFile::IOC, segment),
            state,
            no_hard_cc,
        }
    }

    /// Start writing `count` blocks from `buffer` at `lba`
    pub fn write(&self, owner: NonZeroU32, lba: u32, buffer: u32, count: u32) -> DriverResult<()> {
        self.start(owner, ioc::OP_WRITE, lba, buffer, count)
    }

    /// Start reading `count` blocks at `lba` into `buffer`
    pub fn read(&self, owner: NonZeroU32, lba: u32, buffer: u32, count: u32) -> DriverResult<()> {
        self.start(owner, ioc::OP_READ, lba, buffer, count)
    }

    fn start(&self, owner: NonZeroU32, op: u32, lba: u32, buffer: u32, count: u32) -> DriverResult<()> {
        let len = self.state.block_size() as u64 * count as u64;
        check_user_range(buffer, len)?;

        self.state.lock().acquire_with(owner, || self.hal.relax());

        if op == ioc::OP_READ && self.no_hard_cc {
            self.hal.dcache_invalidate(buffer as usize, len as usize);
        }

        self.regs.write(ioc::BUFFER, buffer)?;
        self.regs.write(ioc::COUNT, count)?;
        self.regs.write(ioc::LBA, lba)?;
        self.regs.write(ioc::IRQ_ENABLE, 1)?;
        self.regs.write(ioc::OP, op)?;

        debug!(
            "ioc: {} lba {} count {} buffer {:#010x} (owner {})",
            if op == ioc::OP_READ { "read" } else { "write" },
            lba,
            count,
            buffer,
            owner
        );
        Ok(())
    }

    /// Wait for the transfer started by `owner` and release the device
    ///
    /// The lock is released whatever the status. A caller that holds no
    /// transfer gets [`DriverError::NoTransferPending`] and nothing changes.
    pub fn completed(&self, owner: NonZeroU32) -> DriverResult<()> {
        if self.state.owner() != Some(owner) {
            return Err(DriverError::NoTransferPending);
        }

        while !self.state.is_done() {
            self.hal.relax();
        }

        let status = self.state.take_status();
        if !self.state.lock().release_if(owner) {
            return Err(DriverError::NoTransferPending);
        }
        debug!("ioc: completed status {} (owner {})", status, owner);

        match status {
            ioc::STATUS_READ_SUCCESS | ioc::STATUS_WRITE_SUCCESS => Ok(()),
            status => Err(DriverError::TransferError { status }),
        }
    }

    /// Device IRQ: reading `STATUS` acknowledges it
    pub fn isr(&self) -> DriverResult<()> {
        let status = self.regs.read(ioc::STATUS)?;
        self.state.complete(status);
        Ok(())
    }

    /// Block size reported by the device
    pub fn block_size(&self) -> DriverResult<u32> {
        self.regs.read(ioc::BLOCK_SIZE)
    }
}
