//! Frame buffer driver
//!
//! Two paths to the frame buffer:
//! - synchronous: a plain copy between the user buffer and the frame
//!   buffer segment
//! - DMA: the calling processor's DMA engine moves the data while the
//!   caller goes on; [`FrameBuffer::completed`] waits for the DMA ISR
//!
//! The DMA engine is claimed through the processor's busy flag. A claim
//! that finds it busy spins for a pseudo-random number of cycles before
//! polling again. The ISR clearing the flag is the release.
//!
//! Known limitation: the two paths are not mutually excluded, so a
//! synchronous copy may overlap a DMA transfer on the same region.

use log::trace;

use super::regs::{dma, Mmio, RegisterFile};
use super::{check_user_range, DriverError, DriverResult};
use crate::arch::Hal;
use crate::kern::lock::backoff_delay;
use crate::kern::state::DmaChannel;
use crate::types::ProcId;

pub struct FrameBuffer<'a, H: Hal> {
    hal: &'a H,
    base: usize,
    dma: Mmio<'a, H>,
    channel: &'a DmaChannel,
    no_hard_cc: bool,
}

impl<'a, H: Hal> FrameBuffer<'a, H> {
    pub fn new(
        hal: &'a H,
        fb_segment: usize,
        dma_segment: usize,
        proc_id: ProcId,
        channel: &'a DmaChannel,
        no_hard_cc: bool,
    ) -> Self {
        Self {
            hal,
            base: fb_segment,
            dma: Mmio::banked(hal, RegisterFile::DMA, dma_segment, proc_id.0),
            channel,
            no_hard_cc,
        }
    }

    /// Physical address of `offset`, wrapping in the 32-bit address space
    fn fb_address(&self, offset: u32) -> u32 {
        (self.base as u32).wrapping_add(offset)
    }

    /// Copy `length` bytes from `buffer` to the frame buffer at `offset`
    pub fn sync_write(&self, offset: u32, buffer: u32, length: u32) -> DriverResult<()> {
        check_user_range(buffer, length as u64)?;
        self.hal
            .copy(self.fb_address(offset) as usize, buffer as usize, length as usize);
        Ok(())
    }

    /// Copy `length` bytes from the frame buffer at `offset` to `buffer`
    pub fn sync_read(&self, offset: u32, buffer: u32, length: u32) -> DriverResult<()> {
        check_user_range(buffer, length as u64)?;
        self.hal
            .copy(buffer as usize, self.fb_address(offset) as usize, length as usize);
        Ok(())
    }

    /// Start a DMA transfer from `buffer` to the frame buffer at `offset`
    pub fn write(&self, offset: u32, buffer: u32, length: u32) -> DriverResult<()> {
        check_user_range(buffer, length as u64)?;
        self.claim();
        self.start(buffer, self.fb_address(offset), length)
    }

    /// Start a DMA transfer from the frame buffer at `offset` to `buffer`
    pub fn read(&self, offset: u32, buffer: u32, length: u32) -> DriverResult<()> {
        check_user_range(buffer, length as u64)?;
        self.claim();
        self.start(self.fb_address(offset), buffer, length)?;
        if self.no_hard_cc {
            self.hal.dcache_invalidate(buffer as usize, length as usize);
        }
        Ok(())
    }

    fn claim(&self) {
        while !self.channel.try_claim() {
            self.channel.note_contention();
            let delay = backoff_delay(self.hal.proc_time());
            trace!("dma busy, backing off {} cycles", delay);
            for _ in 0..delay {
                self.hal.relax();
            }
        }
    }

    fn start(&self, src: u32, dst: u32, length: u32) -> DriverResult<()> {
        self.dma.write(dma::IRQ_DISABLE, 0)?;
        self.dma.write(dma::SRC, src)?;
        self.dma.write(dma::DST, dst)?;
        self.dma.write(dma::LEN, length)
    }

    /// Wait for this processor's DMA transfer to finish
    pub fn completed(&self) -> DriverResult<()> {
        while self.channel.is_busy() {
            self.hal.relax();
        }
        match self.channel.status() {
            0 => Ok(()),
            status => Err(DriverError::TransferError { status }),
        }
    }

    /// DMA IRQ: read the transfer status, acknowledge and release the engine
    pub fn isr(&self) -> DriverResult<()> {
        let status = self.dma.read(dma::LEN)?;
        self.dma.write(dma::RESET, 0)?;
        self.channel.finish(status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHal;

    const FB: usize = 0x9600_0000;
    const DMA: usize = 0x9300_0000;

    #[test]
    fn test_sync_round_trip() {
        let hal = SimHal::new();
        let channel = DmaChannel::new();
        let fb = FrameBuffer::new(&hal, FB, DMA, ProcId(0), &channel, true);

        hal.poke_bytes(0x3000, &[1, 2, 3, 4]);
        fb.sync_write(0x10, 0x3000, 4).unwrap();
        assert_eq!(hal.peek_bytes(FB + 0x10, 4), [1, 2, 3, 4]);

        fb.sync_read(0x11, 0x5000, 2).unwrap();
        assert_eq!(hal.peek_bytes(0x5000, 2), [2, 3]);
        assert!(hal.invalidations().is_empty());
    }

    #[test]
    fn test_rejects_kernel_buffer() {
        let hal = SimHal::new();
        let channel = DmaChannel::new();
        let fb = FrameBuffer::new(&hal, FB, DMA, ProcId(0), &channel, false);

        for result in [
            fb.sync_write(0, 0x8000_0000, 4),
            fb.sync_read(0, 0x7FFF_FFF0, 0x10),
            fb.write(0, 0x9000_0000, 4),
            fb.read(0, 0x7FFF_FFFF, 1),
        ] {
            assert!(matches!(result, Err(DriverError::InvalidAddress { .. })));
        }
        assert!(!channel.is_busy());
        assert!(hal.accesses().is_empty());
    }

    #[test]
    fn test_dma_write_programs_engine() {
        let hal = SimHal::new();
        let channel = DmaChannel::new();
        let fb = FrameBuffer::new(&hal, FB, DMA, ProcId(1), &channel, false);

        hal.poke_bytes(0x3000, b"pixels");
        fb.write(0x40, 0x3000, 6).unwrap();
        assert!(channel.is_busy());
        assert_eq!(hal.peek32(DMA + 32 + 4), (FB + 0x40) as u32);
        assert_eq!(hal.peek_bytes(FB + 0x40, 6), b"pixels");

        fb.isr().unwrap();
        assert!(!channel.is_busy());
        assert_eq!(fb.completed(), Ok(()));
    }

    #[test]
    fn test_large_offset_wraps() {
        let hal = SimHal::new();
        let channel = DmaChannel::new();
        let fb = FrameBuffer::new(&hal, FB, DMA, ProcId(0), &channel, false);
        let offset = 0x7000_0000;
        let wrapped = (FB as u32).wrapping_add(offset);
        assert_eq!(wrapped, 0x0600_0000);

        hal.poke_bytes(0x3000, b"ab");
        fb.sync_write(offset, 0x3000, 2).unwrap();
        assert_eq!(hal.peek_bytes(wrapped as usize, 2), b"ab");

        // both paths agree on the destination
        fb.write(offset, 0x3000, 2).unwrap();
        assert_eq!(hal.peek32(DMA + 4), wrapped);
        fb.isr().unwrap();
        assert_eq!(fb.completed(), Ok(()));
    }

    #[test]
    fn test_dma_read_invalidates() {
        let hal = SimHal::new();
        let channel = DmaChannel::new();
        let fb = FrameBuffer::new(&hal, FB, DMA, ProcId(0), &channel, true);

        fb.read(0, 0x6000, 64).unwrap();
        assert_eq!(hal.invalidations(), [(0x6000, 64)]);
    }

    #[test]
    fn test_dma_error_status() {
        let hal = SimHal::new();
        hal.set_dma_status(ProcId(0), 2);
        let channel = DmaChannel::new();
        let fb = FrameBuffer::new(&hal, FB, DMA, ProcId(0), &channel, false);

        fb.write(0, 0x3000, 8).unwrap();
        fb.isr().unwrap();
        assert_eq!(fb.completed(), Err(DriverError::TransferError { status: 2 }));
    }
}
