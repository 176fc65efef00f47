//! Architecture-specific code
//!
//! Every access the kernel makes to processor state or to physical memory
//! (peripheral registers, user buffers, the frame buffer) goes through the
//! [`Hal`] trait. The MIPS32 implementation talks to the hardware; the
//! simulator in [`crate::sim`] implements the same trait on the host.

#[cfg(target_arch = "mips")]
pub mod mips32;

#[cfg(target_arch = "mips")]
pub use mips32::Mips32;

/// Hardware access used by drivers and dispatch
///
/// Addresses are physical. Implementations perform each 32-bit access as a
/// single volatile bus transaction in program order.
pub trait Hal: Sync {
    /// Raw content of the processor identity register
    fn proc_id(&self) -> u32;

    /// Cycle counter of the calling processor
    fn proc_time(&self) -> u32;

    fn read32(&self, addr: usize) -> u32;

    fn write32(&self, addr: usize, value: u32);

    fn read8(&self, addr: usize) -> u8;

    fn write8(&self, addr: usize, value: u8);

    /// Byte copy from `src` to `dst`; addresses wrap at the top of memory
    fn copy(&self, dst: usize, src: usize, len: usize) {
        for i in 0..len {
            self.write8(dst.wrapping_add(i), self.read8(src.wrapping_add(i)));
        }
    }

    /// Invalidate the data cache lines covering `[addr, addr + len)`
    fn dcache_invalidate(&self, addr: usize, len: usize);

    /// One iteration of a busy-wait loop
    fn relax(&self) {
        core::hint::spin_loop();
    }

    /// Idle step of a halted processor
    fn wait(&self) {
        self.relax();
    }
}

impl<H: Hal> Hal for &H {
    fn proc_id(&self) -> u32 {
        (**self).proc_id()
    }

    fn proc_time(&self) -> u32 {
        (**self).proc_time()
    }

    fn read32(&self, addr: usize) -> u32 {
        (**self).read32(addr)
    }

    fn write32(&self, addr: usize, value: u32) {
        (**self).write32(addr, value)
    }

    fn read8(&self, addr: usize) -> u8 {
        (**self).read8(addr)
    }

    fn write8(&self, addr: usize, value: u8) {
        (**self).write8(addr, value)
    }

    fn copy(&self, dst: usize, src: usize, len: usize) {
        (**self).copy(dst, src, len)
    }

    fn dcache_invalidate(&self, addr: usize, len: usize) {
        (**self).dcache_invalidate(addr, len)
    }

    fn relax(&self) {
        (**self).relax()
    }

    fn wait(&self) {
        (**self).wait()
    }
}
