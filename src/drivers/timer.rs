//! Timer driver
//!
//! One timer per processor, addressed through the calling processor's bank.
//! No locking: nobody else touches a processor's timer.

use super::regs::{timer, Mmio, RegisterFile};
use super::DriverResult;
use crate::arch::Hal;
use crate::types::ProcId;

pub struct Timer<'a, H: Hal> {
    regs: Mmio<'a, H>,
}

impl<'a, H: Hal> Timer<'a, H> {
    pub fn new(hal: &'a H, segment: usize, proc_id: ProcId) -> Self {
        Self {
            regs: Mmio::banked(hal, RegisterFile::TIMER, segment, proc_id.0),
        }
    }

    pub fn read(&self, index: u32) -> DriverResult<u32> {
        self.regs.read(index)
    }

    pub fn write(&self, index: u32, value: u32) -> DriverResult<()> {
        self.regs.write(index, value)
    }

    /// Acknowledge the timer interrupt
    pub fn ack(&self) -> DriverResult<()> {
        self.regs.write(timer::RESETIRQ, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::DriverError;
    use crate::sim::SimHal;

    #[test]
    fn test_banked_per_processor() {
        let hal = SimHal::new();
        Timer::new(&hal, 0x9100_0000, ProcId(2))
            .write(timer::PERIOD, 5000)
            .unwrap();
        assert_eq!(hal.peek32(0x9100_0000 + 2 * 16 + 8), 5000);
        assert_eq!(
            Timer::new(&hal, 0x9100_0000, ProcId(2)).read(timer::PERIOD),
            Ok(5000)
        );
        assert_eq!(
            Timer::new(&hal, 0x9100_0000, ProcId(0)).read(timer::PERIOD),
            Ok(0)
        );
    }

    #[test]
    fn test_index_checked() {
        let hal = SimHal::new();
        let t = Timer::new(&hal, 0x9100_0000, ProcId(0));
        assert_eq!(
            t.read(timer::SPAN),
            Err(DriverError::OutOfRange { index: 4, count: 4 })
        );
        assert!(hal.accesses().is_empty());
    }
}
