//! Spin barriers
//!
//! A fixed table of barriers for user tasks. Each barrier counts arrivals
//! against the value given at init; the last task to arrive re-arms it by
//! resetting the count and advancing the generation, which releases the
//! tasks spinning on the previous generation.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::MAX_BARRIERS;
use crate::drivers::{DriverError, DriverResult};

#[derive(Debug)]
pub struct Barrier {
    value: AtomicU32,
    count: AtomicU32,
    generation: AtomicU32,
}

impl Barrier {
    pub const fn new() -> Self {
        Self {
            value: AtomicU32::new(0),
            count: AtomicU32::new(0),
            generation: AtomicU32::new(0),
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Tasks that reached the current generation so far
    pub fn arrived(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

impl Default for Barrier {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct BarrierTable {
    barriers: [Barrier; MAX_BARRIERS],
}

impl BarrierTable {
    pub const fn new() -> Self {
        Self {
            barriers: [const { Barrier::new() }; MAX_BARRIERS],
        }
    }

    pub fn get(&self, index: u32) -> DriverResult<&Barrier> {
        self.barriers
            .get(index as usize)
            .ok_or(DriverError::OutOfRange {
                index,
                count: MAX_BARRIERS as u32,
            })
    }

    /// Arm barrier `index` for `value` tasks
    pub fn init(&self, index: u32, value: u32) -> DriverResult<()> {
        let barrier = self.get(index)?;
        if value == 0 {
            return Err(DriverError::InvalidArgument);
        }
        barrier.count.store(0, Ordering::Relaxed);
        barrier.value.store(value, Ordering::Release);
        Ok(())
    }

    /// Arrive at barrier `index` and spin until every task has arrived
    pub fn wait(&self, index: u32, mut relax: impl FnMut()) -> DriverResult<()> {
        let barrier = self.get(index)?;
        let value = barrier.value.load(Ordering::Acquire);
        if value == 0 {
            return Err(DriverError::InvalidArgument);
        }

        let generation = barrier.generation.load(Ordering::Acquire);
        let arrived = barrier.count.fetch_add(1, Ordering::AcqRel) + 1;
        if arrived >= value {
            barrier.count.store(0, Ordering::Relaxed);
            barrier.generation.fetch_add(1, Ordering::Release);
            return Ok(());
        }

        while barrier.generation.load(Ordering::Acquire) == generation {
            relax();
        }
        Ok(())
    }
}

impl Default for BarrierTable {
    fn default() -> Self {
        Self::new()
    }
}
