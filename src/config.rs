//! Platform configuration
//!
//! Processor and task counts, cache coherence, segment base addresses and
//! the interrupt vector. On the reference platform these come from the
//! board header and the linker script; here they are one validated value
//! handed to [`crate::kern::Kernel::new`].

use thiserror::Error;

use crate::kern::isr::{InterruptVector, Isr};

/// Most processors the kernel supports
pub const MAX_PROCS: usize = 8;
/// Most tasks per processor the kernel supports
pub const MAX_TASKS_PER_PROC: usize = 4;
/// Size of every per-task table (context table, terminal buffers)
pub const MAX_TASKS: usize = MAX_PROCS * MAX_TASKS_PER_PROC;
/// Number of spin barriers available to user code
pub const MAX_BARRIERS: usize = 8;

/// First kernel address; user buffers must lie entirely below it
pub const USER_SPACE_END: u32 = 0x8000_0000;

const _: () = assert!(MAX_PROCS <= 8, "at most 8 processors are supported");
const _: () = assert!(MAX_TASKS_PER_PROC <= 4, "at most 4 tasks per processor are supported");

/// Configuration errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("processor count {0} outside 1..={max}", max = MAX_PROCS)]
    ProcCount(u32),

    #[error("task count {0} outside 1..={max}", max = MAX_TASKS_PER_PROC)]
    TaskCount(u32),

    #[error("block size must be non-zero")]
    BlockSize,

    #[error("interrupt line {0} outside 0..32")]
    IrqLine(u32),
}

/// Base addresses of the peripheral segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segments {
    pub tty: usize,
    pub timer: usize,
    pub ioc: usize,
    pub dma: usize,
    pub gcd: usize,
    pub fb: usize,
    pub icu: usize,
}

impl Segments {
    /// Addresses of the reference SoC
    pub const REFERENCE: Self = Self {
        tty: 0x9000_0000,
        timer: 0x9100_0000,
        ioc: 0x9200_0000,
        dma: 0x9300_0000,
        gcd: 0x9500_0000,
        fb: 0x9600_0000,
        icu: 0x9F00_0000,
    };
}

impl Default for Segments {
    fn default() -> Self {
        Self::REFERENCE
    }
}

/// Static description of the platform the kernel runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Number of processors
    pub nb_procs: u32,
    /// Maximum number of tasks per processor
    pub max_tasks: u32,
    /// No hardware cache coherence: buffers written by devices must be
    /// invalidated in the data cache
    pub no_hard_cc: bool,
    /// Block size assumed until the block device reports its own
    pub ioc_block_size: u32,
    pub segments: Segments,
    pub irq: InterruptVector,
}

impl PlatformConfig {
    /// Single processor reference platform
    pub const DEFAULT: Self = Self {
        nb_procs: 1,
        max_tasks: MAX_TASKS_PER_PROC as u32,
        no_hard_cc: true,
        ioc_block_size: 512,
        segments: Segments::REFERENCE,
        irq: InterruptVector::EMPTY,
    };

    /// Create a validated configuration with reference addresses
    pub fn new(nb_procs: u32, max_tasks: u32) -> Result<Self, ConfigError> {
        let config = Self {
            nb_procs,
            max_tasks,
            ..Self::DEFAULT
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_segments(mut self, segments: Segments) -> Self {
        self.segments = segments;
        self
    }

    pub fn with_no_hard_cc(mut self, no_hard_cc: bool) -> Self {
        self.no_hard_cc = no_hard_cc;
        self
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.ioc_block_size = block_size;
        self
    }

    /// Bind interrupt line `line` to `isr`
    pub fn with_irq(mut self, line: u32, isr: Isr) -> Result<Self, ConfigError> {
        self.irq.bind(line, isr)?;
        Ok(self)
    }

    /// Check counts against the compile-time limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nb_procs == 0 || self.nb_procs as usize > MAX_PROCS {
            return Err(ConfigError::ProcCount(self.nb_procs));
        }
        if self.max_tasks == 0 || self.max_tasks as usize > MAX_TASKS_PER_PROC {
            return Err(ConfigError::TaskCount(self.max_tasks));
        }
        if self.ioc_block_size == 0 {
            return Err(ConfigError::BlockSize);
        }
        Ok(())
    }

    /// Number of terminals: one private terminal per task
    pub const fn nb_ttys(&self) -> u32 {
        self.nb_procs * self.max_tasks
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(PlatformConfig::DEFAULT.validate(), Ok(()));
        assert_eq!(PlatformConfig::DEFAULT.nb_ttys(), 4);
    }

    #[test]
    fn test_limits() {
        assert_eq!(PlatformConfig::new(0, 1), Err(ConfigError::ProcCount(0)));
        assert_eq!(PlatformConfig::new(9, 1), Err(ConfigError::ProcCount(9)));
        assert_eq!(PlatformConfig::new(8, 5), Err(ConfigError::TaskCount(5)));
        assert!(PlatformConfig::new(8, 4).is_ok());
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let config = PlatformConfig::DEFAULT.with_block_size(0);
        assert_eq!(config.validate(), Err(ConfigError::BlockSize));
    }

    #[test]
    fn test_irq_binding() {
        let config = PlatformConfig::DEFAULT.with_irq(3, Isr::Ioc).unwrap();
        assert_eq!(config.irq.get(3), Isr::Ioc);
        assert_eq!(
            PlatformConfig::DEFAULT.with_irq(32, Isr::Ioc),
            Err(ConfigError::IrqLine(32))
        );
    }
}
