//! Device drivers
//!
//! One protocol per peripheral family. Every driver reaches its device
//! through [`regs::Mmio`], which validates register indices before any bus
//! access, and reaches user memory through the [`Hal`](crate::arch::Hal).
//!
//! Errors are recoverable: the syscall layer turns any [`DriverError`] into
//! the non-zero status `1` expected by user code.

pub mod fb;
pub mod gcd;
pub mod icu;
pub mod ioc;
pub mod regs;
pub mod timer;
pub mod tty;

pub use fb::FrameBuffer;
pub use gcd::Gcd;
pub use icu::Icu;
pub use ioc::BlockDevice;
pub use regs::{Mmio, RegisterFile};
pub use timer::Timer;
pub use tty::Terminal;

use thiserror::Error;

use crate::config::USER_SPACE_END;

/// Driver errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    #[error("register index {index} out of range (register file has {count})")]
    OutOfRange { index: u32, count: u32 },

    #[error("buffer {addr:#010x} (+{len:#x}) is not in user space")]
    InvalidAddress { addr: u32, len: u32 },

    #[error("transfer failed with status {status:#x}")]
    TransferError { status: u32 },

    #[error("no transfer pending for this caller")]
    NoTransferPending,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("terminal {0} is not configured")]
    BadTerminal(u32),

    #[error("processor {0} is not configured")]
    BadProcessor(u32),

    #[error("task {0} is beyond the per-processor task limit")]
    BadTask(u32),
}

impl DriverError {
    /// Status word reported to user code through the syscall ABI
    pub const fn status(&self) -> u32 {
        1
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Check that `[addr, addr + len)` lies in user space
///
/// Rejects `addr >= 0x8000_0000` and `addr + len >= 0x8000_0000`. The sum is
/// computed without wrapping.
pub fn check_user_range(addr: u32, len: u64) -> DriverResult<()> {
    let end = addr as u64 + len;
    if addr >= USER_SPACE_END || end >= USER_SPACE_END as u64 {
        return Err(DriverError::InvalidAddress {
            addr,
            len: len.min(u32::MAX as u64) as u32,
        });
    }
    Ok(())
}
