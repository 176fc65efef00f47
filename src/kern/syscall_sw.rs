//! System Call Switch
//!
//! User code places the call number in `v0` and up to four arguments in
//! `a0..a3`, then executes `syscall`. The low five bits of the number index
//! a fixed 32-entry table; the mapping is part of the user ABI and never
//! changes. Unassigned slots print the faulting EPC and halt the processor.
//!
//! Return values go back in `v0`. Calls returning a status use 0 for
//! success and 1 for any error; the terminal calls return a count or a
//! 0/1 "has data" flag.

use core::fmt::Write;
use core::ops::ControlFlow;

use log::{debug, error, trace};

use super::exception::{HaltReason, TrapFrame, TrapOutcome};
use super::kernel::Kernel;
use super::sched::Scheduler;
use crate::arch::Hal;
use crate::drivers::DriverResult;
use crate::types::ProcId;

// ============================================================================
// Syscall Numbers
// ============================================================================

pub const SYS_PROCID: u32 = 0x00;
pub const SYS_PROCTIME: u32 = 0x01;
pub const SYS_TTY_WRITE: u32 = 0x02;
pub const SYS_TTY_READ: u32 = 0x03;
pub const SYS_TIMER_WRITE: u32 = 0x04;
pub const SYS_TIMER_READ: u32 = 0x05;
pub const SYS_GCD_WRITE: u32 = 0x06;
pub const SYS_GCD_READ: u32 = 0x07;
pub const SYS_TTY_READ_IRQ: u32 = 0x0A;
pub const SYS_CTX_SWITCH: u32 = 0x0D;
pub const SYS_EXIT: u32 = 0x0E;
pub const SYS_PROCNUMBER: u32 = 0x0F;
pub const SYS_FB_SYNC_WRITE: u32 = 0x10;
pub const SYS_FB_SYNC_READ: u32 = 0x11;
pub const SYS_FB_WRITE: u32 = 0x12;
pub const SYS_FB_READ: u32 = 0x13;
pub const SYS_FB_COMPLETED: u32 = 0x14;
pub const SYS_IOC_WRITE: u32 = 0x15;
pub const SYS_IOC_READ: u32 = 0x16;
pub const SYS_IOC_COMPLETED: u32 = 0x17;
pub const SYS_BARRIER_INIT: u32 = 0x18;
pub const SYS_BARRIER_WAIT: u32 = 0x19;

/// Size of the syscall table
pub const SYSCALL_COUNT: usize = 32;

/// Status returned for a successful call
pub const SYS_OK: u32 = 0;

// ============================================================================
// Syscall Table
// ============================================================================

/// System calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    ProcId,
    ProcTime,
    TtyWrite,
    TtyRead,
    TimerWrite,
    TimerRead,
    GcdWrite,
    GcdRead,
    TtyReadIrq,
    CtxSwitch,
    Exit,
    ProcNumber,
    FbSyncWrite,
    FbSyncRead,
    FbWrite,
    FbRead,
    FbCompleted,
    IocWrite,
    IocRead,
    IocCompleted,
    BarrierInit,
    BarrierWait,
    /// Slot with no assigned call
    Unknown,
}

/// Call bound to each syscall number
pub const SYSCALL_VECTOR: [Syscall; SYSCALL_COUNT] = {
    let mut v = [Syscall::Unknown; SYSCALL_COUNT];
    v[SYS_PROCID as usize] = Syscall::ProcId;
    v[SYS_PROCTIME as usize] = Syscall::ProcTime;
    v[SYS_TTY_WRITE as usize] = Syscall::TtyWrite;
    v[SYS_TTY_READ as usize] = Syscall::TtyRead;
    v[SYS_TIMER_WRITE as usize] = Syscall::TimerWrite;
    v[SYS_TIMER_READ as usize] = Syscall::TimerRead;
    v[SYS_GCD_WRITE as usize] = Syscall::GcdWrite;
    v[SYS_GCD_READ as usize] = Syscall::GcdRead;
    v[SYS_TTY_READ_IRQ as usize] = Syscall::TtyReadIrq;
    v[SYS_CTX_SWITCH as usize] = Syscall::CtxSwitch;
    v[SYS_EXIT as usize] = Syscall::Exit;
    v[SYS_PROCNUMBER as usize] = Syscall::ProcNumber;
    v[SYS_FB_SYNC_WRITE as usize] = Syscall::FbSyncWrite;
    v[SYS_FB_SYNC_READ as usize] = Syscall::FbSyncRead;
    v[SYS_FB_WRITE as usize] = Syscall::FbWrite;
    v[SYS_FB_READ as usize] = Syscall::FbRead;
    v[SYS_FB_COMPLETED as usize] = Syscall::FbCompleted;
    v[SYS_IOC_WRITE as usize] = Syscall::IocWrite;
    v[SYS_IOC_READ as usize] = Syscall::IocRead;
    v[SYS_IOC_COMPLETED as usize] = Syscall::IocCompleted;
    v[SYS_BARRIER_INIT as usize] = Syscall::BarrierInit;
    v[SYS_BARRIER_WAIT as usize] = Syscall::BarrierWait;
    v
};

impl Syscall {
    /// Call bound to `number`; only the low five bits are used
    pub const fn from_number(number: u32) -> Self {
        SYSCALL_VECTOR[(number & 0x1F) as usize]
    }

    /// Name for debugging
    pub const fn name(self) -> &'static str {
        match self {
            Self::ProcId => "proc_id",
            Self::ProcTime => "proc_time",
            Self::TtyWrite => "tty_write",
            Self::TtyRead => "tty_read",
            Self::TimerWrite => "timer_write",
            Self::TimerRead => "timer_read",
            Self::GcdWrite => "gcd_write",
            Self::GcdRead => "gcd_read",
            Self::TtyReadIrq => "tty_read_irq",
            Self::CtxSwitch => "ctx_switch",
            Self::Exit => "exit",
            Self::ProcNumber => "procnumber",
            Self::FbSyncWrite => "fb_sync_write",
            Self::FbSyncRead => "fb_sync_read",
            Self::FbWrite => "fb_write",
            Self::FbRead => "fb_read",
            Self::FbCompleted => "fb_completed",
            Self::IocWrite => "ioc_write",
            Self::IocRead => "ioc_read",
            Self::IocCompleted => "ioc_completed",
            Self::BarrierInit => "barrier_init",
            Self::BarrierWait => "barrier_wait",
            Self::Unknown => "unknown",
        }
    }

    /// Number of argument registers used
    pub const fn arg_count(self) -> usize {
        match self {
            Self::ProcId
            | Self::ProcTime
            | Self::CtxSwitch
            | Self::Exit
            | Self::ProcNumber
            | Self::FbCompleted
            | Self::IocCompleted
            | Self::Unknown => 0,
            Self::BarrierWait => 1,
            Self::TtyWrite
            | Self::TtyRead
            | Self::TimerWrite
            | Self::TimerRead
            | Self::GcdWrite
            | Self::GcdRead
            | Self::TtyReadIrq
            | Self::BarrierInit => 2,
            Self::FbSyncWrite
            | Self::FbSyncRead
            | Self::FbWrite
            | Self::FbRead
            | Self::IocWrite
            | Self::IocRead => 3,
        }
    }
}

/// Status word for a driver result
fn status(result: DriverResult<()>) -> u32 {
    match result {
        Ok(()) => SYS_OK,
        Err(e) => {
            debug!("syscall failed: {}", e);
            e.status()
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

impl<H: Hal, S: Scheduler> Kernel<H, S> {
    /// Syscall entry: run the call, then resume after the `syscall`
    /// instruction with the result in `v0`
    pub(crate) fn syscall(&self, proc_id: ProcId, frame: &mut TrapFrame) -> TrapOutcome {
        let call = Syscall::from_number(frame.v0);
        trace!(
            "proc {}: {} {:x?}",
            proc_id,
            call.name(),
            &frame.a[..call.arg_count()]
        );
        match self.invoke(proc_id, call, frame) {
            ControlFlow::Continue(ret) => {
                frame.v0 = ret;
                frame.epc = frame.epc.wrapping_add(4);
                TrapOutcome::Resume
            }
            ControlFlow::Break(reason) => self.halt(proc_id, reason),
        }
    }

    fn invoke(&self, proc_id: ProcId, call: Syscall, frame: &TrapFrame) -> ControlFlow<HaltReason, u32> {
        let [a0, a1, a2, _] = frame.a;

        let ret = match call {
            Syscall::ProcId => self.proc_id().0,
            Syscall::ProcTime => self.proc_time(),
            Syscall::TtyWrite => self.tty().and_then(|t| t.write(a0, a1)).unwrap_or(0),
            Syscall::TtyRead => self.tty().and_then(|t| t.read(a0)).unwrap_or(false) as u32,
            Syscall::TtyReadIrq => self.tty().map(|t| t.read_irq(a0)).unwrap_or(false) as u32,
            Syscall::TimerWrite => status(self.timer().and_then(|t| t.write(a0, a1))),
            Syscall::TimerRead => status(
                self.timer()
                    .and_then(|t| t.read(a0))
                    .map(|v| self.hal().write32(a1 as usize, v)),
            ),
            Syscall::GcdWrite => status(self.gcd().write(a0, a1)),
            Syscall::GcdRead => status(
                self.gcd()
                    .read(a0)
                    .map(|v| self.hal().write32(a1 as usize, v)),
            ),
            Syscall::CtxSwitch => {
                self.scheduler().ctx_switch(proc_id);
                SYS_OK
            }
            Syscall::Exit => return ControlFlow::Break(HaltReason::Exit),
            Syscall::ProcNumber => self.config().nb_procs,
            Syscall::FbSyncWrite => status(self.fb().and_then(|fb| fb.sync_write(a0, a1, a2))),
            Syscall::FbSyncRead => status(self.fb().and_then(|fb| fb.sync_read(a0, a1, a2))),
            Syscall::FbWrite => status(self.fb().and_then(|fb| fb.write(a0, a1, a2))),
            Syscall::FbRead => status(self.fb().and_then(|fb| fb.read(a0, a1, a2))),
            Syscall::FbCompleted => status(self.fb().and_then(|fb| fb.completed())),
            Syscall::IocWrite => status(self.ioc_write(a0, a1, a2)),
            Syscall::IocRead => status(self.ioc_read(a0, a1, a2)),
            Syscall::IocCompleted => status(self.ioc_completed()),
            Syscall::BarrierInit => status(self.barriers().init(a0, a1)),
            Syscall::BarrierWait => status(self.barriers().wait(a0, || self.hal().relax())),
            Syscall::Unknown => return ControlFlow::Break(self.unknown_syscall(proc_id, frame)),
        };
        ControlFlow::Continue(ret)
    }

    fn unknown_syscall(&self, proc_id: ProcId, frame: &TrapFrame) -> HaltReason {
        let _ = write!(
            self.console(),
            "\n\n!!! Undefined System Call !!!\n\nEPC = {:#010x}",
            frame.epc
        );
        error!(
            "proc {}: undefined system call {} at epc {:#010x}",
            proc_id, frame.v0, frame.epc
        );
        HaltReason::UnknownSyscall {
            number: frame.v0,
            epc: frame.epc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abi_mapping() {
        let expected = [
            (0, Syscall::ProcId),
            (1, Syscall::ProcTime),
            (2, Syscall::TtyWrite),
            (3, Syscall::TtyRead),
            (4, Syscall::TimerWrite),
            (5, Syscall::TimerRead),
            (6, Syscall::GcdWrite),
            (7, Syscall::GcdRead),
            (10, Syscall::TtyReadIrq),
            (13, Syscall::CtxSwitch),
            (14, Syscall::Exit),
            (15, Syscall::ProcNumber),
            (16, Syscall::FbSyncWrite),
            (17, Syscall::FbSyncRead),
            (18, Syscall::FbWrite),
            (19, Syscall::FbRead),
            (20, Syscall::FbCompleted),
            (21, Syscall::IocWrite),
            (22, Syscall::IocRead),
            (23, Syscall::IocCompleted),
            (24, Syscall::BarrierInit),
            (25, Syscall::BarrierWait),
        ];
        for (number, call) in expected {
            assert_eq!(Syscall::from_number(number), call, "syscall {}", number);
        }
        let unknown = SYSCALL_VECTOR
            .iter()
            .filter(|c| **c == Syscall::Unknown)
            .count();
        assert_eq!(unknown, SYSCALL_COUNT - expected.len());
    }

    #[test]
    fn test_unassigned_slots() {
        for number in [8, 9, 11, 12, 26, 27, 28, 29, 30, 31] {
            assert_eq!(Syscall::from_number(number), Syscall::Unknown);
        }
    }

    #[test]
    fn test_number_uses_low_bits() {
        assert_eq!(Syscall::from_number(0x20 | SYS_EXIT), Syscall::Exit);
        assert_eq!(Syscall::from_number(0xFFFF_FFE1), Syscall::ProcTime);
    }

    #[test]
    fn test_arg_counts() {
        assert_eq!(Syscall::IocWrite.arg_count(), 3);
        assert_eq!(Syscall::TimerRead.arg_count(), 2);
        assert_eq!(Syscall::BarrierWait.arg_count(), 1);
        assert_eq!(Syscall::Exit.arg_count(), 0);
        assert_eq!(Syscall::Unknown.name(), "unknown");
    }
}
