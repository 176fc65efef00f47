//! Exception Dispatch
//!
//! Every trap enters through [`Kernel::trap`]. The 4-bit exception code of
//! the cause register selects one of sixteen entries: code 0 is the
//! external interrupt, code 8 the system call, and every other code is a
//! fatal cause. A fatal cause prints a diagnostic on the kernel console and
//! halts the processor for good.

use core::fmt::Write;
use core::sync::atomic::Ordering;

use log::error;

use super::kernel::Kernel;
use super::sched::Scheduler;
use crate::arch::Hal;
use crate::types::ProcId;

// ============================================================================
// Exception Causes
// ============================================================================

/// Hardware exception codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExceptionCause {
    /// External interrupt
    Interrupt = 0,
    /// Illegal address on load or fetch
    AddressLoad = 4,
    /// Illegal address on store
    AddressStore = 5,
    /// Bus error on instruction fetch
    InstructionBus = 6,
    /// Bus error on data access
    DataBus = 7,
    /// System call
    Syscall = 8,
    Breakpoint = 9,
    ReservedInstruction = 10,
    /// Coprocessor unusable
    CoprocessorUnusable = 11,
    /// Arithmetic overflow
    Overflow = 12,
    /// Any code with no assigned meaning
    Unknown = 0xFF,
}

/// Cause for each of the sixteen exception codes
pub const EXCEPTION_VECTOR: [ExceptionCause; 16] = [
    ExceptionCause::Interrupt,           // 0000
    ExceptionCause::Unknown,             // 0001
    ExceptionCause::Unknown,             // 0010
    ExceptionCause::Unknown,             // 0011
    ExceptionCause::AddressLoad,         // 0100
    ExceptionCause::AddressStore,        // 0101
    ExceptionCause::InstructionBus,      // 0110
    ExceptionCause::DataBus,             // 0111
    ExceptionCause::Syscall,             // 1000
    ExceptionCause::Breakpoint,          // 1001
    ExceptionCause::ReservedInstruction, // 1010
    ExceptionCause::CoprocessorUnusable, // 1011
    ExceptionCause::Overflow,            // 1100
    ExceptionCause::Unknown,             // 1101
    ExceptionCause::Unknown,             // 1110
    ExceptionCause::Unknown,             // 1111
];

impl ExceptionCause {
    /// Decode the exception code field (bits 2..6) of a cause register
    pub const fn from_cause_register(cause: u32) -> Self {
        EXCEPTION_VECTOR[((cause >> 2) & 0xF) as usize]
    }

    /// Whether this cause halts the processor
    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Interrupt | Self::Syscall)
    }

    /// Human readable description
    pub const fn message(self) -> &'static str {
        match self {
            Self::Interrupt => "external interrupt",
            Self::Syscall => "system call",
            Self::AddressLoad => "illegal read address",
            Self::AddressStore => "illegal write address",
            Self::InstructionBus => "inst bus error",
            Self::DataBus => "data bus error",
            Self::Breakpoint => "breakpoint",
            Self::ReservedInstruction => "reserved instruction",
            Self::CoprocessorUnusable => "illegal coproc access",
            Self::Overflow => "arithmetic overflow",
            Self::Unknown => "strange unknown cause",
        }
    }
}

// ============================================================================
// Trap Frame and Outcome
// ============================================================================

/// Registers saved by the exception entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct TrapFrame {
    /// CP0 Cause
    pub cause: u32,
    /// CP0 EPC
    pub epc: u32,
    /// CP0 BadVAddr
    pub bar: u32,
    /// Syscall number on entry, return value on exit
    pub v0: u32,
    /// Argument registers a0..a3
    pub a: [u32; 4],
}

impl TrapFrame {
    pub const fn syscall(number: u32, args: [u32; 4]) -> Self {
        Self {
            cause: (ExceptionCause::Syscall as u32) << 2,
            epc: 0,
            bar: 0,
            v0: number,
            a: args,
        }
    }

    pub const fn interrupt() -> Self {
        Self {
            cause: (ExceptionCause::Interrupt as u32) << 2,
            epc: 0,
            bar: 0,
            v0: 0,
            a: [0; 4],
        }
    }
}

/// Diagnostic data of a fatal exception
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    pub cause: ExceptionCause,
    pub epc: u32,
    pub bar: u32,
    /// Raw cause register
    pub cause_reg: u32,
}

/// Why a processor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    Fault(Fault),
    UnknownSyscall { number: u32, epc: u32 },
    Exit,
    /// Trap taken on a processor that had already halted
    AlreadyHalted,
    /// Identity register names a processor the kernel does not know
    UnknownProcessor(u32),
}

/// Result of handling one trap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum TrapOutcome {
    /// Return to the interrupted task
    Resume,
    /// The processor is halted and must idle forever
    Halted(HaltReason),
}

// ============================================================================
// Dispatch
// ============================================================================

impl<H: Hal, S: Scheduler> Kernel<H, S> {
    /// Handle one trap on the calling processor
    pub fn trap(&self, frame: &mut TrapFrame) -> TrapOutcome {
        let proc_id = self.proc_id();
        let cpu = match self.processor(proc_id) {
            Some(cpu) if proc_id.0 < self.config().nb_procs => cpu,
            _ => {
                error!("trap on unknown processor {}", proc_id);
                return TrapOutcome::Halted(HaltReason::UnknownProcessor(proc_id.0));
            }
        };
        if cpu.is_halted() {
            return TrapOutcome::Halted(HaltReason::AlreadyHalted);
        }

        let cause = ExceptionCause::from_cause_register(frame.cause);
        if cause.is_fatal() {
            cpu.stats.faults.fetch_add(1, Ordering::Relaxed);
            return self.fault(proc_id, cause, frame);
        }
        if cause == ExceptionCause::Interrupt {
            cpu.stats.interrupts.fetch_add(1, Ordering::Relaxed);
            self.interrupt(proc_id);
            TrapOutcome::Resume
        } else {
            cpu.stats.syscalls.fetch_add(1, Ordering::Relaxed);
            self.syscall(proc_id, frame)
        }
    }

    fn fault(&self, proc_id: ProcId, cause: ExceptionCause, frame: &TrapFrame) -> TrapOutcome {
        let fault = Fault {
            cause,
            epc: frame.epc,
            bar: frame.bar,
            cause_reg: frame.cause,
        };

        // The console cannot fail
        let _ = write!(
            self.console(),
            "\n\nException : {}\nEPC = {:#010x}\nBAR = {:#010x}\nCAUSE = {:#010x}",
            cause.message(),
            fault.epc,
            fault.bar,
            fault.cause_reg
        );
        error!(
            "proc {}: exception: {} (epc {:#010x}, bar {:#010x}, cause {:#010x})",
            proc_id,
            cause.message(),
            fault.epc,
            fault.bar,
            fault.cause_reg
        );

        self.halt(proc_id, HaltReason::Fault(fault))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_codes() {
        assert_eq!(EXCEPTION_VECTOR[0], ExceptionCause::Interrupt);
        assert_eq!(EXCEPTION_VECTOR[8], ExceptionCause::Syscall);
    }

    #[test]
    fn test_vector_matches_codes() {
        for (code, cause) in EXCEPTION_VECTOR.iter().enumerate() {
            if *cause != ExceptionCause::Unknown {
                assert_eq!(*cause as usize, code);
            }
        }
        let unknown: Vec<usize> = EXCEPTION_VECTOR
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == ExceptionCause::Unknown)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(unknown, [1, 2, 3, 13, 14, 15]);
    }

    #[test]
    fn test_decode_cause_register() {
        assert_eq!(ExceptionCause::from_cause_register(0x10), ExceptionCause::AddressLoad);
        assert_eq!(ExceptionCause::from_cause_register(0x20), ExceptionCause::Syscall);
        assert_eq!(ExceptionCause::from_cause_register(0x30), ExceptionCause::Overflow);
        // upper bits are ignored
        assert_eq!(
            ExceptionCause::from_cause_register(0x8000_FF00),
            ExceptionCause::Interrupt
        );
    }

    #[test]
    fn test_fatal_causes() {
        let fatal = EXCEPTION_VECTOR.iter().filter(|c| c.is_fatal()).count();
        assert_eq!(fatal, 14);
        assert!(!ExceptionCause::Syscall.is_fatal());
    }

    #[test]
    fn test_frame_helpers() {
        let frame = TrapFrame::syscall(5, [1, 2, 0, 0]);
        assert_eq!(ExceptionCause::from_cause_register(frame.cause), ExceptionCause::Syscall);
        let frame = TrapFrame::interrupt();
        assert_eq!(ExceptionCause::from_cause_register(frame.cause), ExceptionCause::Interrupt);
    }
}
