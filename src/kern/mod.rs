//! Kern subsystem - trap dispatch and shared kernel state
//!
//! Contains the kernel object, the exception and syscall switches, the
//! interrupt vector, the lock primitive and the state shared between
//! drivers and interrupt service routines.

pub mod barrier;
pub mod context;
pub mod exception;
pub mod isr;
pub mod kernel;
pub mod lock;
pub mod processor;
pub mod sched;
pub mod state;
pub mod syscall_sw;

pub use barrier::{Barrier, BarrierTable};
pub use context::{resolve_tty, ContextTable, CTX_TTY_SLOT, CTX_WORDS, TTY_SENTINEL};
pub use exception::{ExceptionCause, Fault, HaltReason, TrapFrame, TrapOutcome, EXCEPTION_VECTOR};
pub use isr::{InterruptVector, Isr, IRQ_LINES};
pub use kernel::Kernel;
pub use lock::{backoff_delay, SpinWord};
pub use processor::{Processor, ProcessorState, TrapStatsSnapshot};
pub use sched::{CooperativeScheduler, Scheduler};
pub use state::{DmaChannel, IocState, KernelState, TtyInbox};
pub use syscall_sw::{Syscall, SYSCALL_COUNT, SYSCALL_VECTOR};
