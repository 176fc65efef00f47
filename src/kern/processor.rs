//! Processor state
//!
//! Each processor is either running tasks or halted after a fatal trap or
//! an exit. A halted processor never leaves that state. Per-processor trap
//! counters are kept alongside.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::MAX_PROCS;
use crate::types::ProcId;

// ============================================================================
// Processor State
// ============================================================================

/// Processor states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProcessorState {
    /// Executing tasks
    Running = 0,
    /// Stopped for good
    Halted = 1,
}

// ============================================================================
// Trap Statistics
// ============================================================================

/// Trap counters of one processor
#[derive(Debug)]
pub struct TrapStats {
    pub syscalls: AtomicU32,
    pub interrupts: AtomicU32,
    pub spurious: AtomicU32,
    pub faults: AtomicU32,
}

impl TrapStats {
    pub const fn new() -> Self {
        Self {
            syscalls: AtomicU32::new(0),
            interrupts: AtomicU32::new(0),
            spurious: AtomicU32::new(0),
            faults: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> TrapStatsSnapshot {
        TrapStatsSnapshot {
            syscalls: self.syscalls.load(Ordering::Relaxed),
            interrupts: self.interrupts.load(Ordering::Relaxed),
            spurious: self.spurious.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}

impl Default for TrapStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of trap statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrapStatsSnapshot {
    pub syscalls: u32,
    pub interrupts: u32,
    pub spurious: u32,
    pub faults: u32,
}

// ============================================================================
// Processor
// ============================================================================

#[derive(Debug)]
pub struct Processor {
    state: AtomicU32,
    pub stats: TrapStats,
}

impl Processor {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(ProcessorState::Running as u32),
            stats: TrapStats::new(),
        }
    }

    pub fn state(&self) -> ProcessorState {
        match self.state.load(Ordering::Acquire) {
            0 => ProcessorState::Running,
            _ => ProcessorState::Halted,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.state() == ProcessorState::Halted
    }

    /// Enter the halted state; returns `false` if already halted
    pub fn halt(&self) -> bool {
        self.state.swap(ProcessorState::Halted as u32, Ordering::AcqRel)
            == ProcessorState::Running as u32
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

/// Every processor the kernel can run on
#[derive(Debug)]
pub struct ProcessorTable {
    procs: [Processor; MAX_PROCS],
}

impl ProcessorTable {
    pub const fn new() -> Self {
        Self {
            procs: [const { Processor::new() }; MAX_PROCS],
        }
    }

    pub fn get(&self, proc_id: ProcId) -> Option<&Processor> {
        self.procs.get(proc_id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Processor> {
        self.procs.iter()
    }
}

impl Default for ProcessorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halt_is_final() {
        let cpu = Processor::new();
        assert_eq!(cpu.state(), ProcessorState::Running);
        assert!(cpu.halt());
        assert!(cpu.is_halted());
        assert!(!cpu.halt());
        assert_eq!(cpu.state(), ProcessorState::Halted);
    }

    #[test]
    fn test_stats_snapshot() {
        let cpu = Processor::new();
        cpu.stats.syscalls.fetch_add(2, Ordering::Relaxed);
        cpu.stats.spurious.fetch_add(1, Ordering::Relaxed);
        let snap = cpu.stats.snapshot();
        assert_eq!(snap.syscalls, 2);
        assert_eq!(snap.spurious, 1);
        assert_eq!(snap.faults, 0);
    }

    #[test]
    fn test_table_bounds() {
        let table = ProcessorTable::new();
        assert!(table.get(ProcId(7)).is_some());
        assert!(table.get(ProcId(8)).is_none());
        assert_eq!(table.iter().count(), MAX_PROCS);
    }
}
