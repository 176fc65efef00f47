//! Common types used across the kernel
//!
//! This module defines shared identifiers to avoid circular dependencies.

use core::fmt;
use core::num::NonZeroU32;

/// Processor identifier, derived from the hardware identity register
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ProcId(pub u32);

impl ProcId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task identifier, local to one processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TaskId(pub u32);

impl TaskId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Terminal (TTY channel) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TtyId(pub u32);

impl TtyId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TtyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tty{}", self.0)
    }
}

/// The (processor, task) pair on whose behalf a driver call runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Caller {
    pub proc_id: ProcId,
    pub task_id: TaskId,
}

impl Caller {
    pub const fn new(proc_id: ProcId, task_id: TaskId) -> Self {
        Self { proc_id, task_id }
    }

    /// Flat slot index `proc_id * max_tasks + task_id`
    ///
    /// Used for the context table and for the default terminal.
    pub const fn slot(&self, max_tasks: u32) -> u32 {
        self.proc_id.0 * max_tasks + self.task_id.0
    }

    /// Non-zero lock token identifying this caller as a lock holder
    pub fn token(&self, max_tasks: u32) -> NonZeroU32 {
        NonZeroU32::MIN.saturating_add(self.slot(max_tasks))
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc {} task {}", self.proc_id.0, self.task_id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_slot() {
        let caller = Caller::new(ProcId(2), TaskId(3));
        assert_eq!(caller.slot(4), 11);
        assert_eq!(caller.token(4).get(), 12);
    }

    #[test]
    fn test_first_slot_token_is_nonzero() {
        let caller = Caller::new(ProcId(0), TaskId(0));
        assert_eq!(caller.slot(4), 0);
        assert_eq!(caller.token(4).get(), 1);
    }
}
