//! Task context table
//!
//! Flat table of fixed-width slots, one per `(proc_id, task_id)`, owned by
//! the scheduler. The driver layer only reads word [`CTX_TTY_SLOT`], the
//! terminal assignment, and `tty_config` writes it before the task runs.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::MAX_TASKS;
use crate::types::{Caller, TtyId};

/// Words per task context
pub const CTX_WORDS: usize = 64;
/// Context word holding the terminal assignment
pub const CTX_TTY_SLOT: usize = 34;
/// Tag marking an explicit terminal assignment
pub const TTY_SENTINEL: u32 = 0x8000_0000;

/// Context slots of every task on every processor
pub struct ContextTable {
    words: [AtomicU32; MAX_TASKS * CTX_WORDS],
}

impl ContextTable {
    pub const fn new() -> Self {
        Self {
            words: [const { AtomicU32::new(0) }; MAX_TASKS * CTX_WORDS],
        }
    }

    fn word(&self, slot: u32, index: usize) -> Option<&AtomicU32> {
        if index >= CTX_WORDS {
            return None;
        }
        self.words.get(slot as usize * CTX_WORDS + index)
    }

    /// Word `index` of context `slot`
    pub fn read(&self, slot: u32, index: usize) -> Option<u32> {
        self.word(slot, index).map(|w| w.load(Ordering::Acquire))
    }

    pub fn write(&self, slot: u32, index: usize, value: u32) -> bool {
        match self.word(slot, index) {
            Some(w) => {
                w.store(value, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Raw terminal assignment of context `slot` (0 when out of range)
    pub fn tty(&self, slot: u32) -> u32 {
        self.read(slot, CTX_TTY_SLOT).unwrap_or(0)
    }

    /// Store an explicit terminal assignment for context `slot`
    pub fn set_tty(&self, slot: u32, tty_id: TtyId) -> bool {
        self.write(slot, CTX_TTY_SLOT, tty_id.0 | TTY_SENTINEL)
    }
}

impl Default for ContextTable {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ContextTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContextTable")
            .field("slots", &MAX_TASKS)
            .finish()
    }
}

/// Terminal used by `caller` given its context word
///
/// A tagged value names the terminal explicitly; anything else selects the
/// caller's private terminal `proc_id * max_tasks + task_id`.
pub const fn resolve_tty(slot_value: u32, caller: Caller, max_tasks: u32) -> TtyId {
    if slot_value & TTY_SENTINEL != 0 {
        TtyId(slot_value & !TTY_SENTINEL)
    } else {
        TtyId(caller.slot(max_tasks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProcId, TaskId};
    use proptest::prelude::*;

    #[test]
    fn test_set_tty_tags_value() {
        let table = ContextTable::new();
        assert_eq!(table.tty(5), 0);
        assert!(table.set_tty(5, TtyId(2)));
        assert_eq!(table.tty(5), 0x8000_0002);
        assert_eq!(table.read(5, CTX_TTY_SLOT), Some(0x8000_0002));
        assert_eq!(table.read(5, CTX_TTY_SLOT - 1), Some(0));
    }

    #[test]
    fn test_out_of_range_slots() {
        let table = ContextTable::new();
        assert!(!table.set_tty(MAX_TASKS as u32, TtyId(0)));
        assert_eq!(table.read(0, CTX_WORDS), None);
        assert_eq!(table.tty(MAX_TASKS as u32), 0);
    }

    #[test]
    fn test_tagged_zero_is_terminal_zero() {
        let caller = Caller::new(ProcId(1), TaskId(2));
        assert_eq!(resolve_tty(TTY_SENTINEL, caller, 4), TtyId(0));
        assert_eq!(resolve_tty(0, caller, 4), TtyId(6));
    }

    proptest! {
        #[test]
        fn test_default_terminal(proc in 0u32..8, task in 0u32..4, max_tasks in 1u32..=4) {
            let caller = Caller::new(ProcId(proc), TaskId(task));
            prop_assert_eq!(resolve_tty(0, caller, max_tasks), TtyId(proc * max_tasks + task));
        }

        #[test]
        fn test_explicit_terminal(proc in 0u32..8, task in 0u32..4, raw in 0u32..0x8000_0000) {
            let caller = Caller::new(ProcId(proc), TaskId(task));
            prop_assert_eq!(resolve_tty(TTY_SENTINEL | raw, caller, 4), TtyId(raw));
        }
    }
}
