//! Scheduler interface
//!
//! Task switching belongs to the scheduler. The dispatch layer only needs
//! the task running on a processor, the context table and a way to request
//! a switch. [`CooperativeScheduler`] is a minimal round-robin
//! implementation; the register save/restore around a switch is done by
//! the platform's switch entry.

use core::sync::atomic::{AtomicU32, Ordering};

use log::debug;

use super::context::ContextTable;
use crate::config::{MAX_PROCS, MAX_TASKS_PER_PROC};
use crate::types::{ProcId, TaskId};

/// What the dispatch layer consumes from the scheduler
pub trait Scheduler: Sync {
    /// Task currently running on `proc_id`
    fn current_task(&self, proc_id: ProcId) -> TaskId;

    fn contexts(&self) -> &ContextTable;

    /// Switch `proc_id` to its next task
    fn ctx_switch(&self, proc_id: ProcId);
}

/// Round-robin over a fixed number of tasks per processor
#[derive(Debug)]
pub struct CooperativeScheduler {
    contexts: ContextTable,
    current: [AtomicU32; MAX_PROCS],
    tasks: [AtomicU32; MAX_PROCS],
    switches: AtomicU32,
}

impl CooperativeScheduler {
    /// One task on every processor
    pub const fn new() -> Self {
        Self {
            contexts: ContextTable::new(),
            current: [const { AtomicU32::new(0) }; MAX_PROCS],
            tasks: [const { AtomicU32::new(1) }; MAX_PROCS],
            switches: AtomicU32::new(0),
        }
    }

    /// Set the number of tasks loaded on `proc_id`
    pub fn set_task_count(&self, proc_id: ProcId, count: u32) -> bool {
        let Some(tasks) = self.tasks.get(proc_id.index()) else {
            return false;
        };
        if count == 0 || count as usize > MAX_TASKS_PER_PROC {
            return false;
        }
        tasks.store(count, Ordering::Relaxed);
        true
    }

    pub fn task_count(&self, proc_id: ProcId) -> u32 {
        self.tasks
            .get(proc_id.index())
            .map_or(0, |t| t.load(Ordering::Relaxed))
    }

    /// Make `task_id` the running task of `proc_id`
    pub fn set_current(&self, proc_id: ProcId, task_id: TaskId) {
        if let Some(current) = self.current.get(proc_id.index()) {
            current.store(task_id.0, Ordering::Release);
        }
    }

    /// Total switches performed
    pub fn switches(&self) -> u32 {
        self.switches.load(Ordering::Relaxed)
    }
}

impl Default for CooperativeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for CooperativeScheduler {
    fn current_task(&self, proc_id: ProcId) -> TaskId {
        self.current
            .get(proc_id.index())
            .map_or(TaskId(0), |c| TaskId(c.load(Ordering::Acquire)))
    }

    fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    fn ctx_switch(&self, proc_id: ProcId) {
        let (Some(current), Some(tasks)) = (
            self.current.get(proc_id.index()),
            self.tasks.get(proc_id.index()),
        ) else {
            return;
        };
        let count = tasks.load(Ordering::Relaxed).max(1);
        let from = current.load(Ordering::Acquire);
        let to = (from + 1) % count;
        current.store(to, Ordering::Release);
        self.switches.fetch_add(1, Ordering::Relaxed);
        debug!("proc {}: switch task {} -> {}", proc_id, from, to);
    }
}
