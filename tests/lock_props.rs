//! Property tests for the block device lock
//!
//! Concurrent issuers, each playing a distinct (processor, task) pair,
//! hammer the block device through the system call interface. Between a
//! successful `ioc_write` and the matching `ioc_completed` an issuer is
//! inside the critical section; at most one may be there at any time.

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};

use giet_r::kern::context::ContextTable;
use giet_r::kern::isr::Isr;
use giet_r::kern::syscall_sw::{SYS_IOC_COMPLETED, SYS_IOC_WRITE, SYS_OK};
use giet_r::kern::Scheduler;
use giet_r::sim::SimHal;
use giet_r::{Kernel, PlatformConfig, ProcId, TaskId, TrapFrame, TrapOutcome};
use proptest::prelude::*;

thread_local! {
    static TASK: Cell<u32> = const { Cell::new(0) };
}

/// Scheduler whose current task is chosen per thread
struct ThreadTasks {
    contexts: ContextTable,
}

impl Scheduler for ThreadTasks {
    fn current_task(&self, _proc_id: ProcId) -> TaskId {
        TaskId(TASK.with(|t| t.get()))
    }

    fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    fn ctx_switch(&self, _proc_id: ProcId) {}
}

type TestKernel = Kernel<SimHal, ThreadTasks>;

const NB_PROCS: u32 = 4;
const MAX_TASKS: u32 = 4;

fn boot() -> TestKernel {
    let config = PlatformConfig::new(NB_PROCS, MAX_TASKS)
        .unwrap()
        .with_irq(0, Isr::Ioc)
        .unwrap();
    let hal = SimHal::for_config(&config);
    let sched = ThreadTasks {
        contexts: ContextTable::new(),
    };
    Kernel::new(hal, sched, config).unwrap()
}

fn syscall(kernel: &TestKernel, number: u32, args: [u32; 4]) -> u32 {
    let mut frame = TrapFrame::syscall(number, args);
    assert_eq!(kernel.trap(&mut frame), TrapOutcome::Resume);
    frame.v0
}

/// Issuer `i` as a (processor, task) pair
fn issuer(i: u32) -> (ProcId, TaskId) {
    (ProcId(i % NB_PROCS), TaskId(i / NB_PROCS))
}

fn run_issuers(kernel: &TestKernel, issuers: u32, rounds: u32) -> u32 {
    let inside = AtomicU32::new(0);
    let max_inside = AtomicU32::new(0);

    std::thread::scope(|s| {
        for i in 0..issuers {
            let (inside, max_inside) = (&inside, &max_inside);
            s.spawn(move || {
                let (proc_id, task_id) = issuer(i);
                SimHal::on_proc(proc_id);
                TASK.with(|t| t.set(task_id.0));
                let buffer = 0x1000_0000 + i * 0x1000;

                for round in 0..rounds {
                    assert_eq!(syscall(kernel, SYS_IOC_WRITE, [i * 16 + round, buffer, 1, 0]), SYS_OK);
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);

                    // completion interrupt, delivered to whoever issued
                    kernel.ioc().isr().unwrap();

                    inside.fetch_sub(1, Ordering::SeqCst);
                    assert_eq!(syscall(kernel, SYS_IOC_COMPLETED, [0; 4]), SYS_OK);
                }
            });
        }
    });

    max_inside.load(Ordering::SeqCst)
}

#[test]
fn test_two_issuers_serialize() {
    let kernel = boot();
    assert_eq!(run_issuers(&kernel, 2, 20), 1);
    assert!(!kernel.state().ioc.lock().is_locked());
}

#[test]
fn test_waiter_sees_released_lock() {
    let kernel = boot();
    assert_eq!(syscall(&kernel, SYS_IOC_WRITE, [0, 0x1000, 1, 0]), SYS_OK);

    std::thread::scope(|s| {
        let waiter = s.spawn(|| {
            SimHal::on_proc(ProcId(1));
            syscall(&kernel, SYS_IOC_WRITE, [1, 0x2000, 1, 0])
        });

        kernel.ioc().isr().unwrap();
        assert_eq!(syscall(&kernel, SYS_IOC_COMPLETED, [0; 4]), SYS_OK);
        assert_eq!(waiter.join().unwrap(), SYS_OK);
    });

    // the waiter now holds the lock under its own token
    assert!(kernel.state().ioc.lock().is_locked());
    assert_ne!(kernel.state().ioc.owner(), None);
    assert_eq!(syscall(&kernel, SYS_IOC_COMPLETED, [0; 4]), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// At most one issuer between acquire and release
    #[test]
    fn lock_is_mutually_exclusive(issuers in 2u32..=(NB_PROCS * MAX_TASKS), rounds in 1u32..4) {
        let kernel = boot();
        prop_assert_eq!(run_issuers(&kernel, issuers, rounds), 1);
        prop_assert!(!kernel.state().ioc.lock().is_locked());
        prop_assert_eq!(kernel.state().ioc.owner(), None);
    }

    /// Buffers reaching kernel space never take the lock
    #[test]
    fn kernel_buffers_never_lock(buffer in 0x7FFF_0000u32.., count in 1u32..256) {
        let kernel = boot();
        let end = buffer as u64 + count as u64 * 512;
        prop_assume!(end >= 0x8000_0000);
        prop_assert_eq!(syscall(&kernel, SYS_IOC_WRITE, [0, buffer, count, 0]), 1);
        prop_assert!(!kernel.state().ioc.lock().is_locked());
    }
}
