//! The kernel object
//!
//! Owns the hardware access, the scheduler, the platform configuration and
//! all shared state, and hands out drivers bound to the calling processor
//! and task. Trap dispatch is implemented on it in `exception`,
//! `syscall_sw` and `isr`.

use log::{error, info, warn};

use super::barrier::BarrierTable;
use super::context::resolve_tty;
use super::exception::{HaltReason, TrapOutcome};
use super::processor::{Processor, ProcessorTable};
use super::sched::Scheduler;
use super::state::KernelState;
use crate::arch::Hal;
use crate::config::{ConfigError, PlatformConfig};
use crate::console::Console;
use crate::drivers::{
    BlockDevice, DriverError, DriverResult, FrameBuffer, Gcd, Icu, Terminal, Timer,
};
use crate::types::{Caller, ProcId, TaskId, TtyId};

/// Mask applied to the identity register
const PROC_ID_MASK: u32 = 0x3FF;

pub struct Kernel<H: Hal, S: Scheduler> {
    hal: H,
    sched: S,
    config: PlatformConfig,
    state: KernelState,
    processors: ProcessorTable,
    barriers: BarrierTable,
}

impl<H: Hal, S: Scheduler> Kernel<H, S> {
    pub fn new(hal: H, sched: S, config: PlatformConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let block_size = config.ioc_block_size;
        Ok(Self {
            hal,
            sched,
            config,
            state: KernelState::new(block_size),
            processors: ProcessorTable::new(),
            barriers: BarrierTable::new(),
        })
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn scheduler(&self) -> &S {
        &self.sched
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn state(&self) -> &KernelState {
        &self.state
    }

    pub fn barriers(&self) -> &BarrierTable {
        &self.barriers
    }

    pub fn processor(&self, proc_id: ProcId) -> Option<&Processor> {
        self.processors.get(proc_id)
    }

    /// Boot-time initialisation, run once
    pub fn init(&self) {
        match self.ioc().block_size() {
            Ok(0) | Err(_) => warn!(
                "ioc: no block size reported, keeping {}",
                self.state.ioc.block_size()
            ),
            Ok(size) => self.state.ioc.set_block_size(size),
        }
        info!(
            "kernel: {} processor(s), {} task(s) each, block size {}, {} cache coherence",
            self.config.nb_procs,
            self.config.max_tasks,
            self.state.ioc.block_size(),
            if self.config.no_hard_cc { "no hardware" } else { "hardware" }
        );
    }

    /// Per-processor initialisation: unmask every bound interrupt line
    pub fn init_processor(&self) {
        let proc_id = self.proc_id();
        let mask = self.config.irq.mask();
        match self.icu_for(proc_id).unmask(mask) {
            Ok(()) => info!("proc {}: interrupt lines {:#010x} unmasked", proc_id, mask),
            Err(e) => warn!("proc {}: cannot unmask interrupts: {}", proc_id, e),
        }
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Identifier of the calling processor
    pub fn proc_id(&self) -> ProcId {
        ProcId(self.hal.proc_id() & PROC_ID_MASK)
    }

    /// Cycle counter of the calling processor
    pub fn proc_time(&self) -> u32 {
        self.hal.proc_time()
    }

    /// The (processor, task) pair running the current call
    pub fn caller(&self) -> DriverResult<Caller> {
        let proc_id = self.proc_id();
        if proc_id.0 >= self.config.nb_procs {
            return Err(DriverError::BadProcessor(proc_id.0));
        }
        // tasks past the limit alias the next processor's slot
        let task_id = self.sched.current_task(proc_id);
        if task_id.0 >= self.config.max_tasks {
            return Err(DriverError::BadTask(task_id.0));
        }
        Ok(Caller::new(proc_id, task_id))
    }

    // ========================================================================
    // Terminal Assignment
    // ========================================================================

    /// Assign terminal `tty_id` to task `(proc_id, task_id)`
    ///
    /// Returns `false` when any of the three is out of range.
    pub fn tty_config(&self, tty_id: TtyId, proc_id: ProcId, task_id: TaskId) -> bool {
        if task_id.0 >= self.config.max_tasks
            || proc_id.0 >= self.config.nb_procs
            || tty_id.0 >= self.config.nb_ttys()
        {
            return false;
        }
        let slot = Caller::new(proc_id, task_id).slot(self.config.max_tasks);
        self.sched.contexts().set_tty(slot, tty_id)
    }

    /// Terminal used by `caller`
    pub fn resolve_tty(&self, caller: Caller) -> TtyId {
        let max_tasks = self.config.max_tasks;
        let slot_value = self.sched.contexts().tty(caller.slot(max_tasks));
        resolve_tty(slot_value, caller, max_tasks)
    }

    // ========================================================================
    // Drivers
    // ========================================================================

    pub fn console(&self) -> Console<'_, H> {
        Console::new(&self.hal, self.config.segments.tty)
    }

    pub fn timer(&self) -> DriverResult<Timer<'_, H>> {
        let caller = self.caller()?;
        Ok(self.timer_for(caller.proc_id))
    }

    pub(crate) fn timer_for(&self, proc_id: ProcId) -> Timer<'_, H> {
        Timer::new(&self.hal, self.config.segments.timer, proc_id)
    }

    pub fn icu(&self) -> DriverResult<Icu<'_, H>> {
        let caller = self.caller()?;
        Ok(self.icu_for(caller.proc_id))
    }

    pub(crate) fn icu_for(&self, proc_id: ProcId) -> Icu<'_, H> {
        Icu::new(&self.hal, self.config.segments.icu, proc_id)
    }

    pub fn gcd(&self) -> Gcd<'_, H> {
        Gcd::new(&self.hal, self.config.segments.gcd)
    }

    /// Terminal of the calling task
    pub fn tty(&self) -> DriverResult<Terminal<'_, H>> {
        let caller = self.caller()?;
        self.terminal(self.resolve_tty(caller))
    }

    /// Terminal `tty_id`
    pub fn terminal(&self, tty_id: TtyId) -> DriverResult<Terminal<'_, H>> {
        if tty_id.0 >= self.config.nb_ttys() {
            return Err(DriverError::BadTerminal(tty_id.0));
        }
        let inbox = self
            .state
            .tty(tty_id)
            .ok_or(DriverError::BadTerminal(tty_id.0))?;
        Ok(Terminal::new(&self.hal, self.config.segments.tty, tty_id, inbox))
    }

    pub fn ioc(&self) -> BlockDevice<'_, H> {
        BlockDevice::new(
            &self.hal,
            self.config.segments.ioc,
            &self.state.ioc,
            self.config.no_hard_cc,
        )
    }

    /// Frame buffer with the calling processor's DMA engine
    pub fn fb(&self) -> DriverResult<FrameBuffer<'_, H>> {
        let caller = self.caller()?;
        self.fb_for(caller.proc_id)
    }

    pub(crate) fn fb_for(&self, proc_id: ProcId) -> DriverResult<FrameBuffer<'_, H>> {
        let channel = self
            .state
            .dma(proc_id)
            .ok_or(DriverError::BadProcessor(proc_id.0))?;
        Ok(FrameBuffer::new(
            &self.hal,
            self.config.segments.fb,
            self.config.segments.dma,
            proc_id,
            channel,
            self.config.no_hard_cc,
        ))
    }

    // ========================================================================
    // Block Device Calls
    // ========================================================================

    pub fn ioc_write(&self, lba: u32, buffer: u32, count: u32) -> DriverResult<()> {
        let owner = self.caller()?.token(self.config.max_tasks);
        self.ioc().write(owner, lba, buffer, count)
    }

    pub fn ioc_read(&self, lba: u32, buffer: u32, count: u32) -> DriverResult<()> {
        let owner = self.caller()?.token(self.config.max_tasks);
        self.ioc().read(owner, lba, buffer, count)
    }

    pub fn ioc_completed(&self) -> DriverResult<()> {
        let owner = self.caller()?.token(self.config.max_tasks);
        self.ioc().completed(owner)
    }

    // ========================================================================
    // Halting
    // ========================================================================

    /// Halt the calling processor for good
    pub(crate) fn halt(&self, proc_id: ProcId, reason: HaltReason) -> TrapOutcome {
        if let Some(cpu) = self.processors.get(proc_id) {
            cpu.halt();
        }
        let cycle = self.hal.proc_time();
        self.console().exit_banner(proc_id, cycle);
        match reason {
            HaltReason::Exit => info!("proc {}: exit at cycle {}", proc_id, cycle),
            _ => error!("proc {}: halted at cycle {} ({:?})", proc_id, cycle, reason),
        }
        TrapOutcome::Halted(reason)
    }
}
