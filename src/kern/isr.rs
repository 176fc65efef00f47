//! Interrupt service routines
//!
//! The external interrupt entry asks the calling processor's interrupt
//! concentrator for the active line and runs the routine the interrupt
//! vector binds to it. The vector is part of the platform configuration and
//! does not change after boot.

use core::fmt::Write;
use core::sync::atomic::Ordering;

use log::{error, info, warn};

use super::kernel::Kernel;
use super::sched::Scheduler;
use crate::arch::Hal;
use crate::config::ConfigError;
use crate::drivers::DriverResult;
use crate::types::{ProcId, TtyId};

/// Number of interrupt lines per concentrator
pub const IRQ_LINES: usize = 32;

/// Routine bound to an interrupt line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isr {
    /// Nothing expected on this line
    #[default]
    Default,
    /// Block device completion
    Ioc,
    /// DMA completion on the interrupted processor
    Dma,
    /// Timer tick on the interrupted processor
    Timer,
    /// Timer tick that also switches task
    Switch,
    /// Character received on a terminal
    TtyGet(TtyId),
}

/// Routine for each interrupt line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptVector {
    lines: [Isr; IRQ_LINES],
}

impl InterruptVector {
    /// Every line bound to [`Isr::Default`]
    pub const EMPTY: Self = Self {
        lines: [Isr::Default; IRQ_LINES],
    };

    pub fn bind(&mut self, line: u32, isr: Isr) -> Result<(), ConfigError> {
        let slot = self
            .lines
            .get_mut(line as usize)
            .ok_or(ConfigError::IrqLine(line))?;
        *slot = isr;
        Ok(())
    }

    pub fn get(&self, line: u32) -> Isr {
        self.lines.get(line as usize).copied().unwrap_or_default()
    }

    /// Lines bound to something other than the default routine
    pub fn mask(&self) -> u32 {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, isr)| **isr != Isr::Default)
            .fold(0u32, |mask, (line, _)| mask | 1u32 << line)
    }

    /// Line bound to `isr`, if any
    pub fn line_of(&self, isr: Isr) -> Option<u32> {
        self.lines.iter().position(|l| *l == isr).map(|l| l as u32)
    }
}

impl Default for InterruptVector {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl<H: Hal, S: Scheduler> Kernel<H, S> {
    /// External interrupt entry
    pub(crate) fn interrupt(&self, proc_id: ProcId) {
        let line = match self.icu_for(proc_id).pending_line() {
            Ok(Some(line)) => line,
            Ok(None) => {
                if let Some(cpu) = self.processor(proc_id) {
                    cpu.stats.spurious.fetch_add(1, Ordering::Relaxed);
                }
                warn!("proc {}: spurious interrupt", proc_id);
                return;
            }
            Err(e) => {
                error!("proc {}: cannot read interrupt vector: {}", proc_id, e);
                return;
            }
        };

        let isr = self.config().irq.get(line);
        if let Err(e) = self.run_isr(proc_id, line, isr) {
            error!("proc {}: irq {} ({:?}) failed: {}", proc_id, line, isr, e);
        }
    }

    /// Run `isr` for `line` on behalf of `proc_id`
    pub fn run_isr(&self, proc_id: ProcId, line: u32, isr: Isr) -> DriverResult<()> {
        match isr {
            Isr::Ioc => self.ioc().isr(),
            Isr::Dma => self.fb_for(proc_id)?.isr(),
            Isr::TtyGet(tty_id) => self.terminal(tty_id)?.isr_get(),
            Isr::Timer => {
                self.timer_for(proc_id).ack()?;
                info!("proc {}: timer irq at cycle {}", proc_id, self.proc_time());
                Ok(())
            }
            Isr::Switch => {
                self.timer_for(proc_id).ack()?;
                self.scheduler().ctx_switch(proc_id);
                Ok(())
            }
            Isr::Default => {
                let _ = write!(self.console(), "\n\n!!! Default ISR !!!\n");
                warn!("proc {}: unexpected interrupt on line {}", proc_id, line);
                Ok(())
            }
        }
    }
}
