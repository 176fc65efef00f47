//! Shared kernel state
//!
//! Flags and buffers shared between driver calls and interrupt service
//! routines. Each has one writer on each side: the issuing call sets a flag,
//! the ISR clears it (or the reverse), and the polling side observes the
//! change through acquire loads.

use core::num::NonZeroU32;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use super::lock::SpinWord;
use crate::config::{MAX_PROCS, MAX_TASKS};
use crate::types::{ProcId, TtyId};

// ============================================================================
// Block Device
// ============================================================================

/// System-wide block device lock and completion flags
#[derive(Debug)]
pub struct IocState {
    lock: SpinWord,
    done: AtomicBool,
    status: AtomicU32,
    block_size: AtomicU32,
}

impl IocState {
    pub const fn new(block_size: u32) -> Self {
        Self {
            lock: SpinWord::new(),
            done: AtomicBool::new(false),
            status: AtomicU32::new(0),
            block_size: AtomicU32::new(block_size),
        }
    }

    pub fn lock(&self) -> &SpinWord {
        &self.lock
    }

    /// Token of the task that owns the device
    pub fn owner(&self) -> Option<NonZeroU32> {
        self.lock.holder()
    }

    /// ISR side: record the device status and signal completion
    pub fn complete(&self, status: u32) {
        self.status.store(status, Ordering::Relaxed);
        self.done.store(true, Ordering::Release);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Completion side: consume the done flag and return the status
    pub fn take_status(&self) -> u32 {
        let status = self.status.load(Ordering::Relaxed);
        self.done.store(false, Ordering::Relaxed);
        status
    }

    pub fn block_size(&self) -> u32 {
        self.block_size.load(Ordering::Relaxed)
    }

    pub fn set_block_size(&self, block_size: u32) {
        self.block_size.store(block_size, Ordering::Relaxed);
    }
}

// ============================================================================
// DMA Channels
// ============================================================================

/// Busy flag and status of one processor's DMA engine
#[derive(Debug)]
pub struct DmaChannel {
    busy: AtomicBool,
    status: AtomicU32,
    contended: AtomicU32,
}

impl DmaChannel {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            status: AtomicU32::new(0),
            contended: AtomicU32::new(0),
        }
    }

    /// Set the busy flag if it is clear
    pub fn try_claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// ISR side: record the transfer status and clear the busy flag
    pub fn finish(&self, status: u32) {
        self.status.store(status, Ordering::Relaxed);
        self.busy.store(false, Ordering::Release);
    }

    pub fn status(&self) -> u32 {
        self.status.load(Ordering::Relaxed)
    }

    pub fn note_contention(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of backoff rounds spent waiting for this channel
    pub fn contended(&self) -> u32 {
        self.contended.load(Ordering::Relaxed)
    }
}

impl Default for DmaChannel {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Terminal Input
// ============================================================================

/// One-character input buffer of a terminal
///
/// A character arriving while the previous one is still pending replaces
/// it; the lost character is only counted.
#[derive(Debug)]
pub struct TtyInbox {
    byte: AtomicU8,
    full: AtomicBool,
    overruns: AtomicU32,
}

impl TtyInbox {
    pub const fn new() -> Self {
        Self {
            byte: AtomicU8::new(0),
            full: AtomicBool::new(false),
            overruns: AtomicU32::new(0),
        }
    }

    /// ISR side: store `c` and mark the buffer full
    ///
    /// Returns `true` when a pending character was overwritten.
    pub fn push(&self, c: u8) -> bool {
        self.byte.store(c, Ordering::Relaxed);
        let overrun = self.full.swap(true, Ordering::Release);
        if overrun {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        overrun
    }

    /// Reader side: take the pending character, if any
    pub fn take(&self) -> Option<u8> {
        if !self.full.load(Ordering::Acquire) {
            return None;
        }
        let c = self.byte.load(Ordering::Relaxed);
        self.full.store(false, Ordering::Release);
        Some(c)
    }

    pub fn is_full(&self) -> bool {
        self.full.load(Ordering::Acquire)
    }

    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }
}

impl Default for TtyInbox {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Kernel State
// ============================================================================

/// Everything the drivers and ISRs share
#[derive(Debug)]
pub struct KernelState {
    pub ioc: IocState,
    dma: [DmaChannel; MAX_PROCS],
    tty: [TtyInbox; MAX_TASKS],
}

impl KernelState {
    pub const fn new(block_size: u32) -> Self {
        Self {
            ioc: IocState::new(block_size),
            dma: [const { DmaChannel::new() }; MAX_PROCS],
            tty: [const { TtyInbox::new() }; MAX_TASKS],
        }
    }

    pub fn dma(&self, proc_id: ProcId) -> Option<&DmaChannel> {
        self.dma.get(proc_id.index())
    }

    pub fn tty(&self, tty_id: TtyId) -> Option<&TtyInbox> {
        self.tty.get(tty_id.index())
    }
}
