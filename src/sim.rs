//! Simulated platform
//!
//! [`SimHal`] implements [`Hal`] on the host. Memory is sparse and starts
//! zeroed. Device registers live in the same memory; the devices react to
//! the accesses that have side effects on real hardware (a write to the
//! block device `OP` register runs the transfer, a read of `IT_VECTOR`
//! takes the pending line, and so on). Devices complete instantly and
//! raise their interrupt line on the concentrator of the processor that
//! started them, if the platform routes that line.
//!
//! The calling processor is per thread: call [`SimHal::on_proc`] at the
//! start of a thread that plays another processor.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use crate::arch::Hal;
use crate::config::{PlatformConfig, Segments, MAX_PROCS, MAX_TASKS};
use crate::drivers::regs::{dma, gcd, icu, ioc, timer, tty, RegisterFile};
use crate::kern::isr::Isr;
use crate::types::{ProcId, TtyId};

thread_local! {
    static CURRENT_PROC: Cell<u32> = const { Cell::new(0) };
}

/// Value the identity register carries besides the processor number
const EBASE: u32 = 0x8000_0000;

/// One 32-bit bus access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read { addr: usize, value: u32 },
    Write { addr: usize, value: u32 },
}

impl Access {
    pub fn addr(&self) -> usize {
        match *self {
            Access::Read { addr, .. } | Access::Write { addr, .. } => addr,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Device {
    Tty(u32, u32),
    Timer(u32, u32),
    Icu(u32, u32),
    Dma(u32, u32),
    Gcd(u32),
    Ioc(u32),
}

#[derive(Debug, Default)]
struct TtyModel {
    output: Vec<u8>,
    input: VecDeque<u8>,
    /// Characters accepted before `STATUS` reports busy
    budget: Option<u32>,
}

#[derive(Debug, Default, Clone, Copy)]
struct IcuModel {
    mask: u32,
    pending: u32,
}

/// Interrupt lines the platform routes, from its interrupt vector
#[derive(Debug, Default, Clone)]
struct Routes {
    ioc: Option<u32>,
    dma: Option<u32>,
    timer: Option<u32>,
    tty: HashMap<u32, u32>,
}

impl Routes {
    fn from_config(config: &PlatformConfig) -> Self {
        let irq = &config.irq;
        let mut tty = HashMap::new();
        for tty_id in 0..MAX_TASKS as u32 {
            if let Some(line) = irq.line_of(Isr::TtyGet(TtyId(tty_id))) {
                tty.insert(tty_id, line);
            }
        }
        Self {
            ioc: irq.line_of(Isr::Ioc),
            dma: irq.line_of(Isr::Dma),
            timer: irq.line_of(Isr::Timer).or(irq.line_of(Isr::Switch)),
            tty,
        }
    }
}

#[derive(Debug)]
struct Machine {
    mem: HashMap<usize, u8>,
    log: Vec<Access>,
    ttys: HashMap<u32, TtyModel>,
    icus: [IcuModel; MAX_PROCS],
    dma_status: [u32; MAX_PROCS],
    dma_result: [u32; MAX_PROCS],
    timer_acks: [u32; MAX_PROCS],
    disk: HashMap<u32, Vec<u8>>,
    ioc_result: Option<u32>,
    invalidations: Vec<(usize, usize)>,
}

impl Machine {
    fn new() -> Self {
        Self {
            mem: HashMap::new(),
            log: Vec::new(),
            ttys: HashMap::new(),
            icus: [IcuModel::default(); MAX_PROCS],
            dma_status: [0; MAX_PROCS],
            dma_result: [0; MAX_PROCS],
            timer_acks: [0; MAX_PROCS],
            disk: HashMap::new(),
            ioc_result: None,
            invalidations: Vec::new(),
        }
    }

    fn load8(&self, addr: usize) -> u8 {
        self.mem.get(&addr).copied().unwrap_or(0)
    }

    fn store8(&mut self, addr: usize, value: u8) {
        self.mem.insert(addr, value);
    }

    fn load32(&self, addr: usize) -> u32 {
        u32::from_le_bytes([
            self.load8(addr),
            self.load8(addr + 1),
            self.load8(addr + 2),
            self.load8(addr + 3),
        ])
    }

    fn store32(&mut self, addr: usize, value: u32) {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.store8(addr + i, b);
        }
    }

    fn copy(&mut self, dst: usize, src: usize, len: usize) {
        let bytes: Vec<u8> = (0..len).map(|i| self.load8(src + i)).collect();
        for (i, b) in bytes.into_iter().enumerate() {
            self.store8(dst + i, b);
        }
    }

    fn raise(&mut self, proc_id: u32, line: Option<u32>) {
        if let (Some(icu), Some(line)) = (self.icus.get_mut(proc_id as usize), line) {
            icu.pending |= 1 << line;
        }
    }

    fn tty(&mut self, tty_id: u32) -> &mut TtyModel {
        self.ttys.entry(tty_id).or_default()
    }
}

/// Host implementation of the hardware interface
pub struct SimHal {
    machine: Mutex<Machine>,
    segments: Segments,
    routes: Routes,
    max_tasks: u32,
    cycles: AtomicU32,
}

impl SimHal {
    /// Reference segments, no interrupt routing, 512-byte blocks
    pub fn new() -> Self {
        Self::for_config(&PlatformConfig::DEFAULT)
    }

    /// Platform described by `config`, interrupts routed per its vector
    pub fn for_config(config: &PlatformConfig) -> Self {
        let mut machine = Machine::new();
        machine.store32(
            config.segments.ioc + ioc::BLOCK_SIZE as usize * 4,
            config.ioc_block_size,
        );
        Self {
            machine: Mutex::new(machine),
            segments: config.segments,
            routes: Routes::from_config(config),
            max_tasks: config.max_tasks,
            cycles: AtomicU32::new(0),
        }
    }

    /// Make the calling thread run as processor `proc_id`
    pub fn on_proc(proc_id: ProcId) {
        CURRENT_PROC.with(|p| p.set(proc_id.0));
    }

    fn current() -> u32 {
        CURRENT_PROC.with(|p| p.get())
    }

    fn decode(&self, addr: usize) -> Option<Device> {
        let s = &self.segments;
        let bank = |base: usize, regs: RegisterFile, banks: usize| -> Option<(u32, u32)> {
            let span = regs.span as usize * 4;
            if addr < base || addr >= base + span * banks || addr % 4 != 0 {
                return None;
            }
            let offset = addr - base;
            Some(((offset / span) as u32, ((offset % span) / 4) as u32))
        };

        if let Some((n, r)) = bank(s.tty, RegisterFile::TTY, MAX_TASKS) {
            return Some(Device::Tty(n, r));
        }
        if let Some((n, r)) = bank(s.timer, RegisterFile::TIMER, MAX_PROCS) {
            return Some(Device::Timer(n, r));
        }
        if let Some((n, r)) = bank(s.icu, RegisterFile::ICU, MAX_PROCS) {
            return Some(Device::Icu(n, r));
        }
        if let Some((n, r)) = bank(s.dma, RegisterFile::DMA, MAX_PROCS) {
            return Some(Device::Dma(n, r));
        }
        if let Some((_, r)) = bank(s.gcd, RegisterFile::GCD, 1) {
            return Some(Device::Gcd(r));
        }
        if let Some((_, r)) = bank(s.ioc, RegisterFile::IOC, 1) {
            return Some(Device::Ioc(r));
        }
        None
    }

    fn device_read(&self, m: &mut Machine, addr: usize, device: Device) -> u32 {
        match device {
            Device::Tty(n, tty::STATUS) => {
                let t = m.tty(n);
                let mut status = 0;
                if !t.input.is_empty() {
                    status |= tty::STATUS_READ_READY;
                }
                if t.budget == Some(0) {
                    status |= tty::STATUS_WRITE_BUSY;
                }
                status
            }
            Device::Tty(n, tty::READ) => m.tty(n).input.pop_front().map_or(0, u32::from),
            Device::Timer(_, timer::VALUE) => self.cycles.load(Ordering::Relaxed),
            Device::Icu(n, icu::INT) => {
                let i = m.icus[n as usize];
                i.pending & i.mask
            }
            Device::Icu(n, icu::MASK) => m.icus[n as usize].mask,
            Device::Icu(n, icu::IT_VECTOR) => {
                let i = &mut m.icus[n as usize];
                let active = i.pending & i.mask;
                if active == 0 {
                    return 32;
                }
                let line = active.trailing_zeros();
                i.pending &= !(1 << line);
                line
            }
            Device::Dma(n, dma::LEN) => m.dma_status[n as usize],
            _ => m.load32(addr),
        }
    }

    fn device_write(&self, m: &mut Machine, addr: usize, device: Device, value: u32) {
        match device {
            Device::Tty(n, tty::WRITE) => {
                let t = m.tty(n);
                t.output.push(value as u8);
                if let Some(budget) = t.budget.as_mut() {
                    *budget = budget.saturating_sub(1);
                }
            }
            Device::Timer(n, timer::RESETIRQ) => m.timer_acks[n as usize] += 1,
            Device::Icu(n, icu::MASK_SET) => m.icus[n as usize].mask |= value,
            Device::Icu(n, icu::MASK_CLEAR) => m.icus[n as usize].mask &= !value,
            Device::Dma(n, dma::LEN) => {
                let base = addr - dma::LEN as usize * 4;
                let src = m.load32(base + dma::SRC as usize * 4) as usize;
                let dst = m.load32(base + dma::DST as usize * 4) as usize;
                m.copy(dst, src, value as usize);
                m.dma_status[n as usize] = m.dma_result[n as usize];
                m.raise(n, self.routes.dma);
            }
            Device::Gcd(gcd::START) => {
                let base = addr - gcd::START as usize * 4;
                let (mut a, mut b) = (m.load32(base), m.load32(base + 4));
                while b != 0 {
                    (a, b) = (b, a % b);
                }
                m.store32(base + gcd::OPA as usize * 4, a);
                m.store32(base + gcd::STATUS as usize * 4, 0);
            }
            Device::Ioc(ioc::OP) => {
                m.store32(addr, value);
                self.ioc_transfer(m, addr - ioc::OP as usize * 4, value);
            }
            _ => m.store32(addr, value),
        }
    }

    fn ioc_transfer(&self, m: &mut Machine, base: usize, op: u32) {
        let reg = |r: u32| base + r as usize * 4;
        let buffer = m.load32(reg(ioc::BUFFER)) as usize;
        let lba = m.load32(reg(ioc::LBA));
        let count = m.load32(reg(ioc::COUNT));
        let bs = m.load32(reg(ioc::BLOCK_SIZE)) as usize;

        let status = match op {
            ioc::OP_WRITE => {
                for i in 0..count {
                    let start = buffer + i as usize * bs;
                    let block = (0..bs).map(|j| m.load8(start + j)).collect();
                    m.disk.insert(lba + i, block);
                }
                ioc::STATUS_WRITE_SUCCESS
            }
            ioc::OP_READ => {
                for i in 0..count {
                    let block = m
                        .disk
                        .get(&(lba + i))
                        .cloned()
                        .unwrap_or_else(|| vec![0; bs]);
                    for (j, b) in block.into_iter().enumerate() {
                        m.store8(buffer + i as usize * bs + j, b);
                    }
                }
                ioc::STATUS_READ_SUCCESS
            }
            _ => return,
        };
        let status = m.ioc_result.unwrap_or(status);
        m.store32(reg(ioc::STATUS), status);
        if m.load32(reg(ioc::IRQ_ENABLE)) != 0 {
            m.raise(Self::current(), self.routes.ioc);
        }
    }

    // ========================================================================
    // Inspection and Stimulus
    // ========================================================================

    /// Read memory without going through the bus log
    pub fn peek32(&self, addr: usize) -> u32 {
        self.machine.lock().load32(addr)
    }

    pub fn poke32(&self, addr: usize, value: u32) {
        self.machine.lock().store32(addr, value);
    }

    pub fn peek_bytes(&self, addr: usize, len: usize) -> Vec<u8> {
        let m = self.machine.lock();
        (0..len).map(|i| m.load8(addr + i)).collect()
    }

    pub fn poke_bytes(&self, addr: usize, bytes: &[u8]) {
        let mut m = self.machine.lock();
        for (i, b) in bytes.iter().enumerate() {
            m.store8(addr + i, *b);
        }
    }

    /// Every 32-bit access made through [`Hal`] so far
    pub fn accesses(&self) -> Vec<Access> {
        self.machine.lock().log.clone()
    }

    pub fn clear_accesses(&self) {
        self.machine.lock().log.clear();
    }

    /// Everything written to terminal `tty_id`
    pub fn tty_output(&self, tty_id: u32) -> String {
        let mut m = self.machine.lock();
        String::from_utf8_lossy(&m.tty(tty_id).output).into_owned()
    }

    /// Text of the kernel console
    pub fn console_output(&self) -> String {
        self.tty_output(0)
    }

    /// Type `c` on terminal `tty_id`
    pub fn push_tty_input(&self, tty_id: u32, c: u8) {
        let line = self.routes.tty.get(&tty_id).copied();
        let proc_id = tty_id / self.max_tasks.max(1);
        let mut m = self.machine.lock();
        m.tty(tty_id).input.push_back(c);
        m.raise(proc_id, line);
    }

    /// Accept `budget` more characters on terminal `tty_id` before
    /// reporting busy; `None` never reports busy
    pub fn set_tty_budget(&self, tty_id: u32, budget: Option<u32>) {
        self.machine.lock().tty(tty_id).budget = budget;
    }

    /// Force the status of later block device transfers
    pub fn set_ioc_result(&self, status: Option<u32>) {
        self.machine.lock().ioc_result = status;
    }

    pub fn disk_block(&self, lba: u32) -> Option<Vec<u8>> {
        self.machine.lock().disk.get(&lba).cloned()
    }

    pub fn set_disk_block(&self, lba: u32, data: Vec<u8>) {
        self.machine.lock().disk.insert(lba, data);
    }

    /// Status reported by later DMA transfers of `proc_id`
    pub fn set_dma_status(&self, proc_id: ProcId, status: u32) {
        if let Some(s) = self.machine.lock().dma_result.get_mut(proc_id.index()) {
            *s = status;
        }
    }

    pub fn raise_irq(&self, proc_id: ProcId, line: u32) {
        self.machine.lock().raise(proc_id.0, Some(line));
    }

    /// Timer of `proc_id` reaches its period
    pub fn fire_timer(&self, proc_id: ProcId) {
        let line = self.routes.timer;
        self.machine.lock().raise(proc_id.0, line);
    }

    pub fn timer_acks(&self, proc_id: ProcId) -> u32 {
        self.machine
            .lock()
            .timer_acks
            .get(proc_id.index())
            .copied()
            .unwrap_or(0)
    }

    pub fn icu_mask(&self, proc_id: ProcId) -> u32 {
        self.machine
            .lock()
            .icus
            .get(proc_id.index())
            .map_or(0, |i| i.mask)
    }

    /// Lines raised on `proc_id` and not yet taken
    pub fn icu_pending(&self, proc_id: ProcId) -> u32 {
        self.machine
            .lock()
            .icus
            .get(proc_id.index())
            .map_or(0, |i| i.pending)
    }

    /// Data cache invalidations requested so far
    pub fn invalidations(&self) -> Vec<(usize, usize)> {
        self.machine.lock().invalidations.clone()
    }

    pub fn cycles(&self) -> u32 {
        self.cycles.load(Ordering::Relaxed)
    }
}

impl Default for SimHal {
    fn default() -> Self {
        Self::new()
    }
}

impl Hal for SimHal {
    fn proc_id(&self) -> u32 {
        EBASE | Self::current()
    }

    fn proc_time(&self) -> u32 {
        self.cycles.fetch_add(1, Ordering::Relaxed)
    }

    fn read32(&self, addr: usize) -> u32 {
        let mut m = self.machine.lock();
        let value = match self.decode(addr) {
            Some(device) => self.device_read(&mut m, addr, device),
            None => m.load32(addr),
        };
        m.log.push(Access::Read { addr, value });
        value
    }

    fn write32(&self, addr: usize, value: u32) {
        let mut m = self.machine.lock();
        m.log.push(Access::Write { addr, value });
        match self.decode(addr) {
            Some(device) => self.device_write(&mut m, addr, device, value),
            None => m.store32(addr, value),
        }
    }

    fn read8(&self, addr: usize) -> u8 {
        self.machine.lock().load8(addr)
    }

    fn write8(&self, addr: usize, value: u8) {
        self.machine.lock().store8(addr, value);
    }

    fn copy(&self, dst: usize, src: usize, len: usize) {
        self.machine.lock().copy(dst, src, len);
    }

    fn dcache_invalidate(&self, addr: usize, len: usize) {
        self.machine.lock().invalidations.push((addr, len));
    }

    fn relax(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        std::thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_is_little_endian() {
        let hal = SimHal::new();
        hal.write32(0x100, 0x4433_2211);
        assert_eq!(hal.peek_bytes(0x100, 4), [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(hal.read8(0x102), 0x33);
        assert_eq!(hal.accesses().len(), 1);
    }

    #[test]
    fn test_processor_is_per_thread() {
        let hal = SimHal::new();
        SimHal::on_proc(ProcId(2));
        assert_eq!(hal.proc_id() & 0x3FF, 2);
        std::thread::scope(|s| {
            s.spawn(|| assert_eq!(hal.proc_id() & 0x3FF, 0));
        });
    }

    #[test]
    fn test_ioc_transfer_round_trip() {
        let config = PlatformConfig::DEFAULT.with_irq(3, Isr::Ioc).unwrap();
        let hal = SimHal::for_config(&config);
        let base = config.segments.ioc;
        hal.poke_bytes(0x1000, &[7; 512]);

        hal.write32(base + 4 * ioc::BUFFER as usize, 0x1000);
        hal.write32(base + 4 * ioc::COUNT as usize, 1);
        hal.write32(base + 4 * ioc::LBA as usize, 9);
        hal.write32(base + 4 * ioc::IRQ_ENABLE as usize, 1);
        hal.write32(base + 4 * ioc::OP as usize, ioc::OP_WRITE);

        assert_eq!(hal.disk_block(9), Some(vec![7; 512]));
        assert_eq!(hal.peek32(base + 4 * ioc::STATUS as usize), ioc::STATUS_WRITE_SUCCESS);
        assert_eq!(hal.icu_pending(ProcId(0)), 1 << 3);
    }

    #[test]
    fn test_out_of_window_is_memory() {
        let hal = SimHal::new();
        let past_icu = hal.segments.icu + MAX_PROCS * 32;
        hal.write32(past_icu, 5);
        assert_eq!(hal.read32(past_icu), 5);
    }
}
