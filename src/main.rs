//! giet-sim - run a small multi-processor workload on the simulated platform
//!
//! Each simulated processor runs one task that goes through the system call
//! interface the way user code would: it prints on its terminal, writes a
//! block to disk, pushes a buffer to the frame buffer by DMA, meets the
//! other processors at a barrier and exits. Terminal contents and trap
//! statistics are printed at the end.

use std::error::Error;

use clap::Parser;
use log::{info, warn};

use giet_r::kern::isr::Isr;
use giet_r::kern::syscall_sw::*;
use giet_r::kern::CooperativeScheduler;
use giet_r::sim::SimHal;
use giet_r::{Kernel, PlatformConfig, ProcId, TrapFrame, TrapOutcome};

#[derive(Parser)]
#[command(name = "giet-sim")]
#[command(about = "Run a workload on the simulated GIET_R platform", long_about = None)]
struct Cli {
    /// Number of processors
    #[arg(short, long, default_value_t = 4)]
    procs: u32,

    /// Maximum tasks per processor
    #[arg(short, long, default_value_t = 1)]
    tasks: u32,

    /// Block device block size in bytes
    #[arg(long, default_value_t = 512)]
    block_size: u32,

    /// Text each task prints on its terminal
    #[arg(short, long, default_value = "hello from processor")]
    message: String,

    /// Log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log: String,
}

type SimKernel = Kernel<SimHal, CooperativeScheduler>;

const IRQ_IOC: u32 = 0;
const IRQ_DMA: u32 = 1;
const IRQ_TIMER: u32 = 2;
const IRQ_TTY_FIRST: u32 = 8;

/// User memory of processor `p`
const fn user_base(p: u32) -> u32 {
    0x1000_0000 + p * 0x0010_0000
}

fn platform(cli: &Cli) -> Result<PlatformConfig, Box<dyn Error>> {
    let mut config = PlatformConfig::new(cli.procs, cli.tasks)?
        .with_block_size(cli.block_size)
        .with_irq(IRQ_IOC, Isr::Ioc)?
        .with_irq(IRQ_DMA, Isr::Dma)?
        .with_irq(IRQ_TIMER, Isr::Timer)?;
    for tty in 0..config.nb_ttys().min(32 - IRQ_TTY_FIRST) {
        config = config.with_irq(IRQ_TTY_FIRST + tty, Isr::TtyGet(giet_r::TtyId(tty)))?;
    }
    Ok(config)
}

/// Issue system call `number` from the calling processor
fn syscall(kernel: &SimKernel, number: u32, args: [u32; 4]) -> Result<u32, Box<dyn Error>> {
    let mut frame = TrapFrame::syscall(number, args);
    match kernel.trap(&mut frame) {
        TrapOutcome::Resume => Ok(frame.v0),
        TrapOutcome::Halted(reason) => Err(format!("halted: {:?}", reason).into()),
    }
}

/// Take the interrupt the last device operation raised
fn interrupt(kernel: &SimKernel) {
    let mut frame = TrapFrame::interrupt();
    let _ = kernel.trap(&mut frame);
}

fn run_task(kernel: &SimKernel, p: u32, message: &str) -> Result<(), Box<dyn Error>> {
    let hal = kernel.hal();
    let base = user_base(p);
    let line = format!("{} {}\n", message, p);
    hal.poke_bytes(base as usize, line.as_bytes());

    let written = syscall(kernel, SYS_TTY_WRITE, [base, line.len() as u32, 0, 0])?;
    if written as usize != line.len() {
        warn!("proc {}: short terminal write ({} of {})", p, written, line.len());
    }

    let block = kernel.state().ioc.block_size();
    if syscall(kernel, SYS_IOC_WRITE, [p, base, 1, 0])? == SYS_OK {
        interrupt(kernel);
        let status = syscall(kernel, SYS_IOC_COMPLETED, [0; 4])?;
        info!("proc {}: block {} written ({} bytes), status {}", p, p, block, status);
    }

    if syscall(kernel, SYS_FB_WRITE, [p * 64, base, line.len() as u32, 0])? == SYS_OK {
        interrupt(kernel);
        let status = syscall(kernel, SYS_FB_COMPLETED, [0; 4])?;
        info!("proc {}: frame buffer DMA done, status {}", p, status);
    }

    syscall(kernel, SYS_BARRIER_WAIT, [0; 4])?;
    let cycle = syscall(kernel, SYS_PROCTIME, [0; 4])?;
    info!("proc {}: passed barrier at cycle {}", p, cycle);

    let mut frame = TrapFrame::syscall(SYS_EXIT, [0; 4]);
    match kernel.trap(&mut frame) {
        TrapOutcome::Halted(_) => Ok(()),
        TrapOutcome::Resume => Err("exit returned".into()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log.as_str())).init();

    let config = platform(&cli)?;
    let hal = SimHal::for_config(&config);
    let kernel = Kernel::new(hal, CooperativeScheduler::new(), config)?;
    kernel.init();
    kernel.barriers().init(0, cli.procs)?;
    info!("{} {}: {} processors, {} tasks each", giet_r::NAME, giet_r::VERSION, cli.procs, cli.tasks);

    std::thread::scope(|s| {
        for p in 0..cli.procs {
            let kernel = &kernel;
            let message = cli.message.as_str();
            s.spawn(move || {
                SimHal::on_proc(ProcId(p));
                kernel.init_processor();
                if let Err(e) = run_task(kernel, p, message) {
                    warn!("proc {}: {}", p, e);
                }
            });
        }
    });

    for tty in 0..kernel.config().nb_ttys() {
        let out = kernel.hal().tty_output(tty);
        if !out.is_empty() {
            println!("--- tty{} ---\n{}", tty, out.trim_end());
        }
    }
    for p in 0..cli.procs {
        if let Some(cpu) = kernel.processor(ProcId(p)) {
            println!("proc {}: {:?} {:?}", p, cpu.state(), cpu.stats.snapshot());
        }
    }
    Ok(())
}
