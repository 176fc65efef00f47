//! GIET_R - trap dispatch and drivers for a small multi-processor SoC
//!
//! This crate is the kernel layer that sits between user tasks and the
//! peripherals of a shared-memory multi-processor: the exception and
//! system call switches, the interrupt vector, and drivers for terminals,
//! timers, the interrupt concentrator, the block device, the DMA engines,
//! the frame buffer and the GCD coprocessor.
//!
//! All hardware access goes through [`arch::Hal`]. On target the MIPS32
//! implementation is used; with the `std` feature the crate also builds a
//! simulated platform ([`sim::SimHal`]) for tests and the `giet-sim` binary.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(target_arch = "mips", feature(asm_experimental_arch))]
// Register offsets are written as `index * 4` even for index 0
#![allow(clippy::identity_op)]
// Register values are widened and narrowed explicitly at the bus
#![allow(clippy::unnecessary_cast)]

// Core types
pub mod config;
pub mod types;

pub mod arch;
pub mod console;
pub mod drivers;
pub mod kern;
pub mod klog;
pub mod panic;

#[cfg(any(test, feature = "std"))]
pub mod sim;

pub use config::{ConfigError, PlatformConfig, Segments};
pub use drivers::{DriverError, DriverResult};
pub use kern::{HaltReason, Kernel, Scheduler, TrapFrame, TrapOutcome};
pub use types::{Caller, ProcId, TaskId, TtyId};

/// Kernel version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Kernel name
pub const NAME: &str = "GIET_R";
