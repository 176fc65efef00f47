//! Panic handler
//!
//! A kernel panic prints where and why on the kernel console, then parks
//! the processor. Other processors keep running.

use core::fmt::{self, Display, Write};
use core::panic::Location;

use crate::arch::Hal;
use crate::console::Console;

/// Write the panic report for `proc_id` to `console`
pub fn report<H: Hal>(
    console: &mut Console<'_, H>,
    proc_id: u32,
    location: Option<&Location<'_>>,
    message: impl Display,
) -> fmt::Result {
    write!(console, "\n\n!!! KERNEL PANIC on processor {} !!!\n", proc_id)?;
    if let Some(location) = location {
        writeln!(console, "Location: {}:{}", location.file(), location.line())?;
    }
    writeln!(console, "Message: {}", message)
}

#[cfg(all(target_arch = "mips", not(feature = "std"), not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use crate::arch::mips32;

    let hal = mips32::hal();
    let proc_id = hal.proc_id() & 0x3FF;
    let mut console = mips32::console();
    let _ = report(&mut console, proc_id, info.location(), info.message());
    console.exit_banner(crate::types::ProcId(proc_id), hal.proc_time());
    loop {
        hal.wait();
    }
}
