//! Kernel logging subsystem
//!
//! Backs the `log` facade with the kernel console. Each record is formatted
//! into a fixed-size line first so that records from different processors
//! do not interleave mid-line; longer messages are truncated.

use core::fmt::Write;

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::arch::Hal;
use crate::console::Console;

/// Longest line written to the console
pub const LINE_CAPACITY: usize = 160;

fn label(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRACE",
        Level::Debug => "DEBUG",
        Level::Info => " INFO",
        Level::Warn => " WARN",
        Level::Error => "ERROR",
    }
}

/// `log` backend writing `[LEVEL] target: message` lines to terminal 0
pub struct ConsoleLogger<'a, H: Hal> {
    hal: &'a H,
    tty_segment: usize,
    level: LevelFilter,
}

impl<'a, H: Hal> ConsoleLogger<'a, H> {
    pub const fn new(hal: &'a H, tty_segment: usize, level: LevelFilter) -> Self {
        Self {
            hal,
            tty_segment,
            level,
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Format `record` into one console line
    pub fn format(record: &Record<'_>) -> heapless::String<LINE_CAPACITY> {
        let mut line = heapless::String::new();
        let _ = write!(
            Truncating(&mut line),
            "[{}] {}: {}",
            label(record.level()),
            record.target(),
            record.args()
        );
        let _ = line.push('\n');
        line
    }
}

/// Writer that drops whatever does not fit, keeping room for a newline
struct Truncating<'a>(&'a mut heapless::String<LINE_CAPACITY>);

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if self.0.len() + c.len_utf8() >= LINE_CAPACITY {
                break;
            }
            let _ = self.0.push(c);
        }
        Ok(())
    }
}

impl<H: Hal> Log for ConsoleLogger<'_, H> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format(record);
        Console::new(self.hal, self.tty_segment).putk(&line);
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimHal;

    #[test]
    fn test_format_line() {
        let line = ConsoleLogger::<SimHal>::format(
            &Record::builder()
                .level(Level::Warn)
                .target("giet_r::drivers::tty")
                .args(format_args!("tty{}: input overrun", 3))
                .build(),
        );
        assert_eq!(line.as_str(), "[ WARN] giet_r::drivers::tty: tty3: input overrun\n");
    }

    #[test]
    fn test_long_line_truncated() {
        let long = "x".repeat(400);
        let line = ConsoleLogger::<SimHal>::format(
            &Record::builder()
                .level(Level::Info)
                .target("t")
                .args(format_args!("{}", long))
                .build(),
        );
        assert_eq!(line.len(), LINE_CAPACITY);
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_level_filter() {
        let hal = SimHal::new();
        let logger = ConsoleLogger::new(&hal, 0x9000_0000, LevelFilter::Warn);

        logger.log(
            &Record::builder()
                .level(Level::Info)
                .target("boot")
                .args(format_args!("hidden"))
                .build(),
        );
        assert_eq!(hal.tty_output(0), "");

        logger.log(
            &Record::builder()
                .level(Level::Error)
                .target("boot")
                .args(format_args!("shown"))
                .build(),
        );
        assert_eq!(hal.tty_output(0), "[ERROR] boot: shown\n");
    }
}
