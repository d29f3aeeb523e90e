use conquer_once::spin::OnceCell;
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, Ordering};
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;
use std::string::String;

const BUFFER_SIZE: usize = 64 * 1024;

/// Set once the logger has been handed to the `log` facade
static INSTALLED: OnceCell<bool> = OnceCell::uninit();

/// Bounded in-memory copy of recent log lines
struct LogBuffer {
    buffer: String,
}

impl LogBuffer {
    const fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    fn take(&mut self) -> String {
        core::mem::take(&mut self.buffer)
    }
}

impl Write for LogBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.buffer.len() + s.len() > BUFFER_SIZE {
            // Buffer is full, keep the older messages
            return Ok(());
        }
        self.buffer.push_str(s);
        Ok(())
    }
}

/// Logger writing `[LEVEL] target: message` lines to stderr
///
/// Lines can also be captured into a bounded buffer, which the runner and
/// tests read back with [`take_captured`].
pub struct KernelLogger {
    buffer: Mutex<LogBuffer>,
    capture: AtomicBool,
    echo: AtomicBool,
}

impl KernelLogger {
    const fn new() -> Self {
        KernelLogger {
            buffer: Mutex::new(LogBuffer::new()),
            capture: AtomicBool::new(false),
            echo: AtomicBool::new(true),
        }
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if self.capture.load(Ordering::Acquire) {
            let mut buffer = self.buffer.lock();
            let _ = writeln!(
                &mut *buffer,
                "[{:>5}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }

        if self.echo.load(Ordering::Relaxed) {
            std::eprintln!("[{:>5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

pub static KERNEL_LOGGER: KernelLogger = KernelLogger::new();

/// Install the logger and set the maximum level
///
/// Safe to call more than once: the logger is installed on the first call
/// and later calls only change the level. Returns false if some other
/// logger already owns the `log` facade.
pub fn init(level: LevelFilter) -> bool {
    let installed = *INSTALLED.get_or_init(|| log::set_logger(&KERNEL_LOGGER).is_ok());
    if installed {
        log::set_max_level(level);
    }
    installed
}

/// Start or stop copying log lines into the capture buffer
pub fn set_capture(enabled: bool) {
    KERNEL_LOGGER.capture.store(enabled, Ordering::Release);
}

/// Turn stderr output on or off
pub fn set_echo(enabled: bool) {
    KERNEL_LOGGER.echo.store(enabled, Ordering::Relaxed);
}

/// Drain the capture buffer
pub fn take_captured() -> String {
    KERNEL_LOGGER.buffer.lock().take()
}
