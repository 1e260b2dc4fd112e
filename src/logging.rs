//! Shell logging facility
//!
//! Provides thread-safe logging to stderr through the `log` crate.
//! Log levels default to the build configuration (debug/release) and can be
//! overridden with the `FAT32SH_LOG` environment variable.

use std::io::Write;
use std::str::FromStr;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

use crate::constants::LOG_LEVEL_ENV;

/// Global logger instance
pub static LOGGER: Logger = Logger::new();

/// Thread-safe logger implementation
pub struct Logger {
    inner: Mutex<()>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Creates a new logger instance
    pub const fn new() -> Logger {
        Logger {
            inner: Mutex::new(()),
        }
    }
}

impl Log for Logger {
    /// Returns true if the message level is within the configured maximum
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    /// Formats messages as "[LEVEL] message"
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _guard = self.inner.lock();
            let _ = writeln!(std::io::stderr(), "[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {
        let _guard = self.inner.lock();
        let _ = std::io::stderr().flush();
    }
}

/// Level used when the environment does not say otherwise:
///   - Debug builds: LevelFilter::Debug
///   - Release builds: LevelFilter::Info
pub fn default_level() -> LevelFilter {
    #[cfg(debug_assertions)]
    {
        LevelFilter::Debug
    }
    #[cfg(not(debug_assertions))]
    {
        LevelFilter::Info
    }
}

/// Parses a level name such as `warn` or `TRACE`. Unknown names yield `None`.
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    LevelFilter::from_str(value.trim()).ok()
}

/// Initializes the logging system
///
/// Fails only if another logger was installed first.
pub fn init() -> Result<(), SetLoggerError> {
    let level = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|value| parse_level(&value))
        .unwrap_or_else(default_level);

    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}
