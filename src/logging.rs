//! The two named, ANSI-colored logger channels (C9).
//!
//! Grounded in `original_source/include/logger.h` /
//! `original_source/src/logger.cpp`: a tiny, deliberately unstructured
//! stdout logger distinct from the crate's internal `tracing`
//! instrumentation (background-task lifecycle, lock waits) which follows
//! the reference codebase's own `tracing`/`tracing-subscriber` usage
//! instead.

use chrono::Local;
use std::fmt;
use std::sync::Mutex;

static STDOUT_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Debug,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Info => write!(f, "INFO"),
            Level::Debug => write!(f, "DEBUG"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

const COLOR_RESET: &str = "\x1b[0m";

/// A single named channel. The reference codebase exposes exactly two:
/// [`Logger::driver`] and [`Logger::monitor`].
pub struct Logger {
    name: &'static str,
    color: &'static str,
    enabled: bool,
}

impl Logger {
    const fn new(name: &'static str, color: &'static str, enabled: bool) -> Self {
        Logger { name, color, enabled }
    }

    pub fn driver(enabled: bool) -> Self {
        Logger::new("driver", "\x1b[36m", enabled)
    }

    pub fn monitor(enabled: bool) -> Self {
        Logger::new("monitor", "\x1b[35m", enabled)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn info(&self, msg: impl fmt::Display) {
        self.log(Level::Info, msg);
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        self.log(Level::Debug, msg);
    }

    pub fn error(&self, msg: impl fmt::Display) {
        self.log(Level::Error, msg);
    }

    pub fn log(&self, level: Level, msg: impl fmt::Display) {
        if !self.enabled {
            return;
        }
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
        let _guard = STDOUT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        println!(
            "{}[{ts}] {level} [{}] {msg}{COLOR_RESET}",
            self.color, self.name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_logger_does_not_panic() {
        let logger = Logger::driver(false);
        logger.info("should be a no-op");
    }

    #[test]
    fn channel_names_are_fixed() {
        assert_eq!(Logger::driver(true).name, "driver");
        assert_eq!(Logger::monitor(true).name, "monitor");
    }
}
