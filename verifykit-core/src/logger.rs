//! Log bridge between the core and the host application.
//!
//! The core logs security-relevant events (lockout engaged, signing
//! secret rotated, corrupt record recovered) through the `log` facade.
//! Terminal hosts register a [`Logger`] once at startup to receive
//! those messages; message text never contains passwords, key
//! material, or token signatures.

use std::sync::{Arc, OnceLock};

/// Receiver for log messages emitted by the core.
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity levels forwarded to the host logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Very low priority, extremely detailed messages.
    Trace,
    /// Lower priority debugging information.
    Debug,
    /// Informational messages highlighting normal progress.
    Info,
    /// Potentially harmful situations.
    Warn,
    /// Error events the application may still survive.
    Error,
}

/// Adapter that forwards `log` records to the registered [`Logger`].
struct HostLogger;

impl log::Log for HostLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        // Debug/trace noise from dependencies is dropped; only this
        // crate's detailed records are forwarded.
        let from_core = record
            .module_path()
            .is_some_and(|path| path.starts_with("verifykit"));
        let detailed =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;
        if detailed && !from_core {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Registers the host logger. Call once at startup, before any core
/// operation; a second call is ignored.
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: HostLogger = HostLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
