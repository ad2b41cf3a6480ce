//! Top-level logger exports and a small global facade.
//!
//! ```rust,no_run
//! use moss_harvest::logger::{self, LogLevel, StdoutLogger};
//! logger::init_logger(StdoutLogger::new(LogLevel::Info));
//! logger::info("crawl started");
//! ```

pub mod core;

pub use core::{LogLevel, Logger, NoopLogger, StdoutLogger};

use std::sync::{Arc, RwLock};

/// Process-wide logger slot. Empty until `init_logger` is called; the facade
/// helpers are no-ops while it is empty.
static GLOBAL_LOGGER: RwLock<Option<Arc<dyn Logger>>> = RwLock::new(None);

/// Install (or replace) the global logger.
pub fn init_logger<L: Logger>(logger: L) {
    let mut slot = GLOBAL_LOGGER.write().unwrap_or_else(|e| e.into_inner());
    *slot = Some(Arc::new(logger));
}

/// Log through the global logger if one is installed.
pub fn log(level: LogLevel, message: &str) {
    let slot = GLOBAL_LOGGER.read().unwrap_or_else(|e| e.into_inner());
    if let Some(logger) = slot.as_ref() {
        logger.log(level, message);
    }
}

pub fn flush() {
    let slot = GLOBAL_LOGGER.read().unwrap_or_else(|e| e.into_inner());
    if let Some(logger) = slot.as_ref() {
        logger.flush();
    }
}

pub fn trace(msg: &str) {
    log(LogLevel::Trace, msg);
}

pub fn debug(msg: &str) {
    log(LogLevel::Debug, msg);
}

pub fn info(msg: &str) {
    log(LogLevel::Info, msg);
}

pub fn warn(msg: &str) {
    log(LogLevel::Warn, msg);
}

pub fn error(msg: &str) {
    log(LogLevel::Error, msg);
}

#[cfg(test)]
pub mod tests;
