//! Logging primitives shared by the crawler, the sinks and the CLI.
//!
//! The surface is intentionally small: a `Logger` trait with a single required
//! `log` method, a `LogLevel` enum, a `NoopLogger` for tests and a
//! `StdoutLogger` that writes one JSON object per line so crawl progress can
//! be piped into a log collector.
//!
//! Implementors must be `Send + Sync + 'static`: worker tasks on every tokio
//! thread log through the same global instance.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Short uppercase name used in emitted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Minimal logger interface used throughout the crate.
///
/// Only `log` is required; the level helpers delegate to it so test loggers
/// stay tiny.
pub trait Logger: Send + Sync + 'static {
    /// Emit a log record at the given level.
    fn log(&self, level: LogLevel, message: &str);

    /// Flush any buffered records.
    fn flush(&self) {}

    fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Writes `{"ts":"...","level":"INFO","msg":"..."}` lines to stdout.
///
/// Records below `min_level` are discarded.
#[derive(Debug, Clone, Copy)]
pub struct StdoutLogger {
    pub min_level: LogLevel,
}

impl StdoutLogger {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }

    /// Render a record without printing it.
    pub fn format_record(level: LogLevel, message: &str) -> String {
        let ts = chrono::Utc::now().to_rfc3339();
        serde_json::json!({
            "ts": ts,
            "level": level.as_str(),
            "msg": message,
        })
        .to_string()
    }
}

impl Default for StdoutLogger {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl Logger for StdoutLogger {
    fn log(&self, level: LogLevel, message: &str) {
        if level < self.min_level {
            return;
        }
        println!("{}", Self::format_record(level, message));
    }
}
