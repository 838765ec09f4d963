//! Leveled progress logging.
//!
//! There is no package-level default logger. Every entry point takes an
//! explicit `Logger` so the same code path can write to a terminal locally
//! and to a remote tunnel sink on the agent side.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Log severity, ordered.
///
/// `Done` sits between `Info` and `Warn`: it is emitted at info verbosity
/// but marks the successful end of a long-running step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Done,
    Warn,
    Error,
}

/// A single progress message.
///
/// Transient and ordered; exists only on the wire and in forwarder buffers,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
    /// Unix epoch seconds at enqueue time.
    pub timestamp: i64,
}

impl LogMessage {
    /// Create a message stamped with the current time.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: unix_now(),
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Progress logger threaded through every session entry point.
///
/// Implementations filter by [`Logger::level`] before doing any work, so
/// messages below the threshold are free.
pub trait Logger: Send + Sync {
    /// Emit a message at the given level.
    fn log(&self, level: LogLevel, message: &str);

    /// Current threshold. Messages below it are discarded.
    fn level(&self) -> LogLevel;

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn done(&self, message: &str) {
        self.log(LogLevel::Done, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Log at error level, then terminate the process.
    fn fatal(&self, message: &str) -> ! {
        self.log(LogLevel::Error, message);
        std::process::exit(1);
    }
}

/// Logger that re-emits progress as `tracing` events.
///
/// Used as the local terminal logger; the remote side uses the tunnel
/// forwarder instead.
pub struct TracingLogger {
    level: LogLevel,
}

impl TracingLogger {
    #[must_use]
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        if level < self.level {
            return;
        }
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info | LogLevel::Done => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
    }

    fn level(&self) -> LogLevel {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Done);
        assert!(LogLevel::Done < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn message_roundtrip() {
        let msg = LogMessage::new(LogLevel::Warn, "disk almost full");
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: LogMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
