//! Structured logging for the modem stack.
//!
//! The realtime path cannot log through a global, locking backend, so each
//! processor owns a `SignalLogger` that collects bounded, subsystem-tagged
//! entries. The control side drains them whenever it likes.

use std::collections::VecDeque;
use std::fmt;

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to record
    pub level: LogLevel,

    /// Per-subsystem enables
    pub enable_sync: bool,
    pub enable_modem: bool,
    pub enable_framing: bool,
    pub enable_fec: bool,
    pub enable_transport: bool,

    /// Maximum number of entries retained
    pub max_entries: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            enable_sync: true,
            enable_modem: true,
            enable_framing: true,
            enable_fec: true,
            enable_transport: true,
            max_entries: 1000,
        }
    }
}

impl LogConfig {
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            max_entries: 5000,
            ..Self::default()
        }
    }

    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Warn,
            enable_sync: false,
            enable_modem: false,
            enable_framing: false,
            enable_fec: false,
            enable_transport: false,
            max_entries: 100,
        }
    }

    pub fn disabled() -> Self {
        Self {
            level: LogLevel::Error,
            enable_sync: false,
            enable_modem: false,
            enable_framing: false,
            enable_fec: false,
            enable_transport: false,
            max_entries: 0,
        }
    }
}

/// A single log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub subsystem: &'static str,
    pub message: String,
}

/// Logger that collects structured log entries
#[derive(Debug, Clone)]
pub struct SignalLogger {
    config: LogConfig,
    entries: VecDeque<LogEntry>,
}

impl SignalLogger {
    pub fn new(config: LogConfig) -> Self {
        let capacity = config.max_entries.min(1000);
        Self {
            config,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Log a message at the specified level
    pub fn log(&mut self, level: LogLevel, subsystem: &'static str, message: impl fmt::Display) {
        if level < self.config.level {
            return;
        }

        let enabled = match subsystem {
            "SYNC" | "SEARCH" | "TRACK" | "VERIFY" => self.config.enable_sync,
            "FSK" | "DSSS" | "CARRIER" | "AGC" => self.config.enable_modem,
            "FRAME" => self.config.enable_framing,
            "FEC" | "LDPC" | "BCH" => self.config.enable_fec,
            "XMODEM" | "PORT" => self.config.enable_transport,
            _ => true, // unknown subsystems always log
        };
        if !enabled {
            return;
        }

        if self.config.max_entries == 0 {
            return;
        }
        if self.entries.len() >= self.config.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            level,
            subsystem,
            message: message.to_string(),
        });
    }

    pub fn trace(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Trace, subsystem, message);
    }

    pub fn debug(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Debug, subsystem, message);
    }

    pub fn info(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Info, subsystem, message);
    }

    pub fn warn(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Warn, subsystem, message);
    }

    pub fn error(&mut self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Error, subsystem, message);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Drain collected entries, oldest first.
    pub fn take_entries(&mut self) -> Vec<LogEntry> {
        self.entries.drain(..).collect()
    }

    pub fn entries_for_subsystem(&self, subsystem: &str) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.subsystem == subsystem)
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SignalLogger {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}

impl fmt::Display for SignalLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "[{}] {}: {}", entry.level, entry.subsystem, entry.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_below_level() {
        let config = LogConfig {
            level: LogLevel::Info,
            ..Default::default()
        };
        let mut logger = SignalLogger::new(config);

        logger.trace("TEST", "trace message");
        logger.debug("TEST", "debug message");
        logger.info("TEST", "info message");
        logger.warn("TEST", "warn message");

        assert_eq!(logger.len(), 2);
    }

    #[test]
    fn subsystem_filtering() {
        let config = LogConfig {
            level: LogLevel::Debug,
            enable_sync: false,
            enable_transport: true,
            ..Default::default()
        };
        let mut logger = SignalLogger::new(config);

        logger.info("TRACK", "suppressed");
        logger.info("XMODEM", "kept");

        assert_eq!(logger.len(), 1);
        assert_eq!(logger.entries().next().unwrap().subsystem, "XMODEM");
    }

    #[test]
    fn bounded_store_drops_oldest() {
        let config = LogConfig {
            level: LogLevel::Debug,
            max_entries: 3,
            ..Default::default()
        };
        let mut logger = SignalLogger::new(config);

        for i in 1..=4 {
            logger.info("TEST", format!("message {}", i));
        }

        assert_eq!(logger.len(), 3);
        assert!(logger.entries().next().unwrap().message.contains("message 2"));
    }

    #[test]
    fn take_entries_drains() {
        let mut logger = SignalLogger::default();
        logger.info("TEST", "one");
        let drained = logger.take_entries();
        assert_eq!(drained.len(), 1);
        assert!(logger.is_empty());
    }
}
