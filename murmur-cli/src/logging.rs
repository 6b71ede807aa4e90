//! Structured logging for transfer telemetry and final statistics.

use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;
use murmur_core::xmodem::TransportStatsSnapshot;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};

use crate::config::{LogFormat, LogTarget, LoggingConfig};

/// Structured log event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    /// Periodic telemetry sample during a transfer
    Telemetry(TelemetryEvent),

    /// Final statistics for a completed run
    Statistics(StatisticsEvent),

    /// General info message
    Info { message: String },

    /// Warning message
    Warn { message: String },

    /// Error message
    Error {
        message: String,
        details: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub stats: TransportStatsSnapshot,
    pub sync_locked: bool,
    pub estimated_snr_db: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsEvent {
    pub timestamp: DateTime<Utc>,
    pub duration_secs: f64,
    pub stats: TransportStatsSnapshot,
    pub throughput_bytes_per_sec: f64,
    pub error_rate: StatSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatSummary {
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

/// Logger that writes structured events in the configured format.
pub struct StructuredLogger {
    config: LoggingConfig,
    writer: Box<dyn Write + Send>,
    start_time: DateTime<Utc>,
}

impl StructuredLogger {
    pub fn new(config: LoggingConfig) -> Result<Self> {
        let writer: Box<dyn Write + Send> = match &config.target {
            LogTarget::Stdout => Box::new(io::stdout()),
            LogTarget::Stderr => Box::new(io::stderr()),
            LogTarget::File => {
                let path = config
                    .file_path
                    .as_ref()
                    .ok_or_else(|| color_eyre::eyre::eyre!("File path required for file logging"))?;
                Box::new(BufWriter::new(File::create(path)?))
            }
        };

        Ok(Self {
            config,
            writer,
            start_time: Utc::now(),
        })
    }

    pub fn log(&mut self, event: LogEvent) -> Result<()> {
        if event_level(&event) < self.config.level {
            return Ok(());
        }
        let line = match self.config.format {
            LogFormat::Json => serde_json::to_string(&event)?,
            LogFormat::Logfmt => format_logfmt(&event),
            LogFormat::Pretty => format_pretty(&event),
        };
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn info(&mut self, message: impl Into<String>) -> Result<()> {
        self.log(LogEvent::Info {
            message: message.into(),
        })
    }

    pub fn elapsed(&self) -> f64 {
        (Utc::now() - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

fn event_level(event: &LogEvent) -> crate::config::LogLevel {
    use crate::config::LogLevel;
    match event {
        LogEvent::Error { .. } => LogLevel::Error,
        LogEvent::Warn { .. } => LogLevel::Warn,
        _ => LogLevel::Info,
    }
}

fn format_logfmt(event: &LogEvent) -> String {
    let ts = Utc::now().to_rfc3339();
    match event {
        LogEvent::Telemetry(t) => format!(
            "ts=\"{}\" type=telemetry sent={} received={} retransmitted={} dropped={} bytes={} error_rate={:.4} sync_locked={} snr_db={:.1}",
            ts,
            t.stats.packets_sent,
            t.stats.packets_received,
            t.stats.packets_retransmitted,
            t.stats.packets_dropped,
            t.stats.bytes_transferred,
            t.stats.error_rate,
            t.sync_locked,
            t.estimated_snr_db,
        ),
        LogEvent::Statistics(s) => format!(
            "ts=\"{}\" type=statistics duration_secs={:.2} sent={} received={} retransmitted={} dropped={} bytes={} throughput_bps={:.1} error_rate_mean={:.4}",
            ts,
            s.duration_secs,
            s.stats.packets_sent,
            s.stats.packets_received,
            s.stats.packets_retransmitted,
            s.stats.packets_dropped,
            s.stats.bytes_transferred,
            s.throughput_bytes_per_sec,
            s.error_rate.mean,
        ),
        LogEvent::Info { message } => format!("ts=\"{}\" level=info msg=\"{}\"", ts, message),
        LogEvent::Warn { message } => format!("ts=\"{}\" level=warn msg=\"{}\"", ts, message),
        LogEvent::Error { message, details } => match details {
            Some(details) => format!(
                "ts=\"{}\" level=error msg=\"{}\" details=\"{}\"",
                ts, message, details
            ),
            None => format!("ts=\"{}\" level=error msg=\"{}\"", ts, message),
        },
    }
}

fn format_pretty(event: &LogEvent) -> String {
    let ts = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
    match event {
        LogEvent::Telemetry(t) => format!(
            "[{}] TELEMETRY: sent={} recv={} retx={} drop={} bytes={} | err={:.2}% | {}",
            ts,
            t.stats.packets_sent,
            t.stats.packets_received,
            t.stats.packets_retransmitted,
            t.stats.packets_dropped,
            t.stats.bytes_transferred,
            t.stats.error_rate * 100.0,
            if t.sync_locked { "LOCKED" } else { "SEARCHING" },
        ),
        LogEvent::Statistics(s) => format!(
            "[{}] STATISTICS ({:.2}s): sent={} recv={} retx={} drop={} | {} bytes @ {:.1} B/s | err μ={:.4} σ={:.4} [{:.4},{:.4}]",
            ts,
            s.duration_secs,
            s.stats.packets_sent,
            s.stats.packets_received,
            s.stats.packets_retransmitted,
            s.stats.packets_dropped,
            s.stats.bytes_transferred,
            s.throughput_bytes_per_sec,
            s.error_rate.mean,
            s.error_rate.stddev,
            s.error_rate.min,
            s.error_rate.max,
        ),
        LogEvent::Info { message } => format!("[{}] INFO: {}", ts, message),
        LogEvent::Warn { message } => format!("[{}] WARN: {}", ts, message),
        LogEvent::Error { message, details } => match details {
            Some(details) => format!("[{}] ERROR: {} | {}", ts, message, details),
            None => format!("[{}] ERROR: {}", ts, message),
        },
    }
}
