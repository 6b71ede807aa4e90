//! Running aggregation of transfer statistics for periodic logging.

use chrono::Utc;
use murmur_core::xmodem::TransportStatsSnapshot;
use std::time::{Duration, Instant};

use crate::logging::{StatSummary, StatisticsEvent, TelemetryEvent};

/// Samples transport statistics at a fixed interval and accumulates the
/// error-rate distribution for the final summary.
pub struct TelemetryAggregator {
    interval: Duration,
    last_sample: Option<Instant>,
    started: Instant,
    error_rates: Vec<f64>,
    latest: TransportStatsSnapshot,
}

impl TelemetryAggregator {
    pub fn new(interval_secs: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(interval_secs.max(0.05)),
            last_sample: None,
            started: Instant::now(),
            error_rates: Vec::new(),
            latest: TransportStatsSnapshot::default(),
        }
    }

    /// Record the current stats; returns a telemetry event when the
    /// sampling interval has elapsed.
    pub fn update(
        &mut self,
        stats: TransportStatsSnapshot,
        sync_locked: bool,
        estimated_snr_db: f64,
    ) -> Option<TelemetryEvent> {
        self.latest = stats;

        let due = match self.last_sample {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        };
        if !due {
            return None;
        }
        self.last_sample = Some(Instant::now());
        self.error_rates.push(stats.error_rate);

        Some(TelemetryEvent {
            timestamp: Utc::now(),
            stats,
            sync_locked,
            estimated_snr_db,
        })
    }

    /// Final statistics over the whole run.
    pub fn finish(&self) -> StatisticsEvent {
        let duration_secs = self.started.elapsed().as_secs_f64();
        let throughput = if duration_secs > 0.0 {
            self.latest.bytes_transferred as f64 / duration_secs
        } else {
            0.0
        };
        StatisticsEvent {
            timestamp: Utc::now(),
            duration_secs,
            stats: self.latest,
            throughput_bytes_per_sec: throughput,
            error_rate: summarize(&self.error_rates),
        }
    }
}

fn summarize(samples: &[f64]) -> StatSummary {
    if samples.is_empty() {
        return StatSummary {
            mean: 0.0,
            stddev: 0.0,
            min: 0.0,
            max: 0.0,
            samples: 0,
        };
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let variance =
        samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    StatSummary {
        mean,
        stddev: variance.sqrt(),
        min: samples.iter().cloned().fold(f64::INFINITY, f64::min),
        max: samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        samples: samples.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_emits_immediately() {
        let mut telemetry = TelemetryAggregator::new(10.0);
        let event = telemetry.update(TransportStatsSnapshot::default(), false, 0.0);
        assert!(event.is_some());
        // the second sample is rate limited
        let event = telemetry.update(TransportStatsSnapshot::default(), false, 0.0);
        assert!(event.is_none());
    }

    #[test]
    fn summary_tracks_distribution() {
        let summary = summarize(&[0.0, 0.5, 1.0]);
        assert!((summary.mean - 0.5).abs() < 1e-12);
        assert_eq!(summary.min, 0.0);
        assert_eq!(summary.max, 1.0);
        assert_eq!(summary.samples, 3);
    }
}
