//! Sliding-correlator acquisition and the SEARCH/TRACK/VERIFY synchronizer.

use std::collections::VecDeque;

use num_complex::Complex64;
use rayon::prelude::*;

use crate::buffer::RingBuffer;
use crate::config::{DsssConfig, SyncConfig};
use crate::dsss::carrier::{chip_baseband, ChipDownconverter};
use crate::dsss::spreading::{despread, soft_gain_for_snr_db};
use crate::logging::SignalLogger;

/// Outcome of one sliding correlation over a sample window.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub best_chip_offset: usize,
    pub best_sample_offset: usize,
    /// Normalized despread correlation at the peak, in [0, 1]
    pub peak_correlation: f64,
    /// Peak over the mean of all other candidate offsets
    pub peak_ratio: f64,
    pub is_found: bool,
}

/// Slide the spreading sequence across `buffer` at chip granularity, then
/// refine the winning offset at sample granularity.
///
/// A reported chip offset `c` means a data bit starts `c` chips into the
/// buffer; the correlator needs one chip of history before it, so the
/// search starts at chip 1. The signal arrives at an arbitrary sample phase
/// though, and a half-chip misalignment costs nearly half the correlation,
/// so the coarse peak is re-evaluated at every sample shift within ±half a
/// chip to produce `best_sample_offset`.
pub fn find_sync_offset(
    buffer: &[f32],
    sequence: &[i8],
    config: &DsssConfig,
    max_chip_offset: usize,
    correlation_threshold: f64,
    peak_to_noise_ratio: f64,
) -> SyncReport {
    let n = sequence.len();
    let spp = config.samples_per_phase;
    let baseband = chip_baseband(buffer, config);
    if baseband.len() < n + 1 {
        return SyncReport::default();
    }

    let diffs: Vec<Complex64> = baseband
        .windows(2)
        .map(|w| w[1] * w[0].conj())
        .collect();

    // candidate c uses diffs[c-1 .. c-1+n]
    let last_candidate = diffs.len().saturating_sub(n).min(max_chip_offset);
    if last_candidate == 0 {
        return SyncReport::default();
    }

    let correlations: Vec<f64> = (1..=last_candidate)
        .into_par_iter()
        .map(|c| {
            let window = &diffs[c - 1..c - 1 + n];
            correlate_diffs(window, sequence)
        })
        .collect();

    let (best_index, &coarse_peak) = correlations
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .expect("at least one candidate");
    let best_chip_offset = best_index + 1;

    let peak_ratio = if correlations.len() > 1 {
        let rest: f64 = correlations.iter().sum::<f64>() - coarse_peak;
        let mean_rest = rest / (correlations.len() - 1) as f64;
        if mean_rest <= f64::EPSILON {
            f64::INFINITY
        } else {
            coarse_peak / mean_rest
        }
    } else {
        f64::INFINITY
    };

    // sample-granular refinement around the coarse winner
    let center = best_chip_offset * spp;
    let half_chip = spp as isize / 2;
    let mut best_sample_offset = center;
    let mut peak = coarse_peak;
    for delta in -half_chip..=half_chip {
        let start = center as isize + delta;
        if start < spp as isize || (start as usize + n * spp) > buffer.len() {
            continue;
        }
        let corr = correlation_at(buffer, start as usize, sequence, config);
        if corr > peak {
            peak = corr;
            best_sample_offset = start as usize;
        }
    }

    SyncReport {
        best_chip_offset,
        best_sample_offset,
        peak_correlation: peak,
        peak_ratio,
        is_found: peak >= correlation_threshold && peak_ratio >= peak_to_noise_ratio,
    }
}

/// Normalized despread correlation for a bit starting at sample `start`
/// (one chip of history before it must exist in the buffer).
fn correlation_at(buffer: &[f32], start: usize, sequence: &[i8], config: &DsssConfig) -> f64 {
    let spp = config.samples_per_phase;
    let n = sequence.len();
    let window = &buffer[start - spp..start + n * spp];
    let baseband = chip_baseband(window, config);
    let diffs: Vec<Complex64> = baseband
        .windows(2)
        .map(|w| w[1] * w[0].conj())
        .collect();
    correlate_diffs(&diffs, sequence)
}

fn correlate_diffs(diffs: &[Complex64], sequence: &[i8]) -> f64 {
    let mut acc = Complex64::new(0.0, 0.0);
    let mut energy = 0.0f64;
    for (d, &chip) in diffs.iter().zip(sequence.iter()) {
        acc += d * f64::from(chip);
        energy += d.norm();
    }
    if energy <= f64::EPSILON {
        0.0
    } else {
        acc.norm() / energy
    }
}

/// Linear map from peak correlation to an SNR estimate in dB.
pub fn estimate_snr_db(peak_correlation: f64, config: &SyncConfig) -> f64 {
    let span = config.snr_max_correlation - config.snr_min_correlation;
    let t = ((peak_correlation - config.snr_min_correlation) / span).clamp(0.0, 1.0);
    t * config.snr_range_db
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Search,
    Track,
    Verify,
}

/// Externally visible synchronizer state.
#[derive(Debug, Clone)]
pub struct SyncState {
    pub mode: SyncMode,
    pub locked: bool,
    pub sample_offset: usize,
    pub recent_llrs: VecDeque<i8>,
    pub consecutive_weak_bits: u32,
    pub bits_since_last_check: u32,
    pub processed_bits: u64,
    pub estimated_snr_db: f64,
}

impl SyncState {
    fn new() -> Self {
        Self {
            mode: SyncMode::Search,
            locked: false,
            sample_offset: 0,
            recent_llrs: VecDeque::with_capacity(RECENT_LLR_DEPTH),
            consecutive_weak_bits: 0,
            bits_since_last_check: 0,
            processed_bits: 0,
            estimated_snr_db: 0.0,
        }
    }

    fn average_llr_magnitude(&self) -> f32 {
        if self.recent_llrs.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.recent_llrs.iter().map(|&l| f32::from(l).abs()).sum();
        sum / self.recent_llrs.len() as f32
    }
}

const RECENT_LLR_DEPTH: usize = 10;
/// Ring depth in data bits
const RING_BITS: usize = 4;

/// Continuous demodulation driven by the SEARCH/TRACK/VERIFY machine.
///
/// Fed fixed-size sample blocks by the realtime path; emits one soft bit per
/// `sequence_length · samples_per_phase` consumed samples while locked.
pub struct SyncTracker {
    config: DsssConfig,
    sync_config: SyncConfig,
    sequence: Vec<i8>,
    ring: RingBuffer<f32>,
    state: SyncState,
    downconverter: ChipDownconverter,
    prev_chip: Option<Complex64>,
    soft_gain: f64,
    samples_seen: u64,
    last_search_at: Option<u64>,
    bit_buf: Vec<f32>,
    chip_buf: Vec<f32>,
    diff_buf: Vec<Complex64>,
    logger: SignalLogger,
}

impl SyncTracker {
    pub fn new(config: DsssConfig, sync_config: SyncConfig, sequence: Vec<i8>) -> Self {
        let spb = config.samples_per_bit();
        Self {
            downconverter: ChipDownconverter::new(config.clone()),
            ring: RingBuffer::new(spb * RING_BITS),
            state: SyncState::new(),
            prev_chip: None,
            soft_gain: soft_gain_for_snr_db(0.0),
            samples_seen: 0,
            last_search_at: None,
            bit_buf: vec![0.0; spb],
            chip_buf: vec![0.0; config.samples_per_phase],
            diff_buf: vec![Complex64::new(0.0, 0.0); sequence.len()],
            sequence,
            config,
            sync_config,
            logger: SignalLogger::default(),
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn logger_mut(&mut self) -> &mut SignalLogger {
        &mut self.logger
    }

    /// Feed one block of samples; locked-mode soft bits append to `bits_out`.
    pub fn push_block(&mut self, block: &[f32], bits_out: &mut Vec<i8>) {
        self.samples_seen += block.len() as u64;
        self.ring.put_slice(block);

        loop {
            let advanced = match self.state.mode {
                SyncMode::Search => self.try_search(),
                SyncMode::Track => self.track_bit(bits_out),
                SyncMode::Verify => {
                    self.verify();
                    true
                }
            };
            if !advanced {
                break;
            }
        }
    }

    /// Reset to SEARCH with empty buffers; no reallocation.
    pub fn reset(&mut self) {
        self.ring.clear();
        self.state = SyncState::new();
        self.downconverter.reset();
        self.prev_chip = None;
        self.soft_gain = soft_gain_for_snr_db(0.0);
        self.last_search_at = None;
    }

    fn min_search_spacing(&self) -> u64 {
        self.sync_config.min_sync_interval_ms * self.config.sample_rate as u64 / 1000
    }

    fn try_search(&mut self) -> bool {
        let spb = self.config.samples_per_bit();
        if self.ring.len() < 2 * spb {
            return false;
        }
        if let Some(last) = self.last_search_at {
            if self.samples_seen.saturating_sub(last) < self.min_search_spacing() {
                return false;
            }
        }
        self.last_search_at = Some(self.samples_seen);

        let window = self.ring.to_vec();
        let max_chip_offset = window.len() / self.config.samples_per_phase;
        let report = find_sync_offset(
            &window,
            &self.sequence,
            &self.config,
            max_chip_offset,
            self.config.correlation_threshold,
            self.config.peak_to_noise_ratio,
        );
        if !report.is_found {
            return false;
        }

        self.logger.info(
            "SEARCH",
            format!(
                "lock at offset {} corr {:.3} ratio {:.1}",
                report.best_sample_offset, report.peak_correlation, report.peak_ratio
            ),
        );
        self.acquire(&report);
        true
    }

    /// Enter TRACK at the offset named by `report` (relative to the current
    /// ring head), consuming one chip to prime the differential reference.
    fn acquire(&mut self, report: &SyncReport) {
        let spp = self.config.samples_per_phase;
        self.ring.skip(report.best_sample_offset - spp);
        self.downconverter.reset();
        let taken = self.ring.remove_slice(&mut self.chip_buf);
        debug_assert_eq!(taken, spp);
        self.prev_chip = Some(self.downconverter.process_chip(&self.chip_buf));

        self.state.mode = SyncMode::Track;
        self.state.locked = true;
        self.state.sample_offset = report.best_sample_offset;
        self.state.consecutive_weak_bits = 0;
        self.state.bits_since_last_check = 0;
        self.state.recent_llrs.clear();
        self.state.estimated_snr_db = estimate_snr_db(report.peak_correlation, &self.sync_config);
        self.soft_gain = soft_gain_for_snr_db(self.state.estimated_snr_db);
    }

    fn track_bit(&mut self, bits_out: &mut Vec<i8>) -> bool {
        let spb = self.config.samples_per_bit();
        if self.ring.len() < spb {
            return false;
        }
        let spp = self.config.samples_per_phase;
        let taken = self.ring.remove_slice(&mut self.bit_buf);
        debug_assert_eq!(taken, spb);

        let mut prev = self.prev_chip.expect("primed on acquire");
        for k in 0..self.sequence.len() {
            let z = self
                .downconverter
                .process_chip(&self.bit_buf[k * spp..(k + 1) * spp]);
            self.diff_buf[k] = z * prev.conj();
            prev = z;
        }
        self.prev_chip = Some(prev);

        let llr = despread(&self.diff_buf, &self.sequence, self.soft_gain);

        let history_was_healthy =
            self.state.average_llr_magnitude() >= self.sync_config.resync_threshold;

        self.state.processed_bits += 1;
        self.state.bits_since_last_check += 1;
        if self.state.recent_llrs.len() == RECENT_LLR_DEPTH {
            self.state.recent_llrs.pop_front();
        }
        self.state.recent_llrs.push_back(llr);
        bits_out.push(llr);

        let magnitude = llr.unsigned_abs();
        if magnitude < self.sync_config.weak_llr_threshold.unsigned_abs() {
            self.state.consecutive_weak_bits += 1;
            if self.state.consecutive_weak_bits >= self.sync_config.max_consecutive_weak {
                self.logger.warn(
                    "TRACK",
                    format!(
                        "sync lost after {} weak bits",
                        self.state.consecutive_weak_bits
                    ),
                );
                self.lose_sync();
                return true;
            }
        } else {
            self.state.consecutive_weak_bits = 0;
        }

        if history_was_healthy && f32::from(magnitude) < self.sync_config.resync_threshold {
            if !self.local_resync() {
                self.logger.warn("TRACK", "local resync failed");
                self.lose_sync();
            }
            return true;
        }

        if self.state.bits_since_last_check >= self.sync_config.verify_interval_bits {
            self.state.mode = SyncMode::Verify;
        }
        true
    }

    /// Re-acquire within ±`local_resync_span` samples using the looser
    /// correlation threshold. Peeks ahead in the ring without consuming.
    fn local_resync(&mut self) -> bool {
        let spp = self.config.samples_per_phase;
        let n = self.sequence.len();
        let span = self.sync_config.local_resync_span;
        let window_len = 2 * span + (n + 1) * spp;
        if self.ring.len() < window_len {
            return false;
        }

        let window: Vec<f32> = (0..window_len)
            .map(|i| self.ring.get(i as isize).expect("length checked"))
            .collect();
        let max_chip_offset = (2 * span) / spp + 1;
        let report = find_sync_offset(
            &window,
            &self.sequence,
            &self.config,
            max_chip_offset,
            self.sync_config.resync_correlation_threshold,
            self.config.peak_to_noise_ratio,
        );
        if !report.is_found {
            return false;
        }

        self.logger.info(
            "TRACK",
            format!("local resync to offset {}", report.best_sample_offset),
        );
        self.ring.skip(report.best_sample_offset - spp);
        let taken = self.ring.remove_slice(&mut self.chip_buf);
        debug_assert_eq!(taken, spp);
        self.prev_chip = Some(self.downconverter.process_chip(&self.chip_buf));
        self.state.consecutive_weak_bits = 0;
        self.state.estimated_snr_db = estimate_snr_db(report.peak_correlation, &self.sync_config);
        self.soft_gain = soft_gain_for_snr_db(self.state.estimated_snr_db);
        true
    }

    fn verify(&mut self) {
        self.state.bits_since_last_check = 0;
        if self.state.average_llr_magnitude() >= self.sync_config.resync_threshold {
            self.state.mode = SyncMode::Track;
        } else {
            self.logger.warn("VERIFY", "rolling quality below threshold");
            self.lose_sync();
        }
    }

    fn lose_sync(&mut self) {
        self.state.mode = SyncMode::Search;
        self.state.locked = false;
        self.state.consecutive_weak_bits = 0;
        self.state.recent_llrs.clear();
        self.prev_chip = None;
    }
}
