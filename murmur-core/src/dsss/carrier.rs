//! Carrier modulation and complex downconversion at chip rate.

use num_complex::Complex64;
use std::f64::consts::{PI, TAU};

use crate::config::DsssConfig;

/// Differential phase modulator: each −1 chip advances the carrier phase by
/// π, each +1 chip leaves it alone. Both phase accumulators persist across
/// calls so the emitted waveform stays continuous.
#[derive(Debug, Clone)]
pub struct DpskModulator {
    config: DsssConfig,
    carrier_phase: f64,
    dpsk_phase: f64,
}

impl DpskModulator {
    pub fn new(config: DsssConfig) -> Self {
        Self {
            config,
            carrier_phase: 0.0,
            dpsk_phase: 0.0,
        }
    }

    /// Append `samples_per_phase` carrier samples per chip to `out`.
    pub fn modulate_chips(&mut self, chips: &[i8], out: &mut Vec<f32>) {
        let step = TAU * self.config.carrier_freq_hz / self.config.sample_rate as f64;
        for &chip in chips {
            if chip < 0 {
                self.dpsk_phase += PI;
                if self.dpsk_phase >= TAU {
                    self.dpsk_phase -= TAU;
                }
            }
            for _ in 0..self.config.samples_per_phase {
                self.carrier_phase += step;
                if self.carrier_phase > TAU {
                    self.carrier_phase -= TAU;
                }
                out.push((self.carrier_phase + self.dpsk_phase).cos() as f32);
            }
        }
    }

    pub fn reset(&mut self) {
        self.carrier_phase = 0.0;
        self.dpsk_phase = 0.0;
    }
}

/// Streaming complex downconverter integrating one baseband value per chip.
///
/// The mixer phase advances with every consumed sample, so feeding contiguous
/// sample runs keeps consecutive chips phase-coherent, which is all the
/// differential demodulator needs.
#[derive(Debug, Clone)]
pub struct ChipDownconverter {
    config: DsssConfig,
    phase: f64,
}

impl ChipDownconverter {
    pub fn new(config: DsssConfig) -> Self {
        Self { config, phase: 0.0 }
    }

    /// Integrate exactly one chip worth of samples into a baseband value.
    pub fn process_chip(&mut self, samples: &[f32]) -> Complex64 {
        debug_assert_eq!(samples.len(), self.config.samples_per_phase);
        let step = TAU * self.config.carrier_freq_hz / self.config.sample_rate as f64;
        let mut acc = Complex64::new(0.0, 0.0);
        for &sample in samples {
            self.phase += step;
            if self.phase > TAU {
                self.phase -= TAU;
            }
            acc += f64::from(sample) * Complex64::new(self.phase.cos(), -self.phase.sin());
        }
        acc / self.config.samples_per_phase as f64
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Batch downconversion with a local time base: one baseband value per whole
/// chip contained in `samples`. Used by the sync correlator, where only
/// phase differences within the window matter.
pub fn chip_baseband(samples: &[f32], config: &DsssConfig) -> Vec<Complex64> {
    let spp = config.samples_per_phase;
    let chips = samples.len() / spp;
    let step = TAU * config.carrier_freq_hz / config.sample_rate as f64;

    let mut out = Vec::with_capacity(chips);
    let mut phase = 0.0f64;
    for chip in 0..chips {
        let mut acc = Complex64::new(0.0, 0.0);
        for &sample in &samples[chip * spp..(chip + 1) * spp] {
            phase += step;
            if phase > TAU {
                phase -= TAU;
            }
            acc += f64::from(sample) * Complex64::new(phase.cos(), -phase.sin());
        }
        out.push(acc / spp as f64);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chip_count_and_amplitude() {
        let config = DsssConfig::default();
        let mut modulator = DpskModulator::new(config.clone());
        let chips = [1i8, -1, 1, 1, -1];
        let mut audio = Vec::new();
        modulator.modulate_chips(&chips, &mut audio);
        assert_eq!(audio.len(), chips.len() * config.samples_per_phase);
        assert!(audio.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn differential_product_recovers_chips() {
        let config = DsssConfig::default();
        let mut modulator = DpskModulator::new(config.clone());
        let chips = [1i8, -1, 1, -1, -1, 1, 1, -1];
        let mut audio = Vec::new();
        modulator.modulate_chips(&chips, &mut audio);

        let baseband = chip_baseband(&audio, &config);
        assert_eq!(baseband.len(), chips.len());
        for k in 1..chips.len() {
            let d = baseband[k] * baseband[k - 1].conj();
            let detected: i8 = if d.re >= 0.0 { 1 } else { -1 };
            assert_eq!(detected, chips[k], "chip {} misdetected", k);
        }
    }

    #[test]
    fn streaming_downconverter_matches_batch() {
        let config = DsssConfig::default();
        let mut modulator = DpskModulator::new(config.clone());
        let chips = [1i8, -1, -1, 1];
        let mut audio = Vec::new();
        modulator.modulate_chips(&chips, &mut audio);

        let batch = chip_baseband(&audio, &config);
        let mut streaming = ChipDownconverter::new(config.clone());
        let spp = config.samples_per_phase;
        for (k, expected) in batch.iter().enumerate() {
            let z = streaming.process_chip(&audio[k * spp..(k + 1) * spp]);
            assert!((z - expected).norm() < 1e-9);
        }
    }

    #[test]
    fn baseband_magnitude_is_half_amplitude() {
        let config = DsssConfig::default();
        let mut modulator = DpskModulator::new(config.clone());
        let mut audio = Vec::new();
        modulator.modulate_chips(&[1i8; 8], &mut audio);
        let baseband = chip_baseband(&audio, &config);
        for z in &baseband[1..] {
            assert!((z.norm() - 0.5).abs() < 0.1, "|z| = {}", z.norm());
        }
    }
}
