//! Continuous-phase binary FSK modulation.

use std::f64::consts::TAU;

use crate::config::FskConfig;

/// Byte-at-a-time FSK modulator with start/stop framing.
///
/// The phase accumulator is never reset between bits or between calls within
/// a session; a phase discontinuity at a tone switch would splatter energy
/// across the band.
#[derive(Debug, Clone)]
pub struct FskModulator {
    config: FskConfig,
    phase: f64,
    /// Fractional sample debt carried across bit boundaries so fractional
    /// stop bits average out to the exact configured duration
    fraction: f64,
}

impl FskModulator {
    pub fn new(config: FskConfig) -> Self {
        Self {
            config,
            phase: 0.0,
            fraction: 0.0,
        }
    }

    pub fn config(&self) -> &FskConfig {
        &self.config
    }

    /// Modulate a byte sequence into samples, including the silence pads and
    /// mark carrier lead-in/tail.
    pub fn modulate(&mut self, bytes: &[u8]) -> Vec<f32> {
        let spb = self.config.samples_per_bit();
        let estimated = (self.config.silence_pad_ms * 2.0 + self.config.pre_carrier_ms
            + self.config.post_carrier_ms)
            .mul_add(
                self.config.sample_rate as f64 / 1000.0,
                bytes.len() as f64 * (self.config.start_bits as f64 + 8.0 + self.config.stop_bits) * spb,
            ) as usize;
        let mut out = Vec::with_capacity(estimated + 16);

        self.push_silence(self.config.silence_pad_ms, &mut out);
        self.push_tone_ms(self.config.mark_freq_hz, self.config.pre_carrier_ms, &mut out);
        for &byte in bytes {
            self.modulate_byte_into(byte, &mut out);
        }
        self.push_tone_ms(self.config.mark_freq_hz, self.config.post_carrier_ms, &mut out);
        self.push_silence(self.config.silence_pad_ms, &mut out);

        out
    }

    /// Emit exactly one framed byte: start bits (space), 8 data bits
    /// MSB-first, stop bits (mark).
    pub fn modulate_byte_into(&mut self, byte: u8, out: &mut Vec<f32>) {
        for _ in 0..self.config.start_bits {
            self.push_bit(0, out);
        }
        for i in (0..8).rev() {
            self.push_bit((byte >> i) & 1, out);
        }
        self.push_tone_bits(self.config.mark_freq_hz, self.config.stop_bits, out);
    }

    fn push_bit(&mut self, bit: u8, out: &mut Vec<f32>) {
        let freq = if bit == 1 {
            self.config.mark_freq_hz
        } else {
            self.config.space_freq_hz
        };
        self.push_tone_bits(freq, 1.0, out);
    }

    /// Emit `bit_count` bit-periods of a tone; `bit_count` may be fractional.
    fn push_tone_bits(&mut self, freq: f64, bit_count: f64, out: &mut Vec<f32>) {
        self.fraction += bit_count * self.config.samples_per_bit();
        let samples = self.fraction.floor() as usize;
        self.fraction -= samples as f64;

        let step = TAU * freq / self.config.sample_rate as f64;
        for _ in 0..samples {
            self.phase += step;
            if self.phase > TAU {
                self.phase -= TAU;
            }
            out.push(self.phase.sin() as f32);
        }
    }

    fn push_tone_ms(&mut self, freq: f64, duration_ms: f64, out: &mut Vec<f32>) {
        let bits = duration_ms * self.config.baud_rate as f64 / 1000.0;
        self.push_tone_bits(freq, bits, out);
    }

    fn push_silence(&mut self, duration_ms: f64, out: &mut Vec<f32>) {
        let samples = (duration_ms * self.config.sample_rate as f64 / 1000.0).round() as usize;
        out.extend(std::iter::repeat(0.0).take(samples));
    }

    /// Restore initial state (phase reset is allowed here: a reset starts a
    /// new session).
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.fraction = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config() -> FskConfig {
        FskConfig {
            pre_carrier_ms: 0.0,
            post_carrier_ms: 0.0,
            silence_pad_ms: 0.0,
            ..FskConfig::default()
        }
    }

    #[test]
    fn sample_count_matches_framing() {
        let cfg = bare_config();
        let mut modulator = FskModulator::new(cfg.clone());
        let audio = modulator.modulate(&[0x48]);
        // 1 start + 8 data + 1.5 stop at 147 samples/bit
        let expected = (10.5 * cfg.samples_per_bit()).floor() as usize;
        assert_eq!(audio.len(), expected);
    }

    #[test]
    fn fractional_stop_bits_average_out() {
        let cfg = bare_config();
        let mut modulator = FskModulator::new(cfg.clone());
        let audio = modulator.modulate(&[0u8; 4]);
        let expected = (4.0 * 10.5 * cfg.samples_per_bit()).floor() as usize;
        assert!((audio.len() as i64 - expected as i64).abs() <= 1);
    }

    #[test]
    fn phase_is_continuous_across_calls() {
        let cfg = bare_config();
        let mut modulator = FskModulator::new(cfg);
        let first = modulator.modulate(&[0xA5]);
        let second = modulator.modulate(&[0x5A]);

        // the first derivative at the join must be no larger than the
        // biggest step inside either call
        let max_step = |signal: &[f32]| {
            signal
                .windows(2)
                .map(|w| (w[1] - w[0]).abs())
                .fold(0.0f32, f32::max)
        };
        let join_step = (second[0] - *first.last().unwrap()).abs();
        let bound = max_step(&first).max(max_step(&second));
        assert!(
            join_step <= bound + 1e-6,
            "join step {} exceeds in-call bound {}",
            join_step,
            bound
        );
    }

    #[test]
    fn amplitude_is_bounded() {
        let mut modulator = FskModulator::new(FskConfig::default());
        for sample in modulator.modulate(&[0xFF, 0x00, 0x55]) {
            assert!(sample.abs() <= 1.0);
        }
    }

    #[test]
    fn silence_pads_are_zero() {
        let cfg = FskConfig {
            silence_pad_ms: 10.0,
            ..FskConfig::default()
        };
        let pad_samples = (10.0 * 44_100.0 / 1000.0) as usize;
        let mut modulator = FskModulator::new(cfg);
        let audio = modulator.modulate(&[0x42]);
        assert!(audio[..pad_samples].iter().all(|&s| s == 0.0));
        assert!(audio[audio.len() - pad_samples..].iter().all(|&s| s == 0.0));
    }
}
