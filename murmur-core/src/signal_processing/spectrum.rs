//! Spectrum diagnostics for generated and received signals.

use rustfft::{num_complex::Complex32, FftPlanner};

/// Magnitude spectrum in dB over the first `fft_size` samples (padded with
/// zeros if the input is shorter). Returns one value per FFT bin.
pub fn magnitude_spectrum(samples: &[f32], fft_size: usize) -> Vec<f32> {
    if samples.is_empty() || fft_size == 0 {
        return Vec::new();
    }
    let fft_size = fft_size.next_power_of_two();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);

    let mut buffer: Vec<Complex32> = samples
        .iter()
        .take(fft_size)
        .map(|&s| Complex32::new(s, 0.0))
        .collect();
    buffer.resize(fft_size, Complex32::new(0.0, 0.0));

    fft.process(&mut buffer);

    let scale = 1.0 / (fft_size as f32).sqrt();
    buffer
        .iter()
        .map(|c| {
            let mag = c.norm() * scale;
            if mag > 1e-10 {
                20.0 * mag.log10()
            } else {
                -100.0
            }
        })
        .collect()
}

/// Frequency of the strongest bin below Nyquist.
pub fn dominant_frequency(samples: &[f32], sample_rate: usize) -> f64 {
    let fft_size = 8192.min(samples.len().next_power_of_two().max(2));
    let spectrum = magnitude_spectrum(samples, fft_size);
    if spectrum.is_empty() {
        return 0.0;
    }
    let half = spectrum.len() / 2;
    let (best_bin, _) = spectrum[..half]
        .iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        });
    best_bin as f64 * sample_rate as f64 / spectrum.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn tone(freq: f64, sample_rate: usize, samples: usize) -> Vec<f32> {
        (0..samples)
            .map(|n| (TAU * freq * n as f64 / sample_rate as f64).sin() as f32)
            .collect()
    }

    #[test]
    fn dominant_frequency_finds_the_tone() {
        let fs = 44_100;
        let audio = tone(1650.0, fs, 8192);
        let detected = dominant_frequency(&audio, fs);
        assert!(
            (detected - 1650.0).abs() < 10.0,
            "detected {} Hz",
            detected
        );
    }

    #[test]
    fn spectrum_length_matches_fft_size() {
        let audio = tone(1000.0, 44_100, 1000);
        let spectrum = magnitude_spectrum(&audio, 512);
        assert_eq!(spectrum.len(), 512);
    }

    #[test]
    fn empty_input_returns_empty() {
        assert!(magnitude_spectrum(&[], 512).is_empty());
        assert_eq!(dominant_frequency(&[], 44_100), 0.0);
    }
}
