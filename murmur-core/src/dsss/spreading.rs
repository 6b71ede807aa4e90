//! Spreading and soft despreading against the m-sequence.

use num_complex::Complex64;

use crate::utils::saturate_llr;

/// Spread data bits into chips: each bit is XORed with the sequence and
/// mapped 0 → +1, 1 → −1, so a 1 bit inverts every chip of the period.
pub fn spread(bits: &[u8], sequence: &[i8]) -> Vec<i8> {
    let mut chips = Vec::with_capacity(bits.len() * sequence.len());
    for &bit in bits {
        if bit & 1 == 0 {
            chips.extend_from_slice(sequence);
        } else {
            chips.extend(sequence.iter().map(|&c| -c));
        }
    }
    chips
}

/// Soft-combine one bit period of differential chip products against the
/// sequence. `soft_gain` is the SNR-derived scale (2/σ²) applied before
/// saturation; positive output means bit 0.
pub fn despread(diffs: &[Complex64], sequence: &[i8], soft_gain: f64) -> i8 {
    debug_assert_eq!(diffs.len(), sequence.len());
    let mut correlation = 0.0f64;
    let mut energy = 0.0f64;
    for (d, &chip) in diffs.iter().zip(sequence.iter()) {
        correlation += d.re * f64::from(chip);
        energy += d.re.abs();
    }
    if energy <= f64::EPSILON {
        return 0;
    }
    // normalized quality in [-1, 1], scaled by channel confidence
    saturate_llr(correlation / energy * soft_gain)
}

/// Soft-combining gain from an SNR estimate, the usual 2/σ² with σ² for a
/// unit-power signal.
pub fn soft_gain_for_snr_db(snr_db: f64) -> f64 {
    let noise_variance = 10f64.powf(-snr_db / 10.0);
    2.0 / noise_variance
}
