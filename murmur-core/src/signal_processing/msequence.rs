//! Maximum-length sequence generation for the DSSS spreader.
//!
//! A Fibonacci LFSR with a primitive feedback polynomial produces the
//! spreading code. Supported lengths are 15, 31 and 63 (degrees 4..=6).

use crate::errors::ConfigError;

/// Feedback tap positions (1-based, highest first) per register degree.
/// Each pair encodes a primitive trinomial x^m + x^a + 1.
fn taps_for_degree(degree: u32) -> [u32; 2] {
    match degree {
        4 => [4, 3],
        5 => [5, 3],
        6 => [6, 5],
        _ => unreachable!("degree validated by caller"),
    }
}

fn degree_for_length(length: usize) -> Option<u32> {
    match length {
        15 => Some(4),
        31 => Some(5),
        63 => Some(6),
        _ => None,
    }
}

/// Generate one period of the m-sequence as 0/1 bits.
pub fn generate(length: usize, seed: u32) -> Result<Vec<u8>, ConfigError> {
    let degree = degree_for_length(length)
        .ok_or(ConfigError::InvalidSequenceLength { length })?;
    let taps = taps_for_degree(degree);
    let mask = (1u32 << degree) - 1;

    // an all-zero register never leaves the zero state
    let mut state = seed & mask;
    if state == 0 {
        state = 1;
    }

    let mut sequence = Vec::with_capacity(length);
    for _ in 0..length {
        sequence.push((state & 1) as u8);
        let feedback = ((state >> (taps[0] - 1)) ^ (state >> (taps[1] - 1))) & 1;
        state = (state >> 1) | (feedback << (degree - 1));
    }
    Ok(sequence)
}

/// Generate one period mapped to chips: bit 0 → +1, bit 1 → −1.
pub fn spreading_chips(length: usize, seed: u32) -> Result<Vec<i8>, ConfigError> {
    Ok(generate(length, seed)?
        .into_iter()
        .map(|bit| if bit == 0 { 1 } else { -1 })
        .collect())
}
