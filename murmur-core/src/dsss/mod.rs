//! DSSS-DPSK physical layer: m-sequence spreading, differential phase
//! modulation on a carrier, sliding-correlator acquisition and soft
//! despreading.

pub mod carrier;
pub mod spreading;
pub mod sync;

pub use sync::{find_sync_offset, SyncMode, SyncReport, SyncState, SyncTracker};

use crate::config::{DsssConfig, SyncConfig};
use crate::dsss::carrier::DpskModulator;
use crate::dsss::spreading::spread;
use crate::errors::ConfigError;
use crate::signal_processing::msequence::spreading_chips;

/// Unmodulated chips ahead of the first data bit: differential reference for
/// the correlator plus AGC settling time.
pub const LEAD_IN_CHIPS: usize = 8;
/// Unmodulated chips after the last data bit so its final chip is never
/// truncated at the receiver.
pub const TAIL_CHIPS: usize = 2;

/// The spreading sequence for a configuration, as ±1 chips.
pub fn spreading_sequence(config: &DsssConfig) -> Result<Vec<i8>, ConfigError> {
    config.validate()?;
    spreading_chips(config.sequence_length, config.lfsr_seed)
}

/// Transmit side: bits → chips → phases → samples.
pub struct DsssModulator {
    sequence: Vec<i8>,
    dpsk: DpskModulator,
}

impl DsssModulator {
    pub fn new(config: DsssConfig) -> Result<Self, ConfigError> {
        let sequence = spreading_sequence(&config)?;
        Ok(Self {
            sequence,
            dpsk: DpskModulator::new(config),
        })
    }

    /// Modulate data bits into samples, wrapped in lead-in and tail chips.
    pub fn modulate_bits(&mut self, bits: &[u8]) -> Vec<f32> {
        let mut audio = Vec::new();
        self.dpsk.modulate_chips(&[1i8; LEAD_IN_CHIPS], &mut audio);
        let chips = spread(bits, &self.sequence);
        self.dpsk.modulate_chips(&chips, &mut audio);
        self.dpsk.modulate_chips(&[1i8; TAIL_CHIPS], &mut audio);
        audio
    }

    pub fn reset(&mut self) {
        self.dpsk.reset();
    }
}

/// Receive side for a configuration: a SEARCH/TRACK/VERIFY tracker over the
/// same spreading sequence.
pub fn make_tracker(
    config: DsssConfig,
    sync_config: SyncConfig,
) -> Result<SyncTracker, ConfigError> {
    let sequence = spreading_sequence(&config)?;
    Ok(SyncTracker::new(config, sync_config, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_per_bit_invariant() {
        let config = DsssConfig::default();
        let mut modulator = DsssModulator::new(config.clone()).unwrap();
        let bits = [0u8, 1, 1, 0];
        let audio = modulator.modulate_bits(&bits);
        let expected = (bits.len() * config.sequence_length + LEAD_IN_CHIPS + TAIL_CHIPS)
            * config.samples_per_phase;
        assert_eq!(audio.len(), expected);
    }

    #[test]
    fn modulator_rejects_bad_config() {
        let config = DsssConfig {
            sequence_length: 12,
            ..DsssConfig::default()
        };
        assert!(DsssModulator::new(config).is_err());
    }

    #[test]
    fn end_to_end_bits_survive_block_processing() {
        let config = DsssConfig::default();
        let bits = [1u8, 0, 1, 1, 0, 0, 1, 0, 1, 1];
        let mut modulator = DsssModulator::new(config.clone()).unwrap();
        let audio = modulator.modulate_bits(&bits);

        let mut tracker = make_tracker(config, SyncConfig::default()).unwrap();
        let mut soft = Vec::new();
        for block in audio.chunks(128) {
            tracker.push_block(block, &mut soft);
        }

        let decoded: Vec<u8> = soft.iter().map(|&l| u8::from(l < 0)).collect();
        let tail = decoded.len().min(bits.len());
        assert!(tail >= bits.len() - 1);
        assert_eq!(&decoded[decoded.len() - tail..], &bits[bits.len() - tail..]);
    }
}
