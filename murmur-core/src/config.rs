//! Configuration types for the murmur modem stack.
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::errors::ConfigError;
use crate::fec::FecCodeId;

/// System-wide constants shared by every pipeline.
pub struct SystemConfig;

impl SystemConfig {
    /// Audio sample rate in Hz
    pub const SAMPLE_RATE: usize = 44_100;

    /// Host audio block size in samples (the host may choose differently;
    /// this is the size the realtime budget is sized for)
    pub const BLOCK_SIZE: usize = 128;
}

/// Binary FSK wire parameters for one direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FskConfig {
    pub sample_rate: usize,
    pub baud_rate: usize,
    /// Tone for bit 1 (idle / stop bits)
    pub mark_freq_hz: f64,
    /// Tone for bit 0 (start bit)
    pub space_freq_hz: f64,
    pub start_bits: usize,
    /// Fractional stop bits are allowed (1.5 is the classic default)
    pub stop_bits: f64,
    /// Demodulator decimation factor before the byte framer
    pub downsample: usize,
    /// Dead band around zero for the discriminator sign decision
    pub threshold: f64,
    /// Unmodulated mark carrier emitted before the first byte, in milliseconds
    pub pre_carrier_ms: f64,
    /// Mark carrier held after the last byte, in milliseconds
    pub post_carrier_ms: f64,
    /// True silence padding both ends of a transmission, in milliseconds
    pub silence_pad_ms: f64,
}

impl Default for FskConfig {
    fn default() -> Self {
        Self::low_channel()
    }
}

impl FskConfig {
    /// Forward-direction tone pair (1650/1850 Hz).
    pub fn low_channel() -> Self {
        Self {
            sample_rate: SystemConfig::SAMPLE_RATE,
            baud_rate: 300,
            mark_freq_hz: 1650.0,
            space_freq_hz: 1850.0,
            start_bits: 1,
            stop_bits: 1.5,
            downsample: 8,
            threshold: 1e-5,
            pre_carrier_ms: 50.0,
            post_carrier_ms: 50.0,
            silence_pad_ms: 20.0,
        }
    }

    /// Reverse-direction tone pair (980/1180 Hz) so both sides can transmit
    /// simultaneously without duplex echo cancellation.
    pub fn high_channel() -> Self {
        Self {
            mark_freq_hz: 980.0,
            space_freq_hz: 1180.0,
            ..Self::low_channel()
        }
    }

    /// Midpoint of the tone pair; the demodulator mixes against this.
    pub fn center_freq_hz(&self) -> f64 {
        (self.mark_freq_hz + self.space_freq_hz) / 2.0
    }

    pub fn samples_per_bit(&self) -> f64 {
        self.sample_rate as f64 / self.baud_rate as f64
    }

    /// Samples produced for one modulated byte, including start and stop bits.
    pub fn samples_per_byte(&self) -> usize {
        let bits = self.start_bits as f64 + 8.0 + self.stop_bits;
        (bits * self.samples_per_bit()).round() as usize
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate {
                rate: self.sample_rate,
            });
        }
        if self.baud_rate == 0 || self.baud_rate > self.sample_rate {
            return Err(ConfigError::InvalidBaudRate {
                baud: self.baud_rate,
            });
        }
        let top = self.mark_freq_hz.max(self.space_freq_hz);
        if top * 2.0 > self.sample_rate as f64 {
            return Err(ConfigError::NyquistViolation {
                freq_hz: top,
                min_required_hz: top * 2.0,
                actual_hz: self.sample_rate as f64,
            });
        }
        Ok(())
    }
}

/// DSSS-DPSK wire parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsssConfig {
    pub sample_rate: usize,
    pub carrier_freq_hz: f64,
    /// Samples emitted per chip
    pub samples_per_phase: usize,
    /// Spreading sequence length; must be 2^k - 1 for k in 4..=6
    pub sequence_length: usize,
    /// LFSR initial state for the m-sequence generator
    pub lfsr_seed: u32,
    /// Normalized correlation required for sync acquisition
    pub correlation_threshold: f64,
    /// Peak over mean-of-non-peaks required for sync acquisition
    pub peak_to_noise_ratio: f64,
}

impl Default for DsssConfig {
    fn default() -> Self {
        Self {
            sample_rate: SystemConfig::SAMPLE_RATE,
            carrier_freq_hz: 10_000.0,
            samples_per_phase: 23,
            sequence_length: 31,
            lfsr_seed: 0b10101,
            correlation_threshold: 0.5,
            peak_to_noise_ratio: 4.0,
        }
    }
}

impl DsssConfig {
    /// Samples carrying one spread data bit.
    pub fn samples_per_bit(&self) -> usize {
        self.sequence_length * self.samples_per_phase
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate {
                rate: self.sample_rate,
            });
        }
        if !matches!(self.sequence_length, 15 | 31 | 63) {
            return Err(ConfigError::InvalidSequenceLength {
                length: self.sequence_length,
            });
        }
        if self.carrier_freq_hz * 2.0 > self.sample_rate as f64 {
            return Err(ConfigError::NyquistViolation {
                freq_hz: self.carrier_freq_hz,
                min_required_hz: self.carrier_freq_hz * 2.0,
                actual_hz: self.sample_rate as f64,
            });
        }
        Ok(())
    }
}

/// Thresholds driving the SEARCH/TRACK/VERIFY synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// |LLR| below this counts as a weak bit
    pub weak_llr_threshold: i8,
    /// Consecutive weak bits before sync is declared lost
    pub max_consecutive_weak: u32,
    /// Rolling-average LLR magnitude below this triggers a local resync
    pub resync_threshold: f32,
    /// Bits between periodic VERIFY checks
    pub verify_interval_bits: u32,
    /// Minimum wall-clock spacing between full SEARCH correlations
    pub min_sync_interval_ms: u64,
    /// Sample span (+/-) scanned during a local resync
    pub local_resync_span: usize,
    /// Looser correlation threshold used only for local resync
    pub resync_correlation_threshold: f64,
    /// Correlation mapped to 0 dB
    pub snr_min_correlation: f64,
    /// Correlation mapped to `snr_range_db`
    pub snr_max_correlation: f64,
    pub snr_range_db: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            weak_llr_threshold: 8,
            max_consecutive_weak: 5,
            resync_threshold: 16.0,
            verify_interval_bits: 64,
            min_sync_interval_ms: 100,
            local_resync_span: 200,
            resync_correlation_threshold: 0.35,
            snr_min_correlation: 0.3,
            snr_max_correlation: 1.0,
            snr_range_db: 20.0,
        }
    }
}

/// Automatic gain control parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgcConfig {
    /// Target envelope level in (0, 1]
    pub target: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub gain_min: f32,
    pub gain_max: f32,
    /// Exponent applied to the error term per sample; smaller is smoother
    pub error_exponent: f32,
    /// Envelope level below which the gain is held (keeps silence from
    /// winding the gain up to `gain_max`)
    pub silence_floor: f32,
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            target: 0.5,
            attack_ms: 2.0,
            release_ms: 50.0,
            gain_min: 0.1,
            gain_max: 10.0,
            error_exponent: 0.05,
            silence_floor: 1e-4,
        }
    }
}

impl AgcConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target > 0.0 && self.target <= 1.0) {
            return Err(ConfigError::InvalidAgcTarget {
                target: self.target,
            });
        }
        Ok(())
    }
}

/// Link-layer framer parameters for the DSSS path.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramerConfig {
    /// Alternating bit pattern length used for bit-sync refinement
    pub preamble_bits: usize,
    /// Normalized preamble correlation required before sync-word search
    pub preamble_threshold: f32,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub sync_word: [u8; 2],
    /// Accepted Hamming distance when matching the sync word
    pub max_sync_word_distance: u32,
    /// FEC code applied to the payload (the header always uses the small BCH)
    pub payload_fec: FecCodeId,
    /// Consecutive failed frames before `is_healthy` reports false
    pub health_failure_threshold: u32,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            preamble_bits: 32,
            preamble_threshold: 0.75,
            sync_word: [0xEB, 0x90],
            max_sync_word_distance: 2,
            payload_fec: FecCodeId::Ldpc128,
            health_failure_threshold: 3,
        }
    }
}

/// XMODEM transport parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Data bytes per packet
    pub max_payload_size: usize,
    /// Per-packet reply timeout for the sender
    pub timeout_ms: u64,
    pub max_retries: u32,
    /// Inter-packet timeout for the receiver; sized generously because a full
    /// packet takes seconds at acoustic baud rates
    pub receive_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 128,
            timeout_ms: 3000,
            max_retries: 10,
            receive_timeout_ms: 20_000,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload_size == 0 || self.max_payload_size > 255 {
            return Err(ConfigError::InvalidPayloadSize {
                size: self.max_payload_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fsk_defaults_match_wire_parameters() {
        let cfg = FskConfig::default();
        assert_eq!(cfg.mark_freq_hz, 1650.0);
        assert_eq!(cfg.space_freq_hz, 1850.0);
        assert_eq!(cfg.baud_rate, 300);
        assert_eq!(cfg.center_freq_hz(), 1750.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn fsk_samples_per_byte_counts_framing_bits() {
        let cfg = FskConfig::default();
        // 1 start + 8 data + 1.5 stop bits at 147 samples/bit
        let expected = (10.5 * cfg.samples_per_bit()).round() as usize;
        assert_eq!(cfg.samples_per_byte(), expected);
    }

    #[test]
    fn dsss_defaults_match_wire_parameters() {
        let cfg = DsssConfig::default();
        assert_eq!(cfg.samples_per_bit(), 31 * 23);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn nyquist_violation_detected() {
        let cfg = FskConfig {
            sample_rate: 3000,
            ..FskConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NyquistViolation { .. })
        ));
    }

    #[test]
    fn sequence_length_must_be_mersenne() {
        let cfg = DsssConfig {
            sequence_length: 30,
            ..DsssConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn configs_roundtrip_through_toml() {
        let cfg = FramerConfig::default();
        let text = toml::to_string(&cfg).unwrap();
        let back: FramerConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.sync_word, cfg.sync_word);
        assert_eq!(back.preamble_bits, cfg.preamble_bits);
    }
}
