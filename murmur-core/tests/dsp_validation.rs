//! End-to-end validation of the DSP pipelines against their wire contracts.

use murmur_core::agc::Agc;
use murmur_core::channel::{apply_awgn, noise_std_for_snr_db};
use murmur_core::config::{AgcConfig, FskConfig};
use murmur_core::fsk::{FskDemodulator, FskModulator};
use murmur_core::signal_processing::spectrum::dominant_frequency;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn fsk_loopback(bytes: &[u8], noise_snr_db: Option<f64>) -> (Vec<u8>, u64) {
    let config = FskConfig::default();
    let mut modulator = FskModulator::new(config.clone());
    let mut audio = modulator.modulate(bytes);

    if let Some(snr_db) = noise_snr_db {
        let mut rng = ChaCha8Rng::seed_from_u64(0xF5C);
        apply_awgn(&mut audio, noise_std_for_snr_db(snr_db, 0.5), &mut rng);
    }

    let mut demodulator = FskDemodulator::new(config);
    let mut out = Vec::new();
    demodulator.demod_block(&audio, &mut out);
    (out, demodulator.framing_errors())
}

#[test]
fn fsk_one_byte_loopback() {
    // 0x48 at 300 baud / 44.1 kHz: exactly one byte, no framing errors
    let (received, framing_errors) = fsk_loopback(&[0x48], None);
    assert_eq!(received, vec![0x48]);
    assert_eq!(framing_errors, 0);
}

#[test]
fn fsk_message_loopback() {
    let message = b"acoustic coupling at 300 baud";
    let (received, _) = fsk_loopback(message, None);
    assert_eq!(received, message.to_vec());
}

#[test]
fn fsk_survives_moderate_noise() {
    let message = [0x5A, 0x00, 0xFF, 0x13];
    let (received, _) = fsk_loopback(&message, Some(25.0));
    assert_eq!(received, message.to_vec());
}

#[test]
fn idle_carrier_sits_on_the_mark_tone() {
    let config = FskConfig {
        silence_pad_ms: 0.0,
        ..FskConfig::default()
    };
    let mut modulator = FskModulator::new(config.clone());
    // no data: pre- and post-carrier are pure mark
    let audio = modulator.modulate(&[]);
    let detected = dominant_frequency(&audio, config.sample_rate);
    assert!(
        (detected - config.mark_freq_hz).abs() < 20.0,
        "dominant tone {} Hz",
        detected
    );
}

#[test]
fn space_heavy_byte_shows_the_space_tone() {
    let config = FskConfig {
        pre_carrier_ms: 0.0,
        post_carrier_ms: 0.0,
        silence_pad_ms: 0.0,
        ..FskConfig::default()
    };
    let mut modulator = FskModulator::new(config.clone());
    // 0x00: one start bit plus eight space bits against 1.5 mark stop bits
    let audio = modulator.modulate(&[0x00, 0x00, 0x00]);
    let detected = dominant_frequency(&audio, config.sample_rate);
    assert!(
        (detected - config.space_freq_hz).abs() < 20.0,
        "dominant tone {} Hz",
        detected
    );
}

#[test]
fn agc_converges_within_ten_blocks() {
    // stream 10 blocks of constant amplitude 1.5 at target 0.5
    let mut agc = Agc::new(AgcConfig::default(), 44_100);
    let mut final_sample = 0.0f32;
    for _ in 0..10 {
        let mut block = [1.5f32; 128];
        agc.process_block(&mut block);
        final_sample = block[127];
    }
    assert!(
        (final_sample.abs() - 0.5).abs() < 0.1,
        "final output {}",
        final_sample
    );
}

#[test]
fn modulated_output_length_is_deterministic() {
    let config = FskConfig::default();
    let mut first = FskModulator::new(config.clone());
    let mut second = FskModulator::new(config);
    assert_eq!(
        first.modulate(&[1, 2, 3]).len(),
        second.modulate(&[1, 2, 3]).len()
    );
}
