use proptest::prelude::*;

use murmur_core::buffer::RingBuffer;
use murmur_core::config::FskConfig;
use murmur_core::crc::{crc16, crc8};
use murmur_core::fec::{bch, ldpc::LdpcCode, FecCodeId, FecSuite};
use murmur_core::fsk::{FskDemodulator, FskModulator};
use murmur_core::utils::{bit_to_llr, bits_to_bytes, bytes_to_bits};

proptest! {
    /// Ring buffer length never exceeds capacity and lossy-head eviction
    /// matches a reference deque model.
    #[test]
    fn ring_buffer_matches_deque_model(
        capacity in 1usize..32,
        values in prop::collection::vec(any::<u8>(), 0..128),
    ) {
        let mut ring = RingBuffer::new(capacity);
        let mut model = std::collections::VecDeque::new();
        for &value in &values {
            ring.put(value);
            model.push_back(value);
            if model.len() > capacity {
                model.pop_front();
            }
            prop_assert!(ring.len() <= ring.capacity());
            prop_assert_eq!(ring.len(), model.len());
        }
        prop_assert_eq!(ring.to_vec(), model.into_iter().collect::<Vec<_>>());
    }

    /// Any single-bit flip changes both CRCs (linear codes have nonzero
    /// syndromes for weight-1 errors).
    #[test]
    fn crc_detects_single_bit_flips(
        payload in prop::collection::vec(any::<u8>(), 1..64),
        flip_byte in any::<prop::sample::Index>(),
        flip_bit in 0u8..8,
    ) {
        let mut corrupted = payload.clone();
        let index = flip_byte.index(corrupted.len());
        corrupted[index] ^= 1 << flip_bit;
        prop_assert_ne!(crc8(&payload), crc8(&corrupted));
        prop_assert_ne!(crc16(&payload), crc16(&corrupted));
    }

    /// Bit packing round-trips byte-for-byte.
    #[test]
    fn bit_packing_roundtrip(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        prop_assert_eq!(bits_to_bytes(&bytes_to_bits(&bytes)), bytes);
    }

    /// BCH(15,11) corrects any single flipped bit.
    #[test]
    fn bch_corrects_any_single_error(
        data_word in 0u16..(1 << 11),
        error_position in 0usize..15,
    ) {
        let mut data = [0u8; bch::DATA_BITS];
        for (i, slot) in data.iter_mut().enumerate() {
            *slot = ((data_word >> i) & 1) as u8;
        }
        let mut codeword = bch::encode_block(&data);
        codeword[error_position] ^= 1;
        let (decoded, corrected) = bch::decode_block(&codeword);
        prop_assert!(corrected);
        prop_assert_eq!(decoded, data);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Every LDPC codeword lies in the null space of the parity check,
    /// through the systematic conversion and its column permutation.
    #[test]
    fn ldpc_codewords_satisfy_parity(
        data in prop::collection::vec(0u8..=1, 64),
    ) {
        let code = LdpcCode::new(128, 64, 0x6D75_726D).unwrap();
        let codeword = code.encode(&data);
        prop_assert!(code.check(&codeword));
    }

    /// A single flipped information bit is always recovered.
    #[test]
    fn ldpc_recovers_single_information_error(
        data in prop::collection::vec(0u8..=1, 64),
        position in any::<prop::sample::Index>(),
    ) {
        let code = LdpcCode::new(128, 64, 0x6D75_726D).unwrap();
        let mut codeword = code.encode(&data);
        let flip = code.column_permutation()[position.index(64)];
        codeword[flip] ^= 1;
        let llrs: Vec<i8> = codeword.iter().map(|&b| bit_to_llr(b, 24)).collect();
        prop_assert_eq!(code.decode(&llrs).unwrap(), data);
    }

    /// Suite-level byte round trip for every declared code.
    #[test]
    fn fec_suite_roundtrip(
        payload in prop::collection::vec(any::<u8>(), 1..24),
    ) {
        let suite = FecSuite::new();
        for code in [FecCodeId::BchSmall, FecCodeId::Ldpc128, FecCodeId::Ldpc256] {
            let coded = suite.encode(code, &payload);
            let llrs: Vec<i8> = coded.iter().map(|&b| bit_to_llr(b, 24)).collect();
            prop_assert_eq!(suite.decode(code, &llrs, payload.len()).unwrap(), payload.clone());
        }
    }

    /// Noiseless FSK loopback returns exactly the transmitted bytes.
    #[test]
    fn fsk_roundtrip_arbitrary_bytes(
        message in prop::collection::vec(any::<u8>(), 1..4),
    ) {
        let config = FskConfig::default();
        let mut modulator = FskModulator::new(config.clone());
        let audio = modulator.modulate(&message);
        let mut demodulator = FskDemodulator::new(config);
        let mut out = Vec::new();
        demodulator.demod_block(&audio, &mut out);
        prop_assert_eq!(out, message);
    }
}
