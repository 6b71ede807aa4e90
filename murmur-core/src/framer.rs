//! Link-layer framing for the DSSS path.
//!
//! Wire layout, outermost first:
//!
//! ```text
//! PREAMBLE (alternating bits) | SYNC_WORD | BCH(HEADER) | FEC(PAYLOAD) | CRC-16
//! ```
//!
//! The header is three bytes — sequence number, frame type + FEC selector,
//! payload length — always protected by the small BCH code so the receiver
//! can learn the payload code before decoding it. The CRC-16 covers header
//! and payload bytes and rides uncoded after the coded payload: a corrupted
//! CRC surfaces as frame-absence, which is the recovery policy anyway.
//!
//! The decoder is a pure consumer of bit LLRs from the synchronizer; it
//! never reaches back into sync state.

use std::sync::Arc;

use crate::config::FramerConfig;
use crate::crc::crc16;
use crate::errors::FramingError;
use crate::fec::{FecCodeId, FecSuite};
use crate::logging::SignalLogger;
use crate::utils::{bytes_to_bits, hard_bit};

/// Alternating pattern one preamble period long.
const PREAMBLE_PATTERN: u16 = 0xAAAA;
const PREAMBLE_WINDOW_BITS: u32 = 16;
/// Bits allowed between a preamble hit and the sync word before the search
/// gives up (livelock guard).
const SYNC_WORD_LOOKAHEAD_BITS: u32 = 64;

const HEADER_BYTES: usize = 3;
const CRC_BITS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Control,
}

impl FrameType {
    pub fn to_wire(self) -> u8 {
        match self {
            FrameType::Data => 0,
            FrameType::Control => 1,
        }
    }

    pub fn from_wire(value: u8) -> Result<Self, FramingError> {
        match value {
            0 => Ok(FrameType::Data),
            1 => Ok(FrameType::Control),
            _ => Err(FramingError::UnknownFrameType { value }),
        }
    }
}

/// A decoded, CRC-clean frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub seq: u8,
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    seq: u8,
    frame_type: FrameType,
    fec: FecCodeId,
    payload_len: usize,
}

impl FrameHeader {
    fn to_bytes(self) -> [u8; HEADER_BYTES] {
        [
            self.seq,
            (self.frame_type.to_wire() << 4) | self.fec.to_wire(),
            self.payload_len as u8,
        ]
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, FramingError> {
        let frame_type = FrameType::from_wire(bytes[1] >> 4)?;
        let fec = FecCodeId::from_wire(bytes[1] & 0x0F)
            .map_err(|_| FramingError::UnknownFrameType { value: bytes[1] })?;
        Ok(Self {
            seq: bytes[0],
            frame_type,
            fec,
            payload_len: bytes[2] as usize,
        })
    }
}

/// Builds transmit frames as bit vectors ready for the spreader.
pub struct FrameEncoder {
    config: FramerConfig,
    fec: Arc<FecSuite>,
}

impl FrameEncoder {
    pub fn new(config: FramerConfig, fec: Arc<FecSuite>) -> Self {
        Self { config, fec }
    }

    /// Assemble one frame. Fails only on oversized payloads.
    pub fn build_frame(
        &self,
        seq: u8,
        frame_type: FrameType,
        payload: &[u8],
    ) -> Result<Vec<u8>, FramingError> {
        if payload.len() > u8::MAX as usize {
            return Err(FramingError::BadLength {
                length: payload.len(),
            });
        }
        let header = FrameHeader {
            seq,
            frame_type,
            fec: self.config.payload_fec,
            payload_len: payload.len(),
        };
        let header_bytes = header.to_bytes();

        let mut crc_input = Vec::with_capacity(HEADER_BYTES + payload.len());
        crc_input.extend_from_slice(&header_bytes);
        crc_input.extend_from_slice(payload);
        let crc = crc16(&crc_input);

        let mut bits = Vec::with_capacity(self.frame_bits(payload.len()));
        for i in 0..self.config.preamble_bits {
            bits.push(u8::from(i % 2 == 0));
        }
        bits.extend(bytes_to_bits(&self.config.sync_word));
        bits.extend(self.fec.encode(FecCodeId::BchSmall, &header_bytes));
        bits.extend(self.fec.encode(self.config.payload_fec, payload));
        bits.extend(bytes_to_bits(&crc.to_be_bytes()));
        Ok(bits)
    }

    /// Total frame length in bits for a payload size.
    pub fn frame_bits(&self, payload_len: usize) -> usize {
        self.config.preamble_bits
            + 16
            + self.fec.coded_bits_for(FecCodeId::BchSmall, HEADER_BYTES)
            + self.fec.coded_bits_for(self.config.payload_fec, payload_len)
            + CRC_BITS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    SearchingPreamble,
    SearchingSyncWord { bits_checked: u32 },
    ReadingHeader,
    ReadingPayload,
}

/// Streaming frame decoder over bit LLRs.
pub struct FrameDecoder {
    config: FramerConfig,
    fec: Arc<FecSuite>,
    state: DecoderState,
    /// Hard-bit shift register for preamble and sync-word search
    bit_window: u16,
    bits_in_window: u32,
    llr_buf: Vec<i8>,
    header: Option<FrameHeader>,
    consecutive_failures: u32,
    frames_decoded: u64,
    frames_failed: u64,
    logger: SignalLogger,
}

impl FrameDecoder {
    pub fn new(config: FramerConfig, fec: Arc<FecSuite>) -> Self {
        Self {
            config,
            fec,
            state: DecoderState::SearchingPreamble,
            bit_window: 0,
            bits_in_window: 0,
            llr_buf: Vec::with_capacity(4096),
            header: None,
            consecutive_failures: 0,
            frames_decoded: 0,
            frames_failed: 0,
            logger: SignalLogger::default(),
        }
    }

    /// False once `health_failure_threshold` consecutive frames have failed.
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures < self.config.health_failure_threshold
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn frames_failed(&self) -> u64 {
        self.frames_failed
    }

    pub fn logger_mut(&mut self) -> &mut SignalLogger {
        &mut self.logger
    }

    pub fn push_llrs(&mut self, llrs: &[i8], out: &mut Vec<DecodedFrame>) {
        for &llr in llrs {
            if let Some(frame) = self.push_llr(llr) {
                out.push(frame);
            }
        }
    }

    /// Consume one soft bit; returns a frame when one completes.
    pub fn push_llr(&mut self, llr: i8) -> Option<DecodedFrame> {
        match self.state {
            DecoderState::SearchingPreamble => {
                self.shift_bit(llr);
                if self.bits_in_window >= PREAMBLE_WINDOW_BITS
                    && self.preamble_correlation() >= self.config.preamble_threshold
                {
                    self.state = DecoderState::SearchingSyncWord { bits_checked: 0 };
                }
                None
            }
            DecoderState::SearchingSyncWord { bits_checked } => {
                self.shift_bit(llr);
                let sync_word = u16::from_be_bytes(self.config.sync_word);
                let distance = (self.bit_window ^ sync_word).count_ones();
                if distance <= self.config.max_sync_word_distance {
                    self.llr_buf.clear();
                    self.state = DecoderState::ReadingHeader;
                } else if bits_checked + 1 > SYNC_WORD_LOOKAHEAD_BITS {
                    self.logger.debug("FRAME", "sync word not found, resuming search");
                    self.restart_search();
                } else {
                    self.state = DecoderState::SearchingSyncWord {
                        bits_checked: bits_checked + 1,
                    };
                }
                None
            }
            DecoderState::ReadingHeader => {
                self.llr_buf.push(llr);
                let needed = self.fec.coded_bits_for(FecCodeId::BchSmall, HEADER_BYTES);
                if self.llr_buf.len() < needed {
                    return None;
                }
                match self.decode_header() {
                    Ok(header) => {
                        self.header = Some(header);
                        self.llr_buf.clear();
                        self.state = DecoderState::ReadingPayload;
                    }
                    Err(err) => {
                        self.logger.debug("FRAME", format!("header rejected: {}", err));
                        self.fail_frame();
                    }
                }
                None
            }
            DecoderState::ReadingPayload => {
                self.llr_buf.push(llr);
                let header = self.header.expect("set on header decode");
                let needed =
                    self.fec.coded_bits_for(header.fec, header.payload_len) + CRC_BITS;
                if self.llr_buf.len() < needed {
                    return None;
                }
                match self.decode_payload(&header) {
                    Ok(frame) => {
                        self.frames_decoded += 1;
                        self.consecutive_failures = 0;
                        self.restart_search();
                        Some(frame)
                    }
                    Err(err) => {
                        self.logger.debug("FRAME", format!("frame dropped: {}", err));
                        self.fail_frame();
                        None
                    }
                }
            }
        }
    }

    /// Return to initial state, clearing counters.
    pub fn reset(&mut self) {
        self.restart_search();
        self.consecutive_failures = 0;
        self.frames_decoded = 0;
        self.frames_failed = 0;
    }

    fn decode_header(&self) -> Result<FrameHeader, FramingError> {
        let bytes = self
            .fec
            .decode(FecCodeId::BchSmall, &self.llr_buf, HEADER_BYTES)
            .map_err(|_| FramingError::BadLength { length: 0 })?;
        FrameHeader::from_bytes(&bytes)
    }

    fn decode_payload(&self, header: &FrameHeader) -> Result<DecodedFrame, FramingError> {
        let payload_bits = self.fec.coded_bits_for(header.fec, header.payload_len);
        let payload = self
            .fec
            .decode(header.fec, &self.llr_buf[..payload_bits], header.payload_len)
            .map_err(|_| FramingError::BadLength {
                length: header.payload_len,
            })?;

        let mut rx_crc: u16 = 0;
        for &llr in &self.llr_buf[payload_bits..payload_bits + CRC_BITS] {
            rx_crc = (rx_crc << 1) | u16::from(hard_bit(llr));
        }

        let mut crc_input = Vec::with_capacity(HEADER_BYTES + payload.len());
        crc_input.extend_from_slice(&header.to_bytes());
        crc_input.extend_from_slice(&payload);
        let expected = crc16(&crc_input);
        if expected != rx_crc {
            return Err(FramingError::CrcMismatch {
                expected,
                actual: rx_crc,
            });
        }

        Ok(DecodedFrame {
            seq: header.seq,
            frame_type: header.frame_type,
            payload,
        })
    }

    fn fail_frame(&mut self) {
        self.frames_failed += 1;
        self.consecutive_failures += 1;
        self.restart_search();
    }

    fn restart_search(&mut self) {
        self.state = DecoderState::SearchingPreamble;
        self.bit_window = 0;
        self.bits_in_window = 0;
        self.llr_buf.clear();
        self.header = None;
    }

    fn shift_bit(&mut self, llr: i8) {
        self.bit_window = (self.bit_window << 1) | u16::from(hard_bit(llr));
        self.bits_in_window = self.bits_in_window.saturating_add(1);
    }

    /// Fraction of window bits matching the alternating pattern, taking the
    /// better of the two alignments.
    fn preamble_correlation(&self) -> f32 {
        let direct = PREAMBLE_WINDOW_BITS - (self.bit_window ^ PREAMBLE_PATTERN).count_ones();
        let inverted = PREAMBLE_WINDOW_BITS - (self.bit_window ^ !PREAMBLE_PATTERN).count_ones();
        direct.max(inverted) as f32 / PREAMBLE_WINDOW_BITS as f32
    }
}
