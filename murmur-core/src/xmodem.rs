//! XMODEM-style packet transport over an abstract data channel.
//!
//! Stop-and-wait with one outstanding packet: `SOH | seq | ~seq | payload | CRC8`,
//! ACK/NAK flow control, bounded retries, EOT close. The payload of the
//! final chunk is padded with EOF (0x1A) per the XMODEM convention and the
//! padding is stripped again on the receive side.
//!
//! The channel may deliver bytes in arbitrary chunks and may interleave
//! noise-framed garbage; both ends scan the stream rather than trusting
//! array boundaries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use atomic_float::AtomicF64;
use serde::{Deserialize, Serialize};

use crate::config::TransportConfig;
use crate::errors::{PortError, TransportError};
use crate::events::{EventEmitter, ModemEvent};
use crate::port::{AbortHandle, DataChannel};

pub const SOH: u8 = 0x01;
pub const EOT: u8 = 0x04;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
pub const CAN: u8 = 0x18;
pub const EOF_PAD: u8 = 0x1A;

/// Packet counters, updated atomically on each packet event so a monitoring
/// thread can snapshot them mid-transfer.
#[derive(Debug, Default)]
pub struct TransportStats {
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    packets_retransmitted: AtomicU64,
    packets_dropped: AtomicU64,
    bytes_transferred: AtomicU64,
    error_rate: AtomicF64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TransportStatsSnapshot {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_retransmitted: u64,
    pub packets_dropped: u64,
    pub bytes_transferred: u64,
    pub error_rate: f64,
}

impl TransportStats {
    fn on_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::SeqCst);
        self.update_error_rate();
    }

    fn on_received(&self, payload_bytes: u64) {
        self.packets_received.fetch_add(1, Ordering::SeqCst);
        self.bytes_transferred.fetch_add(payload_bytes, Ordering::SeqCst);
        self.update_error_rate();
    }

    fn on_delivered(&self, payload_bytes: u64) {
        self.bytes_transferred.fetch_add(payload_bytes, Ordering::SeqCst);
    }

    fn on_retransmitted(&self) {
        self.packets_retransmitted.fetch_add(1, Ordering::SeqCst);
        self.update_error_rate();
    }

    fn on_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::SeqCst);
        self.update_error_rate();
    }

    fn update_error_rate(&self) {
        let good = self.packets_sent.load(Ordering::SeqCst)
            + self.packets_received.load(Ordering::SeqCst);
        let bad = self.packets_retransmitted.load(Ordering::SeqCst)
            + self.packets_dropped.load(Ordering::SeqCst);
        let rate = bad as f64 / (good + bad).max(1) as f64;
        self.error_rate.store(rate, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::SeqCst),
            packets_received: self.packets_received.load(Ordering::SeqCst),
            packets_retransmitted: self.packets_retransmitted.load(Ordering::SeqCst),
            packets_dropped: self.packets_dropped.load(Ordering::SeqCst),
            bytes_transferred: self.bytes_transferred.load(Ordering::SeqCst),
            error_rate: self.error_rate.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Sending,
    Receiving,
    EotPending,
}

impl TransportState {
    fn name(self) -> &'static str {
        match self {
            TransportState::Idle => "IDLE",
            TransportState::Sending => "SENDING",
            TransportState::Receiving => "RECEIVING",
            TransportState::EotPending => "EOT_PENDING",
        }
    }
}

enum Incoming {
    Packet {
        seq: u8,
        complement: u8,
        payload: Vec<u8>,
        crc: u8,
    },
    Eot,
    Cancel,
}

/// Sequenced byte-stream transport over any [`DataChannel`].
pub struct XmodemTransport<C: DataChannel> {
    channel: C,
    config: TransportConfig,
    state: TransportState,
    stats: Arc<TransportStats>,
    events: EventEmitter,
    rx_stream: Vec<u8>,
}

impl<C: DataChannel> XmodemTransport<C> {
    pub fn new(channel: C, config: TransportConfig) -> Self {
        Self {
            channel,
            config,
            state: TransportState::Idle,
            stats: Arc::new(TransportStats::default()),
            events: EventEmitter::new(),
            rx_stream: Vec::new(),
        }
    }

    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }

    /// Listener registry for per-packet events.
    pub fn events_mut(&mut self) -> &mut EventEmitter {
        &mut self.events
    }

    fn emit_packet(&mut self, kind: &'static str, seq: u8) {
        self.events
            .emit("packet", &ModemEvent::Packet { kind, seq });
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Reject any in-flight operation and return to IDLE.
    pub fn reset(&mut self) -> Result<(), TransportError> {
        self.state = TransportState::Idle;
        self.rx_stream.clear();
        self.channel.reset().map_err(TransportError::Channel)
    }

    /// Send a byte stream as sequenced packets, waiting for an ACK per
    /// packet and closing with EOT.
    pub fn send_data(
        &mut self,
        bytes: &[u8],
        abort: Option<&AbortHandle>,
    ) -> Result<(), TransportError> {
        if self.state != TransportState::Idle {
            return Err(TransportError::Busy {
                state: self.state.name(),
            });
        }
        self.state = TransportState::Sending;
        let result = self.send_inner(bytes, abort);
        self.state = TransportState::Idle;
        result
    }

    fn send_inner(
        &mut self,
        bytes: &[u8],
        abort: Option<&AbortHandle>,
    ) -> Result<(), TransportError> {
        let payload_size = self.config.max_payload_size;

        // an empty send still emits one padded packet so the peer observes
        // an explicit end of stream
        let chunks: Vec<&[u8]> = if bytes.is_empty() {
            vec![&[]]
        } else {
            bytes.chunks(payload_size).collect()
        };

        // classic XMODEM: the receiver solicits with a NAK before the first
        // packet. Wait for it, but tolerate a peer that comes up late - its
        // solicit will then be absorbed by the per-packet reply scan.
        match self.await_control(self.config.timeout_ms, abort) {
            Ok(CAN) => return Err(TransportError::Cancelled),
            Ok(_) | Err(TransportError::Timeout { .. }) => {}
            Err(other) => return Err(other),
        }

        let mut seq: u8 = 1;
        for chunk in chunks {
            let packet = build_packet(seq, chunk, payload_size);
            self.deliver_with_retries(&packet, abort)?;
            self.stats.on_delivered(chunk.len() as u64);
            seq = seq.wrapping_add(1);
        }

        self.state = TransportState::EotPending;
        self.deliver_with_retries(&[EOT], abort)?;
        Ok(())
    }

    /// Transmit `packet` until the peer ACKs it, honoring the retry budget.
    fn deliver_with_retries(
        &mut self,
        packet: &[u8],
        abort: Option<&AbortHandle>,
    ) -> Result<(), TransportError> {
        let seq = if packet[0] == SOH { packet[1] } else { 0 };
        let mut attempts: u32 = 0;
        loop {
            if attempts > 0 {
                self.stats.on_retransmitted();
                self.emit_packet("retransmitted", seq);
            }
            self.channel
                .modulate(packet, abort)
                .map_err(|e| map_port_error(e, TransportError::SendAborted))?;
            self.stats.on_sent();
            self.emit_packet("sent", seq);

            match self.await_control(self.config.timeout_ms, abort) {
                Ok(ACK) => return Ok(()),
                Ok(CAN) => return Err(TransportError::Cancelled),
                Ok(_nak) => {}
                Err(TransportError::Timeout { .. }) => {}
                Err(other) => return Err(other),
            }

            attempts += 1;
            if attempts > self.config.max_retries {
                return Err(TransportError::MaxRetriesExceeded {
                    retries: self.config.max_retries,
                });
            }
        }
    }

    /// Receive a complete stream: solicit with NAK, validate each packet,
    /// terminate on EOT.
    pub fn receive_data(&mut self, abort: Option<&AbortHandle>) -> Result<Vec<u8>, TransportError> {
        if self.state != TransportState::Idle {
            return Err(TransportError::Busy {
                state: self.state.name(),
            });
        }
        self.state = TransportState::Receiving;
        let result = self.receive_inner(abort);
        self.state = TransportState::Idle;
        result
    }

    fn receive_inner(&mut self, abort: Option<&AbortHandle>) -> Result<Vec<u8>, TransportError> {
        // classic XMODEM: the receiver speaks first
        self.send_control(NAK, abort)?;

        let mut assembled = Vec::new();
        let mut expected_seq: u8 = 1;
        let mut solicits: u32 = 0;

        loop {
            match self.await_packet(self.config.receive_timeout_ms, abort) {
                Ok(Incoming::Eot) => {
                    self.send_control(ACK, abort)?;
                    strip_eof_padding(&mut assembled);
                    return Ok(assembled);
                }
                Ok(Incoming::Cancel) => return Err(TransportError::Cancelled),
                Ok(Incoming::Packet {
                    seq,
                    complement,
                    payload,
                    crc,
                }) => {
                    if complement != !seq || seq != expected_seq || crc8_packet(&payload) != crc {
                        self.stats.on_dropped();
                        self.emit_packet("dropped", seq);
                        self.send_control(NAK, abort)?;
                        continue;
                    }
                    self.stats.on_received(payload.len() as u64);
                    self.emit_packet("received", seq);
                    assembled.extend_from_slice(&payload);
                    expected_seq = expected_seq.wrapping_add(1);
                    self.send_control(ACK, abort)?;
                }
                Err(TransportError::Timeout { .. }) => {
                    solicits += 1;
                    if solicits > self.config.max_retries {
                        return Err(TransportError::MaxRetriesExceeded {
                            retries: self.config.max_retries,
                        });
                    }
                    self.send_control(NAK, abort)?;
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn send_control(&mut self, byte: u8, abort: Option<&AbortHandle>) -> Result<(), TransportError> {
        self.channel
            .modulate(&[byte], abort)
            .map_err(|e| map_port_error(e, TransportError::ReceiveAborted))
    }

    /// Scan the incoming stream for the next ACK/NAK/CAN, discarding noise.
    /// A late ACK that arrives after a retransmission was scheduled is still
    /// consumed here.
    fn await_control(
        &mut self,
        timeout_ms: u64,
        abort: Option<&AbortHandle>,
    ) -> Result<u8, TransportError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some(position) = self
                .rx_stream
                .iter()
                .position(|&b| b == ACK || b == NAK || b == CAN)
            {
                let byte = self.rx_stream[position];
                self.rx_stream.drain(..=position);
                return Ok(byte);
            }
            self.fill_rx_stream(deadline, abort, TransportError::SendAborted, "reply")?;
        }
    }

    /// Scan the incoming stream for the next SOH packet, EOT or CAN.
    fn await_packet(
        &mut self,
        timeout_ms: u64,
        abort: Option<&AbortHandle>,
    ) -> Result<Incoming, TransportError> {
        let packet_len = 3 + self.config.max_payload_size + 1;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some(position) = self
                .rx_stream
                .iter()
                .position(|&b| b == SOH || b == EOT || b == CAN)
            {
                self.rx_stream.drain(..position);
                match self.rx_stream[0] {
                    EOT => {
                        self.rx_stream.drain(..1);
                        return Ok(Incoming::Eot);
                    }
                    CAN => {
                        self.rx_stream.drain(..1);
                        return Ok(Incoming::Cancel);
                    }
                    _soh => {
                        if self.rx_stream.len() >= packet_len {
                            let packet: Vec<u8> =
                                self.rx_stream.drain(..packet_len).collect();
                            return Ok(Incoming::Packet {
                                seq: packet[1],
                                complement: packet[2],
                                payload: packet[3..packet_len - 1].to_vec(),
                                crc: packet[packet_len - 1],
                            });
                        }
                        // partial packet: fall through and read more
                    }
                }
            }
            self.fill_rx_stream(deadline, abort, TransportError::ReceiveAborted, "packet")?;
        }
    }

    fn fill_rx_stream(
        &mut self,
        deadline: Instant,
        abort: Option<&AbortHandle>,
        abort_error: TransportError,
        expected: &'static str,
    ) -> Result<(), TransportError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransportError::Timeout {
                expected,
                waited_ms: 0,
            });
        }
        match self.channel.demodulate(remaining, abort) {
            Ok(bytes) => {
                self.rx_stream.extend(bytes);
                Ok(())
            }
            Err(PortError::Timeout { .. }) => Err(TransportError::Timeout {
                expected,
                waited_ms: remaining.as_millis() as u64,
            }),
            Err(err) => Err(map_port_error(err, abort_error)),
        }
    }
}

fn map_port_error(err: PortError, abort_error: TransportError) -> TransportError {
    match err {
        PortError::Aborted { .. } => abort_error,
        PortError::Reset => TransportError::Reset,
        other => TransportError::Channel(other),
    }
}

fn build_packet(seq: u8, chunk: &[u8], payload_size: usize) -> Vec<u8> {
    let mut payload = chunk.to_vec();
    payload.resize(payload_size, EOF_PAD);
    let crc = crc8_packet(&payload);

    let mut packet = Vec::with_capacity(3 + payload_size + 1);
    packet.push(SOH);
    packet.push(seq);
    packet.push(!seq);
    packet.extend_from_slice(&payload);
    packet.push(crc);
    packet
}

/// CRC-8 over the payload bytes only.
fn crc8_packet(payload: &[u8]) -> u8 {
    crate::crc::crc8(payload)
}

fn strip_eof_padding(bytes: &mut Vec<u8>) {
    while bytes.last() == Some(&EOF_PAD) {
        bytes.pop();
    }
}
