//! The streaming DSP processor driven by the host audio callback.
//!
//! All data flows through here: the host calls [`ModemProcessor::process_block`]
//! with fixed-size sample blocks, and the control side talks to it through
//! the message port (`handle_request`). Per-block work is bounded and the
//! steady-state path performs no allocation; buffers are sized at configure
//! time and reused.

pub mod config;

pub use config::{BackendConfig, ProcessorConfig};

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agc::Agc;
use crate::config::SystemConfig;
use crate::dsss::{make_tracker, DsssModulator, SyncTracker};
use crate::errors::ConfigError;
use crate::events::ModemEvent;
use crate::fec::FecSuite;
use crate::framer::{DecodedFrame, FrameDecoder, FrameEncoder, FrameType};
use crate::fsk::FskModem;
use crate::port::{PortMessage, Request, RequestBody, Response, ResponseBody};

/// Snapshot returned for `status` requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorStatus {
    pub configured: bool,
    pub backend: Option<String>,
    pub tx_pending_samples: usize,
    pub decoded_pending: usize,
    pub sync_locked: bool,
    pub estimated_snr_db: f64,
    pub framing_errors: u64,
    pub frames_decoded: u64,
    pub frames_failed: u64,
}

enum Backend {
    Fsk {
        modem: FskModem,
    },
    Dsss {
        modulator: DsssModulator,
        tracker: SyncTracker,
        encoder: FrameEncoder,
        decoder: FrameDecoder,
        tx_seq: u8,
    },
}

/// The canonical murmur data processor.
pub struct ModemProcessor {
    config: Option<ProcessorConfig>,
    backend: Option<Backend>,
    agc: Option<Agc>,
    tx_queue: VecDeque<f32>,
    /// FSK byte stream awaiting a demodulate request
    stream_bytes: Vec<u8>,
    /// DSSS frame payloads awaiting demodulate requests
    frames: VecDeque<Vec<u8>>,
    pending_demodulate: Option<String>,
    prev_locked: bool,
    rx_scratch: Vec<f32>,
    llr_scratch: Vec<i8>,
    frame_scratch: Vec<DecodedFrame>,
    byte_scratch: Vec<u8>,
}

impl ModemProcessor {
    pub fn new() -> Self {
        Self {
            config: None,
            backend: None,
            agc: None,
            tx_queue: VecDeque::new(),
            stream_bytes: Vec::new(),
            frames: VecDeque::new(),
            pending_demodulate: None,
            prev_locked: false,
            rx_scratch: Vec::with_capacity(SystemConfig::BLOCK_SIZE),
            llr_scratch: Vec::with_capacity(64),
            frame_scratch: Vec::with_capacity(4),
            byte_scratch: Vec::with_capacity(64),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn config(&self) -> Option<&ProcessorConfig> {
        self.config.as_ref()
    }

    /// Handle one control request, returning any messages to post back.
    pub fn handle_request(&mut self, request: Request) -> Vec<PortMessage> {
        let Request { id, body } = request;
        match body {
            RequestBody::Configure(config) => match self.apply_config(*config) {
                Ok(()) => vec![reply_ok(id)],
                Err(err) => vec![reply_error(id, err.to_string())],
            },
            RequestBody::Modulate { bytes } => self.handle_modulate(id, &bytes),
            RequestBody::Demodulate => self.handle_demodulate(id),
            RequestBody::Status => {
                vec![PortMessage::Reply(Response {
                    id,
                    body: ResponseBody::Status(Box::new(self.status())),
                })]
            }
            RequestBody::Reset => {
                self.reset();
                vec![reply_ok(id)]
            }
            RequestBody::Abort { target_id } => {
                if self.pending_demodulate.as_deref() == Some(target_id.as_str()) {
                    self.pending_demodulate = None;
                }
                vec![reply_ok(id)]
            }
        }
    }

    /// Process one audio block: demodulate `input`, fill `output` with
    /// pending transmit samples, satisfy a waiting demodulate request.
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) -> Vec<PortMessage> {
        let mut messages = Vec::new();

        if self.backend.is_some() {
            self.rx_scratch.clear();
            self.rx_scratch.extend_from_slice(input);
            if let Some(agc) = self.agc.as_mut() {
                agc.process_block(&mut self.rx_scratch);
            }

            match self.backend.as_mut().expect("checked above") {
                Backend::Fsk { modem } => {
                    self.byte_scratch.clear();
                    modem.demod_block(&self.rx_scratch, &mut self.byte_scratch);
                    if !self.byte_scratch.is_empty() {
                        messages.push(PortMessage::Event(ModemEvent::Demodulated {
                            bytes: self.byte_scratch.clone(),
                        }));
                        self.stream_bytes.extend_from_slice(&self.byte_scratch);
                    }
                }
                Backend::Dsss {
                    tracker, decoder, ..
                } => {
                    self.llr_scratch.clear();
                    tracker.push_block(&self.rx_scratch, &mut self.llr_scratch);

                    let locked = tracker.state().locked;
                    if locked != self.prev_locked {
                        self.prev_locked = locked;
                        let event = if locked {
                            ModemEvent::SyncAcquired {
                                sample_offset: tracker.state().sample_offset,
                                snr_db: tracker.state().estimated_snr_db,
                            }
                        } else {
                            ModemEvent::SyncLost
                        };
                        messages.push(PortMessage::Event(event));
                    }

                    self.frame_scratch.clear();
                    decoder.push_llrs(&self.llr_scratch, &mut self.frame_scratch);
                    for frame in self.frame_scratch.drain(..) {
                        messages.push(PortMessage::Event(ModemEvent::FrameDecoded {
                            seq: frame.seq,
                            payload: frame.payload.clone(),
                        }));
                        self.frames.push_back(frame.payload);
                    }
                }
            }
        }

        for slot in output.iter_mut() {
            *slot = self.tx_queue.pop_front().unwrap_or(0.0);
        }

        if self.pending_demodulate.is_some() {
            if let Some(bytes) = self.take_available() {
                let id = self.pending_demodulate.take().expect("checked above");
                messages.push(PortMessage::Reply(Response {
                    id,
                    body: ResponseBody::Bytes(bytes),
                }));
            }
        }

        messages
    }

    /// Pending transmit samples not yet pulled by the host.
    pub fn tx_pending(&self) -> usize {
        self.tx_queue.len()
    }

    pub fn status(&self) -> ProcessorStatus {
        let mut status = ProcessorStatus {
            configured: self.backend.is_some(),
            tx_pending_samples: self.tx_queue.len(),
            ..ProcessorStatus::default()
        };
        match &self.backend {
            Some(Backend::Fsk { modem }) => {
                status.backend = Some("fsk".into());
                status.decoded_pending = self.stream_bytes.len();
                status.framing_errors = modem.framing_errors();
            }
            Some(Backend::Dsss {
                tracker, decoder, ..
            }) => {
                status.backend = Some("dsss".into());
                status.decoded_pending = self.frames.len();
                status.sync_locked = tracker.state().locked;
                status.estimated_snr_db = tracker.state().estimated_snr_db;
                status.frames_decoded = decoder.frames_decoded();
                status.frames_failed = decoder.frames_failed();
            }
            None => {}
        }
        status
    }

    /// Return every component to its initial state without reallocation.
    /// Configuration is retained; a pending demodulate is dropped (its
    /// waiter was already failed on the control side).
    pub fn reset(&mut self) {
        self.tx_queue.clear();
        self.stream_bytes.clear();
        self.frames.clear();
        self.pending_demodulate = None;
        self.prev_locked = false;
        if let Some(agc) = self.agc.as_mut() {
            agc.reset(None);
        }
        match self.backend.as_mut() {
            Some(Backend::Fsk { modem }) => modem.reset(),
            Some(Backend::Dsss {
                modulator,
                tracker,
                decoder,
                tx_seq,
                ..
            }) => {
                modulator.reset();
                tracker.reset();
                decoder.reset();
                *tx_seq = 0;
            }
            None => {}
        }
    }

    fn apply_config(&mut self, config: ProcessorConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let backend = match &config.backend {
            BackendConfig::Fsk { tx, rx } => Backend::Fsk {
                modem: FskModem::new(tx.clone(), rx.clone()),
            },
            BackendConfig::Dsss { dsss, sync, framer } => {
                let fec = Arc::new(FecSuite::new());
                Backend::Dsss {
                    modulator: DsssModulator::new(dsss.clone())?,
                    tracker: make_tracker(dsss.clone(), sync.clone())?,
                    encoder: FrameEncoder::new(framer.clone(), Arc::clone(&fec)),
                    decoder: FrameDecoder::new(framer.clone(), fec),
                    tx_seq: 0,
                }
            }
        };

        self.agc = if config.agc_enabled {
            Some(Agc::new(config.agc.clone(), config.sample_rate()))
        } else {
            None
        };
        self.backend = Some(backend);
        self.config = Some(config);
        self.tx_queue.clear();
        self.stream_bytes.clear();
        self.frames.clear();
        self.pending_demodulate = None;
        self.prev_locked = false;
        Ok(())
    }

    fn handle_modulate(&mut self, id: String, bytes: &[u8]) -> Vec<PortMessage> {
        match self.backend.as_mut() {
            None => vec![reply_error(id, "Processor is not configured".into())],
            Some(Backend::Fsk { modem }) => {
                let audio = modem.modulate(bytes);
                self.tx_queue.extend(audio);
                vec![reply_ok(id)]
            }
            Some(Backend::Dsss {
                modulator,
                encoder,
                tx_seq,
                ..
            }) => {
                for chunk in bytes.chunks(u8::MAX as usize) {
                    let bits = match encoder.build_frame(*tx_seq, FrameType::Data, chunk) {
                        Ok(bits) => bits,
                        Err(err) => return vec![reply_error(id, err.to_string())],
                    };
                    *tx_seq = tx_seq.wrapping_add(1);
                    let audio = modulator.modulate_bits(&bits);
                    self.tx_queue.extend(audio);
                    // inter-frame gap so the tracker can flag the boundary
                    self.tx_queue
                        .extend(std::iter::repeat(0.0).take(SystemConfig::BLOCK_SIZE));
                }
                vec![reply_ok(id)]
            }
        }
    }

    fn handle_demodulate(&mut self, id: String) -> Vec<PortMessage> {
        if self.backend.is_none() {
            return vec![reply_error(id, "Processor is not configured".into())];
        }
        if self.pending_demodulate.is_some() {
            return vec![reply_error(id, "demodulate is already in flight".into())];
        }
        match self.take_available() {
            Some(bytes) => vec![PortMessage::Reply(Response {
                id,
                body: ResponseBody::Bytes(bytes),
            })],
            None => {
                self.pending_demodulate = Some(id);
                Vec::new()
            }
        }
    }

    fn take_available(&mut self) -> Option<Vec<u8>> {
        match self.backend.as_ref()? {
            Backend::Fsk { .. } => {
                if self.stream_bytes.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut self.stream_bytes))
                }
            }
            Backend::Dsss { .. } => self.frames.pop_front(),
        }
    }
}

impl Default for ModemProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn reply_ok(id: String) -> PortMessage {
    PortMessage::Reply(Response {
        id,
        body: ResponseBody::Ok,
    })
}

fn reply_error(id: String, message: String) -> PortMessage {
    PortMessage::Reply(Response {
        id,
        body: ResponseBody::Error { message },
    })
}
