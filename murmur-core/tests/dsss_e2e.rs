//! End-to-end DSSS scenarios: framed multi-frame streams through the
//! synchronizer and framer, and acquisition robustness.

use std::sync::Arc;

use murmur_core::config::{DsssConfig, FramerConfig, SyncConfig};
use murmur_core::dsss::{make_tracker, DsssModulator};
use murmur_core::fec::FecSuite;
use murmur_core::framer::{DecodedFrame, FrameDecoder, FrameEncoder, FrameType};

struct DsssPipeline {
    modulator: DsssModulator,
    encoder: FrameEncoder,
}

impl DsssPipeline {
    fn new(fec: Arc<FecSuite>) -> Self {
        Self {
            modulator: DsssModulator::new(DsssConfig::default()).unwrap(),
            encoder: FrameEncoder::new(FramerConfig::default(), fec),
        }
    }

    fn frame_audio(&mut self, seq: u8, payload: &[u8]) -> Vec<f32> {
        let bits = self
            .encoder
            .build_frame(seq, FrameType::Data, payload)
            .unwrap();
        self.modulator.modulate_bits(&bits)
    }
}

fn decode_stream(audio: &[f32], fec: Arc<FecSuite>) -> Vec<DecodedFrame> {
    let mut tracker =
        make_tracker(DsssConfig::default(), SyncConfig::default()).unwrap();
    let mut decoder = FrameDecoder::new(FramerConfig::default(), fec);

    let mut frames = Vec::new();
    let mut soft = Vec::new();
    for block in audio.chunks(128) {
        soft.clear();
        tracker.push_block(block, &mut soft);
        decoder.push_llrs(&soft, &mut frames);
    }
    // flush: silence lets the tracker finish buffered bits
    let silence = vec![0.0f32; 128];
    for _ in 0..200 {
        soft.clear();
        tracker.push_block(&silence, &mut soft);
        decoder.push_llrs(&soft, &mut frames);
    }
    frames
}

#[test]
fn three_frame_stream_decodes_in_order() {
    let fec = Arc::new(FecSuite::new());
    let mut pipeline = DsssPipeline::new(Arc::clone(&fec));

    let payloads: [&[u8]; 3] = [&[0x01, 0x02], &[0x03, 0x04, 0x05], &[0x06]];
    let mut audio = Vec::new();
    for (seq, payload) in payloads.iter().enumerate() {
        audio.extend(pipeline.frame_audio(seq as u8, payload));
        // inter-frame silent gap
        audio.extend(std::iter::repeat(0.0).take(500));
    }

    let frames = decode_stream(&audio, fec);
    assert_eq!(frames.len(), 3, "decoded {:?}", frames);
    for (seq, frame) in frames.iter().enumerate() {
        assert_eq!(frame.seq, seq as u8);
        assert_eq!(frame.payload, payloads[seq].to_vec());
    }
}

#[test]
fn false_peak_does_not_prevent_the_real_frame() {
    let fec = Arc::new(FecSuite::new());
    let mut pipeline = DsssPipeline::new(Arc::clone(&fec));

    // a weak correlated burst: a few spread bits at 5% amplitude, enough
    // for the amplitude-normalized correlator to lock onto
    let mut decoy = DsssModulator::new(DsssConfig::default()).unwrap();
    let weak: Vec<f32> = decoy
        .modulate_bits(&[1, 0, 1, 0, 1, 1, 0, 0])
        .into_iter()
        .map(|s| s * 0.05)
        .collect();

    let payload = [0xCA, 0xFE];
    let mut audio = weak;
    audio.extend(std::iter::repeat(0.0).take(2000));
    audio.extend(pipeline.frame_audio(0, &payload));

    let frames = decode_stream(&audio, fec);
    assert!(
        frames.iter().any(|f| f.payload == payload),
        "true frame not decoded: {:?}",
        frames
    );
}

#[test]
fn large_payload_spans_multiple_fec_blocks() {
    let fec = Arc::new(FecSuite::new());
    let mut pipeline = DsssPipeline::new(Arc::clone(&fec));

    let payload: Vec<u8> = (0u8..48).collect();
    let audio = pipeline.frame_audio(9, &payload);

    let frames = decode_stream(&audio, fec);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].seq, 9);
    assert_eq!(frames[0].payload, payload);
}
