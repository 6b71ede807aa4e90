//! Simulated full-duplex link between two processors.
//!
//! A worker thread stands in for the host audio graph: it pumps fixed-size
//! blocks through both processors, routes each side's output through the
//! channel simulation into the other side's input, and services both message
//! ports. Faster than real time, which is exactly what the transfer tests
//! and the CLI want.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::channel::ChannelSim;
use crate::config::SystemConfig;
use crate::port::{port_pair, ProcessorEndpoint, ProcessorPort};
use crate::processor::ModemProcessor;

pub struct LoopbackLink {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LoopbackLink {
    /// Spawn the pump thread; returns the control-side ports for both ends.
    pub fn spawn(
        a_to_b: ChannelSim,
        b_to_a: ChannelSim,
    ) -> (Self, ProcessorPort, ProcessorPort) {
        let (port_a, endpoint_a) = port_pair("a");
        let (port_b, endpoint_b) = port_pair("b");
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || {
            run_link(endpoint_a, endpoint_b, a_to_b, b_to_a, flag);
        });
        (
            Self {
                shutdown,
                handle: Some(handle),
            },
            port_a,
            port_b,
        )
    }
}

impl Drop for LoopbackLink {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_link(
    endpoint_a: ProcessorEndpoint,
    endpoint_b: ProcessorEndpoint,
    mut chan_a_to_b: ChannelSim,
    mut chan_b_to_a: ChannelSim,
    shutdown: Arc<AtomicBool>,
) {
    const BLOCK: usize = SystemConfig::BLOCK_SIZE;

    let mut proc_a = ModemProcessor::new();
    let mut proc_b = ModemProcessor::new();
    let mut a_to_b = vec![0.0f32; BLOCK];
    let mut b_to_a = vec![0.0f32; BLOCK];
    let mut out_a = vec![0.0f32; BLOCK];
    let mut out_b = vec![0.0f32; BLOCK];

    while !shutdown.load(Ordering::SeqCst) {
        let mut had_control = false;
        while let Some(request) = endpoint_a.try_recv() {
            had_control = true;
            for message in proc_a.handle_request(request) {
                endpoint_a.send(message);
            }
        }
        while let Some(request) = endpoint_b.try_recv() {
            had_control = true;
            for message in proc_b.handle_request(request) {
                endpoint_b.send(message);
            }
        }

        for message in proc_a.process_block(&b_to_a, &mut out_a) {
            endpoint_a.send(message);
        }
        for message in proc_b.process_block(&a_to_b, &mut out_b) {
            endpoint_b.send(message);
        }

        chan_a_to_b.process_block(&mut out_a);
        a_to_b.copy_from_slice(&out_a);
        chan_b_to_a.process_block(&mut out_b);
        b_to_a.copy_from_slice(&out_b);

        // still much faster than real time, without spinning a core while
        // both directions are silent
        if !had_control && proc_a.tx_pending() == 0 && proc_b.tx_pending() == 0 {
            thread::sleep(Duration::from_micros(200));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::DataChannel;
    use crate::processor::ProcessorConfig;

    #[test]
    fn bytes_cross_the_link() {
        let (_link, mut port_a, mut port_b) =
            LoopbackLink::spawn(ChannelSim::clean(), ChannelSim::clean());

        port_a
            .configure(&ProcessorConfig::fsk_duplex(true))
            .unwrap();
        port_b
            .configure(&ProcessorConfig::fsk_duplex(false))
            .unwrap();

        // demodulate resolves with whatever bytes are buffered, so short
        // reads accumulate until the message is complete
        let read_n = |port: &mut ProcessorPort, n: usize| {
            let mut received = Vec::new();
            while received.len() < n {
                received.extend(port.demodulate(Duration::from_secs(20), None).unwrap());
            }
            received
        };

        port_a.modulate(b"ping", None).unwrap();
        assert_eq!(read_n(&mut port_b, 4), b"ping".to_vec());

        // and the reverse direction on the other tone pair
        port_b.modulate(b"pong", None).unwrap();
        assert_eq!(read_n(&mut port_a, 4), b"pong".to_vec());
    }

    #[test]
    fn link_survives_noise() {
        let (_link, mut port_a, mut port_b) = LoopbackLink::spawn(
            ChannelSim::with_snr_db(25.0, 7),
            ChannelSim::with_snr_db(25.0, 8),
        );

        port_a
            .configure(&ProcessorConfig::fsk_duplex(true))
            .unwrap();
        port_b
            .configure(&ProcessorConfig::fsk_duplex(false))
            .unwrap();

        port_a.modulate(&[0x42], None).unwrap();
        // an unsquelched receiver may frame stray bytes out of channel
        // noise; the payload byte must still come through
        let deadline = std::time::Instant::now() + Duration::from_secs(30);
        let mut seen = Vec::new();
        while !seen.contains(&0x42) {
            assert!(std::time::Instant::now() < deadline, "received {:?}", seen);
            seen.extend(port_b.demodulate(Duration::from_secs(10), None).unwrap());
        }
    }
}
