mod config;
mod logging;
mod telemetry;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use murmur_core::channel::ChannelSim;
use murmur_core::config::SystemConfig;
use murmur_core::loopback::LoopbackLink;
use murmur_core::port::{DataChannel, Request, RequestBody};
use murmur_core::processor::{BackendConfig, ModemProcessor, ProcessorConfig};
use murmur_core::xmodem::XmodemTransport;

use config::CliConfig;
use logging::{LogEvent, StructuredLogger};
use telemetry::TelemetryAggregator;

#[derive(Parser, Debug)]
#[command(author, version, about = "Murmur acoustic modem", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Modulate a message into a WAV file
    Encode {
        /// Message to encode
        #[arg(short, long)]
        message: String,

        /// Output WAV path (overrides config)
        #[arg(short = 'w', long)]
        wav: Option<PathBuf>,

        /// Use the DSSS physical layer instead of FSK
        #[arg(long)]
        dsss: bool,
    },

    /// Run an XMODEM transfer across the simulated loopback link
    Transfer {
        /// Message to transfer
        #[arg(short, long)]
        message: Option<String>,

        /// Transfer a generated payload of this many bytes instead
        #[arg(long)]
        size: Option<usize>,

        /// Channel SNR in dB (omit for a clean channel)
        #[arg(long)]
        snr_db: Option<f64>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    let config = match &args.config {
        Some(path) => CliConfig::from_file(path)
            .wrap_err_with(|| format!("Failed to load config from {}", path.display()))?,
        None => CliConfig::default(),
    };

    match args.command {
        Command::Encode { message, wav, dsss } => run_encode(config, &message, wav, dsss),
        Command::Transfer {
            message,
            size,
            snr_db,
        } => run_transfer(config, message, size, snr_db),
    }
}

fn run_encode(
    config: CliConfig,
    message: &str,
    wav: Option<PathBuf>,
    dsss: bool,
) -> Result<()> {
    let mut logger = StructuredLogger::new(config.terminal.logging.clone())?;

    let processor_config = if dsss {
        ProcessorConfig::dsss()
    } else {
        config.processor.clone()
    };
    let sample_rate = processor_config.sample_rate();

    let wav_path = wav
        .or(config.terminal.wav_output)
        .ok_or_else(|| eyre!("No WAV output path: pass --wav or set terminal.wav_output"))?;

    logger.info(format!(
        "Encoding {} bytes at {} Hz to {}",
        message.len(),
        sample_rate,
        wav_path.display()
    ))?;

    let audio = render_waveform(&processor_config, message.as_bytes())?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&wav_path, spec)?;
    for &sample in &audio {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    logger.info(format!(
        "Wrote {} samples ({:.2}s) to {}",
        audio.len(),
        audio.len() as f64 / sample_rate as f64,
        wav_path.display()
    ))?;
    Ok(())
}

/// Drive a processor directly to render the transmit waveform.
fn render_waveform(config: &ProcessorConfig, bytes: &[u8]) -> Result<Vec<f32>> {
    let mut processor = ModemProcessor::new();
    let replies = processor.handle_request(Request {
        id: "encode-configure".into(),
        body: RequestBody::Configure(Box::new(config.clone())),
    });
    expect_ok(&replies).wrap_err("processor rejected configuration")?;

    let replies = processor.handle_request(Request {
        id: "encode-modulate".into(),
        body: RequestBody::Modulate {
            bytes: bytes.to_vec(),
        },
    });
    expect_ok(&replies).wrap_err("modulate failed")?;

    let silence = vec![0.0f32; SystemConfig::BLOCK_SIZE];
    let mut block = vec![0.0f32; SystemConfig::BLOCK_SIZE];
    let mut audio = Vec::with_capacity(processor.tx_pending());
    while processor.tx_pending() > 0 {
        processor.process_block(&silence, &mut block);
        audio.extend_from_slice(&block);
    }
    Ok(audio)
}

fn expect_ok(messages: &[murmur_core::port::PortMessage]) -> Result<()> {
    use murmur_core::port::{PortMessage, ResponseBody};
    match messages.first() {
        Some(PortMessage::Reply(reply)) => match &reply.body {
            ResponseBody::Ok => Ok(()),
            ResponseBody::Error { message } => Err(eyre!(message.clone())),
            _ => Err(eyre!("unexpected reply")),
        },
        _ => Err(eyre!("no reply from processor")),
    }
}

fn run_transfer(
    config: CliConfig,
    message: Option<String>,
    size: Option<usize>,
    snr_db: Option<f64>,
) -> Result<()> {
    let logger = Arc::new(Mutex::new(StructuredLogger::new(
        config.terminal.logging.clone(),
    )?));

    let payload: Vec<u8> = match (message, size) {
        (Some(text), _) => text.into_bytes(),
        (None, Some(n)) => (0..n).map(|i| (i * 31 + 7) as u8).collect(),
        (None, None) => b"The quick brown fox jumps over the lazy dog".to_vec(),
    };

    let (chan_ab, chan_ba) = match snr_db {
        Some(snr) => (
            ChannelSim::with_snr_db(snr, 1),
            ChannelSim::with_snr_db(snr, 2),
        ),
        None => (ChannelSim::clean(), ChannelSim::clean()),
    };

    let (_link, mut port_a, mut port_b) = LoopbackLink::spawn(chan_ab, chan_ba);
    port_a
        .configure(&config.processor)
        .map_err(|e| eyre!("side A configure: {}", e))?;
    port_b
        .configure(&mirror(&config.processor))
        .map_err(|e| eyre!("side B configure: {}", e))?;

    let total_packets =
        payload.len().div_ceil(config.transport.max_payload_size).max(1) as u64;
    let progress = ProgressBar::new(total_packets);
    progress.set_style(
        ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] {bar:30} {pos}/{len} packets {msg}",
        )
        .expect("static template"),
    );

    {
        let mut log = logger.lock().unwrap();
        log.log(LogEvent::Info {
            message: format!(
                "Transferring {} bytes in {} packets (snr: {})",
                payload.len(),
                total_packets,
                snr_db.map_or("clean".to_string(), |v| format!("{} dB", v)),
            ),
        })?;
    }

    let mut sender = XmodemTransport::new(port_a, config.transport.clone());
    let sender_stats = sender.stats();
    let telemetry_stats = sender.stats();
    let mut receiver = XmodemTransport::new(port_b, config.transport.clone());
    let receiver_stats = receiver.stats();

    let payload_for_send = payload.clone();
    let sender_thread = thread::spawn(move || sender.send_data(&payload_for_send, None));

    let telemetry_stop = Arc::new(AtomicBool::new(false));
    let telemetry_flag = Arc::clone(&telemetry_stop);
    let telemetry_logger = Arc::clone(&logger);
    let interval = config.terminal.telemetry_interval_secs;
    let telemetry_progress = progress.clone();
    let telemetry_thread = thread::spawn(move || {
        let mut aggregator = TelemetryAggregator::new(interval);
        while !telemetry_flag.load(Ordering::SeqCst) {
            telemetry_progress.set_position(receiver_stats.snapshot().packets_received);
            let snapshot = telemetry_stats.snapshot();
            if let Some(event) = aggregator.update(snapshot, true, 0.0) {
                let _ = telemetry_logger
                    .lock()
                    .unwrap()
                    .log(LogEvent::Telemetry(event));
            }
            thread::sleep(Duration::from_millis(100));
        }
        aggregator.finish()
    });

    let received = receiver.receive_data(None);
    let send_result = sender_thread.join().expect("sender thread panicked");
    telemetry_stop.store(true, Ordering::SeqCst);
    let statistics = telemetry_thread.join().expect("telemetry thread panicked");
    progress.finish_and_clear();

    let mut log = logger.lock().unwrap();
    send_result.map_err(|e| eyre!("send failed: {}", e))?;
    let received = received.map_err(|e| eyre!("receive failed: {}", e))?;

    if received != payload {
        log.log(LogEvent::Error {
            message: "payload mismatch after transfer".into(),
            details: Some(format!(
                "sent {} bytes, received {}",
                payload.len(),
                received.len()
            )),
        })?;
        return Err(eyre!("transfer corrupted the payload"));
    }

    log.log(LogEvent::Statistics(statistics))?;
    let final_stats = sender_stats.snapshot();
    if final_stats.packets_retransmitted > 0 {
        log.log(LogEvent::Warn {
            message: format!(
                "{} packets needed retransmission",
                final_stats.packets_retransmitted
            ),
        })?;
    }
    let elapsed = log.elapsed();
    log.log(LogEvent::Info {
        message: format!(
            "Transfer complete: {} bytes verified, {} packets sent in {:.2}s",
            received.len(),
            final_stats.packets_sent,
            elapsed,
        ),
    })?;
    Ok(())
}

/// Swap transmit and receive tone pairs for the answering side.
fn mirror(config: &ProcessorConfig) -> ProcessorConfig {
    let mut mirrored = config.clone();
    if let BackendConfig::Fsk { tx, rx } = &mut mirrored.backend {
        std::mem::swap(tx, rx);
    }
    mirrored
}
