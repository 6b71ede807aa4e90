//! Murmur core library
//!
//! An acoustic data-modem stack: streaming DSP pipelines that turn byte
//! streams into audible waveforms and back, plus the framing and transport
//! layers that carry those bytes reliably over a lossy channel.
//!
//! Two interchangeable physical layers are provided — continuous-phase
//! binary FSK with per-byte start/stop framing, and DSSS-DPSK with
//! m-sequence spreading and a SEARCH/TRACK/VERIFY synchronizer feeding a
//! FEC-protected framer. On top sits an XMODEM-style stop-and-wait
//! transport over an abstract data channel.
//!
//! The realtime entry point is [`processor::ModemProcessor`], driven by the
//! host with fixed-size sample blocks; the control side talks to it through
//! the message port in [`port`].

pub mod agc;
pub mod buffer;
pub mod channel;
pub mod config;
pub mod crc;
pub mod dsss;
pub mod errors;
pub mod events;
pub mod fec;
pub mod framer;
pub mod fsk;
pub mod logging;
pub mod loopback;
pub mod port;
pub mod processor;
pub mod signal_processing;
pub mod utils;
pub mod xmodem;

// Re-export the canonical processor interface
pub use port::{AbortHandle, DataChannel, ProcessorPort};
pub use processor::{ModemProcessor, ProcessorConfig, ProcessorStatus};
pub use xmodem::{TransportStats, TransportStatsSnapshot, XmodemTransport};
