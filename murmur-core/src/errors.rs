//! Murmur error types with granular categories

use thiserror::Error;

/// Top-level error type for all murmur operations
#[derive(Debug, Error)]
pub enum ModemError {
    #[error("Port error: {0}")]
    Port(#[from] PortError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("FEC error: {0}")]
    Fec(#[from] FecError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("DSP processing error: {0}")]
    Dsp(#[from] DspError),
}

/// Errors raised at the control/DSP message-port boundary
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Processor is not configured")]
    NotConfigured,

    #[error("{operation} is already in flight")]
    Busy { operation: &'static str },

    #[error("{operation} aborted")]
    Aborted { operation: &'static str },

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("DataChannel reset")]
    Reset,

    #[error("Send to processor failed: {reason}")]
    SendFailed { reason: String },

    #[error("Unknown message type: {message_type}")]
    UnknownMessage { message_type: String },

    #[error("Processor rejected configure: {reason}")]
    ConfigureRejected { reason: String },
}

/// Transport-level (XMODEM) errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport is busy: {state}")]
    Busy { state: &'static str },

    #[error("Timed out waiting for {expected} after {waited_ms} ms")]
    Timeout { expected: &'static str, waited_ms: u64 },

    #[error("Max retries exceeded after {retries} attempts")]
    MaxRetriesExceeded { retries: u32 },

    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    #[error("Cancelled by remote")]
    Cancelled,

    #[error("Transport reset")]
    Reset,

    #[error("sendData aborted")]
    SendAborted,

    #[error("receiveData aborted")]
    ReceiveAborted,

    #[error("Underlying channel failed: {0}")]
    Channel(#[from] PortError),
}

/// Bit/byte framing errors
///
/// These are recovered silently inside the DSP layers (drop and resync); they
/// only surface through counters and log entries.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("Start bit vote failed at sample {sample_index}")]
    FalseStart { sample_index: u64 },

    #[error("Sync lost after {weak_bits} consecutive weak bits")]
    SyncLost { weak_bits: u32 },

    #[error("Frame CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },

    #[error("Header declared invalid payload length {length}")]
    BadLength { length: usize },

    #[error("Sync word not matched within Hamming distance {max_distance}")]
    SyncWordMismatch { max_distance: u32 },

    #[error("Unknown frame type {value}")]
    UnknownFrameType { value: u8 },
}

/// Forward-error-correction errors
#[derive(Debug, Error)]
pub enum FecError {
    #[error("Codeword length {actual} does not match code ({expected})")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Decoder did not converge after {iterations} iterations")]
    ConvergenceFailed { iterations: usize },

    #[error("Uncorrectable error pattern in {code}")]
    Uncorrectable { code: &'static str },

    #[error("Singular matrix: cannot reduce parity check to systematic form")]
    SingularMatrix,

    #[error("Unknown FEC code id {id}")]
    UnknownCode { id: u8 },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid sample rate: {rate} Hz (must be > 0)")]
    InvalidSampleRate { rate: usize },

    #[error("Nyquist violation: {freq_hz} Hz requires sample rate > {min_required_hz} Hz, got {actual_hz} Hz")]
    NyquistViolation {
        freq_hz: f64,
        min_required_hz: f64,
        actual_hz: f64,
    },

    #[error("Invalid baud rate: {baud} (must be > 0 and <= sample rate)")]
    InvalidBaudRate { baud: usize },

    #[error("Invalid spreading sequence length {length}: must be 2^k - 1 for k in 4..=6")]
    InvalidSequenceLength { length: usize },

    #[error("AGC target {target} out of range (0, 1]")]
    InvalidAgcTarget { target: f32 },

    #[error("Invalid payload size {size}: must be in 1..=255")]
    InvalidPayloadSize { size: usize },
}

/// DSP processing errors
#[derive(Debug, Error)]
pub enum DspError {
    #[error("Buffer underrun: requested {requested}, available {available}")]
    BufferUnderrun { requested: usize, available: usize },

    #[error("Ring buffer index {index} out of range for length {length}")]
    IndexOutOfRange { index: isize, length: usize },

    #[error("Remove from empty ring buffer")]
    Empty,

    #[error("Filter design failed: {reason}")]
    FilterDesignFailed { reason: String },
}

/// Result type alias for murmur operations
pub type Result<T> = std::result::Result<T, ModemError>;
