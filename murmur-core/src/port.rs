//! Message port between the control side and the streaming DSP processor.
//!
//! Requests carry a unique id; exactly one reply (result or error) is
//! expected per id. Unsolicited events carry no id and bypass the pending
//! operation. Messages travel over ordered crossbeam channels: the control
//! side blocks with a timeout while the host pumps the processor.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::errors::PortError;
use crate::events::{EventEmitter, ModemEvent};
use crate::processor::{ProcessorConfig, ProcessorStatus};

/// Polling slice while blocked on a reply; keeps abort/reset latency low.
const WAIT_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct Request {
    pub id: String,
    pub body: RequestBody,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Configure(Box<ProcessorConfig>),
    Modulate { bytes: Vec<u8> },
    Demodulate,
    Status,
    Reset,
    Abort { target_id: String },
}

#[derive(Debug, Clone)]
pub struct Response {
    pub id: String,
    pub body: ResponseBody,
}

#[derive(Debug, Clone)]
pub enum ResponseBody {
    Ok,
    Bytes(Vec<u8>),
    Status(Box<ProcessorStatus>),
    Error { message: String },
}

/// Port messages are either id-correlated replies or unsolicited, tagged
/// events from the realtime side.
#[derive(Debug, Clone)]
pub enum PortMessage {
    Reply(Response),
    Event(ModemEvent),
}

/// Cooperative cancellation for a single control-side operation.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Abstract byte channel between the transport and a DSP pipeline.
///
/// Both the FSK and DSSS pipelines sit behind this trait via
/// [`ProcessorPort`]; tests substitute scripted implementations.
pub trait DataChannel {
    fn configure(&mut self, config: &ProcessorConfig) -> Result<(), PortError>;

    /// Encode and emit `bytes`; returns once the processor has accepted the
    /// whole waveform for playout.
    fn modulate(&mut self, bytes: &[u8], abort: Option<&AbortHandle>) -> Result<(), PortError>;

    /// Resolve with the next available byte array.
    fn demodulate(
        &mut self,
        timeout: Duration,
        abort: Option<&AbortHandle>,
    ) -> Result<Vec<u8>, PortError>;

    /// Cancel in-flight work on both sides of the port.
    fn reset(&mut self) -> Result<(), PortError>;

    fn is_ready(&self) -> bool;
}

/// Control-side endpoint: correlates requests with replies by id, fanning
/// unsolicited events out to registered listeners.
pub struct ProcessorPort {
    requests: Sender<Request>,
    messages: Receiver<PortMessage>,
    instance: String,
    next_id: AtomicU64,
    reset_epoch: Arc<AtomicU64>,
    configured: bool,
    events: Vec<ModemEvent>,
    emitter: EventEmitter,
}

/// Processor-side endpoint, owned by whoever pumps the realtime loop.
pub struct ProcessorEndpoint {
    pub requests: Receiver<Request>,
    pub messages: Sender<PortMessage>,
}

impl ProcessorEndpoint {
    pub fn try_recv(&self) -> Option<Request> {
        self.requests.try_recv().ok()
    }

    pub fn send(&self, message: PortMessage) {
        // the control side may already be gone during teardown
        let _ = self.messages.send(message);
    }
}

/// A connected port pair. `instance` prefixes generated request ids.
pub fn port_pair(instance: &str) -> (ProcessorPort, ProcessorEndpoint) {
    let (request_tx, request_rx) = unbounded();
    let (message_tx, message_rx) = unbounded();
    (
        ProcessorPort {
            requests: request_tx,
            messages: message_rx,
            instance: instance.to_string(),
            next_id: AtomicU64::new(0),
            reset_epoch: Arc::new(AtomicU64::new(0)),
            configured: false,
            events: Vec::new(),
            emitter: EventEmitter::new(),
        },
        ProcessorEndpoint {
            requests: request_rx,
            messages: message_tx,
        },
    )
}

/// Triggers a port reset from another thread, failing the blocked operation.
#[derive(Clone)]
pub struct PortResetHandle {
    requests: Sender<Request>,
    reset_epoch: Arc<AtomicU64>,
    instance: String,
}

impl PortResetHandle {
    pub fn reset(&self) {
        self.reset_epoch.fetch_add(1, Ordering::SeqCst);
        let _ = self.requests.send(Request {
            id: format!("{}-reset", self.instance),
            body: RequestBody::Reset,
        });
    }
}

impl ProcessorPort {
    pub fn reset_handle(&self) -> PortResetHandle {
        PortResetHandle {
            requests: self.requests.clone(),
            reset_epoch: Arc::clone(&self.reset_epoch),
            instance: self.instance.clone(),
        }
    }

    /// Events received while waiting for replies, in arrival order.
    pub fn take_events(&mut self) -> Vec<ModemEvent> {
        std::mem::take(&mut self.events)
    }

    /// Listener registry invoked synchronously as events arrive.
    pub fn emitter_mut(&mut self) -> &mut EventEmitter {
        &mut self.emitter
    }

    pub fn status(&mut self, timeout: Duration) -> Result<ProcessorStatus, PortError> {
        let id = self.send_request(RequestBody::Status)?;
        match self.wait_reply(&id, "status", timeout, None)? {
            ResponseBody::Status(status) => Ok(*status),
            other => Err(unexpected("status", &other)),
        }
    }

    fn send_request(&self, body: RequestBody) -> Result<String, PortError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("{}-{}", self.instance, n);
        self.requests
            .send(Request {
                id: id.clone(),
                body,
            })
            .map_err(|e| PortError::SendFailed {
                reason: e.to_string(),
            })?;
        Ok(id)
    }

    fn post_abort(&self, target_id: &str) {
        let _ = self.requests.send(Request {
            id: format!("{}-abort", self.instance),
            body: RequestBody::Abort {
                target_id: target_id.to_string(),
            },
        });
    }

    fn wait_reply(
        &mut self,
        id: &str,
        operation: &'static str,
        timeout: Duration,
        abort: Option<&AbortHandle>,
    ) -> Result<ResponseBody, PortError> {
        let deadline = Instant::now() + timeout;
        let epoch = self.reset_epoch.load(Ordering::SeqCst);
        loop {
            if let Some(handle) = abort {
                if handle.is_aborted() {
                    self.post_abort(id);
                    return Err(PortError::Aborted { operation });
                }
            }
            if self.reset_epoch.load(Ordering::SeqCst) != epoch {
                return Err(PortError::Reset);
            }

            let slice = WAIT_SLICE.min(deadline.saturating_duration_since(Instant::now()));
            match self.messages.recv_timeout(slice) {
                Ok(PortMessage::Reply(reply)) if reply.id == id => return Ok(reply.body),
                // stale reply for an operation we already gave up on
                Ok(PortMessage::Reply(_)) => {}
                Ok(PortMessage::Event(event)) => {
                    self.emitter.emit(event.name(), &event);
                    self.events.push(event);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if Instant::now() >= deadline {
                        self.post_abort(id);
                        return Err(PortError::Timeout { operation });
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PortError::SendFailed {
                        reason: "processor endpoint closed".into(),
                    })
                }
            }
        }
    }
}

fn unexpected(operation: &'static str, body: &ResponseBody) -> PortError {
    match body {
        ResponseBody::Error { message } => PortError::SendFailed {
            reason: format!("{}: {}", operation, message),
        },
        _ => PortError::UnknownMessage {
            message_type: format!("unexpected reply for {}", operation),
        },
    }
}

/// Generous default for control operations that should answer immediately.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

impl DataChannel for ProcessorPort {
    fn configure(&mut self, config: &ProcessorConfig) -> Result<(), PortError> {
        let id = self.send_request(RequestBody::Configure(Box::new(config.clone())))?;
        match self.wait_reply(&id, "configure", CONTROL_TIMEOUT, None)? {
            ResponseBody::Ok => {
                self.configured = true;
                Ok(())
            }
            ResponseBody::Error { message } => {
                Err(PortError::ConfigureRejected { reason: message })
            }
            other => Err(unexpected("configure", &other)),
        }
    }

    fn modulate(&mut self, bytes: &[u8], abort: Option<&AbortHandle>) -> Result<(), PortError> {
        if !self.configured {
            return Err(PortError::NotConfigured);
        }
        let id = self.send_request(RequestBody::Modulate {
            bytes: bytes.to_vec(),
        })?;
        match self.wait_reply(&id, "modulate", CONTROL_TIMEOUT, abort)? {
            ResponseBody::Ok => Ok(()),
            ResponseBody::Error { message } => Err(PortError::SendFailed { reason: message }),
            other => Err(unexpected("modulate", &other)),
        }
    }

    fn demodulate(
        &mut self,
        timeout: Duration,
        abort: Option<&AbortHandle>,
    ) -> Result<Vec<u8>, PortError> {
        if !self.configured {
            return Err(PortError::NotConfigured);
        }
        let id = self.send_request(RequestBody::Demodulate)?;
        match self.wait_reply(&id, "demodulate", timeout, abort)? {
            ResponseBody::Bytes(bytes) => Ok(bytes),
            ResponseBody::Error { message } => Err(PortError::SendFailed { reason: message }),
            other => Err(unexpected("demodulate", &other)),
        }
    }

    fn reset(&mut self) -> Result<(), PortError> {
        self.reset_epoch.fetch_add(1, Ordering::SeqCst);
        let id = self.send_request(RequestBody::Reset)?;
        match self.wait_reply(&id, "reset", CONTROL_TIMEOUT, None)? {
            ResponseBody::Ok => Ok(()),
            ResponseBody::Error { message } => Err(PortError::SendFailed { reason: message }),
            other => Err(unexpected("reset", &other)),
        }
    }

    fn is_ready(&self) -> bool {
        self.configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let (port, endpoint) = port_pair("alpha");
        port.send_request(RequestBody::Status).unwrap();
        port.send_request(RequestBody::Status).unwrap();
        let first = endpoint.try_recv().unwrap();
        let second = endpoint.try_recv().unwrap();
        assert_eq!(first.id, "alpha-0");
        assert_eq!(second.id, "alpha-1");
    }

    #[test]
    fn operations_require_configuration() {
        let (mut port, _endpoint) = port_pair("p");
        assert!(matches!(
            port.modulate(&[1], None),
            Err(PortError::NotConfigured)
        ));
        assert!(matches!(
            port.demodulate(Duration::from_millis(10), None),
            Err(PortError::NotConfigured)
        ));
        assert!(!port.is_ready());
    }

    #[test]
    fn reply_correlation_skips_stale_ids() {
        let (mut port, endpoint) = port_pair("p");
        let id = port.send_request(RequestBody::Status).unwrap();
        endpoint.send(PortMessage::Reply(Response {
            id: "p-999".into(),
            body: ResponseBody::Ok,
        }));
        endpoint.send(PortMessage::Reply(Response {
            id: id.clone(),
            body: ResponseBody::Ok,
        }));
        let body = port
            .wait_reply(&id, "status", Duration::from_millis(500), None)
            .unwrap();
        assert!(matches!(body, ResponseBody::Ok));
    }

    #[test]
    fn events_are_collected_and_fanned_out_while_waiting() {
        use std::sync::atomic::AtomicUsize;

        let (mut port, endpoint) = port_pair("p");
        let heard = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&heard);
        port.emitter_mut().on("sync_lost", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let id = port.send_request(RequestBody::Status).unwrap();
        endpoint.send(PortMessage::Event(ModemEvent::SyncLost));
        endpoint.send(PortMessage::Reply(Response {
            id: id.clone(),
            body: ResponseBody::Ok,
        }));
        port.wait_reply(&id, "status", Duration::from_millis(500), None)
            .unwrap();
        assert_eq!(port.take_events(), vec![ModemEvent::SyncLost]);
        assert!(port.take_events().is_empty());
        assert_eq!(heard.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn abort_rejects_and_posts_abort_message() {
        let (mut port, endpoint) = port_pair("p");
        let id = port.send_request(RequestBody::Status).unwrap();
        let handle = AbortHandle::new();
        handle.abort();
        let err = port
            .wait_reply(&id, "demodulate", Duration::from_secs(1), Some(&handle))
            .unwrap_err();
        assert!(matches!(
            err,
            PortError::Aborted {
                operation: "demodulate"
            }
        ));
        // the status request itself, then the best-effort abort
        let _original = endpoint.try_recv().unwrap();
        let abort_req = endpoint.try_recv().unwrap();
        assert!(matches!(
            abort_req.body,
            RequestBody::Abort { target_id } if target_id == id
        ));
    }

    #[test]
    fn timeout_is_reported() {
        let (mut port, _endpoint) = port_pair("p");
        let id = port.send_request(RequestBody::Status).unwrap();
        let err = port
            .wait_reply(&id, "demodulate", Duration::from_millis(30), None)
            .unwrap_err();
        assert!(matches!(
            err,
            PortError::Timeout {
                operation: "demodulate"
            }
        ));
    }

    #[test]
    fn reset_handle_fails_blocked_operation_from_other_thread() {
        let (mut port, _endpoint) = port_pair("p");
        let reset = port.reset_handle();
        let id = port.send_request(RequestBody::Status).unwrap();

        let resetter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            reset.reset();
        });
        let err = port
            .wait_reply(&id, "demodulate", Duration::from_secs(5), None)
            .unwrap_err();
        assert!(matches!(err, PortError::Reset));
        resetter.join().unwrap();
    }
}
