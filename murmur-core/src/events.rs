//! Minimal synchronous event fan-out.
//!
//! Listeners are invoked in registration order on the caller's thread. A
//! panicking listener propagates to the emitter's caller; nothing is caught
//! or swallowed here.

use std::collections::HashMap;

/// Payload carried by every emitted event.
#[derive(Debug, Clone, PartialEq)]
pub enum ModemEvent {
    /// A demodulated byte array is ready for the control side
    Demodulated { bytes: Vec<u8> },
    /// The DSSS framer emitted a complete, CRC-clean frame
    FrameDecoded { seq: u8, payload: Vec<u8> },
    /// The synchronizer acquired lock
    SyncAcquired { sample_offset: usize, snr_db: f64 },
    /// The synchronizer fell back to SEARCH
    SyncLost,
    /// A transport packet event (sent, received, retransmitted, dropped)
    Packet { kind: &'static str, seq: u8 },
}

impl ModemEvent {
    /// Event name this payload is emitted under.
    pub fn name(&self) -> &'static str {
        match self {
            ModemEvent::Demodulated { .. } => "demodulated",
            ModemEvent::FrameDecoded { .. } => "frame_decoded",
            ModemEvent::SyncAcquired { .. } => "sync_acquired",
            ModemEvent::SyncLost => "sync_lost",
            ModemEvent::Packet { .. } => "packet",
        }
    }
}

/// Handle for removing a single listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ModemEvent) + Send>;

/// Synchronous event emitter keyed by event name.
#[derive(Default)]
pub struct EventEmitter {
    listeners: HashMap<String, Vec<(ListenerId, Listener)>>,
    next_id: u64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it is appended after any existing listeners for
    /// the same event name.
    pub fn on<F>(&mut self, name: &str, listener: F) -> ListenerId
    where
        F: FnMut(&ModemEvent) + Send + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners
            .entry(name.to_string())
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    /// Remove a single listener. Returns whether it was registered.
    pub fn off(&mut self, name: &str, id: ListenerId) -> bool {
        if let Some(entries) = self.listeners.get_mut(name) {
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            return entries.len() != before;
        }
        false
    }

    /// Remove every listener for `name`, or every listener outright when
    /// `name` is `None`.
    pub fn remove_all_listeners(&mut self, name: Option<&str>) {
        match name {
            Some(name) => {
                self.listeners.remove(name);
            }
            None => self.listeners.clear(),
        }
    }

    /// Invoke all listeners for `name` in registration order.
    pub fn emit(&mut self, name: &str, event: &ModemEvent) {
        if let Some(entries) = self.listeners.get_mut(name) {
            for (_, listener) in entries.iter_mut() {
                listener(event);
            }
        }
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.get(name).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn listeners_run_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut emitter = EventEmitter::new();
        for tag in 0..3 {
            let order = Arc::clone(&order);
            emitter.on("demodulated", move |_| order.lock().unwrap().push(tag));
        }
        emitter.emit("demodulated", &ModemEvent::SyncLost);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn off_removes_only_the_target_listener() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut emitter = EventEmitter::new();
        let c1 = Arc::clone(&count);
        let keep = emitter.on("sync", move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&count);
        let drop_me = emitter.on("sync", move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        assert!(emitter.off("sync", drop_me));
        assert!(!emitter.off("sync", drop_me));
        emitter.emit("sync", &ModemEvent::SyncLost);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        let _ = keep;
    }

    #[test]
    fn remove_all_listeners_scoped_by_name() {
        let mut emitter = EventEmitter::new();
        emitter.on("a", |_| {});
        emitter.on("b", |_| {});
        emitter.remove_all_listeners(Some("a"));
        assert_eq!(emitter.listener_count("a"), 0);
        assert_eq!(emitter.listener_count("b"), 1);
        emitter.remove_all_listeners(None);
        assert_eq!(emitter.listener_count("b"), 0);
    }

    #[test]
    fn emit_without_listeners_is_a_no_op() {
        let mut emitter = EventEmitter::new();
        emitter.emit("nobody", &ModemEvent::SyncLost);
    }

    #[test]
    #[should_panic(expected = "listener boom")]
    fn panicking_listener_propagates() {
        let mut emitter = EventEmitter::new();
        emitter.on("boom", |_| panic!("listener boom"));
        emitter.emit("boom", &ModemEvent::SyncLost);
    }
}
