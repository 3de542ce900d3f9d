use crate::event::EventDescriptor;
use crate::protocol::{HostEnvelope, events_envelope, ready_envelope};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Oldest entries are discarded past this many recorded errors.
const MAX_RECORDED_ERRORS: usize = 64;

/// Connection to the process that owns application state.
pub trait Transport {
    /// Queue one batch for delivery. Returns immediately; batches are
    /// delivered in call order.
    fn dispatch(&self, events: Vec<EventDescriptor>);

    /// Connection-level errors seen so far, oldest first.
    fn connection_errors(&self) -> Vec<ConnectionError>;
}

/// Advisory, transport-level failure. Not tied to a particular batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("outbound queue full (cap={capacity}); dropped {dropped} batch(es)")]
    QueueFull { capacity: usize, dropped: u64 },
    #[error("outbound queue disconnected")]
    Disconnected,
    #[error("state owner reported {code}: {message}")]
    Server { code: String, message: String },
    #[error("inbound frame rejected: {0}")]
    RejectedFrame(String),
    #[error("reader stopped: {0}")]
    ReaderStopped(String),
    #[error("writer stopped: {0}")]
    WriterStopped(String),
}

type ErrorListener = Arc<dyn Fn(Vec<ConnectionError>) + Send + Sync>;

/// Ordered log of connection errors shared between the UI, reader and writer
/// threads.
#[derive(Clone, Default)]
pub struct ConnectionLog {
    errors: Arc<Mutex<Vec<ConnectionError>>>,
    listener: Option<ErrorListener>,
}

impl ConnectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls `listener` with the full log after every recorded error.
    pub fn with_listener<F>(listener: F) -> Self
    where
        F: Fn(Vec<ConnectionError>) + Send + Sync + 'static,
    {
        Self {
            errors: Arc::default(),
            listener: Some(Arc::new(listener)),
        }
    }

    pub fn record(&self, err: ConnectionError) {
        let snapshot = {
            let mut errors = self.lock();
            errors.push(err);
            if errors.len() > MAX_RECORDED_ERRORS {
                let excess = errors.len() - MAX_RECORDED_ERRORS;
                errors.drain(..excess);
            }
            errors.clone()
        };

        if let Some(listener) = &self.listener {
            listener(snapshot);
        }
    }

    pub fn snapshot(&self) -> Vec<ConnectionError> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ConnectionError>> {
        match self.errors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ConnectionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLog")
            .field("errors", &*self.lock())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

/// [`Transport`] backed by the bounded queue drained by the writer thread.
pub struct ChannelTransport {
    tx: SyncSender<HostEnvelope>,
    sid: String,
    next_batch_id: AtomicU64,
    dropped_batches: AtomicU64,
    queue_capacity: usize,
    resync_pending: AtomicBool,
    errors: ConnectionLog,
}

impl ChannelTransport {
    pub fn new(
        tx: SyncSender<HostEnvelope>,
        sid: impl Into<String>,
        queue_capacity: usize,
        errors: ConnectionLog,
    ) -> Self {
        Self {
            tx,
            sid: sid.into(),
            next_batch_id: AtomicU64::new(1),
            dropped_batches: AtomicU64::new(0),
            queue_capacity,
            resync_pending: AtomicBool::new(false),
            errors,
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn errors(&self) -> &ConnectionLog {
        &self.errors
    }

    pub fn send_ready(&self) {
        self.enqueue_control(ready_envelope(self.sid.clone()));
    }

    /// Ask the state owner for a fresh render. Further requests are ignored
    /// until [`ChannelTransport::resync_completed`] is called.
    pub fn request_resync(&self, reason: &str) {
        if self
            .resync_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        warn!(%reason, "requesting resync");
        self.send_ready();
    }

    pub fn resync_completed(&self) {
        self.resync_pending.store(false, Ordering::Release);
    }

    pub fn resync_pending(&self) -> bool {
        self.resync_pending.load(Ordering::Acquire)
    }

    // Control envelopes must not be dropped; wait off-thread when the queue is full.
    fn enqueue_control(&self, envelope: HostEnvelope) {
        match self.tx.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(envelope)) => {
                warn!(
                    cap = self.queue_capacity,
                    "outbound queue full; waiting to enqueue control envelope"
                );
                let tx = self.tx.clone();
                let errors = self.errors.clone();
                thread::spawn(move || {
                    if tx.send(envelope).is_err() {
                        error!("failed to enqueue control envelope");
                        errors.record(ConnectionError::Disconnected);
                    }
                });
            }
            Err(TrySendError::Disconnected(_envelope)) => {
                error!("failed to enqueue control envelope");
                self.errors.record(ConnectionError::Disconnected);
            }
        }
    }
}

impl Transport for ChannelTransport {
    fn dispatch(&self, events: Vec<EventDescriptor>) {
        if events.is_empty() {
            return;
        }

        let id = self.next_batch_id.fetch_add(1, Ordering::Relaxed);
        let count = events.len();
        let first = events[0].handler.clone();

        match self.tx.try_send(events_envelope(self.sid.clone(), id, events)) {
            Ok(()) => debug!(batch = id, events = count, handler = %first, "event batch queued"),
            Err(TrySendError::Full(_envelope)) => {
                let dropped = self.dropped_batches.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped.is_power_of_two() {
                    warn!(
                        cap = self.queue_capacity,
                        dropped, "outbound queue full; dropping event batch"
                    );
                }
                self.errors.record(ConnectionError::QueueFull {
                    capacity: self.queue_capacity,
                    dropped,
                });
            }
            Err(TrySendError::Disconnected(_envelope)) => {
                error!(handler = %first, "failed to queue event batch");
                self.errors.record(ConnectionError::Disconnected);
            }
        }
    }

    fn connection_errors(&self) -> Vec<ConnectionError> {
        self.errors.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChatCommand, StatePath};
    use std::sync::mpsc;

    fn set_chat(name: &str) -> EventDescriptor {
        ChatCommand::SetChat {
            chat_name: name.to_string(),
        }
        .into_descriptor(&StatePath::new("s.chat"))
    }

    #[test]
    fn dispatch_drops_batch_and_records_error_when_queue_is_full() {
        let (tx, rx) = mpsc::sync_channel(1);
        let transport = ChannelTransport::new(tx, "S1", 1, ConnectionLog::new());

        transport.send_ready();
        transport.dispatch(vec![set_chat("Trip")]);

        assert_eq!(
            transport.connection_errors(),
            vec![ConnectionError::QueueFull {
                capacity: 1,
                dropped: 1
            }]
        );

        match rx.try_recv().expect("seed envelope remains queued") {
            HostEnvelope::Ready { sid, .. } => assert_eq!(sid, "S1"),
            other => panic!("expected ready envelope, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn batches_keep_call_order_and_increasing_ids() {
        let (tx, rx) = mpsc::sync_channel(8);
        let transport = ChannelTransport::new(tx, "S1", 8, ConnectionLog::new());

        transport.dispatch(vec![set_chat("a"), set_chat("b")]);
        transport.dispatch(vec![set_chat("c")]);

        let batches: Vec<(u64, Vec<String>)> = rx
            .try_iter()
            .map(|envelope| match envelope {
                HostEnvelope::Events { id, events, .. } => (
                    id,
                    events
                        .into_iter()
                        .map(|event| event.payload["chat_name"].as_str().unwrap_or("").to_string())
                        .collect(),
                ),
                other => panic!("expected events envelope, got {other:?}"),
            })
            .collect();

        assert_eq!(
            batches,
            vec![
                (1, vec!["a".to_string(), "b".to_string()]),
                (2, vec!["c".to_string()])
            ]
        );
    }

    #[test]
    fn empty_batch_is_not_sent() {
        let (tx, rx) = mpsc::sync_channel(2);
        let transport = ChannelTransport::new(tx, "S1", 2, ConnectionLog::new());

        transport.dispatch(Vec::new());

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disconnected_queue_is_advisory_and_later_dispatches_still_attempt() {
        let (tx, rx) = mpsc::sync_channel(2);
        drop(rx);
        let transport = ChannelTransport::new(tx, "S1", 2, ConnectionLog::new());

        transport.dispatch(vec![set_chat("a")]);
        transport.dispatch(vec![set_chat("b")]);

        assert_eq!(
            transport.connection_errors(),
            vec![ConnectionError::Disconnected, ConnectionError::Disconnected]
        );
    }

    #[test]
    fn resync_is_requested_once_until_completed() {
        let (tx, rx) = mpsc::sync_channel(4);
        let transport = ChannelTransport::new(tx, "S1", 4, ConnectionLog::new());

        transport.request_resync("rev mismatch");
        transport.request_resync("rev mismatch again");
        assert!(transport.resync_pending());
        assert_eq!(rx.try_iter().count(), 1);

        transport.resync_completed();
        transport.request_resync("after render");
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn log_notifies_listener_and_caps_history() {
        let seen = Arc::new(Mutex::new(0_usize));
        let seen_in_listener = seen.clone();
        let log = ConnectionLog::with_listener(move |errors| {
            *seen_in_listener.lock().expect("listener lock") = errors.len();
        });

        for _ in 0..(MAX_RECORDED_ERRORS + 3) {
            log.record(ConnectionError::Disconnected);
        }

        assert_eq!(log.snapshot().len(), MAX_RECORDED_ERRORS);
        assert_eq!(*seen.lock().expect("seen lock"), MAX_RECORDED_ERRORS);
    }
}
