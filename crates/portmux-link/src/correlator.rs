//! Per-port FIFO pairing of pending requests with inbound payloads.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use portmux_wire::{Payload, PayloadKind, PortKey};
use tracing::debug;

use crate::error::{LinkError, Result};

/// Terminal state of a pending request.
///
/// Exactly one settlement (or a deadline on the waiting side) terminates
/// each pending entry.
#[derive(Debug, Clone)]
pub enum Settlement {
    /// A matching response arrived.
    Resolved(Payload),
    /// The remote end reported an explicit error.
    Rejected(String),
    /// The port was reset while the request was pending.
    Disconnected,
}

type Observer = Arc<dyn Fn(&Payload) + Send + Sync>;

struct PendingEntry {
    seq: u64,
    slot: Sender<Settlement>,
}

#[derive(Default)]
struct PortState {
    used: bool,
    queues: HashMap<PayloadKind, VecDeque<PendingEntry>>,
    observers: HashMap<PayloadKind, Vec<Observer>>,
}

struct CorrelatorState {
    ports: HashMap<PortKey, PortState>,
    next_seq: u64,
}

/// Ticket for one pending request: its queue identity and settle slot.
///
/// Hand it to a [`crate::guard::TimeoutGuard`] to await the settlement.
pub struct PendingTicket {
    pub(crate) seq: u64,
    pub(crate) slot: Receiver<Settlement>,
}

/// Per-port request/response pairing over a channel that interleaves
/// unrelated ports freely.
///
/// Each port owns a `used` flag and independent per-kind FIFO queues;
/// resolution always consumes from the head, so N requests enqueued in
/// order resolve in that order no matter how responses interleave with
/// other ports. Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct PortCorrelator {
    state: Arc<Mutex<CorrelatorState>>,
}

impl PortCorrelator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CorrelatorState {
                ports: HashMap::new(),
                next_seq: 0,
            })),
        }
    }

    /// Mark a port as in use.
    ///
    /// Fails with [`LinkError::PortInUse`] until the port is [`reset`].
    ///
    /// [`reset`]: PortCorrelator::reset
    pub fn claim(&self, port: PortKey) -> Result<()> {
        let mut state = self.lock();
        let port_state = state.ports.entry(port).or_default();
        if port_state.used {
            return Err(LinkError::PortInUse(port));
        }
        port_state.used = true;
        Ok(())
    }

    /// Whether the port is currently claimed.
    pub fn is_claimed(&self, port: PortKey) -> bool {
        self.lock()
            .ports
            .get(&port)
            .map(|p| p.used)
            .unwrap_or(false)
    }

    /// Append a pending request to the tail of the `(port, kind)` queue.
    ///
    /// Queue depth is unbounded; a caller issuing requests faster than the
    /// remote replies accumulates unresolved entries.
    pub fn enqueue(&self, port: PortKey, kind: PayloadKind) -> Result<PendingTicket> {
        let mut state = self.lock();
        if !state.ports.get(&port).map(|p| p.used).unwrap_or(false) {
            return Err(LinkError::NotConnected(port));
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        let (tx, rx) = mpsc::channel();
        state
            .ports
            .entry(port)
            .or_default()
            .queues
            .entry(kind)
            .or_default()
            .push_back(PendingEntry { seq, slot: tx });
        Ok(PendingTicket { seq, slot: rx })
    }

    /// Pop the oldest pending request in the queue and fulfill it.
    ///
    /// Returns false (with a diagnostic) if the queue is empty: an
    /// unsolicited inbound payload with no pending request is dropped here
    /// after observers have had their chance at it.
    pub fn resolve_head(&self, port: PortKey, kind: PayloadKind, payload: Payload) -> bool {
        self.settle_head(port, kind, Settlement::Resolved(payload))
    }

    /// Pop the oldest pending request in the queue and fail it with a
    /// remote error message.
    pub fn reject_head(&self, port: PortKey, kind: PayloadKind, message: &str) -> bool {
        self.settle_head(port, kind, Settlement::Rejected(message.to_string()))
    }

    /// Register an observer for inbound payloads of `kind` on `port`.
    ///
    /// Observers are notified for every inbound payload of their kind,
    /// resolved or unsolicited, and survive port resets.
    pub fn observe(
        &self,
        port: PortKey,
        kind: PayloadKind,
        observer: impl Fn(&Payload) + Send + Sync + 'static,
    ) {
        self.lock()
            .ports
            .entry(port)
            .or_default()
            .observers
            .entry(kind)
            .or_default()
            .push(Arc::new(observer));
    }

    /// Notify observers of an inbound payload. Returns the observer count.
    pub fn notify_observers(&self, port: PortKey, kind: PayloadKind, payload: &Payload) -> usize {
        let observers: Vec<Observer> = {
            let state = self.lock();
            state
                .ports
                .get(&port)
                .and_then(|p| p.observers.get(&kind))
                .map(|obs| obs.to_vec())
                .unwrap_or_default()
        };
        // Called outside the lock so an observer may re-enter the correlator.
        for observer in &observers {
            observer(payload);
        }
        observers.len()
    }

    /// Remove a specific pending entry without settling it.
    ///
    /// This is the timeout path: the guard removes its own orphaned entry
    /// so a late response cannot resolve a future call in the same queue.
    pub fn discard(&self, port: PortKey, kind: PayloadKind, seq: u64) -> bool {
        let mut state = self.lock();
        let Some(queue) = state.ports.get_mut(&port).and_then(|p| p.queues.get_mut(&kind)) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|entry| entry.seq != seq);
        queue.len() != before
    }

    /// Clear the port's `used` flag and settle every queued entry as
    /// [`Settlement::Disconnected`].
    ///
    /// This is the disconnect path. Awaiting callers observe a
    /// [`LinkError::Disconnected`] failure rather than hanging; the port
    /// identity may be claimed again afterwards.
    pub fn reset(&self, port: PortKey) {
        let mut state = self.lock();
        let Some(port_state) = state.ports.get_mut(&port) else {
            return;
        };
        port_state.used = false;
        let mut rejected = 0usize;
        for queue in port_state.queues.values_mut() {
            for entry in queue.drain(..) {
                // A failed send means the guard already gave up; nothing to do.
                let _ = entry.slot.send(Settlement::Disconnected);
                rejected += 1;
            }
        }
        if rejected > 0 {
            debug!(%port, rejected, "reset settled pending requests as disconnected");
        }
    }

    /// Number of pending entries in the `(port, kind)` queue.
    pub fn pending_count(&self, port: PortKey, kind: PayloadKind) -> usize {
        self.lock()
            .ports
            .get(&port)
            .and_then(|p| p.queues.get(&kind))
            .map(|q| q.len())
            .unwrap_or(0)
    }

    fn settle_head(&self, port: PortKey, kind: PayloadKind, settlement: Settlement) -> bool {
        let entry = {
            let mut state = self.lock();
            state
                .ports
                .get_mut(&port)
                .and_then(|p| p.queues.get_mut(&kind))
                .and_then(|q| q.pop_front())
        };
        match entry {
            Some(entry) => {
                if entry.slot.send(settlement).is_err() {
                    // Receiver gone without a discard: the waiting side is
                    // tearing down. The entry is consumed either way.
                    debug!(%port, %kind, seq = entry.seq, "pending request abandoned before settlement");
                    return false;
                }
                true
            }
            None => {
                debug!(%port, %kind, "no pending request for inbound payload");
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CorrelatorState> {
        self.state.lock().expect("correlator state poisoned")
    }
}

impl Default for PortCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_marks_port_used() {
        let correlator = PortCorrelator::new();
        let port = PortKey::tcp(0);

        assert!(!correlator.is_claimed(port));
        correlator.claim(port).expect("first claim should succeed");
        assert!(correlator.is_claimed(port));

        assert!(matches!(
            correlator.claim(port),
            Err(LinkError::PortInUse(p)) if p == port
        ));
    }

    #[test]
    fn enqueue_requires_claim() {
        let correlator = PortCorrelator::new();
        assert!(matches!(
            correlator.enqueue(PortKey::tcp(1), PayloadKind::Read),
            Err(LinkError::NotConnected(_))
        ));
    }

    #[test]
    fn resolve_consumes_from_head_in_fifo_order() {
        let correlator = PortCorrelator::new();
        let port = PortKey::tcp(0);
        correlator.claim(port).unwrap();

        let first = correlator.enqueue(port, PayloadKind::Read).unwrap();
        let second = correlator.enqueue(port, PayloadKind::Read).unwrap();

        assert!(correlator.resolve_head(port, PayloadKind::Read, Payload::Read { data: vec![1] }));
        assert!(correlator.resolve_head(port, PayloadKind::Read, Payload::Read { data: vec![2] }));

        let got_first = first.slot.recv().unwrap();
        let got_second = second.slot.recv().unwrap();
        assert!(matches!(got_first, Settlement::Resolved(Payload::Read { data }) if data == [1]));
        assert!(matches!(got_second, Settlement::Resolved(Payload::Read { data }) if data == [2]));
    }

    #[test]
    fn kinds_queue_independently() {
        let correlator = PortCorrelator::new();
        let port = PortKey::tcp(0);
        correlator.claim(port).unwrap();

        let read = correlator.enqueue(port, PayloadKind::Read).unwrap();
        let connect = correlator.enqueue(port, PayloadKind::Connect).unwrap();

        assert!(correlator.resolve_head(
            port,
            PayloadKind::Connect,
            Payload::Connection { connected: true }
        ));
        assert!(matches!(
            connect.slot.recv().unwrap(),
            Settlement::Resolved(Payload::Connection { connected: true })
        ));
        assert_eq!(correlator.pending_count(port, PayloadKind::Read), 1);
        drop(read);
    }

    #[test]
    fn unsolicited_resolve_is_a_noop() {
        let correlator = PortCorrelator::new();
        let port = PortKey::tcp(0);
        let other = PortKey::tcp(1);
        correlator.claim(port).unwrap();
        correlator.claim(other).unwrap();
        let pending = correlator.enqueue(other, PayloadKind::Read).unwrap();

        // Empty queue: no panic, no effect on the other port.
        assert!(!correlator.resolve_head(port, PayloadKind::Read, Payload::Read { data: vec![] }));
        assert_eq!(correlator.pending_count(other, PayloadKind::Read), 1);
        drop(pending);
    }

    #[test]
    fn discard_removes_only_the_named_entry() {
        let correlator = PortCorrelator::new();
        let port = PortKey::tcp(0);
        correlator.claim(port).unwrap();

        let first = correlator.enqueue(port, PayloadKind::Read).unwrap();
        let second = correlator.enqueue(port, PayloadKind::Read).unwrap();

        assert!(correlator.discard(port, PayloadKind::Read, first.seq));
        assert!(!correlator.discard(port, PayloadKind::Read, first.seq));
        assert_eq!(correlator.pending_count(port, PayloadKind::Read), 1);

        // The later entry is now the head.
        assert!(correlator.resolve_head(port, PayloadKind::Read, Payload::Read { data: vec![9] }));
        assert!(matches!(
            second.slot.recv().unwrap(),
            Settlement::Resolved(Payload::Read { data }) if data == [9]
        ));
    }

    #[test]
    fn reset_rejects_pending_and_frees_the_port() {
        let correlator = PortCorrelator::new();
        let port = PortKey::tcp(0);
        correlator.claim(port).unwrap();
        let pending = correlator.enqueue(port, PayloadKind::Connect).unwrap();

        correlator.reset(port);

        assert!(matches!(
            pending.slot.recv().unwrap(),
            Settlement::Disconnected
        ));
        assert_eq!(correlator.pending_count(port, PayloadKind::Connect), 0);
        assert!(!correlator.is_claimed(port));
        correlator.claim(port).expect("port should be claimable after reset");
    }

    #[test]
    fn reject_head_carries_the_remote_message() {
        let correlator = PortCorrelator::new();
        let port = PortKey::tcp(2);
        correlator.claim(port).unwrap();
        let pending = correlator.enqueue(port, PayloadKind::Connect).unwrap();

        assert!(correlator.reject_head(port, PayloadKind::Connect, "connection refused"));
        assert!(matches!(
            pending.slot.recv().unwrap(),
            Settlement::Rejected(message) if message == "connection refused"
        ));
    }

    #[test]
    fn observers_fire_for_every_payload_and_survive_reset() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let correlator = PortCorrelator::new();
        let port = PortKey::tcp(0);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        correlator.observe(port, PayloadKind::Read, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let payload = Payload::Read { data: vec![1] };
        assert_eq!(correlator.notify_observers(port, PayloadKind::Read, &payload), 1);

        correlator.claim(port).unwrap();
        correlator.reset(port);
        assert_eq!(correlator.notify_observers(port, PayloadKind::Read, &payload), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
