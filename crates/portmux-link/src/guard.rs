//! Deadline bounding for pending requests.

use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use portmux_wire::{Payload, PayloadKind, PortKey};
use tracing::debug;

use crate::correlator::{PendingTicket, PortCorrelator, Settlement};
use crate::error::{LinkError, Result};

/// Deadline applied when the caller does not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounds one pending request with a deadline.
///
/// Exactly one of success or failure settles the wrapped operation, never
/// both. When the deadline fires first, the now-orphaned pending entry is
/// removed from its queue so a late, true response cannot spuriously
/// resolve a future call that reuses the same queue.
pub struct TimeoutGuard {
    correlator: PortCorrelator,
    port: PortKey,
    kind: PayloadKind,
    ticket: PendingTicket,
    deadline: Duration,
}

impl TimeoutGuard {
    /// Wrap a pending ticket with an explicit deadline.
    pub fn new(
        correlator: &PortCorrelator,
        port: PortKey,
        kind: PayloadKind,
        ticket: PendingTicket,
        deadline: Duration,
    ) -> Self {
        Self {
            correlator: correlator.clone(),
            port,
            kind,
            ticket,
            deadline,
        }
    }

    /// Wrap a pending ticket with [`DEFAULT_TIMEOUT`].
    pub fn with_default(
        correlator: &PortCorrelator,
        port: PortKey,
        kind: PayloadKind,
        ticket: PendingTicket,
    ) -> Self {
        Self::new(correlator, port, kind, ticket, DEFAULT_TIMEOUT)
    }

    /// Block until the request settles or the deadline fires.
    pub fn wait(self) -> Result<Payload> {
        match self.ticket.slot.recv_timeout(self.deadline) {
            Ok(Settlement::Resolved(payload)) => Ok(payload),
            Ok(Settlement::Rejected(message)) => Err(LinkError::Remote {
                port: self.port,
                message,
            }),
            Ok(Settlement::Disconnected) => Err(LinkError::Disconnected(self.port)),
            Err(RecvTimeoutError::Timeout) => {
                let removed = self.correlator.discard(self.port, self.kind, self.ticket.seq);
                debug!(port = %self.port, kind = %self.kind, removed, "request deadline elapsed");
                Err(LinkError::Timeout {
                    port: self.port,
                    kind: self.kind,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::ChannelClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;

    fn claimed(port: PortKey) -> PortCorrelator {
        let correlator = PortCorrelator::new();
        correlator.claim(port).unwrap();
        correlator
    }

    #[test]
    fn resolves_before_deadline() {
        let port = PortKey::tcp(0);
        let correlator = claimed(port);
        let ticket = correlator.enqueue(port, PayloadKind::Read).unwrap();
        let guard = TimeoutGuard::new(
            &correlator,
            port,
            PayloadKind::Read,
            ticket,
            Duration::from_secs(2),
        );

        let resolver = correlator.clone();
        let handle = thread::spawn(move || {
            resolver.resolve_head(port, PayloadKind::Read, Payload::Read { data: vec![7] });
        });

        let payload = guard.wait().expect("response should arrive in time");
        assert!(matches!(payload, Payload::Read { data } if data == [7]));
        handle.join().expect("resolver thread should finish");
    }

    #[test]
    fn times_out_and_removes_orphan() {
        let port = PortKey::tcp(0);
        let correlator = claimed(port);
        let ticket = correlator.enqueue(port, PayloadKind::Connect).unwrap();
        let guard = TimeoutGuard::new(
            &correlator,
            port,
            PayloadKind::Connect,
            ticket,
            Duration::from_millis(50),
        );

        let started = Instant::now();
        let result = guard.wait();
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(matches!(
            result,
            Err(LinkError::Timeout { kind: PayloadKind::Connect, .. })
        ));

        // The orphan is gone: a late response finds an empty queue.
        assert_eq!(correlator.pending_count(port, PayloadKind::Connect), 0);
        assert!(!correlator.resolve_head(
            port,
            PayloadKind::Connect,
            Payload::Connection { connected: true }
        ));
    }

    #[test]
    fn disconnect_settlement_surfaces_as_disconnected() {
        let port = PortKey::tcp(3);
        let correlator = claimed(port);
        let ticket = correlator.enqueue(port, PayloadKind::Read).unwrap();
        let guard = TimeoutGuard::with_default(&correlator, port, PayloadKind::Read, ticket);

        correlator.reset(port);
        assert!(matches!(guard.wait(), Err(LinkError::Disconnected(p)) if p == port));
    }

    #[test]
    fn remote_rejection_surfaces_as_remote_error() {
        let port = PortKey::tcp(1);
        let correlator = claimed(port);
        let ticket = correlator.enqueue(port, PayloadKind::Connect).unwrap();
        let guard = TimeoutGuard::with_default(&correlator, port, PayloadKind::Connect, ticket);

        correlator.reject_head(port, PayloadKind::Connect, "host unreachable");
        assert!(matches!(
            guard.wait(),
            Err(LinkError::Remote { message, .. }) if message == "host unreachable"
        ));
    }
}
