//! Driver-facing handle for one virtual TCP port.

use std::sync::Arc;
use std::time::Duration;

use portmux_wire::{Envelope, Payload, PayloadKind, PortKey};

use crate::channel::RawChannel;
use crate::correlator::PortCorrelator;
use crate::error::{LinkError, Result};
use crate::guard::{TimeoutGuard, DEFAULT_TIMEOUT};

/// One virtual TCP connection made from the remote device.
///
/// Owns a claimed `tcp<id>` port for its lifetime; the port frees up when
/// the disconnect notification resets it.
pub struct TcpSocket {
    port: PortKey,
    correlator: PortCorrelator,
    channel: Arc<dyn RawChannel>,
    timeout: Duration,
}

impl TcpSocket {
    /// Claim `tcp<id>` and return a handle to it.
    ///
    /// Fails with [`LinkError::PortInUse`] while another handle holds the
    /// port.
    pub fn claim(channel: Arc<dyn RawChannel>, correlator: &PortCorrelator, id: u8) -> Result<Self> {
        let port = PortKey::tcp(id);
        correlator.claim(port)?;
        Ok(Self {
            port,
            correlator: correlator.clone(),
            channel,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The claimed port.
    pub fn port(&self) -> PortKey {
        self.port
    }

    /// Open a connection to `domain:port` and wait for the acknowledgement.
    ///
    /// `domain` is limited to 30 bytes by the protocol.
    pub fn connect_wait(&self, port: u16, domain: &str) -> Result<()> {
        let payload = Payload::Connect {
            port,
            domain: domain.to_string(),
        };
        payload.validate()?;

        let ticket = self.correlator.enqueue(self.port, PayloadKind::Connect)?;
        let guard = TimeoutGuard::new(
            &self.correlator,
            self.port,
            PayloadKind::Connect,
            ticket,
            self.timeout,
        );
        self.channel.send(&Envelope::new(self.port, payload))?;
        guard.wait().map(|_| ())
    }

    /// Send bytes into the open connection.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.ensure_claimed()?;
        self.channel.send(&Envelope::new(
            self.port,
            Payload::Write { data: data.to_vec() },
        ))
    }

    /// Wait for the next chunk of received bytes.
    ///
    /// Data is pushed by the remote end; no outbound envelope is sent.
    pub fn read_wait(&self) -> Result<Vec<u8>> {
        let ticket = self.correlator.enqueue(self.port, PayloadKind::Read)?;
        let guard = TimeoutGuard::new(
            &self.correlator,
            self.port,
            PayloadKind::Read,
            ticket,
            self.timeout,
        );
        match guard.wait()? {
            Payload::Read { data } => Ok(data),
            other => Err(LinkError::UnexpectedPayload {
                port: self.port,
                kind: other.kind(),
            }),
        }
    }

    /// Observe every chunk of received data, resolved or unsolicited.
    pub fn on_receive(&self, callback: impl Fn(&[u8]) + Send + Sync + 'static) {
        self.correlator
            .observe(self.port, PayloadKind::Read, move |payload| {
                if let Payload::Read { data } = payload {
                    callback(data);
                }
            });
    }

    /// Observe connection state changes.
    pub fn on_connection(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.correlator
            .observe(self.port, PayloadKind::Notify, move |payload| {
                if let Payload::Connection { connected } = payload {
                    callback(*connected);
                }
            });
    }

    /// Observe remote error reports.
    pub fn on_error(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.correlator
            .observe(self.port, PayloadKind::Error, move |payload| {
                if let Payload::Error { message } = payload {
                    callback(message);
                }
            });
    }

    /// Terminate the session.
    ///
    /// Local state resets when the disconnect notification arrives, not
    /// here.
    pub fn end(&self) -> Result<()> {
        self.ensure_claimed()?;
        self.channel
            .send(&Envelope::new(self.port, Payload::Disconnect(true)))
    }

    fn ensure_claimed(&self) -> Result<()> {
        if !self.correlator.is_claimed(self.port) {
            return Err(LinkError::NotConnected(self.port));
        }
        Ok(())
    }
}
