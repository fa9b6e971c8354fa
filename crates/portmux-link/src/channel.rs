//! The raw channel seam and the single inbound dispatch point.

use bytes::BytesMut;
use portmux_wire::{
    decode_plugin_frame, Envelope, Payload, PayloadKind, PluginDirection,
    DEFAULT_MAX_PLUGIN_PAYLOAD,
};
use tracing::warn;

use crate::correlator::PortCorrelator;
use crate::error::Result;

/// The shared device channel, as seen from this side.
///
/// The physical link (WebSocket, serial, ...) is the embedder's concern;
/// it must preserve envelope order within a port but may interleave ports
/// freely. Inbound envelopes are delivered by the embedder to a
/// [`Dispatcher`].
pub trait RawChannel: Send + Sync {
    /// Queue one envelope for transmission.
    fn send(&self, envelope: &Envelope) -> Result<()>;
}

/// The single inbound dispatch point.
///
/// All inbound envelope handling is serialized through
/// [`Dispatcher::handle_inbound`]; pending requests settle either here or
/// in their timeout guard, so no further locking discipline is required of
/// drivers.
pub struct Dispatcher {
    correlator: PortCorrelator,
    #[cfg(feature = "schema")]
    registry: Option<std::sync::Arc<portmux_schema::CommandRegistry>>,
}

impl Dispatcher {
    /// Create a dispatcher over a correlator.
    pub fn new(correlator: PortCorrelator) -> Self {
        Self {
            correlator,
            #[cfg(feature = "schema")]
            registry: None,
        }
    }

    /// Attach a command registry for multiplexed command modules.
    ///
    /// Inbound command envelopes for registered modules are validated and
    /// dispatched through the registry before resolution; a violation
    /// rejects the oldest pending command instead of resolving it.
    #[cfg(feature = "schema")]
    pub fn with_registry(mut self, registry: std::sync::Arc<portmux_schema::CommandRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// The correlator this dispatcher settles requests on.
    pub fn correlator(&self) -> &PortCorrelator {
        &self.correlator
    }

    /// Route one inbound envelope to observers and the matching queue head.
    pub fn handle_inbound(&self, envelope: Envelope) {
        let port = envelope.port;
        match envelope.payload {
            Payload::Read { .. } => {
                self.correlator
                    .notify_observers(port, PayloadKind::Read, &envelope.payload);
                self.correlator
                    .resolve_head(port, PayloadKind::Read, envelope.payload);
            }
            Payload::Connection { connected: true } => {
                self.correlator
                    .notify_observers(port, PayloadKind::Notify, &envelope.payload);
                self.correlator
                    .resolve_head(port, PayloadKind::Connect, envelope.payload);
            }
            Payload::Connection { connected: false } => {
                self.correlator
                    .notify_observers(port, PayloadKind::Notify, &envelope.payload);
                self.correlator.reset(port);
            }
            Payload::Receive(_) => {
                #[cfg(feature = "schema")]
                if let Some(registry) = &self.registry {
                    let module = port.kind.prefix();
                    if registry.has_module(module) {
                        if let Err(err) = registry.dispatch(module, &envelope) {
                            warn!(%port, error = %err, "inbound command failed validation");
                            self.correlator
                                .reject_head(port, PayloadKind::Command, &err.to_string());
                            return;
                        }
                    }
                }
                self.correlator
                    .notify_observers(port, PayloadKind::Command, &envelope.payload);
                self.correlator
                    .resolve_head(port, PayloadKind::Command, envelope.payload);
            }
            Payload::Error { ref message } => {
                self.correlator
                    .notify_observers(port, PayloadKind::Error, &envelope.payload);
                self.correlator
                    .reject_head(port, PayloadKind::Connect, message);
            }
            Payload::Connect { .. } | Payload::Write { .. } | Payload::Disconnect(_)
            | Payload::Send(_) => {
                warn!(%port, op = envelope.payload.op_name(), "request-direction payload arrived inbound, dropping");
            }
        }
    }

    /// Parse a wire JSON envelope and route it.
    pub fn handle_json(&self, raw: &str) -> Result<()> {
        let envelope = Envelope::from_json(raw)?;
        self.handle_inbound(envelope);
        Ok(())
    }

    /// Decode inbound plugin binary frames and route each as a receive
    /// envelope on the plugin port.
    pub fn handle_plugin_frames(&self, bytes: &[u8]) -> Result<()> {
        let mut buf = BytesMut::from(bytes);
        while let Some(frame) = decode_plugin_frame(&mut buf, DEFAULT_MAX_PLUGIN_PAYLOAD)? {
            match frame.direction {
                PluginDirection::Receive => self.handle_inbound(Envelope::new(
                    portmux_wire::PortKey::plugin(),
                    Payload::Receive(frame.payload.to_vec()),
                )),
                PluginDirection::Send => {
                    warn!("send-direction plugin frame arrived inbound, dropping");
                }
            }
        }
        Ok(())
    }
}
