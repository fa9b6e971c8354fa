//! Driver-facing handle for the generic plugin command port.

use std::sync::Arc;
use std::time::Duration;

use portmux_wire::{Envelope, Payload, PayloadKind, PortKey};

use crate::channel::RawChannel;
use crate::correlator::PortCorrelator;
use crate::error::{LinkError, Result};
use crate::guard::{TimeoutGuard, DEFAULT_TIMEOUT};

/// The generic plugin command endpoint: opaque payloads in both directions
/// under one module identifier.
pub struct PluginPort {
    port: PortKey,
    correlator: PortCorrelator,
    channel: Arc<dyn RawChannel>,
    #[cfg(feature = "schema")]
    registry: Option<Arc<portmux_schema::CommandRegistry>>,
    timeout: Duration,
}

impl PluginPort {
    /// Claim the plugin port and return a handle to it.
    pub fn claim(channel: Arc<dyn RawChannel>, correlator: &PortCorrelator) -> Result<Self> {
        let port = PortKey::plugin();
        correlator.claim(port)?;
        Ok(Self {
            port,
            correlator: correlator.clone(),
            channel,
            #[cfg(feature = "schema")]
            registry: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Validate outbound commands against a registry before sending.
    #[cfg(feature = "schema")]
    pub fn with_registry(mut self, registry: Arc<portmux_schema::CommandRegistry>) -> Self {
        self.registry = Some(registry);
        self
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

    /// Send an opaque payload to the device-side plugin.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        self.ensure_claimed()?;
        let envelope = Envelope::new(self.port, Payload::Send(data.to_vec()));
        #[cfg(feature = "schema")]
        if let Some(registry) = &self.registry {
            registry.validate(self.port.kind.prefix(), &envelope)?;
        }
        self.channel.send(&envelope)
    }

    /// Wait for the next device-to-host payload.
    pub fn receive_wait(&self) -> Result<Vec<u8>> {
        let ticket = self.correlator.enqueue(self.port, PayloadKind::Command)?;
        let guard = TimeoutGuard::new(
            &self.correlator,
            self.port,
            PayloadKind::Command,
            ticket,
            self.timeout,
        );
        match guard.wait()? {
            Payload::Receive(data) => Ok(data),
            other => Err(LinkError::UnexpectedPayload {
                port: self.port,
                kind: other.kind(),
            }),
        }
    }

    /// Observe every device-to-host payload, resolved or unsolicited.
    pub fn on_receive(&self, callback: impl Fn(&[u8]) + Send + Sync + 'static) {
        self.correlator
            .observe(self.port, PayloadKind::Command, move |payload| {
                if let Payload::Receive(data) = payload {
                    callback(data);
                }
            });
    }

    fn ensure_claimed(&self) -> Result<()> {
        if !self.correlator.is_claimed(self.port) {
            return Err(LinkError::NotConnected(self.port));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<Envelope>>,
    }

    impl RawChannel for RecordingChannel {
        fn send(&self, envelope: &Envelope) -> Result<()> {
            self.sent.lock().unwrap().push(envelope.clone());
            Ok(())
        }
    }

    #[test]
    fn send_emits_the_plugin_envelope() {
        let channel = Arc::new(RecordingChannel::default());
        let correlator = PortCorrelator::new();
        let plugin = PluginPort::claim(channel.clone(), &correlator).unwrap();

        plugin.send(&[5, 6, 7]).unwrap();

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent[0].to_json().unwrap(), r#"{"plugin":{"send":[5,6,7]}}"#);
    }

    #[test]
    fn plugin_port_is_exclusive() {
        let channel = Arc::new(RecordingChannel::default());
        let correlator = PortCorrelator::new();
        let _plugin = PluginPort::claim(channel.clone(), &correlator).unwrap();

        assert!(matches!(
            PluginPort::claim(channel, &correlator),
            Err(LinkError::PortInUse(_))
        ));
    }

    #[test]
    fn send_after_reset_is_not_connected() {
        let channel = Arc::new(RecordingChannel::default());
        let correlator = PortCorrelator::new();
        let plugin = PluginPort::claim(channel, &correlator).unwrap();

        correlator.reset(plugin.port());
        assert!(matches!(plugin.send(&[1]), Err(LinkError::NotConnected(_))));
    }

    #[cfg(feature = "schema")]
    #[test]
    fn registry_validates_outbound_commands() {
        use portmux_schema::{CommandRegistry, SchemaError};

        let mut registry = CommandRegistry::new();
        registry
            .register(
                "plugin",
                "/request/plugin/send",
                r#"{
                    "type": "object",
                    "properties": {
                        "send": { "type": "array", "maxItems": 2 }
                    },
                    "required": ["send"]
                }"#,
                Box::new(|_| {}),
            )
            .unwrap();

        let channel = Arc::new(RecordingChannel::default());
        let correlator = PortCorrelator::new();
        let plugin = PluginPort::claim(channel.clone(), &correlator)
            .unwrap()
            .with_registry(Arc::new(registry));

        plugin.send(&[1, 2]).expect("conforming command should send");
        let result = plugin.send(&[1, 2, 3]);
        assert!(matches!(
            result,
            Err(LinkError::Schema(SchemaError::SchemaViolation { .. }))
        ));
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
    }
}
