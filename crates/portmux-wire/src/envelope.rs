//! Envelope and payload model.
//!
//! An envelope is one discrete message on the shared channel: a single port
//! key mapped to a payload object. Payloads are externally tagged so the
//! serde form matches the wire shapes exactly, e.g.
//! `{"tcp3":{"connect":{"port":80,"domain":"example.com"}}}`.

use std::fmt;

use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, WireError};
use crate::port::PortKey;

/// Maximum connect domain length in bytes. Protocol-enforced, not advisory.
pub const MAX_DOMAIN_LEN: usize = 30;

/// Classification of payloads, used as the correlator queue key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Connect,
    Read,
    Write,
    Disconnect,
    Command,
    Notify,
    Error,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::Connect => "connect",
            PayloadKind::Read => "read",
            PayloadKind::Write => "write",
            PayloadKind::Disconnect => "disconnect",
            PayloadKind::Command => "command",
            PayloadKind::Notify => "notify",
            PayloadKind::Error => "error",
        };
        f.write_str(name)
    }
}

/// One envelope payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Payload {
    /// Open a TCP connection from the device to `domain:port`.
    Connect { port: u16, domain: String },
    /// Push bytes into an open connection.
    Write { data: Vec<u8> },
    /// Bytes received from the remote end.
    Read { data: Vec<u8> },
    /// Terminate the session. The wire value is always `true`.
    Disconnect(bool),
    /// Connection state change. `connected: true` acknowledges a pending
    /// connect; `false` is the disconnect notification.
    Connection { connected: bool },
    /// Plugin module payload, device-bound.
    Send(Vec<u8>),
    /// Plugin module payload, host-bound.
    Receive(Vec<u8>),
    /// Remote error report.
    Error { message: String },
}

impl Payload {
    /// The correlator queue key for this payload.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Connect { .. } => PayloadKind::Connect,
            Payload::Write { .. } => PayloadKind::Write,
            Payload::Read { .. } => PayloadKind::Read,
            Payload::Disconnect(_) => PayloadKind::Disconnect,
            Payload::Connection { .. } => PayloadKind::Notify,
            Payload::Send(_) | Payload::Receive(_) => PayloadKind::Command,
            Payload::Error { .. } => PayloadKind::Error,
        }
    }

    /// The wire tag of this payload (`"connect"`, `"send"`, ...).
    pub fn op_name(&self) -> &'static str {
        match self {
            Payload::Connect { .. } => "connect",
            Payload::Write { .. } => "write",
            Payload::Read { .. } => "read",
            Payload::Disconnect(_) => "disconnect",
            Payload::Connection { .. } => "connection",
            Payload::Send(_) => "send",
            Payload::Receive(_) => "receive",
            Payload::Error { .. } => "error",
        }
    }

    /// Enforce protocol limits on request payloads.
    pub fn validate(&self) -> Result<()> {
        if let Payload::Connect { domain, .. } = self {
            if domain.len() > MAX_DOMAIN_LEN {
                return Err(WireError::DomainTooLong {
                    len: domain.len(),
                    max: MAX_DOMAIN_LEN,
                });
            }
        }
        Ok(())
    }
}

/// One discrete message exchanged over the shared channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The logical port this message belongs to.
    pub port: PortKey,
    /// The message payload.
    pub payload: Payload,
}

impl Envelope {
    /// Create a new envelope.
    pub fn new(port: PortKey, payload: Payload) -> Self {
        Self { port, payload }
    }

    /// Serialize to the wire JSON form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }

    /// Parse from the wire JSON form.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(Into::into)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.port.to_string(), &self.payload)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EnvelopeVisitor;

        impl<'de> Visitor<'de> for EnvelopeVisitor {
            type Value = Envelope;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a single-key map from port key to payload")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Envelope, A::Error> {
                let (key, payload): (String, Payload) = map
                    .next_entry()?
                    .ok_or_else(|| de::Error::custom("envelope has no port key"))?;
                if map.next_entry::<String, IgnoredAny>()?.is_some() {
                    return Err(de::Error::custom("envelope must have exactly one port key"));
                }
                let port: PortKey = key.parse().map_err(de::Error::custom)?;
                Ok(Envelope { port, payload })
            }
        }

        deserializer.deserialize_map(EnvelopeVisitor)
    }
}
