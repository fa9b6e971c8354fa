use portmux_wire::{PayloadKind, PortKey};

/// Errors surfaced to callers of port operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No matching response arrived before the deadline.
    #[error("{kind} request on {port} timed out")]
    Timeout { port: PortKey, kind: PayloadKind },

    /// The port is already claimed.
    #[error("{0} is in use")]
    PortInUse(PortKey),

    /// Operation attempted on a port never claimed or already reset.
    #[error("{0} is not connected")]
    NotConnected(PortKey),

    /// The port was reset while the request was pending.
    #[error("{0} disconnected while a request was pending")]
    Disconnected(PortKey),

    /// The remote end reported an explicit error.
    #[error("remote error on {port}: {message}")]
    Remote { port: PortKey, message: String },

    /// A pending request settled with a payload of the wrong kind.
    #[error("unexpected {kind} payload on {port}")]
    UnexpectedPayload { port: PortKey, kind: PayloadKind },

    /// Wire-level error.
    #[error("wire error: {0}")]
    Wire(#[from] portmux_wire::WireError),

    /// Command schema error.
    #[cfg(feature = "schema")]
    #[error("schema error: {0}")]
    Schema(#[from] portmux_schema::SchemaError),

    /// The correlator was dropped while the request was pending.
    #[error("correlator closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, LinkError>;
