/// Errors in envelope construction and wire (de)serialization.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The wire key does not name a known port.
    #[error("unknown port key '{0}'")]
    UnknownPortKey(String),

    /// The connect domain exceeds the protocol limit.
    #[error("domain too long ({len} bytes, max {max})")]
    DomainTooLong { len: usize, max: usize },

    /// The plugin frame names a module other than the reserved plugin module.
    #[error("unexpected module id {0}")]
    UnknownModule(u8),

    /// The plugin frame carries an unknown function selector.
    #[error("unknown function selector {0}")]
    UnknownSelector(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// JSON error at the wire boundary.
    #[error("envelope json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WireError>;
