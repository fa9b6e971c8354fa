//! Typed wire model for the shared device channel.
//!
//! Every message on the link is an envelope: one port key mapped to one
//! payload. This crate owns the typed port identity, the JSON wire boundary,
//! and the binary plugin module frame codec. Stringified port keys
//! (`"tcp3"`) exist only at the serialization boundary.

pub mod envelope;
pub mod error;
pub mod plugin;
pub mod port;

pub use envelope::{Envelope, Payload, PayloadKind, MAX_DOMAIN_LEN};
pub use error::{Result, WireError};
pub use plugin::{
    decode_plugin_frame, encode_plugin_frame, PluginDirection, PluginFrame,
    DEFAULT_MAX_PLUGIN_PAYLOAD, MODULE_PLUGIN, PLUGIN_HEADER_SIZE, SELECTOR_RECEIVE, SELECTOR_SEND,
};
pub use port::{PortKey, PortKind};
