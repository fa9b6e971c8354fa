//! Per-port request/response correlation over a shared device channel.
//!
//! This is the "just works" layer. Claim a logical port, issue awaitable,
//! timeout-bounded requests, and let the dispatcher route arbitrary,
//! possibly out-of-order inbound envelopes back to the right pending call.
//!
//! All inbound handling is serialized through one [`Dispatcher`]; requests
//! on different ports interleave freely, requests on the same port settle
//! in submission order.

pub mod channel;
pub mod correlator;
pub mod error;
pub mod guard;
pub mod plugin;
pub mod socket;

pub use channel::{Dispatcher, RawChannel};
pub use correlator::{PendingTicket, PortCorrelator, Settlement};
pub use error::{LinkError, Result};
pub use guard::{TimeoutGuard, DEFAULT_TIMEOUT};
pub use plugin::PluginPort;
pub use socket::TcpSocket;
