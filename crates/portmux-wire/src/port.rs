//! Typed port identity.
//!
//! A port is one logical, independently-ordered sub-channel multiplexed over
//! the shared link. The wire key string (`"tcp3"`, `"plugin"`) is produced
//! and parsed only here.

use std::fmt;
use std::str::FromStr;

use crate::error::WireError;

/// Kinds of logical port multiplexed over one device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    /// Virtual TCP socket ports (`tcp0`, `tcp1`, ... on the wire).
    Tcp,
    /// The generic plugin command module.
    Plugin,
    /// The BLE command endpoint.
    BleCommand,
}

impl PortKind {
    /// Wire key prefix for this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            PortKind::Tcp => "tcp",
            PortKind::Plugin => "plugin",
            PortKind::BleCommand => "ble",
        }
    }

    /// Whether this kind has a single instance and omits the numeric
    /// suffix on the wire.
    pub fn is_singleton(self) -> bool {
        !matches!(self, PortKind::Tcp)
    }
}

/// Identity of one logical port: kind plus numeric id.
///
/// Singleton kinds always carry id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortKey {
    /// The port kind.
    pub kind: PortKind,
    /// Numeric id within the kind.
    pub id: u8,
}

impl PortKey {
    /// Create a port key.
    pub fn new(kind: PortKind, id: u8) -> Self {
        Self { kind, id }
    }

    /// The `tcp<id>` port.
    pub fn tcp(id: u8) -> Self {
        Self::new(PortKind::Tcp, id)
    }

    /// The plugin command port.
    pub fn plugin() -> Self {
        Self::new(PortKind::Plugin, 0)
    }

    /// The BLE command port.
    pub fn ble_command() -> Self {
        Self::new(PortKind::BleCommand, 0)
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_singleton() {
            f.write_str(self.kind.prefix())
        } else {
            write!(f, "{}{}", self.kind.prefix(), self.id)
        }
    }
}

impl FromStr for PortKey {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for kind in [PortKind::Tcp, PortKind::Plugin, PortKind::BleCommand] {
            let Some(rest) = s.strip_prefix(kind.prefix()) else {
                continue;
            };
            if kind.is_singleton() {
                if rest.is_empty() {
                    return Ok(Self::new(kind, 0));
                }
            } else if !rest.is_empty() {
                if let Ok(id) = rest.parse::<u8>() {
                    return Ok(Self::new(kind, id));
                }
            }
        }
        Err(WireError::UnknownPortKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_key_round_trip() {
        for key in [PortKey::tcp(0), PortKey::tcp(7), PortKey::plugin(), PortKey::ble_command()] {
            let wire = key.to_string();
            let parsed: PortKey = wire.parse().expect("wire key should parse");
            assert_eq!(parsed, key);
        }
    }

    #[test]
    fn tcp_keys_carry_id() {
        assert_eq!(PortKey::tcp(3).to_string(), "tcp3");
        assert_eq!("tcp3".parse::<PortKey>().unwrap(), PortKey::tcp(3));
    }

    #[test]
    fn singleton_keys_omit_id() {
        assert_eq!(PortKey::plugin().to_string(), "plugin");
        assert_eq!(PortKey::ble_command().to_string(), "ble");
        assert_eq!("plugin".parse::<PortKey>().unwrap(), PortKey::plugin());
    }

    #[test]
    fn bare_tcp_key_is_invalid() {
        assert!(matches!(
            "tcp".parse::<PortKey>(),
            Err(WireError::UnknownPortKey(_))
        ));
    }

    #[test]
    fn suffixed_singleton_key_is_invalid() {
        assert!("plugin2".parse::<PortKey>().is_err());
        assert!("ble1".parse::<PortKey>().is_err());
    }

    #[test]
    fn unknown_prefix_is_invalid() {
        assert!(matches!(
            "uart0".parse::<PortKey>(),
            Err(WireError::UnknownPortKey(_))
        ));
    }

    #[test]
    fn out_of_range_id_is_invalid() {
        assert!("tcp256".parse::<PortKey>().is_err());
    }
}
