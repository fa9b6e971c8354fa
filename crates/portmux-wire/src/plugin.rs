use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// Reserved module id of the plugin command endpoint.
pub const MODULE_PLUGIN: u8 = 15;

/// Function selector: host -> device payload.
pub const SELECTOR_SEND: u8 = 0;

/// Function selector: device -> host payload.
pub const SELECTOR_RECEIVE: u8 = 1;

/// Plugin frame header: module (1) + selector (1) + length (4) = 6 bytes.
pub const PLUGIN_HEADER_SIZE: usize = 6;

/// Default maximum plugin payload size: 64 KiB.
pub const DEFAULT_MAX_PLUGIN_PAYLOAD: usize = 64 * 1024;

/// Direction of a plugin frame, derived from its function selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginDirection {
    /// Host to device.
    Send,
    /// Device to host.
    Receive,
}

impl PluginDirection {
    /// The wire selector byte for this direction.
    pub fn selector(self) -> u8 {
        match self {
            PluginDirection::Send => SELECTOR_SEND,
            PluginDirection::Receive => SELECTOR_RECEIVE,
        }
    }

    fn from_selector(selector: u8) -> Result<Self> {
        match selector {
            SELECTOR_SEND => Ok(PluginDirection::Send),
            SELECTOR_RECEIVE => Ok(PluginDirection::Receive),
            other => Err(WireError::UnknownSelector(other)),
        }
    }
}

/// A decoded plugin module frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginFrame {
    /// Direction derived from the function selector.
    pub direction: PluginDirection,
    /// The raw payload bytes.
    pub payload: Bytes,
}

/// Encode a plugin frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬──────────────┬────────────┬──────────────────┐
/// │ Module (1B)│ Selector (1B)│ Length     │ Payload          │
/// │ 15         │ 0=send 1=recv│ (4B LE)    │ (Length bytes)   │
/// └────────────┴──────────────┴────────────┴──────────────────┘
/// ```
pub fn encode_plugin_frame(
    direction: PluginDirection,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(WireError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(PLUGIN_HEADER_SIZE + payload.len());
    dst.put_u8(MODULE_PLUGIN);
    dst.put_u8(direction.selector());
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a plugin frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_plugin_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<PluginFrame>> {
    if src.len() < PLUGIN_HEADER_SIZE {
        return Ok(None); // Need more data
    }

    if src[0] != MODULE_PLUGIN {
        return Err(WireError::UnknownModule(src[0]));
    }
    let direction = PluginDirection::from_selector(src[1])?;

    let payload_len = u32::from_le_bytes(src[2..6].try_into().unwrap()) as usize;
    if payload_len > max_payload {
        return Err(WireError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = PLUGIN_HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(PLUGIN_HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(PluginFrame { direction, payload }))
}
