//! Wire codec for the gateway routing fabric.
//!
//! Every integer field is big-endian. Frame layout: a [`MessageHeader`]
//! (optionally carrying a [`RouteInfo`] for `P2PMessage`/`BroadcastMessage`
//! frames) followed
//! contiguously by the opaque application payload, together forming a
//! [`Message`]. [`MessagePayload`] is the inner envelope fronts exchange
//! once a `Message` has been dispatched to a local front.

use std::fmt;

mod header;
mod message;
mod payload;
mod route_info;

pub use header::MessageHeader;
pub use message::Message;
pub use payload::MessagePayload;
pub use route_info::RouteInfo;

/// Default maximum accepted frame size (100 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// `ext` bit for "this message is a response".
pub const EXT_RESPONSE: u16 = 0x0001;
/// `ext` bit for route-by-node-id policy.
pub const EXT_ROUTE_BY_NODE: u16 = 0x0002;
/// `ext` bit for route-by-agency policy.
pub const EXT_ROUTE_BY_AGENCY: u16 = 0x0004;
/// `ext` bit for route-by-component policy.
pub const EXT_ROUTE_BY_COMPONENT: u16 = 0x0008;
/// `ext` bit for route-by-topic policy.
pub const EXT_ROUTE_BY_TOPIC: u16 = 0x0010;

const ROUTE_POLICY_MASK: u16 =
EXT_ROUTE_BY_NODE | EXT_ROUTE_BY_AGENCY | EXT_ROUTE_BY_COMPONENT | EXT_ROUTE_BY_TOPIC;

/// Wire-level packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketType {
    P2PMessage = 0x00,
    BroadcastMessage = 0x01,
    RouterTableSyncSeq = 0x10,
    RouterTableResponse = 0x11,
    RouterTableRequest = 0x12,
    SyncNodeSeq = 0x20,
    RequestNodeStatus = 0x21,
    ResponseNodeStatus = 0x22,
}

impl PacketType {
    pub fn from_u16(value: u16) -> Result<Self, WireError> {
        match value {
            0x00 => Ok(Self::P2PMessage),
            0x01 => Ok(Self::BroadcastMessage),
            0x10 => Ok(Self::RouterTableSyncSeq),
            0x11 => Ok(Self::RouterTableResponse),
            0x12 => Ok(Self::RouterTableRequest),
            0x20 => Ok(Self::SyncNodeSeq),
            0x21 => Ok(Self::RequestNodeStatus),
            0x22 => Ok(Self::ResponseNodeStatus),
            other => Err(WireError::UnknownPacketType(other)),
        }
    }

    /// Both application packet types carry a [`RouteInfo`]: a `BroadcastMessage`
    /// still needs topic/component/agency context for the receiving gateway's
    /// local fan-out, even though it skips the peer-router hop.
    pub fn carries_route_info(self) -> bool {
        matches!(self, Self::P2PMessage | Self::BroadcastMessage)
    }
}

/// One of the four routing policies selectable via `ext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutePolicy {
    NodeId,
    Agency,
    Component,
    Topic,
}

impl RoutePolicy {
    pub fn ext_bit(self) -> u16 {
        match self {
            Self::NodeId => EXT_ROUTE_BY_NODE,
            Self::Agency => EXT_ROUTE_BY_AGENCY,
            Self::Component => EXT_ROUTE_BY_COMPONENT,
            Self::Topic => EXT_ROUTE_BY_TOPIC,
        }
    }

    /// Decode the policy bits of `ext`. Exactly one of the four route bits
    /// must be set; a conforming decoder
    /// must not re-test the same bit twice, and must reject frames that
    /// carry more than one policy bit rather than silently picking one.
    pub fn decode_ext(ext: u16) -> Result<Self, WireError> {
        let bits = ext & ROUTE_POLICY_MASK;
        match bits.count_ones() {
            0 => Err(WireError::NoPolicyBit(ext)),
            1 => {
                // Priority order per: NodeID -> Component -> Agency -> Topic.
                // Only one bit is set at this point, so the order just
                // documents intent; it never masks a second bit.
                if bits & EXT_ROUTE_BY_NODE != 0 {
                    Ok(Self::NodeId)
                } else if bits & EXT_ROUTE_BY_COMPONENT != 0 {
                    Ok(Self::Component)
                } else if bits & EXT_ROUTE_BY_AGENCY != 0 {
                    Ok(Self::Agency)
                } else {
                    Ok(Self::Topic)
                }
            }
            _ => Err(WireError::MultiplePolicyBits(ext)),
        }
    }
}

pub fn is_response(ext: u16) -> bool {
    ext & EXT_RESPONSE != 0
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum WireError {
    #[error("frame of {0} bytes exceeds the configured maximum of {1} bytes")]
    FrameTooLarge(usize, usize),
    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),
    #[error("malformed payload: {0}")]
    MalformedPayload(&'static str),
    #[error("unknown packet type 0x{0:04x}")]
    UnknownPacketType(u16),
    #[error("route policy ext bits 0x{0:04x} set more than one policy bit")]
    MultiplePolicyBits(u16),
    #[error("route policy ext bits 0x{0:04x} set no policy bit")]
    NoPolicyBit(u16),
    #[error("route info missing required field for {0:?}: {1}")]
    InvalidRouteInfo(RoutePolicy, &'static str),
}

impl fmt::Display for RoutePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NodeId => "byNode",
            Self::Agency => "byAgency",
            Self::Component => "byComponent",
            Self::Topic => "byTopic",
        };
        write!(f, "{name}")
    }
}

// These primitives are also used by downstream crates (`fabric-routing`,
// `fabric-nodeinfo`) to build the sub-codecs for `RouterTableResponse` and
// `ResponseNodeStatus` payloads, so they stay `pub` rather than crate-private.

pub fn read_u16(buf: &[u8], idx: &mut usize) -> Result<u16, WireError> {
    if buf.len() < *idx + 2 {
        return Err(WireError::MalformedMessage("truncated u16 field"));
    }
    let value = u16::from_be_bytes([buf[*idx], buf[*idx + 1]]);
    *idx += 2;
    Ok(value)
}

pub fn read_u32(buf: &[u8], idx: &mut usize) -> Result<u32, WireError> {
    if buf.len() < *idx + 4 {
        return Err(WireError::MalformedMessage("truncated u32 field"));
    }
    let value = u32::from_be_bytes([buf[*idx], buf[*idx + 1], buf[*idx + 2], buf[*idx + 3]]);
    *idx += 4;
    Ok(value)
}

pub fn read_len_prefixed<'a>(buf: &'a [u8], idx: &mut usize) -> Result<&'a [u8], WireError> {
    let len = read_u16(buf, idx)? as usize;
    if buf.len() < *idx + len {
        return Err(WireError::MalformedMessage("truncated length-prefixed field"));
    }
    let slice = &buf[*idx..*idx + len];
    *idx += len;
    Ok(slice)
}

pub fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), WireError> {
    let len = u16::try_from(bytes.len())
    .map_err(|_| WireError::MalformedMessage("field exceeds u16 length prefix"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

pub fn read_len_prefixed_string(buf: &[u8], idx: &mut usize) -> Result<String, WireError> {
    let slice = read_len_prefixed(buf, idx)?;
    String::from_utf8(slice.to_vec())
    .map_err(|_| WireError::MalformedMessage("length-prefixed field is not valid utf-8"))
}
