//! Common types shared by the forwarder layer and the capture pipeline.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Which proxied protocol phase a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// The lobby phase: login, character selection, world redirect.
    Lobby,
    /// The zone phase: in-world traffic after the lobby hand-off.
    Zone,
}

impl ConnectionKind {
    /// Tag byte written into capture records.
    pub fn tag(self) -> u8 {
        match self {
            ConnectionKind::Lobby => 1,
            ConnectionKind::Zone => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ConnectionKind::Lobby),
            2 => Some(ConnectionKind::Zone),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKind::Lobby => write!(f, "lobby"),
            ConnectionKind::Zone => write!(f, "zone"),
        }
    }
}

/// Direction of an intercepted packet relative to the proxied client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Clientbound: bytes arriving from the upstream server.
    Rx,
    /// Serverbound: bytes the client sends toward the upstream server.
    Tx,
}

impl Direction {
    /// Tag byte written into capture records.
    pub fn tag(self) -> u8 {
        match self {
            Direction::Rx => 0,
            Direction::Tx => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Direction::Rx),
            1 => Some(Direction::Tx),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "rx"),
            Direction::Tx => write!(f, "tx"),
        }
    }
}

/// A fully resolved proxy endpoint. Immutable once built by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub addr: IpAddr,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self { addr, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

impl From<ProxyEndpoint> for SocketAddr {
    fn from(ep: ProxyEndpoint) -> Self {
        ep.socket_addr()
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Byte size of the fixed segment descriptor every intercepted packet carries.
pub const SEGMENT_HEADER_LEN: usize = 16;

/// The per-segment descriptor the forwarders carve out of the relayed stream.
///
/// The capture pipeline treats it as an opaque block of bytes to be copied
/// into the frame body verbatim; the relay itself reads only the leading
/// little-endian u32, the total segment length (descriptor included).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    bytes: [u8; SEGMENT_HEADER_LEN],
}

impl SegmentHeader {
    pub fn from_bytes(bytes: [u8; SEGMENT_HEADER_LEN]) -> Self {
        Self { bytes }
    }

    /// Total segment length in bytes, this descriptor included.
    pub fn segment_len(&self) -> usize {
        u32::from_le_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]]) as usize
    }

    pub fn as_bytes(&self) -> &[u8; SEGMENT_HEADER_LEN] {
        &self.bytes
    }
}

/// A packet lifted out of the relayed stream.
///
/// Borrowed into a callback for the duration of one invocation and not
/// retained afterwards; anything the callback wants to keep must be copied.
#[derive(Debug, Clone, Copy)]
pub struct RawPacket<'a> {
    pub header: SegmentHeader,
    pub payload: &'a [u8],
}

/// Callback invoked synchronously from a relay task for every carved packet.
pub type PacketHandler = Arc<dyn Fn(&RawPacket<'_>) + Send + Sync>;
