//! The network layer: endpoint resolution and the two relays whose packet
//! events feed the capture pipeline.

pub mod forwarder;
pub mod resolver;
pub mod types;

pub use forwarder::{Forwarder, Upstream, ZoneRoute};
pub use types::{ConnectionKind, Direction, PacketHandler, ProxyEndpoint, RawPacket, SegmentHeader};
