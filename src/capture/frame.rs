//! Frame synthesis.
//!
//! The forwarders only hand us an inner segment descriptor and a payload;
//! the outer per-frame header the container expects does not exist on the
//! wire at that point. It is fabricated here, in one place, so the policy
//! is easy to audit:
//!
//! - the timestamp is the wall clock at synthesis time, not the moment the
//!   forwarder read the bytes off the socket (the relay does not expose
//!   that instant);
//! - `frame_count` is always 1: the relay delivers one carved segment per
//!   callback, so every frame records exactly one packet even when the
//!   inner descriptor announces several logical sub-packets.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::network::types::{ConnectionKind, RawPacket, SEGMENT_HEADER_LEN};

/// Byte size of the fabricated outer header:
/// timestamp u64 | total_size u32 | connection_kind u8 | frame_count u32.
pub const OUTER_HEADER_LEN: usize = 8 + 4 + 1 + 4;

/// Builds the byte sequence for one capture frame.
///
/// Layout, all integers little-endian:
///
/// ```text
/// [outer header, OUTER_HEADER_LEN bytes]
/// [inner segment descriptor, SEGMENT_HEADER_LEN bytes, copied verbatim]
/// [payload]
/// ```
///
/// Pure function: no shared state, no I/O, safe to call from any number of
/// relay tasks at once.
pub fn synthesize(
    raw: &RawPacket<'_>,
    kind: ConnectionKind,
    captured_at: DateTime<Utc>,
) -> Bytes {
    let total_size = (OUTER_HEADER_LEN + SEGMENT_HEADER_LEN + raw.payload.len()) as u32;
    let mut buf = BytesMut::with_capacity(total_size as usize);
    buf.put_u64_le(captured_at.timestamp_millis() as u64);
    buf.put_u32_le(total_size);
    buf.put_u8(kind.tag());
    buf.put_u32_le(1); // frame_count
    buf.put_slice(raw.header.as_bytes());
    buf.put_slice(raw.payload);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::types::SegmentHeader;

    fn packet(payload: &[u8]) -> RawPacket<'_> {
        let mut header = [0u8; SEGMENT_HEADER_LEN];
        let total = (SEGMENT_HEADER_LEN + payload.len()) as u32;
        header[..4].copy_from_slice(&total.to_le_bytes());
        RawPacket {
            header: SegmentHeader::from_bytes(header),
            payload,
        }
    }

    #[test]
    fn declared_total_size_matches_actual_length() {
        for payload in [&b""[..], &b"a"[..], &[0u8; 1500][..]] {
            let raw = packet(payload);
            let frame = synthesize(&raw, ConnectionKind::Lobby, Utc::now());
            let declared = u32::from_le_bytes(frame[8..12].try_into().unwrap());
            assert_eq!(declared as usize, frame.len());
            assert_eq!(frame.len(), OUTER_HEADER_LEN + SEGMENT_HEADER_LEN + payload.len());
        }
    }

    #[test]
    fn frame_count_is_always_one() {
        // Inner descriptor claiming many sub-packets still yields count 1.
        let mut header = [0u8; SEGMENT_HEADER_LEN];
        header[..4].copy_from_slice(&(SEGMENT_HEADER_LEN as u32 + 4).to_le_bytes());
        header[12] = 9; // whatever the descriptor says, we do not interpret it
        let raw = RawPacket {
            header: SegmentHeader::from_bytes(header),
            payload: b"abcd",
        };
        let frame = synthesize(&raw, ConnectionKind::Zone, Utc::now());
        let count = u32::from_le_bytes(frame[13..17].try_into().unwrap());
        assert_eq!(count, 1);
    }

    #[test]
    fn encodes_timestamp_kind_and_body() {
        let raw = packet(b"payload");
        let captured_at = Utc::now();
        let frame = synthesize(&raw, ConnectionKind::Zone, captured_at);

        let ts = u64::from_le_bytes(frame[..8].try_into().unwrap());
        assert_eq!(ts, captured_at.timestamp_millis() as u64);
        assert_eq!(frame[12], ConnectionKind::Zone.tag());
        assert_eq!(&frame[OUTER_HEADER_LEN..OUTER_HEADER_LEN + SEGMENT_HEADER_LEN], raw.header.as_bytes());
        assert_eq!(&frame[OUTER_HEADER_LEN + SEGMENT_HEADER_LEN..], b"payload");
    }
}
