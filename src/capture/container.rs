//! The `.cfcap` container codec.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! file header: magic "CFCP" | major u16 | minor u16
//! records, each: tag u8 | body
//!   tag 1 VersionInfo : writer_len u16 | writer utf-8 | format_version u32
//!   tag 2 SessionStart: session id 16 B | started u64 ms
//!   tag 3 SessionEnd  : ended u64 ms
//!   tag 4 Frame       : kind u8 | direction u8 | len u32 | frame bytes
//! ```
//!
//! Writes are buffered; a crash can lose the tail of the file. The normal
//! stop path flushes through [`CaptureFile::flush`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};
use log::error;
use uuid::Uuid;

use crate::error_handling::types::SinkError;
use crate::network::types::{ConnectionKind, Direction};

const MAGIC: [u8; 4] = *b"CFCP";
const CONTAINER_MAJOR: u16 = 1;
const CONTAINER_MINOR: u16 = 0;

const TAG_VERSION_INFO: u8 = 1;
const TAG_SESSION_START: u8 = 2;
const TAG_SESSION_END: u8 = 3;
const TAG_FRAME: u8 = 4;

/// One parsed container record, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    VersionInfo {
        writer: String,
        format_version: u32,
    },
    SessionStart {
        session_id: Uuid,
        started_ms: u64,
    },
    SessionEnd {
        ended_ms: u64,
    },
    Frame {
        kind: ConnectionKind,
        direction: Direction,
        bytes: Vec<u8>,
    },
}

/// Append-only writer for a capture container.
pub struct CaptureFile {
    f: BufWriter<File>,
}

impl CaptureFile {
    /// Creates a new container and writes the file header.
    ///
    /// Fails if the file already exists or the parent directory is missing;
    /// the controller is responsible for creating the default `captures/`
    /// directory beforehand.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = File::options()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                error!("Failed to create capture file {}: {}", path.display(), e);
                SinkError::CreateFailed(e)
            })?;
        let mut f = BufWriter::new(file);
        let mut header = BytesMut::with_capacity(8);
        header.put_slice(&MAGIC);
        header.put_u16_le(CONTAINER_MAJOR);
        header.put_u16_le(CONTAINER_MINOR);
        f.write_all(&header).map_err(SinkError::WriteFailed)?;
        Ok(Self { f })
    }

    pub fn write_version_info(&mut self, writer: &str, format_version: u32) -> Result<(), SinkError> {
        let mut body = BytesMut::with_capacity(1 + 2 + writer.len() + 4);
        body.put_u8(TAG_VERSION_INFO);
        body.put_u16_le(writer.len() as u16);
        body.put_slice(writer.as_bytes());
        body.put_u32_le(format_version);
        self.write_record(&body)
    }

    pub fn write_session_start(&mut self, session_id: Uuid, started_ms: u64) -> Result<(), SinkError> {
        let mut body = BytesMut::with_capacity(1 + 16 + 8);
        body.put_u8(TAG_SESSION_START);
        body.put_slice(session_id.as_bytes());
        body.put_u64_le(started_ms);
        self.write_record(&body)
    }

    pub fn write_session_end(&mut self, ended_ms: u64) -> Result<(), SinkError> {
        let mut body = BytesMut::with_capacity(1 + 8);
        body.put_u8(TAG_SESSION_END);
        body.put_u64_le(ended_ms);
        self.write_record(&body)
    }

    /// Appends one synthesized frame, tagged with its protocol phase and
    /// direction. The frame bytes are written verbatim.
    pub fn append_frame(
        &mut self,
        kind: ConnectionKind,
        direction: Direction,
        frame: &[u8],
    ) -> Result<(), SinkError> {
        let mut body = BytesMut::with_capacity(1 + 1 + 1 + 4 + frame.len());
        body.put_u8(TAG_FRAME);
        body.put_u8(kind.tag());
        body.put_u8(direction.tag());
        body.put_u32_le(frame.len() as u32);
        body.put_slice(frame);
        self.write_record(&body)
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.f.flush().map_err(SinkError::WriteFailed)
    }

    // Each record reaches the BufWriter in a single write_all, so partially
    // interleaved records cannot occur as long as callers serialize access.
    fn write_record(&mut self, record: &[u8]) -> Result<(), SinkError> {
        self.f.write_all(record).map_err(|e| {
            error!("Failed to append capture record: {}", e);
            SinkError::WriteFailed(e)
        })
    }
}

/// Parses a container back into its record sequence.
///
/// Used by tests and by post-run inspection; the recording path never reads.
pub fn read_records(path: &Path) -> Result<Vec<Record>, SinkError> {
    let data = std::fs::read(path).map_err(SinkError::ReadFailed)?;
    let mut cur = &data[..];

    if cur.remaining() < 8 {
        return Err(SinkError::Malformed("truncated file header".into()));
    }
    let mut magic = [0u8; 4];
    cur.copy_to_slice(&mut magic);
    if magic != MAGIC {
        return Err(SinkError::Malformed(format!("bad magic {:02x?}", magic)));
    }
    let major = cur.get_u16_le();
    let _minor = cur.get_u16_le();
    if major != CONTAINER_MAJOR {
        return Err(SinkError::Malformed(format!("unsupported major version {}", major)));
    }

    let mut records = Vec::new();
    while cur.has_remaining() {
        let tag = cur.get_u8();
        match tag {
            TAG_VERSION_INFO => {
                if cur.remaining() < 2 {
                    return Err(SinkError::Malformed("truncated version info".into()));
                }
                let len = cur.get_u16_le() as usize;
                if cur.remaining() < len + 4 {
                    return Err(SinkError::Malformed("truncated version info".into()));
                }
                let writer = String::from_utf8_lossy(&cur[..len]).into_owned();
                cur.advance(len);
                let format_version = cur.get_u32_le();
                records.push(Record::VersionInfo {
                    writer,
                    format_version,
                });
            }
            TAG_SESSION_START => {
                if cur.remaining() < 16 + 8 {
                    return Err(SinkError::Malformed("truncated session start".into()));
                }
                let mut id = [0u8; 16];
                cur.copy_to_slice(&mut id);
                let started_ms = cur.get_u64_le();
                records.push(Record::SessionStart {
                    session_id: Uuid::from_bytes(id),
                    started_ms,
                });
            }
            TAG_SESSION_END => {
                if cur.remaining() < 8 {
                    return Err(SinkError::Malformed("truncated session end".into()));
                }
                records.push(Record::SessionEnd {
                    ended_ms: cur.get_u64_le(),
                });
            }
            TAG_FRAME => {
                if cur.remaining() < 1 + 1 + 4 {
                    return Err(SinkError::Malformed("truncated frame record".into()));
                }
                let kind = ConnectionKind::from_tag(cur.get_u8())
                    .ok_or_else(|| SinkError::Malformed("unknown connection kind tag".into()))?;
                let direction = Direction::from_tag(cur.get_u8())
                    .ok_or_else(|| SinkError::Malformed("unknown direction tag".into()))?;
                let len = cur.get_u32_le() as usize;
                if cur.remaining() < len {
                    return Err(SinkError::Malformed("truncated frame bytes".into()));
                }
                let bytes = cur[..len].to_vec();
                cur.advance(len);
                records.push(Record::Frame {
                    kind,
                    direction,
                    bytes,
                });
            }
            other => {
                return Err(SinkError::Malformed(format!("unknown record tag {}", other)));
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn records_round_trip_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.cfcap");
        let id = Uuid::new_v4();

        let mut file = CaptureFile::create(&path).unwrap();
        file.write_version_info("cfcap/0.1.0", 1).unwrap();
        file.write_session_start(id, 1000).unwrap();
        file.append_frame(ConnectionKind::Lobby, Direction::Rx, b"first frame")
            .unwrap();
        file.append_frame(ConnectionKind::Zone, Direction::Tx, b"second frame")
            .unwrap();
        file.write_session_end(2000).unwrap();
        file.flush().unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(
            records,
            vec![
                Record::VersionInfo {
                    writer: "cfcap/0.1.0".into(),
                    format_version: 1,
                },
                Record::SessionStart {
                    session_id: id,
                    started_ms: 1000,
                },
                Record::Frame {
                    kind: ConnectionKind::Lobby,
                    direction: Direction::Rx,
                    bytes: b"first frame".to_vec(),
                },
                Record::Frame {
                    kind: ConnectionKind::Zone,
                    direction: Direction::Tx,
                    bytes: b"second frame".to_vec(),
                },
                Record::SessionEnd { ended_ms: 2000 },
            ]
        );
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dup.cfcap");
        let _first = CaptureFile::create(&path).unwrap();
        assert!(matches!(
            CaptureFile::create(&path),
            Err(SinkError::CreateFailed(_))
        ));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.cfcap");
        {
            let mut file = CaptureFile::create(&path).unwrap();
            file.append_frame(ConnectionKind::Lobby, Direction::Rx, b"frame")
                .unwrap();
            file.flush().unwrap();
        }
        let mut data = std::fs::read(&path).unwrap();
        data.truncate(data.len() - 1);
        std::fs::write(&path, data).unwrap();

        assert!(matches!(read_records(&path), Err(SinkError::Malformed(_))));
    }
}
