//! The single logical append point for captured frames.
//!
//! Up to four relay contexts (lobby rx/tx, zone rx/tx) call
//! [`CaptureSink::append_frame`] at arbitrary times; a mutex around the
//! container writer turns those calls into one global append order with no
//! interleaving of partial frame bytes. Finalization takes the same mutex
//! and flips a flag, so the session-end marker can never land between the
//! bytes of an in-flight frame and no frame can follow it.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::debug;

use crate::capture::container::CaptureFile;
use crate::capture::types::{CaptureSession, FORMAT_VERSION, WRITER_VERSION};
use crate::error_handling::types::SinkError;
use crate::network::types::{ConnectionKind, Direction};

struct Inner {
    file: CaptureFile,
    finalized: bool,
    frames: u64,
}

pub struct CaptureSink {
    inner: Mutex<Inner>,
}

impl CaptureSink {
    pub fn new(file: CaptureFile) -> Self {
        Self {
            inner: Mutex::new(Inner {
                file,
                finalized: false,
                frames: 0,
            }),
        }
    }

    /// Writes the writer/format version record. Called once, at startup,
    /// by the lifecycle controller.
    pub fn write_version_info(&self) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().unwrap();
        inner.file.write_version_info(WRITER_VERSION, FORMAT_VERSION)
    }

    /// Writes the session-start marker. Called once, at startup, by the
    /// lifecycle controller, before either forwarder accepts connections.
    pub fn write_session_start(&self, session: &CaptureSession) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .file
            .write_session_start(session.id, session.started_at.timestamp_millis() as u64)
    }

    /// Appends one frame atomically with respect to every other append and
    /// to finalization. Fails with [`SinkError::Finalized`] once the
    /// session-end marker has been written.
    pub fn append_frame(
        &self,
        kind: ConnectionKind,
        direction: Direction,
        frame: &[u8],
    ) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.finalized {
            return Err(SinkError::Finalized);
        }
        inner.file.append_frame(kind, direction, frame)?;
        inner.frames += 1;
        Ok(())
    }

    /// Writes the session-end marker and flushes the container.
    ///
    /// After this returns, every further `append_frame` fails; the marker is
    /// guaranteed to be the last record of the file.
    pub fn finalize(&self, ended_at: DateTime<Utc>) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.finalized {
            return Err(SinkError::Finalized);
        }
        inner.finalized = true;
        inner
            .file
            .write_session_end(ended_at.timestamp_millis() as u64)?;
        inner.file.flush()?;
        debug!("capture sink finalized after {} frames", inner.frames);
        Ok(())
    }

    /// Number of frames appended so far, for the shutdown summary.
    pub fn frames_appended(&self) -> u64 {
        self.inner.lock().unwrap().frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::container::{read_records, Record};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sink_at(dir: &TempDir) -> (Arc<CaptureSink>, std::path::PathBuf) {
        let path = dir.path().join("sink.cfcap");
        let file = CaptureFile::create(&path).unwrap();
        (Arc::new(CaptureSink::new(file)), path)
    }

    #[test]
    fn concurrent_appends_never_interleave() {
        let dir = TempDir::new().unwrap();
        let (sink, path) = sink_at(&dir);

        // Four producer contexts, as in a real run: lobby rx/tx, zone rx/tx.
        let sources = [
            (ConnectionKind::Lobby, Direction::Rx, 0xA0u8),
            (ConnectionKind::Lobby, Direction::Tx, 0xA1),
            (ConnectionKind::Zone, Direction::Rx, 0xB0),
            (ConnectionKind::Zone, Direction::Tx, 0xB1),
        ];
        let mut handles = Vec::new();
        for (kind, direction, fill) in sources {
            let sink = Arc::clone(&sink);
            handles.push(std::thread::spawn(move || {
                for i in 0..1000u16 {
                    // Length varies per call so torn writes would corrupt
                    // the record framing, not just the contents.
                    let len = 8 + (i as usize % 96);
                    let mut frame = vec![fill; len];
                    frame[..2].copy_from_slice(&i.to_le_bytes());
                    sink.append_frame(kind, direction, &frame).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        sink.finalize(Utc::now()).unwrap();

        let records = read_records(&path).unwrap();
        let frames: Vec<_> = records
            .iter()
            .filter_map(|r| match r {
                Record::Frame { bytes, .. } => Some(bytes),
                _ => None,
            })
            .collect();
        assert_eq!(frames.len(), 4000);
        assert_eq!(sink.frames_appended(), 4000);
        for bytes in frames {
            // Every byte past the sequence number carries the producer's
            // fill value; a torn write would mix fills or break framing.
            assert!(bytes[2..].iter().all(|b| *b == bytes[2]));
        }
    }

    #[test]
    fn append_after_finalize_fails() {
        let dir = TempDir::new().unwrap();
        let (sink, path) = sink_at(&dir);

        sink.append_frame(ConnectionKind::Lobby, Direction::Rx, b"before")
            .unwrap();
        sink.finalize(Utc::now()).unwrap();
        assert!(matches!(
            sink.append_frame(ConnectionKind::Lobby, Direction::Rx, b"after"),
            Err(SinkError::Finalized)
        ));
        assert!(matches!(sink.finalize(Utc::now()), Err(SinkError::Finalized)));

        let records = read_records(&path).unwrap();
        assert!(matches!(records.last(), Some(Record::SessionEnd { .. })));
    }
}
