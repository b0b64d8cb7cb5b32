use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Writer identifier recorded in the container's version record.
pub const WRITER_VERSION: &str = concat!("cfcap/", env!("CARGO_PKG_VERSION"));

/// Version of the frame layout this writer produces.
pub const FORMAT_VERSION: u32 = 1;

/// One recording run, from process start to the operator stop signal.
///
/// The id seeds the default output filename. Owned by the lifecycle
/// controller; nothing else mutates it.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Marks the session ended and returns the end timestamp.
    ///
    /// The first call pins the timestamp; later calls return it unchanged.
    pub fn finish(&mut self) -> DateTime<Utc> {
        *self.ended_at.get_or_insert_with(Utc::now)
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_sets_ended_at_once() {
        let mut session = CaptureSession::new();
        assert!(session.ended_at.is_none());

        let first = session.finish();
        let second = session.finish();
        assert_eq!(first, second);
        assert_eq!(session.ended_at, Some(first));
    }
}
