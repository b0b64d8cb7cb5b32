//! The capture pipeline: frame synthesis, the `.cfcap` container codec, and
//! the serialized append point shared by all packet callbacks.

pub mod container;
pub mod frame;
pub mod sink;
pub mod types;

pub use container::CaptureFile;
pub use sink::CaptureSink;
pub use types::CaptureSession;
