pub mod capture;
pub mod configuration;
pub mod controller;
pub mod error_handling;
pub mod network;

pub use capture::{CaptureFile, CaptureSession, CaptureSink};
pub use configuration::Config;
pub use controller::Controller;
