use std::fmt;
use std::net::SocketAddr;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    MissingHost,
    PublicZonePair(String),
    MissingLibrary(String),
    OutputDirError(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::MissingHost => {
                write!(f, "No upstream host given (set --host or use --config)")
            }
            ConfigError::PublicZonePair(e) => write!(f, "Public zone endpoint error: {}", e),
            ConfigError::MissingLibrary(e) => write!(f, "Compression library error: {}", e),
            ConfigError::OutputDirError(e) => write!(f, "Capture directory error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug)]
pub enum ResolutionError {
    LookupFailed(String, std::io::Error),
    NoAddresses(String),
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::LookupFailed(host, e) => {
                write!(f, "Failed to resolve '{}': {}", host, e)
            }
            ResolutionError::NoAddresses(host) => {
                write!(f, "Lookup for '{}' returned no addresses", host)
            }
        }
    }
}

impl std::error::Error for ResolutionError {}

#[derive(Debug)]
pub enum ForwarderError {
    BindError(std::io::Error),
    AcceptError(std::io::Error),
    UpstreamConnectError(SocketAddr, std::io::Error),
    RelayError(std::io::Error),
}

impl fmt::Display for ForwarderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwarderError::BindError(e) => write!(f, "Listener bind error: {}", e),
            ForwarderError::AcceptError(e) => write!(f, "Accept error: {}", e),
            ForwarderError::UpstreamConnectError(addr, e) => {
                write!(f, "Upstream connect to {} failed: {}", addr, e)
            }
            ForwarderError::RelayError(e) => write!(f, "Relay error: {}", e),
        }
    }
}

impl std::error::Error for ForwarderError {}

#[derive(Debug)]
pub enum SinkError {
    CreateFailed(std::io::Error),
    WriteFailed(std::io::Error),
    ReadFailed(std::io::Error),
    Malformed(String),
    Finalized,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::CreateFailed(e) => write!(f, "Capture file creation failed: {}", e),
            SinkError::WriteFailed(e) => write!(f, "Capture write failed: {}", e),
            SinkError::ReadFailed(e) => write!(f, "Capture read failed: {}", e),
            SinkError::Malformed(e) => write!(f, "Malformed capture container: {}", e),
            SinkError::Finalized => write!(f, "Capture already finalized"),
        }
    }
}

impl std::error::Error for SinkError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    ResolutionError(ResolutionError),
    ForwarderError(ForwarderError),
    SinkError(SinkError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::ResolutionError(e) => write!(f, "Resolution error: {}", e),
            ControllerError::ForwarderError(e) => write!(f, "Forwarder error: {}", e),
            ControllerError::SinkError(e) => write!(f, "Capture sink error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<ResolutionError> for ControllerError {
    fn from(err: ResolutionError) -> Self {
        ControllerError::ResolutionError(err)
    }
}

impl From<ForwarderError> for ControllerError {
    fn from(err: ForwarderError) -> Self {
        ControllerError::ForwarderError(err)
    }
}

impl From<SinkError> for ControllerError {
    fn from(err: SinkError) -> Self {
        ControllerError::SinkError(err)
    }
}
