use std::path::{Path, PathBuf};

use clap::Parser;
use log::info;
use serde::Deserialize;
use uuid::Uuid;

use crate::error_handling::types::ConfigError;

fn default_origin_port() -> u16 {
    54994
}

fn default_proxy_host() -> String {
    String::from("127.0.0.1")
}

fn default_lobby_proxy_port() -> u16 {
    44994
}

fn default_zone_proxy_port() -> u16 {
    44992
}

/// Runtime configuration for a capture run.
///
/// Every setting can come from the command line or, with `--config`, from a
/// TOML file carrying the same field names; the two sources are
/// alternatives, not layers. The positional `output` argument stays a
/// command-line concern either way.
#[derive(Parser, Debug, Clone, Deserialize)]
#[command(name = "cfcap")]
#[command(version)]
#[command(about = "Records a proxied lobby/zone session into a .cfcap capture file")]
pub struct Config {
    /// Upstream origin host the lobby forwarder relays to.
    ///
    /// Hostname or literal IP address. Required unless `--config` supplies
    /// it.
    ///
    /// # Command Line
    /// Use `--host <HOST>` to set this value from the CLI
    #[arg(long)]
    #[serde(default)]
    pub host: Option<String>,

    /// Upstream origin port the lobby forwarder relays to.
    ///
    /// # Command Line
    /// Use `--port <PORT>` to set this value from the CLI
    #[arg(long, default_value_t = default_origin_port())]
    #[serde(default = "default_origin_port")]
    pub port: u16,

    /// Local bind host for the lobby listener.
    ///
    /// # Command Line
    /// Use `--lobby-proxy-host <HOST>` to set this value from the CLI
    #[arg(long, default_value_t = default_proxy_host())]
    #[serde(default = "default_proxy_host")]
    pub lobby_proxy_host: String,

    /// Local bind port for the lobby listener.
    ///
    /// # Command Line
    /// Use `--lobby-proxy-port <PORT>` to set this value from the CLI
    #[arg(long, default_value_t = default_lobby_proxy_port())]
    #[serde(default = "default_lobby_proxy_port")]
    pub lobby_proxy_port: u16,

    /// Local bind host for the zone listener.
    ///
    /// # Command Line
    /// Use `--zone-proxy-host <HOST>` to set this value from the CLI
    #[arg(long, default_value_t = default_proxy_host())]
    #[serde(default = "default_proxy_host")]
    pub zone_proxy_host: String,

    /// Local bind port for the zone listener.
    ///
    /// # Command Line
    /// Use `--zone-proxy-port <PORT>` to set this value from the CLI
    #[arg(long, default_value_t = default_zone_proxy_port())]
    #[serde(default = "default_zone_proxy_port")]
    pub zone_proxy_port: u16,

    /// Zone host advertised to clients instead of the real bind host.
    ///
    /// For NAT or reverse-proxy deployments where clients cannot reach the
    /// bind endpoint directly. Must be set together with
    /// `--public-zone-port`, or not at all.
    ///
    /// # Command Line
    /// Use `--public-zone-host <HOST>` to set this value from the CLI
    #[arg(long)]
    #[serde(default)]
    pub public_zone_host: Option<String>,

    /// Zone port advertised to clients instead of the real bind port.
    ///
    /// Must be set together with `--public-zone-host`, or not at all.
    ///
    /// # Command Line
    /// Use `--public-zone-port <PORT>` to set this value from the CLI
    #[arg(long)]
    #[serde(default)]
    pub public_zone_port: Option<u16>,

    /// Path to the Oodle compression library.
    ///
    /// Handed through to the codec layer untouched; when given, the file
    /// must exist.
    ///
    /// # Command Line
    /// Use `--oodle-path <PATH>` to set this value from the CLI, or the
    /// `CFCAP_OODLE_PATH` environment variable
    #[arg(long, env = "CFCAP_OODLE_PATH")]
    #[serde(default)]
    pub oodle_path: Option<PathBuf>,

    /// Load the settings above from a TOML file instead of flags.
    ///
    /// # Command Line
    /// Use `--config <FILE>` to set this value from the CLI
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Capture file path.
    ///
    /// Defaults to `./captures/<session-id>.cfcap`; the `captures`
    /// directory is created if absent.
    #[arg(value_name = "OUTPUT")]
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Config {
    /// Parses the command line and, if `--config` was given, swaps in the
    /// file's settings. The result is validated either way.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_sources(Config::parse())
    }

    pub(crate) fn from_sources(mut args: Config) -> Result<Self, ConfigError> {
        let config = match args.config.take() {
            Some(path) => {
                info!("loading configuration from {}", path.display());
                let mut file_config = Config::from_file(&path)?;
                if args.output.is_some() {
                    file_config.output = args.output.take();
                }
                file_config
            }
            None => args,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;
        toml::from_str(&text).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// Checks the cross-field rules a parser cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_none() {
            return Err(ConfigError::MissingHost);
        }
        match (&self.public_zone_host, self.public_zone_port) {
            (Some(_), None) => {
                return Err(ConfigError::PublicZonePair(
                    "--public-zone-host given without --public-zone-port".into(),
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::PublicZonePair(
                    "--public-zone-port given without --public-zone-host".into(),
                ));
            }
            _ => {}
        }
        if let Some(path) = &self.oodle_path {
            if !path.exists() {
                return Err(ConfigError::MissingLibrary(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// The capture file path for this run, creating the default `captures`
    /// directory when no explicit output was given.
    pub fn output_path(&self, session_id: Uuid) -> Result<PathBuf, ConfigError> {
        if let Some(output) = &self.output {
            return Ok(output.clone());
        }
        let dir = PathBuf::from("captures");
        std::fs::create_dir_all(&dir).map_err(ConfigError::OutputDirError)?;
        Ok(dir.join(format!("{}.cfcap", session_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from([&["cfcap"], args].concat()).unwrap_or_else(|e| panic!("{}", e))
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = parse(&["--host", "lobby.example.net"]);
        assert_eq!(config.host.as_deref(), Some("lobby.example.net"));
        assert_eq!(config.port, 54994);
        assert_eq!(config.lobby_proxy_host, "127.0.0.1");
        assert_eq!(config.lobby_proxy_port, 44994);
        assert_eq!(config.zone_proxy_host, "127.0.0.1");
        assert_eq!(config.zone_proxy_port, 44992);
        assert!(config.public_zone_host.is_none());
        assert!(config.output.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn host_is_required() {
        let config = parse(&[]);
        assert!(matches!(config.validate(), Err(ConfigError::MissingHost)));
    }

    #[test]
    fn public_zone_pair_must_be_complete() {
        let half = parse(&["--host", "h", "--public-zone-host", "1.2.3.4"]);
        assert!(matches!(
            half.validate(),
            Err(ConfigError::PublicZonePair(_))
        ));

        let other_half = parse(&["--host", "h", "--public-zone-port", "9000"]);
        assert!(matches!(
            other_half.validate(),
            Err(ConfigError::PublicZonePair(_))
        ));

        let both = parse(&[
            "--host",
            "h",
            "--public-zone-host",
            "1.2.3.4",
            "--public-zone-port",
            "9000",
        ]);
        assert!(both.validate().is_ok());
    }

    #[test]
    fn oodle_path_must_exist_when_given() {
        let config = parse(&["--host", "h", "--oodle-path", "/no/such/liboodle.so"]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingLibrary(_))
        ));

        let dir = TempDir::new().unwrap();
        let lib = dir.path().join("liboodle.so");
        std::fs::write(&lib, b"").unwrap();
        let config = parse(&["--host", "h", "--oodle-path", lib.to_str().unwrap()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_config_replaces_flags_but_keeps_cli_output() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("cfcap.toml");
        std::fs::write(
            &file,
            "host = \"origin.example.net\"\nport = 55000\nzone_proxy_port = 40000\n",
        )
        .unwrap();

        let args = parse(&[
            "--config",
            file.to_str().unwrap(),
            "--host",
            "ignored.example.net",
            "out.cfcap",
        ]);
        let config = Config::from_sources(args).unwrap();
        assert_eq!(config.host.as_deref(), Some("origin.example.net"));
        assert_eq!(config.port, 55000);
        assert_eq!(config.zone_proxy_port, 40000);
        assert_eq!(config.lobby_proxy_port, 44994); // file omitted it
        assert_eq!(config.output, Some(PathBuf::from("out.cfcap")));
    }

    #[test]
    fn explicit_output_wins_over_default_path() {
        let config = parse(&["--host", "h", "/tmp/explicit.cfcap"]);
        let path = config.output_path(Uuid::new_v4()).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/explicit.cfcap"));
    }

    #[test]
    #[serial_test::serial]
    fn default_output_is_seeded_by_the_session_id() {
        let dir = TempDir::new().unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let config = parse(&["--host", "h"]);
        let id = Uuid::new_v4();
        let path = config.output_path(id).unwrap();

        std::env::set_current_dir(previous).unwrap();
        assert_eq!(path, PathBuf::from(format!("captures/{}.cfcap", id)));
        assert!(dir.path().join("captures").is_dir());
    }
}
