//! The proxy lifecycle controller.
//!
//! Owns the capture session and walks the run through its states:
//! `Idle → Resolving → Starting → Running → Stopping → Terminated`.
//! Startup resolves every endpoint, opens the container, wires the four
//! packet streams into the sink and spawns both relay loops; the stop path
//! finalizes the container first and only then lets the process die, so the
//! end marker is always observable.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;

use crate::capture::container::CaptureFile;
use crate::capture::sink::CaptureSink;
use crate::capture::types::CaptureSession;
use crate::capture::frame;
use crate::configuration::config::Config;
use crate::error_handling::types::ControllerError;
use crate::network::forwarder::{Forwarder, Upstream, ZoneRoute};
use crate::network::resolver;
use crate::network::types::{ConnectionKind, Direction, PacketHandler, ProxyEndpoint, RawPacket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Resolving,
    Starting,
    Running,
    Stopping,
    Terminated,
}

pub struct Controller {
    config: Config,
    session: CaptureSession,
    state: ControllerState,
    output: Option<PathBuf>,
    sink: Option<Arc<CaptureSink>>,
    lobby: Option<Arc<Forwarder>>,
    zone: Option<Arc<Forwarder>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        config.validate()?;
        let session = CaptureSession::new();
        info!("capture session {}", session.id);
        Ok(Self {
            config,
            session,
            state: ControllerState::Idle,
            output: None,
            sink: None,
            lobby: None,
            zone: None,
            tasks: Vec::new(),
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn sink(&self) -> Option<&Arc<CaptureSink>> {
        self.sink.as_ref()
    }

    pub fn lobby(&self) -> Option<&Arc<Forwarder>> {
        self.lobby.as_ref()
    }

    pub fn zone(&self) -> Option<&Arc<Forwarder>> {
        self.zone.as_ref()
    }

    fn set_state(&mut self, next: ControllerState) {
        debug!("controller state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Resolves the endpoints, opens the container and brings both
    /// forwarders up. Any failure lands in `Terminated` before a single
    /// connection has been accepted.
    pub async fn start(&mut self) -> Result<(), ControllerError> {
        match self.try_start().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_state(ControllerState::Terminated);
                Err(e)
            }
        }
    }

    async fn try_start(&mut self) -> Result<(), ControllerError> {
        self.set_state(ControllerState::Resolving);
        // validate() already ruled out a missing host.
        let host = self.config.host.clone().unwrap_or_default();
        let origin = ProxyEndpoint::new(resolver::resolve(&host).await?, self.config.port);
        let lobby_bind = ProxyEndpoint::new(
            resolver::resolve(&self.config.lobby_proxy_host).await?,
            self.config.lobby_proxy_port,
        );
        let zone_bind = ProxyEndpoint::new(
            resolver::resolve(&self.config.zone_proxy_host).await?,
            self.config.zone_proxy_port,
        );
        let public_zone = match (&self.config.public_zone_host, self.config.public_zone_port) {
            (Some(host), Some(port)) => {
                Some(ProxyEndpoint::new(resolver::resolve(host).await?, port))
            }
            _ => None,
        };
        info!(
            "origin {}, lobby bind {}, zone bind {}, advertised zone {}",
            origin,
            lobby_bind,
            zone_bind,
            public_zone.unwrap_or(zone_bind)
        );

        self.set_state(ControllerState::Starting);
        let output = self.config.output_path(self.session.id)?;
        info!("writing capture to {}", output.display());
        let sink = Arc::new(CaptureSink::new(CaptureFile::create(&output)?));

        let route = Arc::new(ZoneRoute::new(public_zone.unwrap_or(zone_bind)));
        let mut zone = Forwarder::new(
            ConnectionKind::Zone,
            zone_bind,
            Upstream::Routed(Arc::clone(&route)),
            self.config.oodle_path.clone(),
        );
        let mut lobby = Forwarder::new(
            ConnectionKind::Lobby,
            lobby_bind,
            Upstream::Fixed(origin.socket_addr()),
            self.config.oodle_path.clone(),
        );
        lobby.register_peer(route);

        lobby.set_rx_handler(capture_handler(&sink, ConnectionKind::Lobby, Direction::Rx));
        lobby.set_tx_handler(capture_handler(&sink, ConnectionKind::Lobby, Direction::Tx));
        zone.set_rx_handler(capture_handler(&sink, ConnectionKind::Zone, Direction::Rx));
        zone.set_tx_handler(capture_handler(&sink, ConnectionKind::Zone, Direction::Tx));

        // Both markers go in before either listener can accept a client, so
        // no frame can ever precede them.
        sink.write_version_info()?;
        sink.write_session_start(&self.session)?;

        let lobby = Arc::new(lobby);
        let zone = Arc::new(zone);
        for forwarder in [&lobby, &zone] {
            let forwarder = Arc::clone(forwarder);
            // A run-loop failure ends this task only; the other forwarder
            // and the capture keep going.
            self.tasks.push(tokio::spawn(async move {
                let kind = forwarder.kind();
                if let Err(e) = forwarder.run().await {
                    error!("{} forwarder stopped: {}", kind, e);
                }
            }));
        }

        self.output = Some(output);
        self.sink = Some(sink);
        self.lobby = Some(lobby);
        self.zone = Some(zone);
        self.set_state(ControllerState::Running);
        Ok(())
    }

    /// Writes the session-end marker and flushes the container.
    ///
    /// Relay tasks are abandoned, not drained: segments in flight at this
    /// instant never reach the sink. Once the sink is finalized a late
    /// callback fails its append instead of interleaving with the marker.
    pub async fn stop(&mut self) -> Result<(), ControllerError> {
        self.set_state(ControllerState::Stopping);
        let ended_at = self.session.finish();
        if !self.tasks.is_empty() {
            debug!("abandoning {} forwarder tasks without draining", self.tasks.len());
        }
        if let Some(sink) = &self.sink {
            sink.finalize(ended_at)?;
            info!(
                "capture finished: {} frames in {}",
                sink.frames_appended(),
                self.output
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            );
        }
        self.set_state(ControllerState::Terminated);
        Ok(())
    }

    /// The binary's lifecycle: start, block on the operator keypress, stop.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        self.start().await?;
        let wait = tokio::spawn(wait_for_stop_signal());
        let _ = wait.await;
        self.stop().await
    }
}

fn capture_handler(
    sink: &Arc<CaptureSink>,
    kind: ConnectionKind,
    direction: Direction,
) -> PacketHandler {
    let sink = Arc::clone(sink);
    Arc::new(move |raw: &RawPacket<'_>| {
        let frame = frame::synthesize(raw, kind, Utc::now());
        if let Err(e) = sink.append_frame(kind, direction, &frame) {
            error!("dropping {} {} frame, append failed: {}", kind, direction, e);
        }
    })
}

/// Blocks until the operator sends a byte on stdin (a keypress followed by
/// Enter on a cooked terminal, or anything on a pipe).
async fn wait_for_stop_signal() {
    println!("Capturing. Press Enter to stop.");
    let mut byte = [0u8; 1];
    let _ = tokio::io::stdin().read(&mut byte).await;
}
