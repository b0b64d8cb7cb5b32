//! The lobby and zone relays.
//!
//! A `Forwarder` accepts client connections on its bind endpoint and relays
//! each one bidirectionally to its upstream. Relayed bytes are always
//! forwarded unchanged first; a per-direction parse buffer then carves them
//! into protocol segments (16-byte descriptor with a leading total length)
//! and hands every complete segment to the registered packet callback.
//!
//! Handshake interpretation, encryption and the compression codec live
//! outside this crate; the `oodle_path` is carried through to that seam
//! untouched, and the [`ZoneRoute`] handle is where the lobby handshake
//! layer records the zone upstream it learns.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::{Buf, Bytes, BytesMut};
use log::{debug, error, info, trace, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::error_handling::types::ForwarderError;
use crate::network::types::{
    ConnectionKind, Direction, PacketHandler, ProxyEndpoint, RawPacket, SegmentHeader,
    SEGMENT_HEADER_LEN,
};

/// Upper bound on a single segment; anything larger means the stream is
/// desynchronized, not that a packet is actually that big.
const MAX_SEGMENT_LEN: usize = 16 * 1024 * 1024;

/// Peering handle between the lobby and zone forwarders.
///
/// Carries the zone endpoint advertised to clients (the bind endpoint, or
/// the public override in NAT deployments) and the zone upstream, which is
/// not known at startup: the lobby handshake layer discovers it while
/// redirecting a client and records it through [`ZoneRoute::set_upstream`].
pub struct ZoneRoute {
    advertised: ProxyEndpoint,
    upstream: Mutex<Option<SocketAddr>>,
}

impl ZoneRoute {
    pub fn new(advertised: ProxyEndpoint) -> Self {
        Self {
            advertised,
            upstream: Mutex::new(None),
        }
    }

    /// The zone endpoint clients are told to connect to.
    pub fn advertised(&self) -> ProxyEndpoint {
        self.advertised
    }

    pub fn set_upstream(&self, addr: SocketAddr) {
        info!("zone upstream learned: {}", addr);
        *self.upstream.lock().unwrap() = Some(addr);
    }

    pub fn upstream(&self) -> Option<SocketAddr> {
        *self.upstream.lock().unwrap()
    }
}

/// How a forwarder picks the server side of each relayed connection.
pub enum Upstream {
    /// The configured origin; used by the lobby forwarder.
    Fixed(SocketAddr),
    /// Whatever the route handle currently holds; used by the zone
    /// forwarder, whose upstream is learned at runtime.
    Routed(Arc<ZoneRoute>),
}

pub struct Forwarder {
    kind: ConnectionKind,
    bind: ProxyEndpoint,
    upstream: Upstream,
    peer_route: Option<Arc<ZoneRoute>>,
    oodle_path: Option<PathBuf>,
    rx_handler: Option<PacketHandler>,
    tx_handler: Option<PacketHandler>,
    bound: Mutex<Option<SocketAddr>>,
}

impl Forwarder {
    pub fn new(
        kind: ConnectionKind,
        bind: ProxyEndpoint,
        upstream: Upstream,
        oodle_path: Option<PathBuf>,
    ) -> Self {
        Self {
            kind,
            bind,
            upstream,
            peer_route: None,
            oodle_path,
            rx_handler: None,
            tx_handler: None,
            bound: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Hands the lobby forwarder the zone route so its handshake layer can
    /// redirect clients to the zone listener and record the upstream it
    /// learns along the way.
    pub fn register_peer(&mut self, route: Arc<ZoneRoute>) {
        self.peer_route = Some(route);
    }

    pub fn peer_route(&self) -> Option<&Arc<ZoneRoute>> {
        self.peer_route.as_ref()
    }

    /// Registers the callback for clientbound packets. Must be called
    /// before the forwarder is shared and run.
    pub fn set_rx_handler(&mut self, handler: PacketHandler) {
        self.rx_handler = Some(handler);
    }

    /// Registers the callback for serverbound packets.
    pub fn set_tx_handler(&mut self, handler: PacketHandler) {
        self.tx_handler = Some(handler);
    }

    /// The address the listener actually bound, once `run` has bound it.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock().unwrap()
    }

    fn upstream_addr(&self) -> Option<SocketAddr> {
        match &self.upstream {
            Upstream::Fixed(addr) => Some(*addr),
            Upstream::Routed(route) => route.upstream(),
        }
    }

    /// Delivers one carved packet to the direction's callback.
    ///
    /// Also the injection seam: anything holding the forwarder can feed it
    /// synthetic packets without a socket in the loop.
    pub fn emit(&self, direction: Direction, packet: &RawPacket<'_>) {
        let handler = match direction {
            Direction::Rx => self.rx_handler.as_ref(),
            Direction::Tx => self.tx_handler.as_ref(),
        };
        if let Some(handler) = handler {
            handler(packet);
        }
        let n = packet.payload.len();
        let preview = &packet.payload[..std::cmp::min(n, 64)];
        trace!(
            "[{}/{}] segment with {} payload bytes: {:02x?}{}",
            self.kind,
            direction,
            n,
            preview,
            if n > 64 { " ..." } else { "" }
        );
    }

    /// Accept loop. Runs until the listener fails; per-connection relay
    /// errors are logged and do not end the loop.
    pub async fn run(self: Arc<Self>) -> Result<(), ForwarderError> {
        let listener = TcpListener::bind(self.bind.socket_addr())
            .await
            .map_err(ForwarderError::BindError)?;
        let local = listener.local_addr().map_err(ForwarderError::BindError)?;
        *self.bound.lock().unwrap() = Some(local);
        info!("{} forwarder listening on {}", self.kind, local);
        if let Some(route) = &self.peer_route {
            info!(
                "{} forwarder hands clients off to the zone listener at {}",
                self.kind,
                route.advertised()
            );
        }
        if let Some(path) = &self.oodle_path {
            debug!(
                "{} forwarder passing compression library {} to the codec layer",
                self.kind,
                path.display()
            );
        }

        loop {
            let (client, peer) = listener.accept().await.map_err(ForwarderError::AcceptError)?;
            let upstream = match self.upstream_addr() {
                Some(addr) => addr,
                None => {
                    warn!(
                        "{} client {} connected before an upstream was learned, dropping",
                        self.kind, peer
                    );
                    continue;
                }
            };
            debug!("{} client {} connected, relaying to {}", self.kind, peer, upstream);
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = Arc::clone(&this).relay(client, upstream).await {
                    error!("{} relay for {} failed: {}", this.kind, peer, e);
                }
            });
        }
    }

    async fn relay(
        self: Arc<Self>,
        client: TcpStream,
        upstream_addr: SocketAddr,
    ) -> Result<(), ForwarderError> {
        let upstream = TcpStream::connect(upstream_addr)
            .await
            .map_err(|e| ForwarderError::UpstreamConnectError(upstream_addr, e))?;
        let (cr, cw) = client.into_split();
        let (sr, sw) = upstream.into_split();

        let mut set = JoinSet::new();

        // Client -> upstream: serverbound, captured as Tx.
        {
            let this = Arc::clone(&self);
            set.spawn(async move {
                let mut cr = cr;
                let mut sw = sw;
                let mut buf = vec![0u8; 16 * 1024];
                let mut parse = BytesMut::new();
                loop {
                    let n = match cr.read(&mut buf).await {
                        Ok(n) => n,
                        Err(e) => break Err(ForwarderError::RelayError(e)),
                    };
                    if n == 0 {
                        trace!("[{}] client EOF; shutting down upstream writer", this.kind);
                        let _ = sw.shutdown().await;
                        break Ok(());
                    }
                    if let Err(e) = sw.write_all(&buf[..n]).await {
                        break Err(ForwarderError::RelayError(e));
                    }
                    parse.extend_from_slice(&buf[..n]);
                    this.carve(Direction::Tx, &mut parse);
                }
            });
        }

        // Upstream -> client: clientbound, captured as Rx.
        {
            let this = Arc::clone(&self);
            set.spawn(async move {
                let mut sr = sr;
                let mut cw = cw;
                let mut buf = vec![0u8; 16 * 1024];
                let mut parse = BytesMut::new();
                loop {
                    let n = match sr.read(&mut buf).await {
                        Ok(n) => n,
                        Err(e) => break Err(ForwarderError::RelayError(e)),
                    };
                    if n == 0 {
                        trace!("[{}] upstream EOF; shutting down client writer", this.kind);
                        let _ = cw.shutdown().await;
                        break Ok(());
                    }
                    if let Err(e) = cw.write_all(&buf[..n]).await {
                        break Err(ForwarderError::RelayError(e));
                    }
                    parse.extend_from_slice(&buf[..n]);
                    this.carve(Direction::Rx, &mut parse);
                }
            });
        }

        while let Some(res) = set.join_next().await {
            res.map_err(|e| ForwarderError::RelayError(io::Error::new(io::ErrorKind::Other, e)))??;
        }
        Ok(())
    }

    fn carve(&self, direction: Direction, parse: &mut BytesMut) {
        while let Some((header, payload)) = next_segment(parse) {
            self.emit(
                direction,
                &RawPacket {
                    header,
                    payload: &payload,
                },
            );
        }
    }
}

/// Pops one complete segment off the front of the parse buffer.
///
/// Returns `None` when more bytes are needed. A declared length below the
/// descriptor size or above [`MAX_SEGMENT_LEN`] means the stream is
/// desynchronized: the whole buffer is dropped so relaying can continue,
/// at the cost of the segments it held.
pub(crate) fn next_segment(parse: &mut BytesMut) -> Option<(SegmentHeader, Bytes)> {
    if parse.len() < SEGMENT_HEADER_LEN {
        return None;
    }
    let mut bytes = [0u8; SEGMENT_HEADER_LEN];
    bytes.copy_from_slice(&parse[..SEGMENT_HEADER_LEN]);
    let header = SegmentHeader::from_bytes(bytes);
    let total = header.segment_len();
    if total < SEGMENT_HEADER_LEN || total > MAX_SEGMENT_LEN {
        warn!(
            "segment length {} out of range; dropping {} buffered bytes to resync",
            total,
            parse.len()
        );
        parse.clear();
        return None;
    }
    if parse.len() < total {
        return None;
    }
    let mut segment = parse.split_to(total);
    segment.advance(SEGMENT_HEADER_LEN);
    Some((header, segment.freeze()))
}
