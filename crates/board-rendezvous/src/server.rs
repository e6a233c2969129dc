//! Rendezvous server: accept loop, per-peer tasks, and the share table.
//!
//! Routing policy:
//!
//! - A newly connected peer receives a `SHARING_BOARD` backlog for every
//!   board currently shared by *other* peers, so late joiners catch up.
//! - `SHARE_BOARD(id)` records the share and broadcasts `SHARING_BOARD(id)`
//!   to every other peer.
//! - `UNSHARE_BOARD(id)` forgets it and broadcasts `UNSHARING_BOARD(id)`.
//! - A dropped connection broadcasts `DISCONNECT_PEER(id)` for each board
//!   the peer had shared, which tells subscribers to drop their replicas and
//!   tear down the link.
//!
//! All routing decisions are computed by pure [`ServerState`] methods and
//! executed afterwards, so the policy is unit-testable without a socket.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use board_core::protocol::messages::HEADER_SIZE;
use board_core::{decode_message, encode_message, BoardId, BoardMessage, PeerAddr};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Upper bound on one inbound frame; announcements are tiny.
const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Error type for the rendezvous server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind rendezvous listener on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

// ── Share table ───────────────────────────────────────────────────────────────

struct PeerEntry {
    outbound: mpsc::UnboundedSender<BoardMessage>,
    shared: HashSet<BoardId>,
}

/// Connected peers and the boards they share.
#[derive(Default)]
pub struct ServerState {
    peers: HashMap<PeerAddr, PeerEntry>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns the `SHARING_BOARD` backlog the
    /// new peer must receive for boards shared by everyone else.
    pub fn register(
        &mut self,
        peer: PeerAddr,
        outbound: mpsc::UnboundedSender<BoardMessage>,
    ) -> Vec<BoardMessage> {
        let backlog: Vec<BoardMessage> = self
            .peers
            .values()
            .flat_map(|entry| entry.shared.iter().cloned())
            .map(BoardMessage::SharingBoard)
            .collect();
        self.peers.insert(
            peer,
            PeerEntry {
                outbound,
                shared: HashSet::new(),
            },
        );
        backlog
    }

    /// Handles one announcement from `from`, returning `(recipient, notice)`
    /// pairs to deliver.
    pub fn handle(
        &mut self,
        from: &PeerAddr,
        message: BoardMessage,
    ) -> Vec<(PeerAddr, BoardMessage)> {
        let Some(entry) = self.peers.get_mut(from) else {
            warn!("announcement from unregistered peer {from}; dropping");
            return Vec::new();
        };
        match message {
            BoardMessage::ShareBoard(id) => {
                if !entry.shared.insert(id.clone()) {
                    debug!("{from} re-announced {id}; notifying anyway");
                }
                info!("{from} is sharing {id}");
                self.broadcast_except(from, BoardMessage::SharingBoard(id))
            }
            BoardMessage::UnshareBoard(id) => {
                if !entry.shared.remove(&id) {
                    warn!("{from} unshared {id} which it never announced; dropping");
                    return Vec::new();
                }
                info!("{from} stopped sharing {id}");
                self.broadcast_except(from, BoardMessage::UnsharingBoard(id))
            }
            other => {
                warn!(
                    "unexpected {:?} from {from} on the rendezvous channel; dropping",
                    other.kind()
                );
                Vec::new()
            }
        }
    }

    /// Forgets a disconnected peer, returning the `DISCONNECT_PEER` notices
    /// owed to everyone still connected.
    pub fn unregister(&mut self, peer: &PeerAddr) -> Vec<(PeerAddr, BoardMessage)> {
        let Some(entry) = self.peers.remove(peer) else {
            return Vec::new();
        };
        let mut notices = Vec::new();
        for id in entry.shared {
            info!("peer {peer} disconnected while sharing {id}");
            notices.extend(self.broadcast_except(peer, BoardMessage::DisconnectPeer(id)));
        }
        notices
    }

    /// Queues `notice` for delivery via each recipient's outbound channel.
    pub fn dispatch(&self, decisions: Vec<(PeerAddr, BoardMessage)>) {
        for (recipient, notice) in decisions {
            if let Some(entry) = self.peers.get(&recipient) {
                if entry.outbound.send(notice).is_err() {
                    debug!("peer {recipient} went away mid-dispatch");
                }
            }
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn broadcast_except(
        &self,
        from: &PeerAddr,
        notice: BoardMessage,
    ) -> Vec<(PeerAddr, BoardMessage)> {
        self.peers
            .keys()
            .filter(|peer| *peer != from)
            .map(|peer| (peer.clone(), notice.clone()))
            .collect()
    }
}

type SharedState = Arc<Mutex<ServerState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ServerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Runs the rendezvous accept loop until `running` is cleared.
///
/// # Errors
///
/// Returns [`ServerError::BindFailed`] if the listener cannot be bound.
pub async fn run_server(bind_addr: SocketAddr, running: Arc<AtomicBool>) -> Result<(), ServerError> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|source| ServerError::BindFailed {
            addr: bind_addr,
            source,
        })?;

    info!("rendezvous server listening on {bind_addr}");
    let state: SharedState = Arc::new(Mutex::new(ServerState::new()));

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping rendezvous accept loop");
            break;
        }

        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, socket_addr))) => {
                let peer = match PeerAddr::new(socket_addr.ip().to_string(), socket_addr.port()) {
                    Ok(peer) => peer,
                    Err(e) => {
                        warn!("rejecting connection with unusable address {socket_addr}: {e}");
                        continue;
                    }
                };
                info!("peer connected: {peer}");
                handle_connection(stream, peer, Arc::clone(&state));
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            Err(_) => {
                // Timeout — no new connection; loop back to check the flag.
            }
        }
    }

    Ok(())
}

/// Spawns the reader and writer tasks for one peer connection.
fn handle_connection(stream: tokio::net::TcpStream, peer: PeerAddr, state: SharedState) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<BoardMessage>();

    let backlog = lock(&state).register(peer.clone(), tx.clone());
    for notice in backlog {
        if tx.send(notice).is_err() {
            break;
        }
    }

    let writer_peer = peer.clone();
    tokio::spawn(async move {
        while let Some(notice) = rx.recv().await {
            match encode_message(&notice) {
                Ok(bytes) => {
                    if let Err(e) = write_half.write_all(&bytes).await {
                        debug!("send to {writer_peer} failed: {e}");
                        break;
                    }
                }
                Err(e) => error!("failed to encode notice: {e}"),
            }
        }
    });

    tokio::spawn(async move {
        loop {
            match read_frame(&mut read_half).await {
                Ok(Some(frame)) => match decode_message(&frame) {
                    Ok((message, _)) => {
                        let decisions = lock(&state).handle(&peer, message);
                        lock(&state).dispatch(decisions);
                    }
                    Err(e) => warn!("undecodable frame from {peer}: {e}"),
                },
                Ok(None) => {
                    info!("peer disconnected: {peer}");
                    break;
                }
                Err(e) => {
                    warn!("read error on connection to {peer}: {e}");
                    break;
                }
            }
        }
        let notices = lock(&state).unregister(&peer);
        lock(&state).dispatch(notices);
    });
}

/// Reads one complete frame; `Ok(None)` on clean end-of-stream.
async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    if let Err(e) = reader.read_exact(&mut header).await {
        return if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Ok(None)
        } else {
            Err(e)
        };
    }
    let name_len = u16::from_be_bytes([header[1], header[2]]) as usize;
    let payload_len = u32::from_be_bytes([header[3], header[4], header[5], header[6]]) as usize;
    let body_len = name_len + payload_len;
    if HEADER_SIZE + body_len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {body_len} bytes exceeds the rendezvous frame limit"),
        ));
    }
    let mut frame = header.to_vec();
    frame.resize(HEADER_SIZE + body_len, 0);
    reader.read_exact(&mut frame[HEADER_SIZE..]).await?;
    Ok(Some(frame))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
