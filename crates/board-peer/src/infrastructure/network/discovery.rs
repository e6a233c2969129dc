//! Rendezvous client: the discovery adapter.
//!
//! The rendezvous server is the only well-known address in the system.
//! Every peer keeps one connection to it, announces `SHARE_BOARD` /
//! `UNSHARE_BOARD` for its own boards, and reacts to the server's notices:
//!
//! - `SHARING_BOARD` → make sure a link to the owner exists, then fetch the
//!   board if we do not hold it yet.
//! - `UNSHARING_BOARD` → drop the local replica.
//! - `DISCONNECT_PEER` → drop the replica and tear down the link.
//!
//! The connection runs a reconnect loop: if the server goes away the adapter
//! retries at a fixed interval and announcements made in the meantime are
//! dropped with a warning (everything here is best-effort; board state
//! recovers through refetches, not through reliable delivery).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use board_core::{decode_message, encode_message, BoardMessage, PeerAddr};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::application::sync::SyncEngine;
use crate::infrastructure::network::session::SessionRegistry;
use crate::infrastructure::network::{connect_peer, read_frame};

/// Connection settings for the rendezvous link.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Address of the rendezvous server.
    pub server: PeerAddr,
    /// Delay between reconnect attempts when the server is unreachable.
    pub reconnect_interval: Duration,
    /// Timeout for dialing the server and for dialing board owners.
    pub connect_timeout: Duration,
}

/// Translates between the rendezvous channel and the local peer state.
pub struct DiscoveryAdapter {
    settings: DiscoverySettings,
    engine: Arc<SyncEngine>,
    registry: Arc<SessionRegistry>,
    outbound: Mutex<Option<mpsc::UnboundedSender<BoardMessage>>>,
}

impl DiscoveryAdapter {
    pub fn new(
        settings: DiscoverySettings,
        engine: Arc<SyncEngine>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            settings,
            engine,
            registry,
            outbound: Mutex::new(None),
        }
    }

    fn outbound(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<BoardMessage>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues an announcement (`SHARE_BOARD` / `UNSHARE_BOARD`) for the
    /// server.  Dropped with a warning while disconnected.
    pub fn announce(&self, message: BoardMessage) {
        match &*self.outbound() {
            Some(tx) => {
                if tx.send(message).is_err() {
                    warn!("rendezvous link went away; dropping announcement");
                }
            }
            None => warn!(
                "not connected to rendezvous server {}; dropping announcement",
                self.settings.server
            ),
        }
    }

    /// Spawns the reconnect loop.  Runs until `running` is cleared.
    pub fn start(self: Arc<Self>, running: Arc<AtomicBool>) {
        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                self.run_connection().await;
                if running.load(Ordering::Relaxed) {
                    info!(
                        "reconnecting to rendezvous server in {:?}",
                        self.settings.reconnect_interval
                    );
                    sleep(self.settings.reconnect_interval).await;
                }
            }
        });
    }

    /// One connection lifetime: dial, pump notices until the stream ends.
    async fn run_connection(&self) {
        let endpoint = format!("{}:{}", self.settings.server.host(), self.settings.server.port());
        let stream = match timeout(self.settings.connect_timeout, TcpStream::connect(&endpoint)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("could not connect to rendezvous server {endpoint}: {e}");
                return;
            }
            Err(_) => {
                warn!("timed out connecting to rendezvous server {endpoint}");
                return;
            }
        };
        info!("connected to rendezvous server at {endpoint}");

        let (mut read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<BoardMessage>();
        *self.outbound() = Some(tx);

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match encode_message(&message) {
                    Ok(bytes) => {
                        if let Err(e) = write_half.write_all(&bytes).await {
                            warn!("send to rendezvous server failed: {e}");
                            break;
                        }
                    }
                    Err(e) => warn!("failed to encode announcement: {e}"),
                }
            }
        });

        loop {
            match read_frame(&mut read_half).await {
                Ok(Some(frame)) => match decode_message(&frame) {
                    Ok((notice, _)) => self.handle_notice(notice).await,
                    Err(e) => warn!("undecodable frame from rendezvous server: {e}"),
                },
                Ok(None) => {
                    info!("rendezvous server closed the connection");
                    break;
                }
                Err(e) => {
                    warn!("read error on rendezvous link: {e}");
                    break;
                }
            }
        }

        *self.outbound() = None;
        writer.abort();
    }

    /// Applies one server notice to local state.
    pub async fn handle_notice(&self, notice: BoardMessage) {
        match notice {
            BoardMessage::SharingBoard(id) => {
                if id.owner() == *self.engine.self_addr() {
                    debug!("ignoring share notice for our own board {id}");
                    return;
                }
                if self.engine.contains(&id) {
                    debug!("already holding {id}; ignoring share notice");
                    return;
                }
                let owner = id.owner();
                match connect_peer(
                    &self.engine,
                    &self.registry,
                    &owner,
                    self.settings.connect_timeout,
                )
                .await
                {
                    Ok(link) => {
                        debug!("requesting {id} from {owner}");
                        link.send(BoardMessage::GetBoardData(id));
                    }
                    Err(e) => warn!("could not reach owner of {id}: {e}"),
                }
            }
            BoardMessage::UnsharingBoard(id) => {
                self.engine.remove_replica(&id);
            }
            BoardMessage::DisconnectPeer(id) => {
                let owner = id.owner();
                self.engine.remove_replica(&id);
                self.registry.teardown(&owner);
            }
            other => warn!(
                "unexpected {:?} from rendezvous server; dropping",
                other.kind()
            ),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
