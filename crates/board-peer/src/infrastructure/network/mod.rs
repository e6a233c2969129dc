//! Network infrastructure for the peer application.
//!
//! # Sub-modules
//!
//! - **`session`** – The peer link registry: one live link per unordered
//!   peer pair, with fire-and-forget outbound queues.
//!
//! - **`discovery`** – The rendezvous client: announces shared boards and
//!   translates share/unshare/disconnect notices into engine and registry
//!   actions.
//!
//! This module itself owns the TCP mechanics shared by both: frame reading,
//! per-link reader/writer tasks, dialing with a connect timeout, the accept
//! loop, and the execution of the engine's relay decisions.

pub mod discovery;
pub mod session;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use board_core::protocol::messages::HEADER_SIZE;
use board_core::{decode_message, encode_message, BoardMessage, PeerAddr};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::application::sync::{Relay, SyncEngine};
use session::{PeerLink, SessionRegistry};

/// Upper bound on one frame (header + name + payload).  A board with tens of
/// thousands of strokes still fits comfortably; anything larger is a broken
/// or hostile peer.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Error type for the peer network layer.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The peer listener could not be bound.
    #[error("failed to bind peer listener on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// Dialing a remote peer failed.
    #[error("failed to connect to peer {peer}: {source}")]
    ConnectFailed {
        peer: PeerAddr,
        #[source]
        source: std::io::Error,
    },
    /// Dialing a remote peer did not complete within the configured timeout.
    #[error("timed out connecting to peer {peer} after {waited:?}")]
    ConnectTimeout { peer: PeerAddr, waited: Duration },
}

// ── Relay execution ───────────────────────────────────────────────────────────

/// Executes the engine's relay decisions against the live link set.
///
/// All sends are fire-and-forget; a decision targeting a peer with no link
/// is dropped with a debug log (the peer will refetch on reconnect).
pub fn dispatch_relays(registry: &SessionRegistry, relays: Vec<Relay>) {
    for relay in relays {
        match relay {
            Relay::ToPeer { target, message } => match registry.link_to(&target) {
                Some(link) => link.send(message),
                None => debug!("no link to {target}; dropping {:?}", message.kind()),
            },
            Relay::FanOut { message, exclude } => {
                registry.for_each_other_link(exclude.as_ref(), |link| link.send(message.clone()));
            }
        }
    }
}

// ── Framing ───────────────────────────────────────────────────────────────────

/// Reads one complete frame from the stream.
///
/// The frame header carries the name and payload lengths, so we read exactly
/// `HEADER_SIZE` bytes, then exactly the remainder.  Returns `Ok(None)` on a
/// clean end-of-stream at a frame boundary.
pub(crate) async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
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
            format!("frame of {body_len} bytes exceeds the frame size limit"),
        ));
    }

    let mut frame = header.to_vec();
    frame.resize(HEADER_SIZE + body_len, 0);
    reader.read_exact(&mut frame[HEADER_SIZE..]).await?;
    Ok(Some(frame))
}

// ── Link lifecycle ────────────────────────────────────────────────────────────

/// Registers a link for an established stream and spawns its reader and
/// writer tasks.
///
/// The writer drains the link's outbound queue onto the socket.  The reader
/// decodes inbound frames, drives the synchronization engine, and executes
/// whatever relays come back; when the stream ends (or errors) it tears the
/// link down in the registry.  A single undecodable frame is logged and
/// skipped — it must never kill the connection.
pub fn spawn_link(
    stream: TcpStream,
    remote: PeerAddr,
    engine: Arc<SyncEngine>,
    registry: Arc<SessionRegistry>,
) -> Arc<PeerLink> {
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<BoardMessage>();
    let link = registry.register(remote.clone(), tx);

    let writer_remote = remote.clone();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match encode_message(&message) {
                Ok(bytes) => {
                    if let Err(e) = write_half.write_all(&bytes).await {
                        warn!("send to {writer_remote} failed: {e}");
                        break;
                    }
                }
                Err(e) => error!("failed to encode outbound message: {e}"),
            }
        }
    });

    let reader_remote = remote;
    tokio::spawn(async move {
        loop {
            match read_frame(&mut read_half).await {
                Ok(Some(frame)) => match decode_message(&frame) {
                    Ok((message, _)) => {
                        debug!("received {:?} from {reader_remote}", message.kind());
                        let relays = engine.handle_peer_message(&reader_remote, message);
                        dispatch_relays(&registry, relays);
                    }
                    Err(e) => warn!("undecodable frame from {reader_remote}: {e}"),
                },
                Ok(None) => {
                    info!("peer {reader_remote} disconnected");
                    break;
                }
                Err(e) => {
                    warn!("read error on link to {reader_remote}: {e}");
                    break;
                }
            }
        }
        registry.teardown(&reader_remote);
    });

    link
}

/// Returns the existing link to `target`, or dials a new connection.
///
/// The registry lookup covers both orderings of the pair, so a link the
/// remote peer initiated satisfies the request without a second connection.
///
/// # Errors
///
/// Returns [`NetworkError::ConnectFailed`] or
/// [`NetworkError::ConnectTimeout`] when no connection can be established.
pub async fn connect_peer(
    engine: &Arc<SyncEngine>,
    registry: &Arc<SessionRegistry>,
    target: &PeerAddr,
    connect_timeout: Duration,
) -> Result<Arc<PeerLink>, NetworkError> {
    if let Some(link) = registry.link_to(target) {
        return Ok(link);
    }

    let endpoint = format!("{}:{}", target.host(), target.port());
    let stream = match timeout(connect_timeout, TcpStream::connect(&endpoint)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(NetworkError::ConnectFailed {
                peer: target.clone(),
                source,
            })
        }
        Err(_) => {
            return Err(NetworkError::ConnectTimeout {
                peer: target.clone(),
                waited: connect_timeout,
            })
        }
    };

    info!("connected to peer {target}");
    Ok(spawn_link(
        stream,
        target.clone(),
        Arc::clone(engine),
        Arc::clone(registry),
    ))
}

/// Runs the peer accept loop until `running` is cleared.
///
/// Uses a short timeout on `accept()` so the loop can periodically check the
/// shutdown flag even when no peers are connecting.
///
/// # Errors
///
/// Returns [`NetworkError::BindFailed`] if the listener cannot be bound.
pub async fn run_peer_listener(
    bind_addr: SocketAddr,
    engine: Arc<SyncEngine>,
    registry: Arc<SessionRegistry>,
    running: Arc<AtomicBool>,
) -> Result<(), NetworkError> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|source| NetworkError::BindFailed {
            addr: bind_addr,
            source,
        })?;

    info!("peer listener on {bind_addr}");

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping peer accept loop");
            break;
        }

        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                // Inbound links are keyed by the socket's source address; the
                // remote's listening identity only matters for outbound dedup.
                match PeerAddr::new(peer_addr.ip().to_string(), peer_addr.port()) {
                    Ok(remote) => {
                        info!("accepted peer connection from {remote}");
                        spawn_link(stream, remote, Arc::clone(&engine), Arc::clone(&registry));
                    }
                    Err(e) => warn!("rejecting connection with unusable address {peer_addr}: {e}"),
                }
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            Err(_) => {
                // Timeout — no new connection; loop back to check the flag.
            }
        }
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use board_core::BoardId;

    fn addr(host: &str, port: u16) -> PeerAddr {
        PeerAddr::new(host, port).unwrap()
    }

    #[tokio::test]
    async fn test_read_frame_round_trips_an_encoded_message() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let id: BoardId = "alpha:4171:b1".parse().unwrap();
        let bytes = encode_message(&BoardMessage::GetBoardData(id.clone())).unwrap();
        client.write_all(&bytes).await.unwrap();

        let frame = read_frame(&mut server).await.unwrap().expect("one frame");
        let (decoded, consumed) = decode_message(&frame).unwrap();
        assert_eq!(decoded, BoardMessage::GetBoardData(id));
        assert_eq!(consumed, frame.len());
    }

    #[tokio::test]
    async fn test_read_frame_returns_none_on_clean_eof() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_declared_length() {
        let (mut client, mut server) = tokio::io::duplex(64);
        // Header declaring a payload far beyond the frame size limit.
        let mut header = vec![0x01, 0x00, 0x04];
        header.extend_from_slice(&(u32::MAX).to_be_bytes());
        client.write_all(&header).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_read_frame_reads_back_to_back_frames() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let id: BoardId = "alpha:4171:b1".parse().unwrap();
        let first = encode_message(&BoardMessage::GetBoardData(id.clone())).unwrap();
        let second = encode_message(&BoardMessage::BoardDeleted(id)).unwrap();
        client.write_all(&first).await.unwrap();
        client.write_all(&second).await.unwrap();

        let f1 = read_frame(&mut server).await.unwrap().unwrap();
        let f2 = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(f1, first);
        assert_eq!(f2, second);
    }

    #[test]
    fn test_dispatch_to_unlinked_peer_is_dropped_quietly() {
        let registry = SessionRegistry::new(addr("alpha", 4171));
        let id: BoardId = "beta:4172:b1".parse().unwrap();
        dispatch_relays(
            &registry,
            vec![Relay::ToPeer {
                target: addr("beta", 4172),
                message: BoardMessage::GetBoardData(id),
            }],
        );
    }

    #[test]
    fn test_dispatch_fan_out_skips_excluded_link() {
        let registry = SessionRegistry::new(addr("alpha", 4171));
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_c, mut rx_c) = mpsc::unbounded_channel();
        let beta = addr("beta", 4172);
        registry.register(beta.clone(), tx_b);
        registry.register(addr("gamma", 4173), tx_c);

        let id: BoardId = "alpha:4171:b1".parse().unwrap();
        dispatch_relays(
            &registry,
            vec![Relay::FanOut {
                message: BoardMessage::BoardDeleted(id.clone()),
                exclude: Some(beta),
            }],
        );

        assert!(rx_b.try_recv().is_err(), "excluded link must receive nothing");
        assert_eq!(rx_c.try_recv().unwrap(), BoardMessage::BoardDeleted(id));
    }

    #[tokio::test]
    async fn test_connect_peer_reports_refused_connection() {
        let engine = Arc::new(SyncEngine::new(addr("alpha", 4171)));
        let registry = Arc::new(SessionRegistry::new(addr("alpha", 4171)));
        // Port 1 on localhost is essentially never listening.
        let target = addr("127.0.0.1", 1);

        let result = connect_peer(&engine, &registry, &target, Duration::from_secs(2)).await;

        assert!(matches!(
            result,
            Err(NetworkError::ConnectFailed { .. }) | Err(NetworkError::ConnectTimeout { .. })
        ));
        assert!(registry.is_empty(), "a failed dial must not register a link");
    }

    #[tokio::test]
    async fn test_listener_binds_and_stops_on_cleared_flag() {
        let engine = Arc::new(SyncEngine::new(addr("alpha", 4171)));
        let registry = Arc::new(SessionRegistry::new(addr("alpha", 4171)));
        let running = Arc::new(AtomicBool::new(false)); // stopped immediately

        let result = run_peer_listener(
            "127.0.0.1:0".parse().unwrap(),
            engine,
            registry,
            running,
        )
        .await;

        assert!(result.is_ok(), "listener must bind an ephemeral port");
    }
}
