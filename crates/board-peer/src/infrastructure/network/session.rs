//! Peer session registry: at most one live link per unordered peer pair.
//!
//! A [`PeerLink`] is the sending side of one TCP connection to a remote
//! peer.  The link owns nothing but an unbounded channel; a dedicated writer
//! task (spawned in [`super`]) drains the channel onto the socket, which is
//! what makes every send fire-and-forget — the synchronization engine never
//! waits for the network.
//!
//! The registry key is the *unordered* pair of endpoint addresses.  Either
//! peer may have initiated the connection, so [`PairKey::new`] normalizes
//! the ordering and a single lookup covers both directions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use board_core::{BoardMessage, PeerAddr};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

// ── Pair key ──────────────────────────────────────────────────────────────────

/// Unordered pair of peer addresses identifying one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey(PeerAddr, PeerAddr);

impl PairKey {
    /// Builds the key with a normalized ordering, so
    /// `PairKey::new(a, b) == PairKey::new(b, a)`.
    pub fn new(a: PeerAddr, b: PeerAddr) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

// ── Peer link ─────────────────────────────────────────────────────────────────

/// The outbound half of an active connection to a remote peer.
#[derive(Debug)]
pub struct PeerLink {
    remote: PeerAddr,
    key: PairKey,
    outbound: mpsc::UnboundedSender<BoardMessage>,
}

impl PeerLink {
    pub fn remote(&self) -> &PeerAddr {
        &self.remote
    }

    pub fn key(&self) -> &PairKey {
        &self.key
    }

    /// Enqueues a message for the link's writer task.  Fire-and-forget: a
    /// closed link drops the message with a debug log, never an error — the
    /// transport's disconnect notification drives cleanup separately.
    pub fn send(&self, message: BoardMessage) {
        if self.outbound.send(message).is_err() {
            debug!("link to {} is closed; dropping outbound message", self.remote);
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Shared map of all live peer links.
///
/// One `std::sync::Mutex` guards the whole map; registry mutations and
/// fan-out iteration are mutually exclusive, which is plenty at the peer
/// counts a LAN whiteboard sees.
pub struct SessionRegistry {
    self_addr: PeerAddr,
    links: Mutex<HashMap<PairKey, Arc<PeerLink>>>,
}

impl SessionRegistry {
    pub fn new(self_addr: PeerAddr) -> Self {
        Self {
            self_addr,
            links: Mutex::new(HashMap::new()),
        }
    }

    pub fn self_addr(&self) -> &PeerAddr {
        &self.self_addr
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PairKey, Arc<PeerLink>>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a link for `remote`, returning the shared handle.  A stale
    /// entry for the same pair is replaced; its writer task ends when the
    /// old sender is dropped.
    pub fn register(
        &self,
        remote: PeerAddr,
        outbound: mpsc::UnboundedSender<BoardMessage>,
    ) -> Arc<PeerLink> {
        let key = PairKey::new(self.self_addr.clone(), remote.clone());
        let link = Arc::new(PeerLink {
            remote: remote.clone(),
            key: key.clone(),
            outbound,
        });
        if self.lock().insert(key, Arc::clone(&link)).is_some() {
            warn!("replaced an existing link to {remote}");
        }
        link
    }

    /// Returns the live link for `target`, if one exists in either
    /// direction.  This is the duplicate-connection check performed before
    /// dialing.
    pub fn link_to(&self, target: &PeerAddr) -> Option<Arc<PeerLink>> {
        let key = PairKey::new(self.self_addr.clone(), target.clone());
        self.lock().get(&key).cloned()
    }

    /// Closes and forgets the link to `remote`.  Idempotent: tearing down an
    /// absent link returns `false` and does nothing.
    pub fn teardown(&self, remote: &PeerAddr) -> bool {
        let key = PairKey::new(self.self_addr.clone(), remote.clone());
        let removed = self.lock().remove(&key).is_some();
        if removed {
            debug!("tore down link to {remote}");
        }
        removed
    }

    /// Applies `f` to every registered link except the one to `exclude`.
    /// This is the fan-out primitive behind flood-with-no-echo.
    pub fn for_each_other_link(&self, exclude: Option<&PeerAddr>, mut f: impl FnMut(&Arc<PeerLink>)) {
        for link in self.lock().values() {
            if Some(&link.remote) == exclude {
                continue;
            }
            f(link);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every link (application shutdown).
    pub fn clear(&self) {
        self.lock().clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
