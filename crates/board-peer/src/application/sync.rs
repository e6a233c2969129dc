//! SyncEngine: the per-board optimistic-concurrency gate and relay rules.
//!
//! Every protocol event — local edit or remote message — flows through one
//! `match` here.  The engine validates the event against the board's version
//! gate, mutates the document if the event wins, and returns [`Relay`]
//! decisions describing who must hear about it.  Executing those decisions
//! (actually writing to sockets) is the network layer's job; nothing in this
//! module blocks or suspends, so version checks are atomic under one store
//! mutex.
//!
//! # The relay rules in one paragraph
//!
//! A **proposal** (`*_ACCEPTED`) travels toward a board's owner and embeds
//! the version the proposer saw; the owner accepts it only if that version
//! is still current, then fans the confirmed **update** (`*_UPDATE`, now
//! embedding the post-mutation version) out to every other link.  A receiver
//! applies an update only when its own version differs from the embedded
//! one, then re-broadcasts it to everyone except the sender.  Once versions
//! match, the message dies — that equality check is the entire loop-
//! prevention mechanism.  Rejections are silent; a peer that lost a race
//! recovers by refetching the full board.

use std::sync::{Mutex, MutexGuard, PoisonError};

use board_core::{
    BoardDocument, BoardId, BoardIdError, BoardMessage, BoardSnapshot, PeerAddr, Stroke,
    VersionedRef,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::boards::{BoardStore, BoardSummary};

/// Error type for local edit operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("no board with id {0}")]
    UnknownBoard(BoardId),
    #[error("board {0} already exists")]
    DuplicateBoard(BoardId),
    #[error("board {0} is a remote replica; only its owner may change sharing")]
    NotOwned(BoardId),
    #[error(transparent)]
    InvalidId(#[from] BoardIdError),
}

/// A send decision produced by the engine and executed by the network layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relay {
    /// Send to one specific peer (a reply, or a proposal toward an owner).
    ToPeer {
        target: PeerAddr,
        message: BoardMessage,
    },
    /// Send to every registered link except `exclude` (flood-with-no-echo).
    FanOut {
        message: BoardMessage,
        exclude: Option<PeerAddr>,
    },
}

/// Outcome of a local mutation: whether the version gate accepted it, the
/// sends it triggers, and an optional rendezvous announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEdit {
    pub accepted: bool,
    pub relays: Vec<Relay>,
    pub announce: Option<BoardMessage>,
}

impl LocalEdit {
    /// A rejected edit: no mutation happened, nothing is sent.  The caller
    /// must redraw from the board's current state.
    fn rejected() -> Self {
        Self {
            accepted: false,
            relays: Vec::new(),
            announce: None,
        }
    }

    fn accepted(relays: Vec<Relay>, announce: Option<BoardMessage>) -> Self {
        Self {
            accepted: true,
            relays,
            announce,
        }
    }
}

/// The synchronization engine.
///
/// Holds the board store behind a single `std::sync::Mutex` — critical
/// sections are pure in-memory work, so a blocking mutex is safe to use from
/// async tasks and keeps every version comparison linearizable per document.
pub struct SyncEngine {
    self_addr: PeerAddr,
    boards: Mutex<BoardStore>,
}

impl SyncEngine {
    /// Creates an engine for the peer reachable at `self_addr`.
    pub fn new(self_addr: PeerAddr) -> Self {
        Self {
            self_addr,
            boards: Mutex::new(BoardStore::new()),
        }
    }

    /// The identity boards created here are owned by.
    pub fn self_addr(&self) -> &PeerAddr {
        &self.self_addr
    }

    fn store(&self) -> MutexGuard<'_, BoardStore> {
        // A poisoned lock means a panic mid-mutation elsewhere; the store is
        // still structurally valid, so keep serving rather than cascade.
        self.boards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn contains(&self, id: &BoardId) -> bool {
        self.store().contains(id)
    }

    pub fn board_version(&self, id: &BoardId) -> Option<u64> {
        self.store().get(id).map(|d| d.version())
    }

    pub fn board_strokes(&self, id: &BoardId) -> Option<Vec<Stroke>> {
        self.store().get(id).map(|d| d.strokes().to_vec())
    }

    pub fn summaries(&self) -> Vec<BoardSummary> {
        self.store().summaries()
    }

    fn owns(&self, id: &BoardId) -> bool {
        id.owner() == self.self_addr
    }

    // ── Local mutation path ───────────────────────────────────────────────────

    /// Creates a new locally-owned board: version 0, empty, not shared.
    pub fn create_board(&self, name: &str) -> Result<BoardId, EditError> {
        let id = BoardId::owned_by(&self.self_addr, name)?;
        let mut store = self.store();
        if store.contains(&id) {
            return Err(EditError::DuplicateBoard(id));
        }
        store.upsert(BoardDocument::new_local(id.clone()));
        debug!("created board {id}");
        Ok(id)
    }

    /// Appends a stroke drawn locally.  `expected` is the version the caller
    /// last rendered; a remote update that raced in since then rejects the
    /// edit.
    pub fn local_append(
        &self,
        id: &BoardId,
        stroke: Stroke,
        expected: u64,
    ) -> Result<LocalEdit, EditError> {
        let mut store = self.store();
        let doc = store
            .get_mut(id)
            .ok_or_else(|| EditError::UnknownBoard(id.clone()))?;
        if !doc.try_append(stroke, expected) {
            debug!(
                "local append on {id} rejected: expected {expected}, board at {}",
                doc.version()
            );
            return Ok(LocalEdit::rejected());
        }
        let relays = if doc.is_remote() {
            // Proposal toward the owner: pre-mutation version, post-edit strokes.
            vec![Relay::ToPeer {
                target: id.owner(),
                message: BoardMessage::PathAccepted(BoardSnapshot {
                    id: id.clone(),
                    version: expected,
                    strokes: doc.strokes().to_vec(),
                }),
            }]
        } else if doc.is_shared() {
            vec![Relay::FanOut {
                message: BoardMessage::PathUpdate(BoardSnapshot::from(&*doc)),
                exclude: None,
            }]
        } else {
            Vec::new()
        };
        Ok(LocalEdit::accepted(relays, None))
    }

    /// Undoes the most recent stroke.  Rejected on version mismatch or an
    /// empty board.
    pub fn local_undo(&self, id: &BoardId, expected: u64) -> Result<LocalEdit, EditError> {
        let mut store = self.store();
        let doc = store
            .get_mut(id)
            .ok_or_else(|| EditError::UnknownBoard(id.clone()))?;
        if !doc.try_undo(expected) {
            debug!(
                "local undo on {id} rejected: expected {expected}, board at {} with {} strokes",
                doc.version(),
                doc.strokes().len()
            );
            return Ok(LocalEdit::rejected());
        }
        let relays = self.mutation_relays(
            doc,
            BoardMessage::UndoAccepted(VersionedRef {
                id: id.clone(),
                version: expected,
            }),
            BoardMessage::UndoUpdate(VersionedRef {
                id: id.clone(),
                version: doc.version(),
            }),
        );
        Ok(LocalEdit::accepted(relays, None))
    }

    /// Removes all strokes from the board.
    pub fn local_clear(&self, id: &BoardId, expected: u64) -> Result<LocalEdit, EditError> {
        let mut store = self.store();
        let doc = store
            .get_mut(id)
            .ok_or_else(|| EditError::UnknownBoard(id.clone()))?;
        if !doc.try_clear(expected) {
            debug!(
                "local clear on {id} rejected: expected {expected}, board at {}",
                doc.version()
            );
            return Ok(LocalEdit::rejected());
        }
        let relays = self.mutation_relays(
            doc,
            BoardMessage::ClearAccepted(VersionedRef {
                id: id.clone(),
                version: expected,
            }),
            BoardMessage::ClearUpdate(VersionedRef {
                id: id.clone(),
                version: doc.version(),
            }),
        );
        Ok(LocalEdit::accepted(relays, None))
    }

    /// Proposal toward the owner for a replica, confirmed broadcast for a
    /// shared owned board, nothing for a private one.
    fn mutation_relays(
        &self,
        doc: &BoardDocument,
        proposal: BoardMessage,
        update: BoardMessage,
    ) -> Vec<Relay> {
        if doc.is_remote() {
            vec![Relay::ToPeer {
                target: doc.id().owner(),
                message: proposal,
            }]
        } else if doc.is_shared() {
            vec![Relay::FanOut {
                message: update,
                exclude: None,
            }]
        } else {
            Vec::new()
        }
    }

    /// Deletes a board and propagates the deletion to every link.  An owned
    /// shared board also withdraws its rendezvous announcement.
    pub fn delete_board(&self, id: &BoardId) -> Result<LocalEdit, EditError> {
        let mut store = self.store();
        let doc = store
            .remove(id)
            .ok_or_else(|| EditError::UnknownBoard(id.clone()))?;
        let relays = vec![Relay::FanOut {
            message: BoardMessage::BoardDeleted(id.clone()),
            exclude: None,
        }];
        let announce = (!doc.is_remote() && doc.is_shared())
            .then(|| BoardMessage::UnshareBoard(id.clone()));
        debug!("deleted board {id}");
        Ok(LocalEdit::accepted(relays, announce))
    }

    /// Toggles the shared flag on an owned board.
    ///
    /// Turning sharing on announces `SHARE_BOARD` and pushes the full board
    /// to every currently connected link; turning it off announces
    /// `UNSHARE_BOARD`.  Toggling to the current state is a no-op.
    pub fn set_shared(&self, id: &BoardId, shared: bool) -> Result<LocalEdit, EditError> {
        let mut store = self.store();
        let doc = store
            .get_mut(id)
            .ok_or_else(|| EditError::UnknownBoard(id.clone()))?;
        if doc.is_remote() {
            return Err(EditError::NotOwned(id.clone()));
        }
        if doc.is_shared() == shared {
            return Ok(LocalEdit::accepted(Vec::new(), None));
        }
        doc.set_shared(shared);
        if shared {
            let push = Relay::FanOut {
                message: BoardMessage::BoardData(BoardSnapshot::from(&*doc)),
                exclude: None,
            };
            Ok(LocalEdit::accepted(
                vec![push],
                Some(BoardMessage::ShareBoard(id.clone())),
            ))
        } else {
            Ok(LocalEdit::accepted(
                Vec::new(),
                Some(BoardMessage::UnshareBoard(id.clone())),
            ))
        }
    }

    /// Removes a replica in response to a discovery notice.  Never touches a
    /// locally-owned board, whatever the notice claims.
    pub fn remove_replica(&self, id: &BoardId) -> bool {
        if self.owns(id) {
            warn!("ignoring replica removal for locally owned board {id}");
            return false;
        }
        let removed = self.store().remove(id).is_some();
        if removed {
            debug!("removed replica {id}");
        }
        removed
    }

    /// Drops all local state without propagation — the application shutdown
    /// sequence.
    pub fn shutdown_local(&self) -> usize {
        let mut store = self.store();
        let count = store.len();
        *store = BoardStore::new();
        count
    }

    // ── Remote message path ───────────────────────────────────────────────────

    /// Validates and applies one message received from the peer `from`,
    /// returning the relays it triggers.
    ///
    /// Every precondition failure here is silent at the protocol level
    /// (logged, nothing sent back) — the only recovery path is a later
    /// full-board refetch.
    pub fn handle_peer_message(&self, from: &PeerAddr, msg: BoardMessage) -> Vec<Relay> {
        match msg {
            BoardMessage::GetBoardData(id) => {
                let store = self.store();
                let message = match store.get(&id) {
                    Some(doc) => BoardMessage::BoardData(BoardSnapshot::from(doc)),
                    None => BoardMessage::BoardError(format!("unknown board: {id}")),
                };
                vec![Relay::ToPeer {
                    target: from.clone(),
                    message,
                }]
            }

            BoardMessage::BoardData(snap) => {
                if self.owns(&snap.id) {
                    warn!(
                        "peer {from} sent a full-board transfer for locally owned {}; ignoring",
                        snap.id
                    );
                    return Vec::new();
                }
                debug!("installing replica {} at version {}", snap.id, snap.version);
                self.store()
                    .upsert(BoardDocument::new_replica(snap.id, snap.version, snap.strokes));
                Vec::new()
            }

            BoardMessage::PathAccepted(snap) => {
                if !self.owns(&snap.id) {
                    warn!("peer {from} proposed a path on {} which this peer does not own", snap.id);
                    return Vec::new();
                }
                let mut store = self.store();
                let Some(doc) = store.get_mut(&snap.id) else {
                    debug!("proposal for unknown board {}; dropping", snap.id);
                    return Vec::new();
                };
                let Some(stroke) = snap.strokes.last().cloned() else {
                    warn!("proposal for {} carried no stroke; dropping", snap.id);
                    return Vec::new();
                };
                if doc.try_append(stroke, snap.version) {
                    debug!("accepted path on {} -> version {}", snap.id, doc.version());
                    vec![Relay::FanOut {
                        message: BoardMessage::PathUpdate(BoardSnapshot::from(&*doc)),
                        exclude: Some(from.clone()),
                    }]
                } else {
                    debug!(
                        "version conflict on {}: proposal at {}, board at {}; dropping",
                        snap.id,
                        snap.version,
                        doc.version()
                    );
                    Vec::new()
                }
            }

            BoardMessage::PathUpdate(snap) => {
                let mut store = self.store();
                let Some(doc) = store.get_mut(&snap.id) else {
                    debug!("path update for unknown board {}; dropping", snap.id);
                    return Vec::new();
                };
                if doc.version() == snap.version {
                    // Already seen this change; relaying it further would loop.
                    return Vec::new();
                }
                let Some(stroke) = snap.strokes.last().cloned() else {
                    warn!("path update for {} carried no stroke; dropping", snap.id);
                    return Vec::new();
                };
                let current = doc.version();
                if !doc.try_append(stroke, current) {
                    return Vec::new();
                }
                if doc.version() != snap.version {
                    warn!(
                        "replica {} drifted: local {} vs update {}; a refetch will reconcile",
                        snap.id,
                        doc.version(),
                        snap.version
                    );
                }
                vec![Relay::FanOut {
                    message: BoardMessage::PathUpdate(snap),
                    exclude: Some(from.clone()),
                }]
            }

            BoardMessage::UndoAccepted(vref) => {
                if !self.owns(&vref.id) {
                    warn!("peer {from} proposed an undo on {} which this peer does not own", vref.id);
                    return Vec::new();
                }
                let mut store = self.store();
                let Some(doc) = store.get_mut(&vref.id) else {
                    debug!("undo proposal for unknown board {}; dropping", vref.id);
                    return Vec::new();
                };
                if doc.try_undo(vref.version) {
                    vec![Relay::FanOut {
                        message: BoardMessage::UndoUpdate(VersionedRef {
                            id: vref.id,
                            version: doc.version(),
                        }),
                        exclude: Some(from.clone()),
                    }]
                } else {
                    debug!(
                        "version conflict on {}: undo at {}, board at {}; dropping",
                        vref.id,
                        vref.version,
                        doc.version()
                    );
                    Vec::new()
                }
            }

            BoardMessage::UndoUpdate(vref) => {
                let mut store = self.store();
                let Some(doc) = store.get_mut(&vref.id) else {
                    debug!("undo update for unknown board {}; dropping", vref.id);
                    return Vec::new();
                };
                if doc.version() == vref.version {
                    return Vec::new();
                }
                let current = doc.version();
                if !doc.try_undo(current) {
                    debug!("undo update on empty board {}; dropping", vref.id);
                    return Vec::new();
                }
                vec![Relay::FanOut {
                    message: BoardMessage::UndoUpdate(vref),
                    exclude: Some(from.clone()),
                }]
            }

            BoardMessage::ClearAccepted(vref) => {
                if !self.owns(&vref.id) {
                    warn!("peer {from} proposed a clear on {} which this peer does not own", vref.id);
                    return Vec::new();
                }
                let mut store = self.store();
                let Some(doc) = store.get_mut(&vref.id) else {
                    debug!("clear proposal for unknown board {}; dropping", vref.id);
                    return Vec::new();
                };
                if doc.try_clear(vref.version) {
                    vec![Relay::FanOut {
                        message: BoardMessage::ClearUpdate(VersionedRef {
                            id: vref.id,
                            version: doc.version(),
                        }),
                        exclude: Some(from.clone()),
                    }]
                } else {
                    debug!(
                        "version conflict on {}: clear at {}, board at {}; dropping",
                        vref.id,
                        vref.version,
                        doc.version()
                    );
                    Vec::new()
                }
            }

            BoardMessage::ClearUpdate(vref) => {
                let mut store = self.store();
                let Some(doc) = store.get_mut(&vref.id) else {
                    debug!("clear update for unknown board {}; dropping", vref.id);
                    return Vec::new();
                };
                if doc.version() == vref.version {
                    return Vec::new();
                }
                let current = doc.version();
                if !doc.try_clear(current) {
                    return Vec::new();
                }
                vec![Relay::FanOut {
                    message: BoardMessage::ClearUpdate(vref),
                    exclude: Some(from.clone()),
                }]
            }

            BoardMessage::BoardDeleted(id) => {
                // Presence is the dedup guard: an absent board was either
                // never held or already deleted, and re-relaying would loop.
                if self.store().remove(&id).is_some() {
                    debug!("board {id} deleted by peer {from}");
                    vec![Relay::FanOut {
                        message: BoardMessage::BoardDeleted(id),
                        exclude: Some(from.clone()),
                    }]
                } else {
                    Vec::new()
                }
            }

            BoardMessage::BoardError(text) => {
                warn!("peer {from} reported an error: {text}");
                Vec::new()
            }

            BoardMessage::ListenBoard(id) | BoardMessage::UnlistenBoard(id) => {
                // Declared by the catalogue; fan-out already reaches exactly
                // the connected links, so there is no subscription set to keep.
                debug!("ignoring listen/unlisten for {id} from {from}");
                Vec::new()
            }

            BoardMessage::ShareBoard(id)
            | BoardMessage::UnshareBoard(id)
            | BoardMessage::SharingBoard(id)
            | BoardMessage::UnsharingBoard(id)
            | BoardMessage::DisconnectPeer(id) => {
                warn!("rendezvous control message for {id} arrived on a peer link from {from}; dropping");
                Vec::new()
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
