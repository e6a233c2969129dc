//! All BoardMesh protocol message types.
//!
//! Two channels share one catalogue: board traffic between peers, and
//! share/unshare control traffic between a peer and the rendezvous server.
//! Every payload is a flat UTF-8 string; the codec module owns the exact
//! `%`-delimited layout so the rest of the system handles typed values only.

use crate::domain::board::{BoardDocument, BoardId, Stroke};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current wire format version byte.
pub const WIRE_VERSION: u8 = 0x01;

/// Total size of the frame header in bytes:
/// `[wire_version:1][name_len:2][payload_len:4]`.
pub const HEADER_SIZE: usize = 7;

// ── Message kinds ─────────────────────────────────────────────────────────────

/// Every message name defined by the protocol.
///
/// The wire carries the historical SCREAMING_SNAKE event names; this enum is
/// what the rest of the code dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    // Peer ↔ peer board traffic
    GetBoardData,
    BoardData,
    PathUpdate,
    PathAccepted,
    UndoUpdate,
    UndoAccepted,
    ClearUpdate,
    ClearAccepted,
    BoardDeleted,
    BoardError,
    ListenBoard,
    UnlistenBoard,
    // Peer → rendezvous announcements
    ShareBoard,
    UnshareBoard,
    // Rendezvous → peer notices
    SharingBoard,
    UnsharingBoard,
    DisconnectPeer,
}

impl MessageKind {
    /// The event name as it appears on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            MessageKind::GetBoardData => "GET_BOARD_DATA",
            MessageKind::BoardData => "BOARD_DATA",
            MessageKind::PathUpdate => "BOARD_PATH_UPDATE",
            MessageKind::PathAccepted => "BOARD_PATH_ACCEPTED",
            MessageKind::UndoUpdate => "BOARD_UNDO_UPDATE",
            MessageKind::UndoAccepted => "BOARD_UNDO_ACCEPTED",
            MessageKind::ClearUpdate => "BOARD_CLEAR_UPDATE",
            MessageKind::ClearAccepted => "BOARD_CLEAR_ACCEPTED",
            MessageKind::BoardDeleted => "BOARD_DELETED",
            MessageKind::BoardError => "BOARD_ERROR",
            MessageKind::ListenBoard => "BOARD_LISTEN",
            MessageKind::UnlistenBoard => "BOARD_UNLISTEN",
            MessageKind::ShareBoard => "SHARE_BOARD",
            MessageKind::UnshareBoard => "UNSHARE_BOARD",
            MessageKind::SharingBoard => "SHARING_BOARD",
            MessageKind::UnsharingBoard => "UNSHARING_BOARD",
            MessageKind::DisconnectPeer => "DISCONNECT_PEER",
        }
    }
}

impl TryFrom<&str> for MessageKind {
    type Error = ();

    fn try_from(name: &str) -> Result<Self, ()> {
        match name {
            "GET_BOARD_DATA" => Ok(MessageKind::GetBoardData),
            "BOARD_DATA" => Ok(MessageKind::BoardData),
            "BOARD_PATH_UPDATE" => Ok(MessageKind::PathUpdate),
            "BOARD_PATH_ACCEPTED" => Ok(MessageKind::PathAccepted),
            "BOARD_UNDO_UPDATE" => Ok(MessageKind::UndoUpdate),
            "BOARD_UNDO_ACCEPTED" => Ok(MessageKind::UndoAccepted),
            "BOARD_CLEAR_UPDATE" => Ok(MessageKind::ClearUpdate),
            "BOARD_CLEAR_ACCEPTED" => Ok(MessageKind::ClearAccepted),
            "BOARD_DELETED" => Ok(MessageKind::BoardDeleted),
            "BOARD_ERROR" => Ok(MessageKind::BoardError),
            "BOARD_LISTEN" => Ok(MessageKind::ListenBoard),
            "BOARD_UNLISTEN" => Ok(MessageKind::UnlistenBoard),
            "SHARE_BOARD" => Ok(MessageKind::ShareBoard),
            "UNSHARE_BOARD" => Ok(MessageKind::UnshareBoard),
            "SHARING_BOARD" => Ok(MessageKind::SharingBoard),
            "UNSHARING_BOARD" => Ok(MessageKind::UnsharingBoard),
            "DISCONNECT_PEER" => Ok(MessageKind::DisconnectPeer),
            _ => Err(()),
        }
    }
}

// ── Payload types ─────────────────────────────────────────────────────────────

/// Full board state as carried by `BOARD_DATA` and the path messages.
///
/// For confirmed updates the version is the authoritative post-mutation
/// version; for proposals it is the proposer's pre-mutation version (the
/// value the owner validates against).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub id: BoardId,
    pub version: u64,
    pub strokes: Vec<Stroke>,
}

impl From<&BoardDocument> for BoardSnapshot {
    fn from(doc: &BoardDocument) -> Self {
        Self {
            id: doc.id().clone(),
            version: doc.version(),
            strokes: doc.strokes().to_vec(),
        }
    }
}

/// Board id plus a version, as carried by the undo and clear messages
/// (`host:port:name%version%` — no stroke payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRef {
    pub id: BoardId,
    pub version: u64,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid BoardMesh messages, discriminated by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardMessage {
    /// Request the full board from its owner.
    GetBoardData(BoardId),
    /// Full board reply, and the initial push when a board becomes shared.
    BoardData(BoardSnapshot),
    /// Confirmed append, broadcast outward from the authoritative side.
    PathUpdate(BoardSnapshot),
    /// Proposed append, sent toward the owner for validation.
    PathAccepted(BoardSnapshot),
    /// Confirmed undo.
    UndoUpdate(VersionedRef),
    /// Proposed undo.
    UndoAccepted(VersionedRef),
    /// Confirmed clear.
    ClearUpdate(VersionedRef),
    /// Proposed clear.
    ClearAccepted(VersionedRef),
    /// Board removal, relayed to all subscribers.
    BoardDeleted(BoardId),
    /// Error report; emitted, never consumed by this core.
    BoardError(String),
    /// Subscribe to a board's updates (declared; handled as a no-op).
    ListenBoard(BoardId),
    /// Unsubscribe (declared; handled as a no-op).
    UnlistenBoard(BoardId),
    /// Announce to the rendezvous server that a board is shared.
    ShareBoard(BoardId),
    /// Withdraw a share announcement.
    UnshareBoard(BoardId),
    /// Rendezvous notice: some peer is sharing this board.
    SharingBoard(BoardId),
    /// Rendezvous notice: this board is no longer shared.
    UnsharingBoard(BoardId),
    /// Rendezvous notice: the peer owning this board disconnected.
    DisconnectPeer(BoardId),
}

impl BoardMessage {
    /// Returns the [`MessageKind`] discriminant for this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            BoardMessage::GetBoardData(_) => MessageKind::GetBoardData,
            BoardMessage::BoardData(_) => MessageKind::BoardData,
            BoardMessage::PathUpdate(_) => MessageKind::PathUpdate,
            BoardMessage::PathAccepted(_) => MessageKind::PathAccepted,
            BoardMessage::UndoUpdate(_) => MessageKind::UndoUpdate,
            BoardMessage::UndoAccepted(_) => MessageKind::UndoAccepted,
            BoardMessage::ClearUpdate(_) => MessageKind::ClearUpdate,
            BoardMessage::ClearAccepted(_) => MessageKind::ClearAccepted,
            BoardMessage::BoardDeleted(_) => MessageKind::BoardDeleted,
            BoardMessage::BoardError(_) => MessageKind::BoardError,
            BoardMessage::ListenBoard(_) => MessageKind::ListenBoard,
            BoardMessage::UnlistenBoard(_) => MessageKind::UnlistenBoard,
            BoardMessage::ShareBoard(_) => MessageKind::ShareBoard,
            BoardMessage::UnshareBoard(_) => MessageKind::UnshareBoard,
            BoardMessage::SharingBoard(_) => MessageKind::SharingBoard,
            BoardMessage::UnsharingBoard(_) => MessageKind::UnsharingBoard,
            BoardMessage::DisconnectPeer(_) => MessageKind::DisconnectPeer,
        }
    }

    /// The board this message refers to, when it refers to one.
    pub fn board_id(&self) -> Option<&BoardId> {
        match self {
            BoardMessage::GetBoardData(id)
            | BoardMessage::BoardDeleted(id)
            | BoardMessage::ListenBoard(id)
            | BoardMessage::UnlistenBoard(id)
            | BoardMessage::ShareBoard(id)
            | BoardMessage::UnshareBoard(id)
            | BoardMessage::SharingBoard(id)
            | BoardMessage::UnsharingBoard(id)
            | BoardMessage::DisconnectPeer(id) => Some(id),
            BoardMessage::BoardData(snap)
            | BoardMessage::PathUpdate(snap)
            | BoardMessage::PathAccepted(snap) => Some(&snap.id),
            BoardMessage::UndoUpdate(vref)
            | BoardMessage::UndoAccepted(vref)
            | BoardMessage::ClearUpdate(vref)
            | BoardMessage::ClearAccepted(vref) => Some(&vref.id),
            BoardMessage::BoardError(_) => None,
        }
    }
}
