//! # board-core
//!
//! Shared library for BoardMesh containing the wire protocol codec and the
//! board domain entities.
//!
//! This crate is used by both the peer application and the rendezvous server.
//! It has zero dependencies on OS APIs, UI frameworks, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! BoardMesh is a peer-to-peer shared whiteboard: every peer can create
//! drawing boards, share them on the local network, and replicate boards
//! shared by other peers.  There is no central document server — the peer
//! that created a board is the authority for it, and everyone else holds a
//! replica that converges through an optimistic version check.
//!
//! This crate (`board-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – Pure business logic with no I/O.  The most important
//!   piece is the [`BoardDocument`]: an ordered list of strokes plus a
//!   monotonic version counter that accepts a mutation only when the caller
//!   proves it saw the current version.
//!
//! - **`protocol`** – How messages travel over the network.  Board state is
//!   a flat `%`-delimited string (kept for compatibility with the historical
//!   wire format) wrapped in a small length-prefixed binary frame, and every
//!   message is a variant of one typed enum so peers dispatch with a single
//!   `match`.

// Declare the two top-level modules.  Rust will look for each in a
// subdirectory with the same name (e.g., src/protocol/mod.rs).
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `board_core::BoardDocument` instead of `board_core::domain::board::BoardDocument`.
pub use domain::board::{
    BoardDocument, BoardId, BoardIdError, PeerAddr, Stroke, StrokeError,
};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{BoardMessage, BoardSnapshot, MessageKind, VersionedRef};
