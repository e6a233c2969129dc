//! board-rendezvous library entry point.
//!
//! The rendezvous server is the only well-known address in a BoardMesh
//! deployment.  It holds no board content at all — only which connected peer
//! currently shares which board ids — and forwards share, unshare, and
//! disconnect notices so peers can find each other.  All board traffic flows
//! directly between peers.

pub mod server;
