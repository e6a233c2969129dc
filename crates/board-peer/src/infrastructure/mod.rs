//! Infrastructure layer for the peer application.
//!
//! Contains the boundary adapters: peer TCP networking, the rendezvous
//! client, TOML configuration storage, and the UI command facade.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `board_core`, but MUST NOT be imported by the application or domain
//! layers.

pub mod network;
pub mod storage;
pub mod ui_bridge;
