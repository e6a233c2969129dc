//! Application layer of the peer: the board store and the synchronization
//! engine.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure business rules, here in `board-core`) and the infrastructure
//! (sockets, files).  Code in this layer:
//!
//! - **Orchestrates** domain objects to fulfil a goal (e.g., "validate this
//!   remote edit against the version gate and decide who hears about it").
//! - **Returns decisions instead of performing I/O** — the synchronization
//!   engine never touches a socket; it hands relay plans to the network
//!   layer.
//! - Is fully unit-testable without binding a single port.
//!
//! # Sub-modules
//!
//! - **`sync`** – The synchronization engine: the per-board
//!   optimistic-concurrency gate, the relay table for every protocol
//!   message, and the local-mutation path.  This is the heart of the peer.
//!
//! - **`boards`** – The in-memory store of all board documents this peer
//!   holds, owned and replicated alike.

pub mod boards;
pub mod sync;
