//! UI command facade: plain synchronous local-edit calls for a frontend.
//!
//! BoardMesh ships no rendering surface; this module is the seam one would
//! plug into.  Every call here is synchronous and non-blocking — the engine
//! validates the edit in memory and the resulting sends are fire-and-forget
//! queue pushes — so a GUI may call it from its own event thread and marshal
//! the boolean result back however it likes.
//!
//! The `expected` parameter on the edit calls is the board version the
//! frontend last rendered.  A `false` return means a remote update raced in
//! since that render: the edit did not happen and the caller must redraw
//! from the current state (see [`AppState::boards`]).

use std::sync::Arc;

use board_core::{BoardId, Stroke};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::boards::BoardSummary;
use crate::application::sync::{EditError, LocalEdit, SyncEngine};
use crate::infrastructure::network::discovery::DiscoveryAdapter;
use crate::infrastructure::network::dispatch_relays;
use crate::infrastructure::network::session::SessionRegistry;

// ── DTOs ──────────────────────────────────────────────────────────────────────

/// JSON-friendly board listing entry for a frontend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardDto {
    pub id: String,
    pub version: u64,
    pub stroke_count: usize,
    pub shared: bool,
    pub remote: bool,
}

impl From<BoardSummary> for BoardDto {
    fn from(summary: BoardSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            version: summary.version,
            stroke_count: summary.stroke_count,
            shared: summary.shared,
            remote: summary.remote,
        }
    }
}

// ── Shared application state ──────────────────────────────────────────────────

/// Application state shared between the frontend seam and the network tasks.
pub struct AppState {
    engine: Arc<SyncEngine>,
    registry: Arc<SessionRegistry>,
    discovery: Arc<DiscoveryAdapter>,
}

impl AppState {
    pub fn new(
        engine: Arc<SyncEngine>,
        registry: Arc<SessionRegistry>,
        discovery: Arc<DiscoveryAdapter>,
    ) -> Self {
        Self {
            engine,
            registry,
            discovery,
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Executes an edit outcome: pushes its relays onto the link queues and
    /// forwards any rendezvous announcement.  Returns the acceptance flag.
    fn apply(&self, edit: LocalEdit) -> bool {
        dispatch_relays(&self.registry, edit.relays);
        if let Some(announcement) = edit.announce {
            self.discovery.announce(announcement);
        }
        edit.accepted
    }

    /// Creates a new local board and returns its id.
    pub fn create_board(&self, name: &str) -> Result<BoardId, EditError> {
        self.engine.create_board(name)
    }

    /// Applies a freshly drawn stroke.  `false` means the caller lost a race
    /// and must redraw without it.
    pub fn draw_stroke(
        &self,
        id: &BoardId,
        stroke: Stroke,
        expected: u64,
    ) -> Result<bool, EditError> {
        let edit = self.engine.local_append(id, stroke, expected)?;
        Ok(self.apply(edit))
    }

    /// Undoes the last stroke on a board.
    pub fn undo(&self, id: &BoardId, expected: u64) -> Result<bool, EditError> {
        let edit = self.engine.local_undo(id, expected)?;
        Ok(self.apply(edit))
    }

    /// Clears a board.
    pub fn clear(&self, id: &BoardId, expected: u64) -> Result<bool, EditError> {
        let edit = self.engine.local_clear(id, expected)?;
        Ok(self.apply(edit))
    }

    /// Deletes a board, propagating the deletion to connected peers.
    pub fn delete_board(&self, id: &BoardId) -> Result<(), EditError> {
        let edit = self.engine.delete_board(id)?;
        self.apply(edit);
        Ok(())
    }

    /// Toggles sharing on an owned board.
    pub fn set_shared(&self, id: &BoardId, shared: bool) -> Result<(), EditError> {
        let edit = self.engine.set_shared(id, shared)?;
        self.apply(edit);
        Ok(())
    }

    /// Current board list for display, sorted by id.
    pub fn boards(&self) -> Vec<BoardDto> {
        self.engine
            .summaries()
            .into_iter()
            .map(BoardDto::from)
            .collect()
    }

    /// Shutdown sequence: drop all boards and close all links, without
    /// propagation.
    pub fn shutdown(&self) {
        let dropped = self.engine.shutdown_local();
        self.registry.clear();
        debug!("shutdown dropped {dropped} boards");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::discovery::DiscoverySettings;
    use board_core::{BoardMessage, PeerAddr};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn addr(host: &str, port: u16) -> PeerAddr {
        PeerAddr::new(host, port).unwrap()
    }

    fn app_state() -> AppState {
        let self_addr = addr("alpha", 4171);
        let engine = Arc::new(SyncEngine::new(self_addr.clone()));
        let registry = Arc::new(SessionRegistry::new(self_addr));
        let discovery = Arc::new(DiscoveryAdapter::new(
            DiscoverySettings {
                server: addr("127.0.0.1", 4170),
                reconnect_interval: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(2),
            },
            Arc::clone(&engine),
            Arc::clone(&registry),
        ));
        AppState::new(engine, registry, discovery)
    }

    fn stroke(token: &str) -> Stroke {
        Stroke::new(token).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_boards() {
        let app = app_state();
        let id = app.create_board("b1").unwrap();

        let boards = app.boards();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].id, id.to_string());
        assert_eq!(boards[0].version, 0);
        assert!(!boards[0].shared);
        assert!(!boards[0].remote);
    }

    #[tokio::test]
    async fn test_draw_stroke_accepted_updates_listing() {
        let app = app_state();
        let id = app.create_board("b1").unwrap();

        assert!(app.draw_stroke(&id, stroke("s1"), 0).unwrap());

        let boards = app.boards();
        assert_eq!(boards[0].version, 1);
        assert_eq!(boards[0].stroke_count, 1);
    }

    #[tokio::test]
    async fn test_draw_stroke_with_stale_version_reports_rejection() {
        let app = app_state();
        let id = app.create_board("b1").unwrap();
        assert!(app.draw_stroke(&id, stroke("s1"), 0).unwrap());

        // Frontend still believes the board is at version 0.
        assert!(!app.draw_stroke(&id, stroke("s2"), 0).unwrap());
        assert_eq!(app.boards()[0].version, 1);
    }

    #[tokio::test]
    async fn test_shared_edit_reaches_registered_links() {
        let app = app_state();
        let id = app.create_board("b1").unwrap();
        app.set_shared(&id, true).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        app.registry().register(addr("beta", 4172), tx);

        assert!(app.draw_stroke(&id, stroke("s1"), 0).unwrap());

        let sent = rx.try_recv().expect("link must receive the update");
        assert!(matches!(sent, BoardMessage::PathUpdate(_)));
    }

    #[tokio::test]
    async fn test_delete_board_propagates_to_links() {
        let app = app_state();
        let id = app.create_board("b1").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        app.registry().register(addr("beta", 4172), tx);

        app.delete_board(&id).unwrap();

        assert_eq!(rx.try_recv().unwrap(), BoardMessage::BoardDeleted(id));
        assert!(app.boards().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_drops_boards_and_links() {
        let app = app_state();
        app.create_board("b1").unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        app.registry().register(addr("beta", 4172), tx);

        app.shutdown();

        assert!(app.boards().is_empty());
        assert!(app.registry().is_empty());
    }
}
