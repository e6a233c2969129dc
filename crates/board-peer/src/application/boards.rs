//! BoardStore: the in-memory registry of every board this peer holds.
//!
//! The store is a plain map with no locking of its own; the [`SyncEngine`]
//! wraps it in a mutex so that each read-modify-write on a document's
//! `(version, strokes)` pair is atomic across connection tasks and the
//! local-edit thread.
//!
//! [`SyncEngine`]: crate::application::sync::SyncEngine

use std::collections::HashMap;

use board_core::{BoardDocument, BoardId};

/// Lightweight listing entry for one board, used by the UI seam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSummary {
    pub id: BoardId,
    pub version: u64,
    pub stroke_count: usize,
    pub shared: bool,
    pub remote: bool,
}

impl From<&BoardDocument> for BoardSummary {
    fn from(doc: &BoardDocument) -> Self {
        Self {
            id: doc.id().clone(),
            version: doc.version(),
            stroke_count: doc.strokes().len(),
            shared: doc.is_shared(),
            remote: doc.is_remote(),
        }
    }
}

/// In-memory map of `BoardId -> BoardDocument`.
///
/// A `HashMap` gives O(1) lookup per message; iteration order is not
/// guaranteed, so [`BoardStore::summaries`] sorts by id before returning,
/// matching what a board-selection list expects.
#[derive(Debug, Default)]
pub struct BoardStore {
    boards: HashMap<BoardId, BoardDocument>,
}

impl BoardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a document.  Replacement is deliberate: a
    /// full-board transfer is the resynchronization path for a diverged
    /// replica.
    pub fn upsert(&mut self, doc: BoardDocument) {
        self.boards.insert(doc.id().clone(), doc);
    }

    pub fn get(&self, id: &BoardId) -> Option<&BoardDocument> {
        self.boards.get(id)
    }

    pub fn get_mut(&mut self, id: &BoardId) -> Option<&mut BoardDocument> {
        self.boards.get_mut(id)
    }

    pub fn contains(&self, id: &BoardId) -> bool {
        self.boards.contains_key(id)
    }

    /// Removes a document, returning it if it was present.
    pub fn remove(&mut self, id: &BoardId) -> Option<BoardDocument> {
        self.boards.remove(id)
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Snapshot of all boards, sorted by id.
    pub fn summaries(&self) -> Vec<BoardSummary> {
        let mut all: Vec<BoardSummary> = self.boards.values().map(BoardSummary::from).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}
