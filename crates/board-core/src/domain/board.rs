//! Board identity and the versioned document state machine.
//!
//! A [`BoardDocument`] is the replicated entity of BoardMesh.  Its version
//! counter is the *only* conflict-detection mechanism in the whole system:
//! every mutation requires the caller to pass the version it believes is
//! current, and the mutation is accepted iff that guess matches.  Two
//! documents with the same id and version therefore hold identical strokes.
//!
//! # Optimistic concurrency (for beginners)
//!
//! Instead of locking a board across the network before editing it, a peer
//! edits first and asks questions later: it applies the edit to its local
//! copy and tells the board's owner "here is my edit, valid against version
//! N".  If the owner is still at version N the edit wins and is broadcast;
//! if some other peer got there first the edit is silently rejected and the
//! loser refetches the authoritative copy.  No consensus round-trips, at the
//! price of occasionally redrawing a lost stroke.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced when parsing or constructing board/peer identities.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoardIdError {
    /// The string did not contain the expected `host:port:name` segments.
    #[error("expected host:port:name, got {0:?}")]
    MissingSegment(String),

    /// The port segment was not a decimal u16.
    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    /// The host segment was empty or contained a reserved character.
    #[error("invalid host (empty, or contains ':' or '%'): {0:?}")]
    InvalidHost(String),

    /// The board name was empty or contained the payload delimiter.
    #[error("invalid board name (empty, or contains '%'): {0:?}")]
    InvalidName(String),
}

/// Errors produced when constructing a [`Stroke`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StrokeError {
    /// A stroke token must carry at least one byte.
    #[error("stroke token must not be empty")]
    Empty,

    /// `%` separates strokes on the wire and may not appear inside one.
    #[error("stroke token must not contain the reserved delimiter '%'")]
    ReservedDelimiter,
}

// ── Peer address ──────────────────────────────────────────────────────────────

/// The `host:port` identity of a peer process.
///
/// Peers are identified by the address their peer listener is reachable at;
/// the same tuple prefixes every [`BoardId`] owned by that peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddr {
    host: String,
    port: u16,
}

impl PeerAddr {
    /// Creates a peer address, validating the host segment.
    ///
    /// # Errors
    ///
    /// Returns [`BoardIdError::InvalidHost`] if the host is empty or contains
    /// `':'` or `'%'` (both are wire delimiters).
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, BoardIdError> {
        let host = host.into();
        if host.is_empty() || host.contains(':') || host.contains('%') {
            return Err(BoardIdError::InvalidHost(host));
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Board identity ────────────────────────────────────────────────────────────

/// Globally unique identity of a board: owner host, owner port, board name.
///
/// Serialized as `"host:port:name"`.  The owner prefix is not decoration —
/// it is how a subscriber knows which peer to dial for the authoritative
/// copy.  The name segment may itself contain `':'`; parsing splits on the
/// first two colons only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoardId {
    host: String,
    port: u16,
    name: String,
}

impl BoardId {
    /// Creates a board id, validating every segment.
    ///
    /// # Errors
    ///
    /// Returns [`BoardIdError`] if the host or name is empty or contains a
    /// reserved delimiter.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        name: impl Into<String>,
    ) -> Result<Self, BoardIdError> {
        let host = host.into();
        if host.is_empty() || host.contains(':') || host.contains('%') {
            return Err(BoardIdError::InvalidHost(host));
        }
        let name = name.into();
        if name.is_empty() || name.contains('%') {
            return Err(BoardIdError::InvalidName(name));
        }
        Ok(Self { host, port, name })
    }

    /// Builds the id of a board owned by `owner`.
    pub fn owned_by(owner: &PeerAddr, name: impl Into<String>) -> Result<Self, BoardIdError> {
        Self::new(owner.host.clone(), owner.port, name)
    }

    /// The address of the peer that owns (is authoritative for) this board.
    pub fn owner(&self) -> PeerAddr {
        PeerAddr {
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn owner_host(&self) -> &str {
        &self.host
    }

    pub fn owner_port(&self) -> u16 {
        self.port
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.port, self.name)
    }
}

impl FromStr for BoardId {
    type Err = BoardIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let host = parts
            .next()
            .ok_or_else(|| BoardIdError::MissingSegment(s.to_string()))?;
        let port = parts
            .next()
            .ok_or_else(|| BoardIdError::MissingSegment(s.to_string()))?;
        let name = parts
            .next()
            .ok_or_else(|| BoardIdError::MissingSegment(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| BoardIdError::InvalidPort(port.to_string()))?;
        Self::new(host, port, name)
    }
}

// ── Stroke ────────────────────────────────────────────────────────────────────

/// One drawn path: an opaque token from the protocol's point of view.
///
/// The synchronization protocol never interprets stroke contents — it only
/// counts and concatenates them.  The rendering surface decides what the
/// token means (point list, colour tag, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stroke(String);

impl Stroke {
    /// Creates a stroke token.
    ///
    /// # Errors
    ///
    /// Returns [`StrokeError`] for the empty string or a token containing
    /// `'%'` (the wire delimiter between strokes).
    pub fn new(token: impl Into<String>) -> Result<Self, StrokeError> {
        let token = token.into();
        if token.is_empty() {
            return Err(StrokeError::Empty);
        }
        if token.contains('%') {
            return Err(StrokeError::ReservedDelimiter);
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Stroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Board document ────────────────────────────────────────────────────────────

/// The replicated whiteboard entity: ordered strokes plus a version counter.
///
/// Invariant: `version` equals the number of accepted mutations since
/// creation — it increments by exactly 1 on every accepted append, undo, and
/// clear, and never moves otherwise.
///
/// `BoardDocument` is plain data; callers provide mutual exclusion (the peer
/// application keeps all documents behind one store-level mutex, which also
/// makes each `try_*` call atomic with respect to concurrent readers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardDocument {
    id: BoardId,
    strokes: Vec<Stroke>,
    version: u64,
    shared: bool,
    remote: bool,
}

impl BoardDocument {
    /// Creates a locally-owned board: version 0, no strokes, not shared.
    pub fn new_local(id: BoardId) -> Self {
        Self {
            id,
            strokes: Vec::new(),
            version: 0,
            shared: false,
            remote: false,
        }
    }

    /// Instantiates a replica of a remote peer's board from a full-board
    /// transfer.  Replicas are marked shared: they exist precisely because
    /// the owner is sharing them.
    pub fn new_replica(id: BoardId, version: u64, strokes: Vec<Stroke>) -> Self {
        Self {
            id,
            strokes,
            version,
            shared: true,
            remote: true,
        }
    }

    pub fn id(&self) -> &BoardId {
        &self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Whether local changes are announced to the rendezvous server.
    /// Only meaningful for locally-owned boards.
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn set_shared(&mut self, shared: bool) {
        self.shared = shared;
    }

    /// True if this replica's owner is a different peer.  Remote replicas
    /// accept mutations only via the synchronization protocol and never make
    /// owner decisions.
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Appends a stroke iff `expected` matches the current version.
    ///
    /// Returns `true` and bumps the version on success; returns `false` and
    /// leaves the document untouched otherwise.  A rejected caller must
    /// resynchronize (redraw from current state, or refetch the
    /// authoritative copy if the edit originated remotely).
    #[must_use]
    pub fn try_append(&mut self, stroke: Stroke, expected: u64) -> bool {
        if expected != self.version {
            return false;
        }
        self.strokes.push(stroke);
        self.version += 1;
        true
    }

    /// Removes the last stroke iff `expected` matches the current version
    /// and the board is non-empty.
    ///
    /// Undoing an empty board is rejected rather than treated as a no-op
    /// version bump, so the version keeps meaning "number of accepted
    /// mutations".
    #[must_use]
    pub fn try_undo(&mut self, expected: u64) -> bool {
        if expected != self.version || self.strokes.is_empty() {
            return false;
        }
        self.strokes.pop();
        self.version += 1;
        true
    }

    /// Removes all strokes iff `expected` matches the current version.
    #[must_use]
    pub fn try_clear(&mut self, expected: u64) -> bool {
        if expected != self.version {
            return false;
        }
        self.strokes.clear();
        self.version += 1;
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn board(name: &str) -> BoardDocument {
        BoardDocument::new_local(BoardId::new("alpha", 4171, name).unwrap())
    }

    fn stroke(token: &str) -> Stroke {
        Stroke::new(token).unwrap()
    }

    // ── Identity parsing ──────────────────────────────────────────────────────

    #[test]
    fn test_board_id_round_trips_through_display() {
        let id = BoardId::new("alpha", 4171, "board1").unwrap();
        let reparsed: BoardId = id.to_string().parse().unwrap();
        assert_eq!(reparsed, id);
    }

    #[test]
    fn test_board_id_name_may_contain_colons() {
        let id: BoardId = "alpha:4171:board:with:colons".parse().unwrap();
        assert_eq!(id.name(), "board:with:colons");
        assert_eq!(id.owner_host(), "alpha");
        assert_eq!(id.owner_port(), 4171);
    }

    #[test]
    fn test_board_id_rejects_missing_segments() {
        assert!(matches!(
            "alpha:4171".parse::<BoardId>(),
            Err(BoardIdError::MissingSegment(_))
        ));
    }

    #[test]
    fn test_board_id_rejects_non_numeric_port() {
        assert!(matches!(
            "alpha:port:board".parse::<BoardId>(),
            Err(BoardIdError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_board_id_rejects_name_with_delimiter() {
        assert!(matches!(
            BoardId::new("alpha", 4171, "bad%name"),
            Err(BoardIdError::InvalidName(_))
        ));
    }

    #[test]
    fn test_board_id_owner_matches_prefix() {
        let id: BoardId = "alpha:4171:b".parse().unwrap();
        assert_eq!(id.owner(), PeerAddr::new("alpha", 4171).unwrap());
    }

    #[test]
    fn test_peer_addr_rejects_host_with_colon() {
        assert!(matches!(
            PeerAddr::new("a:b", 1),
            Err(BoardIdError::InvalidHost(_))
        ));
    }

    // ── Stroke validation ─────────────────────────────────────────────────────

    #[test]
    fn test_stroke_rejects_empty_token() {
        assert_eq!(Stroke::new(""), Err(StrokeError::Empty));
    }

    #[test]
    fn test_stroke_rejects_reserved_delimiter() {
        assert_eq!(Stroke::new("1,1 2%2"), Err(StrokeError::ReservedDelimiter));
    }

    // ── Version gate ──────────────────────────────────────────────────────────

    #[test]
    fn test_new_local_board_starts_at_version_zero() {
        let b = board("b");
        assert_eq!(b.version(), 0);
        assert!(b.strokes().is_empty());
        assert!(!b.is_shared());
        assert!(!b.is_remote());
    }

    #[test]
    fn test_version_counts_accepted_mutations() {
        // Arrange
        let mut b = board("b");

        // Act – three accepted mutations
        assert!(b.try_append(stroke("s1"), 0));
        assert!(b.try_append(stroke("s2"), 1));
        assert!(b.try_undo(2));

        // Assert – version equals the number of accepted mutations
        assert_eq!(b.version(), 3);
        assert_eq!(b.strokes(), &[stroke("s1")]);
    }

    #[test]
    fn test_append_with_stale_expected_is_rejected_without_mutation() {
        let mut b = board("b");
        assert!(b.try_append(stroke("s1"), 0));

        // Same expected value again – somebody else won the race.
        assert!(!b.try_append(stroke("s2"), 0));
        assert_eq!(b.version(), 1, "rejection must not bump the version");
        assert_eq!(b.strokes().len(), 1);
    }

    #[test]
    fn test_two_appends_against_same_expected_only_one_succeeds() {
        let mut b = board("b");
        let first = b.try_append(stroke("a"), 0);
        let second = b.try_append(stroke("b"), 0);
        assert!(first);
        assert!(!second);
        assert_eq!(b.version(), 1, "version increases by exactly 1, not 2");
    }

    #[test]
    fn test_undo_on_empty_board_is_rejected() {
        let mut b = board("b");
        assert!(!b.try_undo(0));
        assert_eq!(b.version(), 0);
    }

    #[test]
    fn test_undo_removes_last_stroke_only() {
        let mut b = board("b");
        assert!(b.try_append(stroke("s1"), 0));
        assert!(b.try_append(stroke("s2"), 1));
        assert!(b.try_undo(2));
        assert_eq!(b.strokes(), &[stroke("s1")]);
    }

    #[test]
    fn test_clear_empties_board_and_bumps_version() {
        let mut b = board("b");
        assert!(b.try_append(stroke("s1"), 0));
        assert!(b.try_clear(1));
        assert!(b.strokes().is_empty());
        assert_eq!(b.version(), 2);
    }

    #[test]
    fn test_clear_with_wrong_expected_is_rejected() {
        let mut b = board("b");
        assert!(b.try_append(stroke("s1"), 0));
        assert!(!b.try_clear(0));
        assert_eq!(b.strokes().len(), 1);
    }

    #[test]
    fn test_replica_is_remote_and_shared() {
        let id: BoardId = "beta:4171:b".parse().unwrap();
        let r = BoardDocument::new_replica(id, 2, vec![stroke("s1"), stroke("s2")]);
        assert!(r.is_remote());
        assert!(r.is_shared());
        assert_eq!(r.version(), 2);
    }
}
