//! Wire codec for BoardMesh protocol messages.
//!
//! Two layers live here:
//!
//! - The **payload codec**: board state as a flat `%`-delimited string,
//!   `"host:port:name%version%stroke1%...%strokeN"`.  This format is kept
//!   for compatibility and isolated entirely inside this module — nothing
//!   outside the codec splits strings.
//! - The **frame codec**: a small binary envelope so one message travels as
//!   one unit over a byte stream:
//!
//! ```text
//! [wire_version:1][name_len:2][payload_len:4][name:N][payload:M]
//! ```
//!
//! Total header size: 7 bytes.  All multi-byte integers are big-endian.
//!
//! Decode failures are always reported as a typed [`ProtocolError`] and
//! never coerced to a default value — a silently-zeroed version number would
//! corrupt every version comparison downstream.

use crate::domain::board::{BoardId, BoardIdError, Stroke, StrokeError};
use crate::protocol::messages::{
    BoardMessage, BoardSnapshot, MessageKind, VersionedRef, HEADER_SIZE, WIRE_VERSION,
};
use thiserror::Error;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The wire format version in the header is not supported.
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    /// The message name in the header is not a recognized event name.
    #[error("unknown message kind: {0:?}")]
    UnknownMessageKind(String),

    /// The declared name/payload lengths exceed the available data.
    #[error("frame length mismatch: header declares {declared} bytes, available is {available}")]
    FrameLengthMismatch { declared: usize, available: usize },

    /// A required `%`-delimited segment is missing.
    #[error("missing payload segment: {0}")]
    MissingSegment(&'static str),

    /// The version segment was not a base-10 integer.
    #[error("invalid version number: {0:?}")]
    InvalidVersionNumber(String),

    /// The board id segment could not be parsed.
    #[error("invalid board id: {0}")]
    BoardId(#[from] BoardIdError),

    /// A stroke token was empty or malformed.
    #[error("invalid stroke: {0}")]
    Stroke(#[from] StrokeError),

    /// Anything else structurally wrong with the payload.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Payload codec: `%`-delimited board strings ────────────────────────────────

/// Parses the board id from any board payload: the segment before the first
/// `%` (or the whole payload when there is none).
pub fn parse_board_id(payload: &str) -> Result<BoardId, ProtocolError> {
    let head = payload.split('%').next().unwrap_or_default();
    Ok(head.parse()?)
}

/// Parses the version from a board payload: the second `%`-delimited
/// segment, as a base-10 integer.
pub fn parse_version(payload: &str) -> Result<u64, ProtocolError> {
    let mut parts = payload.splitn(3, '%');
    parts.next(); // board id
    let segment = parts.next().ok_or(ProtocolError::MissingSegment("version"))?;
    segment
        .parse()
        .map_err(|_| ProtocolError::InvalidVersionNumber(segment.to_string()))
}

/// Parses the stroke list from a board payload: every `%`-delimited segment
/// after the version.  A trailing empty segment (`"id%0%"`) is the
/// zero-stroke board; an empty segment anywhere else is a decode failure.
pub fn parse_strokes(payload: &str) -> Result<Vec<Stroke>, ProtocolError> {
    let rest = payload
        .splitn(3, '%')
        .nth(2)
        .ok_or(ProtocolError::MissingSegment("strokes"))?;
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    rest.split('%').map(|t| Ok(Stroke::new(t)?)).collect()
}

/// Parses the newest stroke from a path message payload: the last
/// `%`-delimited segment.  Defined only for path messages, which carry at
/// least one stroke.
pub fn parse_latest_stroke(payload: &str) -> Result<Stroke, ProtocolError> {
    parse_strokes(payload)?
        .pop()
        .ok_or(ProtocolError::MissingSegment("stroke"))
}

/// Serializes board state to the flat wire string.
///
/// Zero strokes produce `"host:port:name%version%"`; the trailing delimiter
/// is what lets [`parse_strokes`] distinguish "no strokes" from "segment
/// missing".
pub fn encode_board(id: &BoardId, version: u64, strokes: &[Stroke]) -> String {
    let mut out = format!("{id}%{version}%");
    for (i, stroke) in strokes.iter().enumerate() {
        if i > 0 {
            out.push('%');
        }
        out.push_str(stroke.as_str());
    }
    out
}

/// Decodes a full board payload into a [`BoardSnapshot`].
pub fn decode_board(payload: &str) -> Result<BoardSnapshot, ProtocolError> {
    Ok(BoardSnapshot {
        id: parse_board_id(payload)?,
        version: parse_version(payload)?,
        strokes: parse_strokes(payload)?,
    })
}

fn encode_versioned_ref(vref: &VersionedRef) -> String {
    format!("{}%{}%", vref.id, vref.version)
}

fn decode_versioned_ref(payload: &str) -> Result<VersionedRef, ProtocolError> {
    if !parse_strokes(payload)?.is_empty() {
        return Err(ProtocolError::MalformedPayload(
            "undo/clear payload must not carry strokes".to_string(),
        ));
    }
    Ok(VersionedRef {
        id: parse_board_id(payload)?,
        version: parse_version(payload)?,
    })
}

// ── Frame codec ───────────────────────────────────────────────────────────────

/// Encodes a [`BoardMessage`] into a byte vector including the 7-byte header.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if the payload exceeds the
/// `u32` length field (not reachable with realistic board sizes).
pub fn encode_message(msg: &BoardMessage) -> Result<Vec<u8>, ProtocolError> {
    let name = msg.kind().wire_name().as_bytes();
    let payload = encode_payload(msg);
    let payload = payload.as_bytes();
    if payload.len() > u32::MAX as usize {
        return Err(ProtocolError::MalformedPayload(format!(
            "payload of {} bytes exceeds the frame length field",
            payload.len()
        )));
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + name.len() + payload.len());
    buf.push(WIRE_VERSION);
    buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(name);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes one [`BoardMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header + name + payload), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
///
/// # Examples
///
/// ```rust
/// use board_core::{decode_message, encode_message, BoardMessage};
///
/// let original = BoardMessage::GetBoardData("alpha:4171:board1".parse().unwrap());
/// let bytes = encode_message(&original).unwrap();
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, original);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn decode_message(bytes: &[u8]) -> Result<(BoardMessage, usize), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != WIRE_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let name_len = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
    let payload_len = u32::from_be_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]) as usize;

    let total_needed = HEADER_SIZE + name_len + payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::FrameLengthMismatch {
            declared: name_len + payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    let name = std::str::from_utf8(&bytes[HEADER_SIZE..HEADER_SIZE + name_len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("message name not UTF-8: {e}")))?;
    let payload =
        std::str::from_utf8(&bytes[HEADER_SIZE + name_len..total_needed])
            .map_err(|e| ProtocolError::MalformedPayload(format!("payload not UTF-8: {e}")))?;

    let kind = MessageKind::try_from(name)
        .map_err(|()| ProtocolError::UnknownMessageKind(name.to_string()))?;
    let msg = decode_payload(kind, payload)?;
    Ok((msg, total_needed))
}

// ── Per-kind payload encoding ─────────────────────────────────────────────────

fn encode_payload(msg: &BoardMessage) -> String {
    match msg {
        BoardMessage::GetBoardData(id)
        | BoardMessage::BoardDeleted(id)
        | BoardMessage::ListenBoard(id)
        | BoardMessage::UnlistenBoard(id)
        | BoardMessage::ShareBoard(id)
        | BoardMessage::UnshareBoard(id)
        | BoardMessage::SharingBoard(id)
        | BoardMessage::UnsharingBoard(id)
        | BoardMessage::DisconnectPeer(id) => id.to_string(),
        BoardMessage::BoardData(snap)
        | BoardMessage::PathUpdate(snap)
        | BoardMessage::PathAccepted(snap) => encode_board(&snap.id, snap.version, &snap.strokes),
        BoardMessage::UndoUpdate(vref)
        | BoardMessage::UndoAccepted(vref)
        | BoardMessage::ClearUpdate(vref)
        | BoardMessage::ClearAccepted(vref) => encode_versioned_ref(vref),
        BoardMessage::BoardError(text) => text.clone(),
    }
}

// ── Per-kind payload decoding ─────────────────────────────────────────────────

fn decode_payload(kind: MessageKind, payload: &str) -> Result<BoardMessage, ProtocolError> {
    match kind {
        MessageKind::GetBoardData => Ok(BoardMessage::GetBoardData(payload.parse()?)),
        MessageKind::BoardData => Ok(BoardMessage::BoardData(decode_board(payload)?)),
        MessageKind::PathUpdate => Ok(BoardMessage::PathUpdate(decode_path_board(payload)?)),
        MessageKind::PathAccepted => Ok(BoardMessage::PathAccepted(decode_path_board(payload)?)),
        MessageKind::UndoUpdate => Ok(BoardMessage::UndoUpdate(decode_versioned_ref(payload)?)),
        MessageKind::UndoAccepted => Ok(BoardMessage::UndoAccepted(decode_versioned_ref(payload)?)),
        MessageKind::ClearUpdate => Ok(BoardMessage::ClearUpdate(decode_versioned_ref(payload)?)),
        MessageKind::ClearAccepted => {
            Ok(BoardMessage::ClearAccepted(decode_versioned_ref(payload)?))
        }
        MessageKind::BoardDeleted => Ok(BoardMessage::BoardDeleted(payload.parse()?)),
        MessageKind::BoardError => Ok(BoardMessage::BoardError(payload.to_string())),
        MessageKind::ListenBoard => Ok(BoardMessage::ListenBoard(payload.parse()?)),
        MessageKind::UnlistenBoard => Ok(BoardMessage::UnlistenBoard(payload.parse()?)),
        MessageKind::ShareBoard => Ok(BoardMessage::ShareBoard(payload.parse()?)),
        MessageKind::UnshareBoard => Ok(BoardMessage::UnshareBoard(payload.parse()?)),
        MessageKind::SharingBoard => Ok(BoardMessage::SharingBoard(payload.parse()?)),
        MessageKind::UnsharingBoard => Ok(BoardMessage::UnsharingBoard(payload.parse()?)),
        MessageKind::DisconnectPeer => Ok(BoardMessage::DisconnectPeer(payload.parse()?)),
    }
}

/// Path messages carry exactly the board state *including* the path in
/// question, so a path payload with zero strokes is malformed.
fn decode_path_board(payload: &str) -> Result<BoardSnapshot, ProtocolError> {
    let snap = decode_board(payload)?;
    if snap.strokes.is_empty() {
        return Err(ProtocolError::MissingSegment("stroke"));
    }
    Ok(snap)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
