//! Integration tests for the board-core protocol codec.
//!
//! These tests verify complete round-trip encoding and decoding of every
//! message kind through the public API, exercising the frame codec, the
//! `%`-delimited payload codec, and the domain types together.

use board_core::{
    decode_message, encode_message, BoardDocument, BoardId, BoardMessage, BoardSnapshot,
    MessageKind, ProtocolError, Stroke, VersionedRef,
};

fn id(s: &str) -> BoardId {
    s.parse().expect("test board id must parse")
}

fn stroke(s: &str) -> Stroke {
    Stroke::new(s).expect("test stroke must be valid")
}

/// Encodes a message and then decodes it, asserting that the decoded message
/// matches the original.
fn roundtrip(msg: BoardMessage) -> BoardMessage {
    let bytes = encode_message(&msg).expect("encode must succeed");
    let (decoded, consumed) = decode_message(&bytes).expect("decode must succeed");
    assert_eq!(consumed, bytes.len(), "all bytes must be consumed");
    decoded
}

#[test]
fn test_roundtrip_get_board_data() {
    let original = BoardMessage::GetBoardData(id("alpha:4171:board1660000000000"));
    assert_eq!(original, roundtrip(original.clone()));
}

#[test]
fn test_roundtrip_board_data_with_many_strokes() {
    let strokes: Vec<Stroke> = (0..50)
        .map(|i| stroke(&format!("0,0 {i},{i} black")))
        .collect();
    let original = BoardMessage::BoardData(BoardSnapshot {
        id: id("alpha:4171:b1"),
        version: 50,
        strokes,
    });
    assert_eq!(original, roundtrip(original.clone()));
}

#[test]
fn test_roundtrip_board_data_empty_board() {
    let original = BoardMessage::BoardData(BoardSnapshot {
        id: id("alpha:4171:b1"),
        version: 0,
        strokes: vec![],
    });
    assert_eq!(original, roundtrip(original.clone()));
}

#[test]
fn test_roundtrip_path_update_and_accepted() {
    let snap = BoardSnapshot {
        id: id("alpha:4171:b1"),
        version: 3,
        strokes: vec![stroke("s1"), stroke("s2"), stroke("s3"), stroke("s4")],
    };
    for original in [
        BoardMessage::PathUpdate(snap.clone()),
        BoardMessage::PathAccepted(snap),
    ] {
        assert_eq!(original, roundtrip(original.clone()));
    }
}

#[test]
fn test_roundtrip_undo_and_clear_family() {
    let vref = VersionedRef {
        id: id("alpha:4171:b1"),
        version: 9,
    };
    for original in [
        BoardMessage::UndoUpdate(vref.clone()),
        BoardMessage::UndoAccepted(vref.clone()),
        BoardMessage::ClearUpdate(vref.clone()),
        BoardMessage::ClearAccepted(vref),
    ] {
        assert_eq!(original, roundtrip(original.clone()));
    }
}

#[test]
fn test_roundtrip_board_deleted_listen_unlisten() {
    for original in [
        BoardMessage::BoardDeleted(id("alpha:4171:b1")),
        BoardMessage::ListenBoard(id("alpha:4171:b1")),
        BoardMessage::UnlistenBoard(id("alpha:4171:b1")),
    ] {
        assert_eq!(original, roundtrip(original.clone()));
    }
}

#[test]
fn test_roundtrip_board_error_free_text() {
    // BOARD_ERROR text is implementation-defined and may contain delimiters.
    let original = BoardMessage::BoardError("version 3 != 4 for alpha:4171:b1%4%".to_string());
    assert_eq!(original, roundtrip(original.clone()));
}

#[test]
fn test_roundtrip_rendezvous_catalogue() {
    for original in [
        BoardMessage::ShareBoard(id("alpha:4171:b1")),
        BoardMessage::UnshareBoard(id("alpha:4171:b1")),
        BoardMessage::SharingBoard(id("alpha:4171:b1")),
        BoardMessage::UnsharingBoard(id("alpha:4171:b1")),
        BoardMessage::DisconnectPeer(id("alpha:4171:b1")),
    ] {
        assert_eq!(original, roundtrip(original.clone()));
    }
}

#[test]
fn test_document_survives_wire_roundtrip_exactly() {
    // A document serialized as BOARD_DATA and re-instantiated as a replica
    // must report the same id, version, and strokes.
    let mut doc = BoardDocument::new_local(id("alpha:4171:b1"));
    assert!(doc.try_append(stroke("s1"), 0));
    assert!(doc.try_append(stroke("s2"), 1));
    assert!(doc.try_undo(2));

    let original = BoardMessage::BoardData(BoardSnapshot::from(&doc));
    let decoded = roundtrip(original);

    let BoardMessage::BoardData(snap) = decoded else {
        panic!("decoded message must still be BoardData");
    };
    let replica = BoardDocument::new_replica(snap.id, snap.version, snap.strokes);
    assert_eq!(replica.id(), doc.id());
    assert_eq!(replica.version(), doc.version());
    assert_eq!(replica.strokes(), doc.strokes());
}

#[test]
fn test_kind_accessor_matches_wire_name() {
    let msg = BoardMessage::GetBoardData(id("alpha:4171:b1"));
    assert_eq!(msg.kind(), MessageKind::GetBoardData);
    assert_eq!(msg.kind().wire_name(), "GET_BOARD_DATA");
    assert_eq!(MessageKind::try_from("GET_BOARD_DATA"), Ok(MessageKind::GetBoardData));
}

#[test]
fn test_every_kind_name_parses_back_to_itself() {
    for kind in [
        MessageKind::GetBoardData,
        MessageKind::BoardData,
        MessageKind::PathUpdate,
        MessageKind::PathAccepted,
        MessageKind::UndoUpdate,
        MessageKind::UndoAccepted,
        MessageKind::ClearUpdate,
        MessageKind::ClearAccepted,
        MessageKind::BoardDeleted,
        MessageKind::BoardError,
        MessageKind::ListenBoard,
        MessageKind::UnlistenBoard,
        MessageKind::ShareBoard,
        MessageKind::UnshareBoard,
        MessageKind::SharingBoard,
        MessageKind::UnsharingBoard,
        MessageKind::DisconnectPeer,
    ] {
        assert_eq!(MessageKind::try_from(kind.wire_name()), Ok(kind));
    }
}

#[test]
fn test_decoding_garbage_never_panics() {
    // A handful of adversarial inputs; every one must produce Err, not panic.
    let cases: Vec<Vec<u8>> = vec![
        vec![],
        vec![0x01],
        vec![0xFF; 7],
        vec![0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
        b"GET_BOARD_DATA alpha:4171:b1".to_vec(),
    ];
    for bytes in cases {
        let result: Result<_, ProtocolError> = decode_message(&bytes);
        assert!(result.is_err(), "garbage input must decode to an error");
    }
}
