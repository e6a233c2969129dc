//! Criterion benchmarks for the BoardMesh wire codec.
//!
//! Measures encoding and decoding latency for representative messages; the
//! codec sits on every relay hop, so it must stay cheap relative to the
//! network round trip.
//!
//! Run with:
//! ```bash
//! cargo bench --package board-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use board_core::protocol::codec::{
    decode_message, encode_message, parse_latest_stroke, parse_version,
};
use board_core::{BoardId, BoardMessage, BoardSnapshot, Stroke, VersionedRef};

// ── Message fixtures ──────────────────────────────────────────────────────────

fn board_id() -> BoardId {
    "alpha:4171:board1660000000000".parse().expect("fixture id")
}

fn snapshot(stroke_count: usize) -> BoardSnapshot {
    let strokes = (0..stroke_count)
        .map(|i| Stroke::new(format!("10,{i} 20,{i} 30,{i} black")).expect("fixture stroke"))
        .collect();
    BoardSnapshot {
        id: board_id(),
        version: stroke_count as u64,
        strokes,
    }
}

fn make_get_board_data() -> BoardMessage {
    BoardMessage::GetBoardData(board_id())
}

fn make_undo_update() -> BoardMessage {
    BoardMessage::UndoUpdate(VersionedRef {
        id: board_id(),
        version: 41,
    })
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    group.bench_function("get_board_data", |b| {
        let msg = make_get_board_data();
        b.iter(|| encode_message(black_box(&msg)).expect("encode"));
    });

    group.bench_function("undo_update", |b| {
        let msg = make_undo_update();
        b.iter(|| encode_message(black_box(&msg)).expect("encode"));
    });

    for stroke_count in [1usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("board_data", stroke_count),
            &stroke_count,
            |b, &n| {
                let msg = BoardMessage::BoardData(snapshot(n));
                b.iter(|| encode_message(black_box(&msg)).expect("encode"));
            },
        );
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    group.bench_function("get_board_data", |b| {
        let bytes = encode_message(&make_get_board_data()).expect("encode");
        b.iter(|| decode_message(black_box(&bytes)).expect("decode"));
    });

    for stroke_count in [1usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("board_data", stroke_count),
            &stroke_count,
            |b, &n| {
                let bytes =
                    encode_message(&BoardMessage::BoardData(snapshot(n))).expect("encode");
                b.iter(|| decode_message(black_box(&bytes)).expect("decode"));
            },
        );
    }

    group.finish();
}

fn bench_payload_helpers(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload");

    let payload = board_core::protocol::codec::encode_board(
        &board_id(),
        100,
        &snapshot(100).strokes,
    );

    group.bench_function("parse_version", |b| {
        b.iter(|| parse_version(black_box(&payload)).expect("version"));
    });

    group.bench_function("parse_latest_stroke", |b| {
        b.iter(|| parse_latest_stroke(black_box(&payload)).expect("stroke"));
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_payload_helpers);
criterion_main!(benches);
