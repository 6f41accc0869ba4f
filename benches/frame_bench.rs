//! Benchmarks for bridge frame encoding, assembly and decoding.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench frame_bench
//! ```

use bytes::BytesMut;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use nowtalk_core::{MacAddress, MessageCode};
use nowtalk_protocol::{BridgeCodec, FrameAssembler, InboundFrame, OutboundFrame};
use std::hint::black_box;
use tokio_util::codec::Encoder;

fn sample_frame() -> OutboundFrame {
    let mac = MacAddress::new(0x0011_2233_4455).unwrap();
    OutboundFrame::deliver(mac, MessageCode::PAIRING_OFFER, "BDG1~203.0.113.7~Ann~nowTalk~12345")
        .unwrap()
}

/// Benchmark encoding a deliver frame through the codec.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    let frame = sample_frame();
    group.bench_function("encode_deliver", |b| {
        b.iter(|| {
            let mut codec = BridgeCodec::new();
            let mut buffer = BytesMut::new();
            codec.encode(black_box(frame.clone()), &mut buffer).unwrap();
            black_box(buffer);
        });
    });

    group.finish();
}

/// Benchmark decoding a raw deliver frame.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    let raw = sample_frame().to_bytes().unwrap();
    group.bench_function("decode_message", |b| {
        b.iter(|| black_box(InboundFrame::decode(black_box(&raw))));
    });

    group.bench_function("decode_status_line", |b| {
        b.iter(|| black_box(InboundFrame::decode(black_box(b"! peer table full"))));
    });

    group.finish();
}

/// Benchmark reassembling a frame delivered in small chunks.
fn bench_assemble(c: &mut Criterion) {
    let raw = sample_frame().to_bytes().unwrap();

    c.bench_function("assemble_chunked", |b| {
        b.iter(|| {
            let mut assembler = FrameAssembler::new();
            for chunk in raw.chunks(8) {
                assembler.feed(black_box(chunk));
            }
            black_box(assembler.take_frame());
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_assemble);
criterion_main!(benches);
