//! Codec benchmarks for peercast-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use peercast_protocol::{codec, Envelope};

const CHAT_FRAME: &[u8] = br#"{"type":"chat-message","from":"","data":"{\"content\":\"hello there\",\"ts\":\"2024-05-01T10:00:00.000Z\"}"}"#;

fn sdp_frame(size: usize) -> Vec<u8> {
    let sdp = "a".repeat(size);
    format!(
        r#"{{"type":"offer","from":"","data":"{{\"to\":\"9b2f0c1e-4d55-4a8e-9d4b-2f7a6c3e1b00\",\"content\":\"{}\"}}"}}"#,
        sdp
    )
    .into_bytes()
}

fn bench_decode_chat(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(CHAT_FRAME.len() as u64));
    group.bench_function("chat", |b| {
        b.iter(|| {
            let env = codec::decode(black_box(CHAT_FRAME)).unwrap();
            env.client_event().unwrap()
        })
    });
    group.finish();
}

fn bench_decode_offer(c: &mut Criterion) {
    let frame = sdp_frame(4096);

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("offer_4KB", |b| {
        b.iter(|| {
            let env = codec::decode(black_box(&frame)).unwrap();
            env.client_event().unwrap()
        })
    });
    group.finish();
}

fn bench_encode_forward(c: &mut Criterion) {
    let mut env = codec::decode(&sdp_frame(4096)).unwrap();
    env.from = "3f1c2b7a-0e9d-4c1b-8a55-6d2e4f7b9c10".into();

    c.bench_function("encode_forward_4KB", |b| {
        b.iter(|| codec::encode(black_box(&env)))
    });
}

fn bench_encode_leave(c: &mut Criterion) {
    let env = Envelope::leave("3f1c2b7a-0e9d-4c1b-8a55-6d2e4f7b9c10");

    c.bench_function("encode_leave", |b| b.iter(|| codec::encode(black_box(&env))));
}

criterion_group!(
    benches,
    bench_decode_chat,
    bench_decode_offer,
    bench_encode_forward,
    bench_encode_leave
);
criterion_main!(benches);
