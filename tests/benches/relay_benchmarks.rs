//! # Attestation Relay Benchmarks
//!
//! | Path | Operation | Target |
//! |------|-----------|--------|
//! | Collection | Decode one hex event payload | < 10µs |
//! | Finalization | Merkle root over a full buffer | < 1ms per 1000 leaves |
//! | Proofs | Build and verify one inclusion proof | < 100µs |

use attestation_relay::algorithms::{decode_hex, encode_event};
use attestation_relay::domain::MOCK_INSTRUCTION_SELECTOR;
use attestation_relay::{build_merkle_proof, compute_merkle_root, verify_merkle_proof, BufferClock, Hash};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

fn leaf_hashes(count: usize) -> Vec<Hash> {
    (0..count)
        .map(|i| {
            let mut hash = [0u8; 32];
            hash[..8].copy_from_slice(&(i as u64).to_be_bytes());
            hash
        })
        .collect()
}

fn bench_event_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay-collection");
    let clock = BufferClock::new(90, 0).unwrap_or_else(|e| panic!("clock: {}", e));
    let raw = encode_event(1_000_000, &MOCK_INSTRUCTION_SELECTOR, &[1; 32], &[2; 32]);
    let data = format!("0x{}", hex::encode(raw));

    group.bench_function("decode_hex_event", |b| {
        b.iter(|| black_box(decode_hex(black_box(&data), 1, &clock).is_ok()))
    });
    group.finish();
}

fn bench_merkle_root(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay-finalization");
    group.measurement_time(Duration::from_secs(5));

    for size in [16, 256, 1_000, 10_000] {
        let leaves = leaf_hashes(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("merkle_root", size), &leaves, |b, leaves| {
            b.iter(|| black_box(compute_merkle_root(leaves)))
        });
    }
    group.finish();
}

fn bench_merkle_proof(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay-proofs");
    let leaves = leaf_hashes(1_000);
    let root = compute_merkle_root(&leaves);

    group.bench_function("build_and_verify_proof", |b| {
        b.iter(|| {
            let proof = build_merkle_proof(&leaves, 517).unwrap_or_default();
            black_box(verify_merkle_proof(&leaves[517], &proof, &root))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_event_decoding, bench_merkle_root, bench_merkle_proof);
criterion_main!(benches);
