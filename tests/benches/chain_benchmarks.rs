//! # Forge-Chain Hot Path Benchmarks
//!
//! | Path | Why it matters |
//! |------|----------------|
//! | fc-01 compact codec | Called per target conversion |
//! | fc-01 validate | Runs for every received block |
//! | fc-03 insert_batch | Sync import throughput |
//! | fc-03 balance_of | Linear walk from head to genesis |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fc_01_proof_of_work::{compact, expand};
use fc_03_blockchain::test_utils::{build_branch, key_hash, test_chain, test_pow};
use primitive_types::U256;
use std::time::Duration;

fn bench_compact_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("fc-01-compact");
    let target = U256::one() << 240;
    let bits = compact(target);

    group.bench_function("compact", |b| b.iter(|| compact(black_box(target))));
    group.bench_function("expand", |b| b.iter(|| expand(black_box(bits))));
    group.finish();
}

fn bench_pow_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("fc-01-proof-of-work");
    let (chain, _bus) = test_chain();
    let blocks = build_branch(&chain, chain.head_hash(), 1, key_hash(1));
    let pow = test_pow();

    group.bench_function("validate", |b| b.iter(|| pow.validate(black_box(&blocks[0]))));
    group.finish();
}

fn bench_insert_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("fc-03-insert-batch");
    group.measurement_time(Duration::from_secs(10));

    for size in [16usize, 64, 256] {
        let (source, _bus) = test_chain();
        let blocks = build_branch(&source, source.head_hash(), size, key_hash(1));

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &blocks, |b, blocks| {
            b.iter_batched(
                || (test_chain().0, blocks.clone()),
                |(chain, blocks)| chain.insert_batch(blocks).unwrap(),
                criterion::BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_balance_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("fc-03-balance-of");

    for length in [100usize, 1000] {
        let (chain, _bus) = test_chain();
        let blocks = build_branch(&chain, chain.head_hash(), length, key_hash(1));
        chain.insert_batch(blocks).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(length), &chain, |b, chain| {
            b.iter(|| chain.balance_of(black_box(&key_hash(1))).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_compact_codec,
    bench_pow_validate,
    bench_insert_batch,
    bench_balance_scan
);
criterion_main!(benches);
