//! Benchmarks for backup-indexer
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn benchmark_stats_batch_add(c: &mut Criterion) {
    use backup_indexer::stats::RunningStats;

    let batch: Vec<f64> = (0..4096).map(|i| (i as f64).sin()).collect();

    c.bench_function("stats_add_slice_4096", |b| {
        b.iter(|| {
            let stats = RunningStats::new();
            stats.add_slice(black_box(&batch)).unwrap();
            black_box(stats.mean());
        })
    });

    c.bench_function("stats_variance_recompute", |b| {
        let stats = RunningStats::new();
        stats.add_slice(&batch).unwrap();
        b.iter(|| {
            // Invalidate the cache, then force a recompute
            stats.add(black_box(0.5)).unwrap();
            black_box(stats.variance());
        })
    });
}

fn benchmark_streaming_hashes(c: &mut Criterion) {
    use backup_indexer::cancel::CancelToken;
    use backup_indexer::hash::{crc32_reader, xxh64_reader, BufferPool};

    let content: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
    let pool = BufferPool::default();
    let cancel = CancelToken::new();

    c.bench_function("crc32_1mb", |b| {
        b.iter(|| {
            let digest = crc32_reader(&mut black_box(content.as_slice()), &pool, &cancel).unwrap();
            black_box(digest);
        })
    });

    c.bench_function("xxh64_1mb", |b| {
        b.iter(|| {
            let digest = xxh64_reader(&mut black_box(content.as_slice()), &pool, &cancel).unwrap();
            black_box(digest);
        })
    });
}

criterion_group!(benches, benchmark_stats_batch_add, benchmark_streaming_hashes);
criterion_main!(benches);
