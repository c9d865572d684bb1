// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Order-statistic B+ tree benchmarks.
//!
//! Measures performance of:
//! - insert() - ordered insertion
//! - rank() - member-to-rank lookup
//! - range_by_rank() - rank-window scan
//!
//! ## Performance Targets
//! - insert: O(log n) per call, sub-microsecond at n = 10_000
//! - rank: O(log n) per call
//! - range_by_rank: O(log n + k) for a window of k results

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kvshard::bptree::{Key, OrderStatTree};

fn populated(n: u64) -> OrderStatTree {
    let mut tree = OrderStatTree::new(32);
    for i in 0..n {
        tree.insert(Key::new(i as f64, format!("member-{i}")));
    }
    tree
}

/// Benchmark insert() into trees of growing size.
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("bptree_insert");

    for n in [100u64, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter_batched(
                || populated(n),
                |mut tree| {
                    black_box(tree.insert(Key::new(n as f64 + 0.5, "new-member")));
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark rank() lookups against a fixed-size tree.
fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("bptree_rank");

    for n in [100u64, 1_000, 10_000].iter() {
        let tree = populated(*n);
        let probe = Key::new((n / 2) as f64, format!("member-{}", n / 2));
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, _| {
            b.iter(|| {
                black_box(tree.rank(&probe));
            });
        });
    }

    group.finish();
}

/// Benchmark range_by_rank() over a fixed window size.
fn bench_range_by_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("bptree_range_by_rank");

    for n in [100i64, 1_000, 10_000].iter() {
        let tree = populated(*n as u64);
        group.throughput(Throughput::Elements(10));
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter(|| {
                black_box(tree.range_by_rank(n / 2, n / 2 + 9));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_rank, bench_range_by_rank);
criterion_main!(benches);
