// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Count-min sketch benchmarks.
//!
//! Measures performance of:
//! - incr_by() - d atomic CAS loops per call
//! - query() - d atomic loads per item
//!
//! ## Performance Targets
//! - incr_by: O(depth) atomic operations per call, no allocation
//! - query: O(depth) atomic loads per item, linear in item count

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kvshard::cms::CountMinSketch;

fn sized(width: u32, depth: u32) -> CountMinSketch {
    CountMinSketch::by_dim(width, depth).unwrap()
}

/// Benchmark incr_by() across growing sketch dimensions.
fn bench_incr_by(c: &mut Criterion) {
    let mut group = c.benchmark_group("cms_incr_by");

    for depth in [3u32, 5, 7].iter() {
        let sketch = sized(2048, *depth);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, _| {
            b.iter(|| {
                black_box(sketch.incr_by("hot-key", 1));
            });
        });
    }

    group.finish();
}

/// Benchmark query() over a batch of items.
fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("cms_query");

    for item_count in [10usize, 100, 1_000].iter() {
        let sketch = sized(2048, 5);
        let items: Vec<String> = (0..*item_count).map(|i| format!("item-{i}")).collect();
        for item in &items {
            sketch.incr_by(item, 1);
        }

        group.throughput(Throughput::Elements(*item_count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(item_count), item_count, |b, _| {
            b.iter(|| {
                black_box(sketch.query(&items));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_incr_by, bench_query);
criterion_main!(benches);
