//! Benchmarks for mounting and reconciling keyed lists.
//!
//! Run with:
//! `cargo bench -p trellis-harness --bench reconcile_bench`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use trellis_harness::Harness;
use trellis_reconciler::{Node, host, text};

const SIZES: [usize; 2] = [100, 1_000];

/// Deterministic Fisher-Yates shuffle driven by a simple LCG.
fn shuffled(size: usize, seed: u64) -> Vec<usize> {
    let mut state = seed;
    let mut order: Vec<usize> = (0..size).collect();
    for i in (1..size).rev() {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1);
        let j = (state >> 33) as usize % (i + 1);
        order.swap(i, j);
    }
    order
}

fn list(order: &[usize], suffix: &str) -> Node {
    host("ul")
        .children(order.iter().map(|i| {
            host("li")
                .key(i.to_string())
                .attr("index", *i as i64)
                .child(text(format!("item {i}{suffix}")))
        }))
        .build()
}

fn bench_mount(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile/mount");
    for size in SIZES {
        let order: Vec<usize> = (0..size).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &order, |b, order| {
            b.iter(|| {
                let harness = Harness::new();
                black_box(harness.render(list(order, "")));
            });
        });
    }
    group.finish();
}

fn bench_keyed_shuffle(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile/keyed_shuffle");
    for size in SIZES {
        let orders = [shuffled(size, 7), shuffled(size, 11)];
        let harness = Harness::new();
        harness.render(list(&orders[0], ""));
        let mut turn = 0usize;

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| {
                turn += 1;
                let order = &orders[turn % 2];
                black_box(harness.render(list(order, "")));
                harness.take_ops();
            });
        });
    }
    group.finish();
}

fn bench_text_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile/text_update");
    for size in SIZES {
        let order: Vec<usize> = (0..size).collect();
        let harness = Harness::new();
        harness.render(list(&order, ""));
        let mut tick = 0u64;

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| {
                tick += 1;
                black_box(harness.render(list(&order, &format!(" #{tick}"))));
                harness.take_ops();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_mount, bench_keyed_shuffle, bench_text_update);
criterion_main!(benches);
