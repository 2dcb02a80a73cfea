use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use genic::SparseArray;

const N: u32 = 1024;
const NEIGHBORS: u32 = 24;

fn build(n: u32, neighbors: u32) -> SparseArray {
    let mut sa = SparseArray::new(n, n);
    for row in 0..n {
        for k in 0..neighbors {
            let column = (row + k * 7 + 1) % n;
            sa.add_entry_interaction(row, column, (k + 1) as f32, 1.0 / (k + 1) as f32);
        }
    }
    sa.finish();
    sa
}

fn bench_build(c: &mut Criterion) {
    c.bench_function("sparse_build_1024x24", |b| {
        b.iter(|| build(black_box(N), black_box(NEIGHBORS)))
    });
}

fn bench_query(c: &mut Criterion) {
    let sa = build(N, NEIGHBORS);
    c.bench_function("sparse_point_queries", |b| {
        b.iter(|| {
            let mut total = 0.0f32;
            for row in 0..N {
                total += sa.strength(black_box(row), black_box((row + 8) % N));
            }
            total
        })
    });
    c.bench_function("sparse_row_scans", |b| {
        b.iter(|| {
            let mut total = 0.0f32;
            for row in 0..N {
                let (_, distances) = sa.distances_for_row(black_box(row));
                total += distances.iter().sum::<f32>();
            }
            total
        })
    });
}

criterion_group!(benches, bench_build, bench_query);
criterion_main!(benches);
