//! Pruned versus exhaustive traversal

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dualtree::{
    DualTreeEngine, EngineConfig, KdTree, KernelSum, KernelSumParam, NearestNeighbor,
    NearestNeighborParam, RangeCount, RangeCountParam,
};

fn clustered(n: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut state = seed;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };
    (0..n)
        .map(|i| {
            let center = (i % 8) as f64 * 10.0;
            vec![center + next(), center * 0.5 + next()]
        })
        .collect()
}

fn benchmark_nearest(c: &mut Criterion) {
    let mut group = c.benchmark_group("nearest_neighbor");
    for n in [500usize, 2000] {
        let mut points = clustered(n, 7);
        let tree = KdTree::build(&mut points, 16).expect("tree builds");
        let param = NearestNeighborParam::new().with_leave_one_out(true);

        for (label, naive) in [("pruned", false), ("naive", true)] {
            let config = EngineConfig::new().with_leave_one_out(true).with_naive(naive);
            let engine = DualTreeEngine::<NearestNeighbor>::new(param.clone(), config);
            group.bench_with_input(BenchmarkId::new(label, n), &n, |b, _| {
                b.iter(|| {
                    let output = engine
                        .run_trees(&tree, &points, &tree, &points)
                        .expect("traversal succeeds");
                    black_box(output.global.total_distance);
                });
            });
        }
    }
    group.finish();
}

fn benchmark_range_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_count");
    let mut points = clustered(2000, 11);
    let tree = KdTree::build(&mut points, 16).expect("tree builds");

    for radius in [0.25, 2.0] {
        let param = RangeCountParam::new(radius).expect("valid radius");
        let engine = DualTreeEngine::<RangeCount>::new(param, EngineConfig::new());
        group.bench_with_input(BenchmarkId::new("pruned", radius), &radius, |b, _| {
            b.iter(|| {
                let output = engine
                    .run_trees(&tree, &points, &tree, &points)
                    .expect("traversal succeeds");
                black_box(output.global.total_neighbors);
            });
        });
    }
    group.finish();
}

fn benchmark_kernel_sum(c: &mut Criterion) {
    let mut points = clustered(2000, 3);
    let tree = KdTree::build(&mut points, 16).expect("tree builds");
    let param = KernelSumParam::new(0.5, 0.01, points.len()).expect("valid kernel");
    let engine = DualTreeEngine::<KernelSum>::new(param, EngineConfig::new());

    c.bench_function("kde_2000_eps_0.01", |b| {
        b.iter(|| {
            let output = engine
                .run_trees(&tree, &points, &tree, &points)
                .expect("traversal succeeds");
            black_box(output.global.total_density);
        });
    });
}

criterion_group!(benches, benchmark_nearest, benchmark_range_count, benchmark_kernel_sum);
criterion_main!(benches);
