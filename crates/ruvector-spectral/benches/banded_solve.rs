//! Benchmarks for the banded direct solvers.
//!
//! Each specialised sweep is measured against the generic sparse LU on the
//! same matrix, for a single vector and for a batch of lanes along one axis
//! of a 2-D array.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ruvector_spectral::banded::BandedMatrix;
use ruvector_spectral::config::MatvecFormat;
use ruvector_spectral::direct::DirectSolver;
use ruvector_spectral::types::{Diagonal, SolverKind};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Strictly diagonally dominant matrix with the given offsets.
///
/// Symmetric patterns mirror their upper diagonals so the LDL^T sweeps
/// apply.
fn dominant_matrix(offsets: &[isize], symmetric: bool, n: usize, seed: u64) -> BandedMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut diagonals: Vec<(isize, Diagonal)> = Vec::new();
    for &k in offsets.iter().filter(|&&k| k > 0) {
        let values: Vec<f64> = (0..n - k as usize).map(|_| rng.gen_range(-0.4..0.4)).collect();
        if symmetric {
            diagonals.push((-k, Diagonal::Values(values.clone())));
        }
        diagonals.push((k, Diagonal::Values(values)));
    }
    if !symmetric {
        for &k in offsets.iter().filter(|&&k| k < 0) {
            let values = (0..n - k.unsigned_abs()).map(|_| rng.gen_range(-0.4..0.4)).collect();
            diagonals.push((k, Diagonal::Values(values)));
        }
    }
    let main = (0..n).map(|_| rng.gen_range(3.0..4.0)).collect();
    diagonals.push((0, Diagonal::Values(main)));
    // Offsets come from a fixed table and the shape is square.
    BandedMatrix::new(diagonals, (n, n)).unwrap_or_else(|e| panic!("invalid pattern: {e}"))
}

fn random_vector(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn patterns() -> Vec<(&'static str, Vec<isize>, bool)> {
    vec![
        ("twodma", vec![0, 2], false),
        ("tdma", vec![-2, 0, 2], false),
        ("tdma_odd", vec![1], true),
        ("pdma", vec![2, 4], true),
        ("fdma", vec![-2, 0, 2, 4], false),
    ]
}

// ---------------------------------------------------------------------------
// Benchmark: specialised sweep vs generic LU
// ---------------------------------------------------------------------------

fn specialised_vs_generic(c: &mut Criterion) {
    let mut group = c.benchmark_group("specialised_vs_generic");
    group.warm_up_time(Duration::from_secs(2));
    group.sample_size(100);

    for &n in &[256, 4096] {
        for (name, offsets, symmetric) in patterns() {
            let matrix = dominant_matrix(&offsets, symmetric, n, 42);
            let rhs = random_vector(n, 43);
            let fast = DirectSolver::new(&matrix).unwrap_or_else(|e| panic!("{name}: {e}"));
            let generic = DirectSolver::with_kind(&matrix, SolverKind::Generic)
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            group.throughput(Throughput::Elements(n as u64));

            group.bench_with_input(BenchmarkId::new(format!("{name}/{}", fast.kind()), n), &n, |b, _| {
                b.iter(|| fast.solve_vec(criterion::black_box(&rhs), &[]))
            });
            group.bench_with_input(BenchmarkId::new(format!("{name}/generic"), n), &n, |b, _| {
                b.iter(|| generic.solve_vec(criterion::black_box(&rhs), &[]))
            });
        }
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: batched lanes
// ---------------------------------------------------------------------------

fn batched_lanes(c: &mut Criterion) {
    let mut group = c.benchmark_group("batched_lanes");
    group.warm_up_time(Duration::from_secs(2));
    group.sample_size(50);

    let n = 512;
    let matrix = dominant_matrix(&[-2, 0, 2], false, n, 7);
    for &lanes in &[16, 256] {
        for axis in 0..2 {
            let mut shape = vec![lanes, lanes];
            shape[axis] = n;
            let values = random_vector(shape[0] * shape[1], 8);
            let b = ArrayD::from_shape_vec(IxDyn(&shape), values)
                .unwrap_or_else(|e| panic!("bad shape: {e}"));
            group.throughput(Throughput::Elements((n * lanes) as u64));

            group.bench_with_input(
                BenchmarkId::new(format!("solve/axis{axis}"), lanes),
                &lanes,
                |bench, _| bench.iter(|| matrix.solve(criterion::black_box(&b.view()), axis, &[])),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("matvec/axis{axis}"), lanes),
                &lanes,
                |bench, _| {
                    bench.iter(|| {
                        matrix.apply(criterion::black_box(&b.view()), axis, MatvecFormat::Vectorized)
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(banded, specialised_vs_generic, batched_lanes);
criterion_main!(banded);
