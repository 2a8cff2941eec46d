//! Noise injection benchmarks
//!
//! Per-pose cost of the Gaussian perturbation, including the exact-identity
//! fast path at zero noise.
//!
//! Toyota Way: Measure before optimizing (Genchi Genbutsu)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use posesweep::noise::NoiseModel;
use posesweep::pose::{ParameterPoint, PoseEstimate};

#[allow(clippy::cast_precision_loss)]
fn poses(n: usize) -> Vec<PoseEstimate> {
    (0..n)
        .map(|i| {
            let x = i as f64 * 1e-3;
            PoseEstimate::new([x, 0.5 - x, 1.0 + x], [0.1, x, -x])
        })
        .collect()
}

fn bench_perturb(c: &mut Criterion) {
    let mut group = c.benchmark_group("perturb");
    let input = poses(10_000);
    group.throughput(Throughput::Elements(input.len() as u64));

    for (label, t, r) in [("zero", 0.0, 0.0), ("translation", 0.01, 0.0), ("both", 0.01, 0.05)] {
        let point = ParameterPoint::new(t, r).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(label), &point, |b, &point| {
            let mut noise = NoiseModel::seeded(42);
            b.iter(|| {
                for pose in &input {
                    black_box(noise.perturb(black_box(pose), point).unwrap());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_perturb);
criterion_main!(benches);
