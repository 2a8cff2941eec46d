//! Archive mutation benchmarks
//!
//! Full noisy-base rewrite (decode, perturb, encode, stage, commit) per
//! archive codec.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use posesweep::archive::{ArchiveMutator, Codec, FeatureArchive, FeatureEntry};
use posesweep::base::{Base, NoisyBase};
use posesweep::noise::NoiseModel;
use posesweep::pose::{ParameterPoint, PoseEstimate};

/// Two bases of `archives` archives with `entries` entries of 512-byte payloads.
#[allow(clippy::cast_precision_loss)]
fn create_bases(codec: Codec, archives: usize, entries: usize) -> (tempfile::TempDir, Base, NoisyBase) {
    let dir = tempfile::tempdir().unwrap();
    let entries: Vec<FeatureEntry> = (0..entries)
        .map(|i| {
            let x = i as f64 * 0.01;
            FeatureEntry::new(
                PoseEstimate::new([x, x, 1.0], [0.0, 0.1, x]),
                (0..512).map(|j| ((i + j) % 251) as u8).collect::<Vec<u8>>(),
            )
        })
        .collect();
    let archive = FeatureArchive::build(codec, &entries).unwrap();
    for base in ["original", "noisy"] {
        std::fs::create_dir_all(dir.path().join(base)).unwrap();
        for a in 0..archives {
            archive.write(dir.path().join(base).join(format!("obj{a}.farc"))).unwrap();
        }
    }
    let original = Base::open(dir.path().join("original")).unwrap();
    let noisy = NoisyBase::new(Base::open(dir.path().join("noisy")).unwrap());
    (dir, original, noisy)
}

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive_mutation");
    group.sample_size(20);
    let point = ParameterPoint::new(0.01, 0.05).unwrap();

    for codec in [Codec::None, Codec::Lz4, Codec::Zstd] {
        let (_dir, original, mut noisy) = create_bases(codec, 8, 500);
        let mutator = ArchiveMutator::new();
        group.bench_function(BenchmarkId::from_parameter(codec.as_str()), |b| {
            b.iter(|| {
                mutator
                    .apply(&original, &mut noisy, point, &mut NoiseModel::seeded(7))
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_apply);
criterion_main!(benches);
