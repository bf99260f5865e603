//! Benchmark: single-pair kernels per dtype and tier.
//!
//! Run with: `cargo bench --bench kernels_benchmark`

#![allow(clippy::cast_precision_loss)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};
use simkern_core::{
    bf16, f16, CapabilityRegistry, CapabilitySet, Engine, Metric, VectorRef,
};

const DIMS: [usize; 3] = [128, 768, 1536];

fn random_f32(dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Best detected tier and the portable baseline.
fn engines() -> Vec<(&'static str, Engine)> {
    vec![
        ("best", Engine::new(Arc::new(CapabilityRegistry::detect()))),
        (
            "serial",
            Engine::new(Arc::new(CapabilityRegistry::with_supported(
                CapabilitySet::baseline(),
            ))),
        ),
    ]
}

fn bench_dense(c: &mut Criterion) {
    let mut group = c.benchmark_group("dense");

    for dim in DIMS {
        let a32 = random_f32(dim, 1);
        let b32 = random_f32(dim, 2);
        let a64: Vec<f64> = a32.iter().map(|&x| f64::from(x)).collect();
        let b64: Vec<f64> = b32.iter().map(|&x| f64::from(x)).collect();
        let a16: Vec<f16> = a32.iter().map(|&x| f16::from_f32(x)).collect();
        let b16: Vec<f16> = b32.iter().map(|&x| f16::from_f32(x)).collect();
        let abf: Vec<bf16> = a32.iter().map(|&x| bf16::from_f32(x)).collect();
        let bbf: Vec<bf16> = b32.iter().map(|&x| bf16::from_f32(x)).collect();
        let ai8: Vec<i8> = a32.iter().map(|&x| (x * 127.0) as i8).collect();
        let bi8: Vec<i8> = b32.iter().map(|&x| (x * 127.0) as i8).collect();

        let operands: [(&str, VectorRef<'_>, VectorRef<'_>); 5] = [
            ("f64", (&a64).into(), (&b64).into()),
            ("f32", (&a32).into(), (&b32).into()),
            ("f16", (&a16).into(), (&b16).into()),
            ("bf16", (&abf).into(), (&bbf).into()),
            ("i8", (&ai8).into(), (&bi8).into()),
        ];

        group.throughput(Throughput::Elements(dim as u64));
        for (tier, engine) in engines() {
            for metric in [Metric::Inner, Metric::SqEuclidean, Metric::Cosine] {
                for (dtype, a, b) in operands {
                    let kernel = engine.resolve(metric, a.dtype()).expect("implemented");
                    group.bench_with_input(
                        BenchmarkId::new(format!("{metric}/{dtype}/{tier}"), dim),
                        &(a, b),
                        |bench, &(a, b)| {
                            bench.iter(|| black_box(kernel.call(black_box(a), black_box(b))));
                        },
                    );
                }
            }
        }
    }

    group.finish();
}

fn bench_binary(c: &mut Criterion) {
    let mut group = c.benchmark_group("binary");
    let mut rng = StdRng::seed_from_u64(3);

    for bytes in [32_usize, 128, 1024] {
        let a: Vec<u8> = (0..bytes).map(|_| rng.gen()).collect();
        let b: Vec<u8> = (0..bytes).map(|_| rng.gen()).collect();
        group.throughput(Throughput::Bytes(bytes as u64));
        for (tier, engine) in engines() {
            for metric in [Metric::Hamming, Metric::Jaccard] {
                group.bench_function(BenchmarkId::new(format!("{metric}/{tier}"), bytes), |bench| {
                    bench.iter(|| {
                        engine.compute(metric, VectorRef::bits(black_box(&a)), VectorRef::bits(black_box(&b)))
                    });
                });
            }
        }
    }

    group.finish();
}

fn bench_intersect(c: &mut Criterion) {
    let mut group = c.benchmark_group("intersect");
    let engine = Engine::global();

    // Balanced sizes use the merge, skewed sizes the galloping search.
    for (short, long) in [(1024_u32, 1024_u32), (64, 4096)] {
        let a: Vec<u32> = (0..short).map(|i| i * 3).collect();
        let b: Vec<u32> = (0..long).map(|i| i * 2).collect();
        group.bench_function(format!("u32/{short}x{long}"), |bench| {
            bench.iter(|| engine.compute(Metric::Intersect, black_box(&a).into(), black_box(&b).into()));
        });
    }

    group.finish();
}

fn bench_curved(c: &mut Criterion) {
    let mut group = c.benchmark_group("curved");
    let engine = Engine::global();

    for dim in [16_usize, 64, 256] {
        let a: Vec<f64> = random_f32(dim, 4).into_iter().map(f64::from).collect();
        let b: Vec<f64> = random_f32(dim, 5).into_iter().map(f64::from).collect();
        let mut identity = vec![0.0_f64; dim * dim];
        for i in 0..dim {
            identity[i * dim + i] = 1.0;
        }
        for metric in [Metric::Bilinear, Metric::Mahalanobis] {
            group.bench_function(BenchmarkId::new(metric.name(), dim), |bench| {
                bench.iter(|| {
                    engine.compute_curved(
                        metric,
                        black_box(&a).into(),
                        black_box(&b).into(),
                        black_box(&identity).into(),
                    )
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_dense, bench_binary, bench_intersect, bench_curved);
criterion_main!(benches);
