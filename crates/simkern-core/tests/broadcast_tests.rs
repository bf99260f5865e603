//! Integration tests for batch evaluation through the public API.

use std::sync::Arc;

use simkern_core::{
    BatchPolicy, CallOptions, CapabilityRegistry, Dtype, Engine, Error, MatrixRef, Metric,
    OutputDtype, Scalar, Values, VectorRef,
};

fn engine(parallel: bool) -> Engine {
    Engine::with_policy(
        Arc::new(CapabilityRegistry::detect()),
        BatchPolicy {
            parallel,
            parallel_threshold: 4,
            default_output: None,
        },
    )
}

fn rows(n: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut x = seed;
    (0..n * dim)
        .map(|_| {
            x = x.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            ((x >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
        })
        .collect()
}

#[test]
fn test_rowwise_matches_single_calls() {
    // Arrange
    let engine = engine(false);
    let (a, b) = (rows(10, 16, 1), rows(10, 16, 2));
    let ma = MatrixRef::new(&a, 10, 16).unwrap();
    let mb = MatrixRef::new(&b, 10, 16).unwrap();

    // Act
    let batch = engine.evaluate(Metric::Cosine, &ma, &mb, None).unwrap();

    // Assert
    assert_eq!(batch.shape(), &[10]);
    for i in 0..10 {
        let single = engine.compute(Metric::Cosine, ma.row(i), mb.row(i)).unwrap();
        assert_eq!(batch.get(i), Some(single));
    }
}

#[test]
fn test_broadcast_one_against_many() {
    let engine = engine(false);
    let many = rows(7, 8, 3);
    let one = rows(1, 8, 4);
    let m = MatrixRef::new(&many, 7, 8).unwrap();
    let q = MatrixRef::new(&one, 1, 8).unwrap();

    let left = engine.evaluate(Metric::SqEuclidean, &q, &m, None).unwrap();
    let right = engine.evaluate(Metric::SqEuclidean, &m, &q, None).unwrap();

    assert_eq!(left.shape(), &[7]);
    assert_eq!(left, right);
}

#[test]
fn test_incompatible_row_counts() {
    let engine = engine(false);
    let a = rows(3, 4, 5);
    let b = rows(2, 4, 6);

    let err = engine
        .evaluate(
            Metric::Inner,
            &MatrixRef::new(&a, 3, 4).unwrap(),
            &MatrixRef::new(&b, 2, 4).unwrap(),
            None,
        )
        .unwrap_err();

    assert_eq!(err, Error::BroadcastMismatch { left: 3, right: 2 });
}

#[test]
fn test_cdist_is_transposed_by_swapping_operands() {
    // Arrange
    let engine = engine(false);
    let (a, b) = (rows(5, 12, 7), rows(3, 12, 8));
    let ma = MatrixRef::new(&a, 5, 12).unwrap();
    let mb = MatrixRef::new(&b, 3, 12).unwrap();

    // Act
    let ab = engine.cdist(Metric::SqEuclidean, &ma, &mb, None).unwrap();
    let ba = engine.cdist(Metric::SqEuclidean, &mb, &ma, None).unwrap();

    // Assert
    assert_eq!(ab.shape(), &[5, 3]);
    assert_eq!(ba.shape(), &[3, 5]);
    for i in 0..5 {
        for j in 0..3 {
            assert_eq!(ab.at(i, j), ba.at(j, i));
        }
    }
}

#[test]
fn test_parallel_and_sequential_agree() {
    let (a, b) = (rows(300, 32, 9), rows(1, 32, 10));
    let ma = MatrixRef::new(&a, 300, 32).unwrap();
    let mb = MatrixRef::new(&b, 1, 32).unwrap();

    let sequential = engine(false).evaluate(Metric::Inner, &ma, &mb, None).unwrap();
    let parallel = engine(true).evaluate(Metric::Inner, &ma, &mb, None).unwrap();

    assert_eq!(sequential, parallel);
}

#[test]
fn test_output_cast_to_u8() {
    // Arrange - hamming distances of packed bytes fit in u8
    let engine = engine(false);
    let a = [0xFF_u8, 0x00, 0x0F, 0xF0];
    let b = [0x00_u8, 0x00, 0x00, 0x00];
    let ma = MatrixRef::new(VectorRef::bits(&a), 2, 2).unwrap();
    let mb = MatrixRef::new(VectorRef::bits(&b), 2, 2).unwrap();

    // Act
    let result = engine
        .evaluate(Metric::Hamming, &ma, &mb, Some(OutputDtype::U8))
        .unwrap();

    // Assert
    assert_eq!(result.values(), &Values::U8(vec![8, 8]));
}

#[test]
fn test_output_cast_overflow_is_reported() {
    let engine = engine(false);
    let a = vec![0xFF_u8; 64];
    let b = vec![0x00_u8; 64];

    let err = engine
        .evaluate(
            Metric::Hamming,
            &MatrixRef::from_vector(VectorRef::bits(&a)),
            &MatrixRef::from_vector(VectorRef::bits(&b)),
            Some(OutputDtype::I8),
        )
        .unwrap_err();

    assert!(matches!(err, Error::Overflow(_)));
}

#[test]
fn test_complex_rows_via_dtype_override() {
    // Arrange - each row holds two complex numbers as four reals
    let engine = engine(false);
    let a = [1.0_f64, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 2.0];
    let b = [1.0_f64, 0.0, 0.0, 1.0];
    let ma = MatrixRef::new(&a[..], 2, 4).unwrap();
    let mb = MatrixRef::new(&b[..], 1, 4).unwrap();

    // Act
    let result = engine
        .evaluate_with(
            Metric::VDot,
            &ma,
            &mb,
            CallOptions::default().dtype(Dtype::Complex128),
        )
        .unwrap();

    // Assert - conj(1)·1 + conj(i)·i = 2, doubled for the second row
    assert_eq!(result.dtype(), OutputDtype::Complex128);
    assert_eq!(result.get(0), Some(Scalar::Complex { re: 2.0, im: 0.0 }));
    assert_eq!(result.get(1), Some(Scalar::Complex { re: 4.0, im: 0.0 }));
}

#[test]
fn test_empty_batch() {
    let engine = engine(false);
    let empty: [f64; 0] = [];
    let m = MatrixRef::new(&empty[..], 0, 3).unwrap();

    let result = engine.evaluate(Metric::Inner, &m, &m, None).unwrap();

    assert_eq!(result.shape(), &[0]);
    assert!(result.is_empty());
}
