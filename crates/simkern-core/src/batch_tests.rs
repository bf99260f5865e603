//! Tests for `batch` module - broadcast rules, output selection and policies.

use super::batch::*;
use super::capability::CapabilitySet;
use super::config::BatchConfig;
use super::dispatch::{Kernel, ResolvedTable};
use super::dtype::{Dtype, OutputDtype};
use super::error::Error;
use super::metric::Metric;
use super::output::{Scalar, Values};
use super::vector::{MatrixRef, VectorRef};

fn kernel(metric: Metric, dtype: Dtype) -> Kernel {
    ResolvedTable::build(CapabilitySet::baseline())
        .resolve(metric, dtype)
        .unwrap()
}

fn sequential() -> BatchPolicy {
    BatchPolicy {
        parallel: false,
        ..BatchPolicy::default()
    }
}

// =========================================================================
// BroadcastShape
// =========================================================================

#[test]
fn test_broadcast_rules() {
    let same = BroadcastShape::resolve(4, 4).unwrap();
    assert_eq!(same.rows(), 4);
    assert_eq!(same.pair(3), (3, 3));

    let right = BroadcastShape::resolve(4, 1).unwrap();
    assert_eq!(right.rows(), 4);
    assert_eq!(right.pair(2), (2, 0));

    let left = BroadcastShape::resolve(1, 5).unwrap();
    assert_eq!(left.rows(), 5);
    assert_eq!(left.pair(4), (0, 4));
}

#[test]
fn test_broadcast_mismatch() {
    let err = BroadcastShape::resolve(3, 2).unwrap_err();
    assert_eq!(err, Error::BroadcastMismatch { left: 3, right: 2 });
}

#[test]
fn test_broadcast_empty_rows() {
    assert_eq!(BroadcastShape::resolve(0, 0).unwrap().rows(), 0);
    assert_eq!(BroadcastShape::resolve(0, 1).unwrap().rows(), 0);
}

// =========================================================================
// Policy
// =========================================================================

#[test]
fn test_policy_from_config() {
    // Arrange
    let config = BatchConfig {
        parallel: false,
        parallel_threshold: 0,
        default_output: Some("f32".to_string()),
    };

    // Act
    let policy = BatchPolicy::from_config(&config).unwrap();

    // Assert
    assert!(!policy.parallel);
    assert_eq!(policy.parallel_threshold, 1);
    assert_eq!(policy.default_output, Some(OutputDtype::F32));
}

#[test]
fn test_policy_rejects_unknown_output() {
    let config = BatchConfig {
        default_output: Some("f8".to_string()),
        ..BatchConfig::default()
    };

    let err = BatchPolicy::from_config(&config).unwrap_err();

    // Same parser and message as config validation
    assert!(matches!(&err, Error::Config(msg) if msg.contains("batch.default_output")));
    assert_eq!(err.code(), "SIMK-009");
}

// =========================================================================
// evaluate
// =========================================================================

#[test]
fn test_two_vectors_give_scalar_shape() {
    let a = [1.0_f64, 2.0];
    let b = [1.0_f64, 4.0];

    let result = evaluate(
        &sequential(),
        &kernel(Metric::SqEuclidean, Dtype::F64),
        &MatrixRef::from_vector(&a[..]),
        &MatrixRef::from_vector(&b[..]),
        None,
    )
    .unwrap();

    assert!(result.shape().is_empty());
    assert_eq!(result.values(), &Values::F64(vec![4.0]));
}

#[test]
fn test_rowwise_and_broadcast() {
    // Arrange - three rows of A against one query row
    let rows = [0.0_f32, 0.0, 1.0, 0.0, 0.0, 2.0];
    let query = [0.0_f32, 0.0];
    let a = MatrixRef::new(&rows[..], 3, 2).unwrap();
    let b = MatrixRef::from_vector(&query[..]);
    let k = kernel(Metric::SqEuclidean, Dtype::F32);

    // Act
    let forward = evaluate(&sequential(), &k, &a, &b, None).unwrap();
    let backward = evaluate(&sequential(), &k, &b, &a, None).unwrap();

    // Assert
    assert_eq!(forward.shape(), &[3]);
    assert_eq!(forward.to_f64_vec().unwrap(), vec![0.0, 1.0, 4.0]);
    assert_eq!(backward.to_f64_vec().unwrap(), vec![0.0, 1.0, 4.0]);
}

#[test]
fn test_row_count_mismatch() {
    let data = [0.0_f64; 6];
    let a = MatrixRef::new(&data[..], 3, 2).unwrap();
    let b = MatrixRef::new(&data[..4], 2, 2).unwrap();

    let err = evaluate(&sequential(), &kernel(Metric::Inner, Dtype::F64), &a, &b, None)
        .unwrap_err();

    assert!(matches!(err, Error::BroadcastMismatch { left: 3, right: 2 }));
}

#[test]
fn test_column_mismatch() {
    let data = [0.0_f64; 6];
    let a = MatrixRef::new(&data[..], 2, 3).unwrap();
    let b = MatrixRef::new(&data[..], 3, 2).unwrap();

    let err = evaluate(&sequential(), &kernel(Metric::Inner, Dtype::F64), &a, &b, None)
        .unwrap_err();

    assert_eq!(
        err,
        Error::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    );
}

#[test]
fn test_operand_dtype_mismatch() {
    let a = [1.0_f64];
    let b = [1.0_f32];

    let err = evaluate(
        &sequential(),
        &kernel(Metric::Inner, Dtype::F64),
        &MatrixRef::from_vector(&a[..]),
        &MatrixRef::from_vector(&b[..]),
        None,
    )
    .unwrap_err();

    assert!(matches!(err, Error::UnsupportedDtype(_)));
}

#[test]
fn test_first_kernel_error_propagates() {
    // Arrange - second row has q = 0 where p > 0
    let p = [0.5_f64, 0.5, 1.0, 0.0];
    let q = [0.5_f64, 0.5, 0.0, 1.0];
    let a = MatrixRef::new(&p[..], 2, 2).unwrap();
    let b = MatrixRef::new(&q[..], 2, 2).unwrap();

    // Act
    let err = evaluate(
        &sequential(),
        &kernel(Metric::KullbackLeibler, Dtype::F64),
        &a,
        &b,
        None,
    )
    .unwrap_err();

    // Assert
    assert!(matches!(err, Error::NumericalDomain(_)));
}

#[test]
fn test_intersect_rows_need_not_share_length() {
    let a = [1_u32, 2, 3];
    let b = [2_u32, 3, 4, 5, 6];

    let result = evaluate(
        &sequential(),
        &kernel(Metric::Intersect, Dtype::U32),
        &MatrixRef::from_vector(&a[..]),
        &MatrixRef::from_vector(&b[..]),
        None,
    )
    .unwrap();

    assert_eq!(result.get(0), Some(Scalar::Real(2.0)));
}

#[test]
fn test_curved_metric_needs_weight_matrix() {
    let a = [1.0_f64, 2.0];

    let err = evaluate(
        &sequential(),
        &kernel(Metric::Mahalanobis, Dtype::F64),
        &MatrixRef::from_vector(&a[..]),
        &MatrixRef::from_vector(&a[..]),
        None,
    )
    .unwrap_err();

    assert!(matches!(err, Error::InvalidShape(_)));
}

// =========================================================================
// Output dtype selection
// =========================================================================

#[test]
fn test_requested_output_wins() {
    let a = [1_i8, 2, 3];
    let m = MatrixRef::from_vector(&a[..]);

    let result = evaluate(
        &sequential(),
        &kernel(Metric::Inner, Dtype::I8),
        &m,
        &m,
        Some(OutputDtype::I32),
    )
    .unwrap();

    assert_eq!(result.values(), &Values::I32(vec![14]));
}

#[test]
fn test_default_output_applies_to_real_metrics_only() {
    // Arrange
    let policy = BatchPolicy {
        default_output: Some(OutputDtype::F32),
        ..sequential()
    };
    let reals = [1.0_f64, 2.0];
    let r = MatrixRef::from_vector(&reals[..]);
    let complex = VectorRef::complex128(&reals).unwrap();
    let c = MatrixRef::from_vector(complex);

    // Act
    let real_result = evaluate(&policy, &kernel(Metric::Inner, Dtype::F64), &r, &r, None).unwrap();
    let complex_result =
        evaluate(&policy, &kernel(Metric::Dot, Dtype::Complex128), &c, &c, None).unwrap();

    // Assert
    assert_eq!(real_result.dtype(), OutputDtype::F32);
    assert_eq!(complex_result.dtype(), OutputDtype::Complex128);
    // (1 + 2i)² = -3 + 4i
    assert_eq!(complex_result.get(0), Some(Scalar::Complex { re: -3.0, im: 4.0 }));
}

// =========================================================================
// evaluate_curved
// =========================================================================

#[test]
fn test_evaluate_curved_shares_matrix() {
    let rows = [1.0_f64, 0.0, 0.0, 1.0];
    let a = MatrixRef::new(&rows[..], 2, 2).unwrap();
    let origin = [0.0_f64, 0.0];
    let b = MatrixRef::from_vector(&origin[..]);
    let m = [4.0_f64, 0.0, 0.0, 9.0];

    let result = evaluate_curved(
        &sequential(),
        &kernel(Metric::Mahalanobis, Dtype::F64),
        &a,
        &b,
        (&m[..]).into(),
        None,
    )
    .unwrap();

    assert_eq!(result.to_f64_vec().unwrap(), vec![2.0, 3.0]);
}

// =========================================================================
// cdist
// =========================================================================

#[test]
fn test_cdist_shape_and_order() {
    // Arrange
    let a = [0.0_f64, 1.0, 2.0];
    let b = [0.0_f64, 10.0];
    let ma = MatrixRef::new(&a[..], 3, 1).unwrap();
    let mb = MatrixRef::new(&b[..], 2, 1).unwrap();

    // Act
    let result = cdist(
        &sequential(),
        &kernel(Metric::SqEuclidean, Dtype::F64),
        &ma,
        &mb,
        None,
    )
    .unwrap();

    // Assert
    assert_eq!(result.shape(), &[3, 2]);
    assert_eq!(result.at(2, 0), Some(Scalar::Real(4.0)));
    assert_eq!(result.at(1, 1), Some(Scalar::Real(81.0)));
    assert_eq!(
        result.to_f64_vec().unwrap(),
        vec![0.0, 100.0, 1.0, 81.0, 4.0, 64.0]
    );
}

#[test]
fn test_parallel_matches_sequential() {
    // Arrange - enough calls to cross a threshold of 1
    let data: Vec<f32> = (0..64 * 8).map(|i| (i % 13) as f32 * 0.25).collect();
    let a = MatrixRef::new(&data, 64, 8).unwrap();
    let parallel = BatchPolicy {
        parallel: true,
        parallel_threshold: 1,
        default_output: None,
    };
    let k = kernel(Metric::Cosine, Dtype::F32);

    // Act
    let expected = cdist(&sequential(), &k, &a, &a, None).unwrap();
    let actual = cdist(&parallel, &k, &a, &a, None).unwrap();

    // Assert
    assert_eq!(actual, expected);
}
