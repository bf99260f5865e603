//! Tests for `dispatch` module - catalog, resolved tables and typed calls.

use super::capability::{Capability, CapabilitySet};
use super::dispatch::*;
use super::dtype::Dtype;
use super::error::Error;
use super::kernels::KernelFn;
use super::metric::Metric;
use super::output::Scalar;
use super::vector::VectorRef;

// =========================================================================
// Catalog
// =========================================================================

#[test]
fn test_every_dense_float_pair_is_implemented() {
    for dtype in [Dtype::F64, Dtype::F32, Dtype::F16, Dtype::BF16] {
        for metric in [
            Metric::Inner,
            Metric::Dot,
            Metric::VDot,
            Metric::SqEuclidean,
            Metric::Cosine,
            Metric::JensenShannon,
            Metric::KullbackLeibler,
            Metric::Bilinear,
            Metric::Mahalanobis,
        ] {
            assert!(is_implemented(metric, dtype), "{metric} over {dtype}");
        }
    }
}

#[test]
fn test_unimplemented_pairs() {
    assert!(!is_implemented(Metric::Hamming, Dtype::F32));
    assert!(!is_implemented(Metric::Cosine, Dtype::B8));
    assert!(!is_implemented(Metric::KullbackLeibler, Dtype::I8));
    assert!(!is_implemented(Metric::Intersect, Dtype::F64));
    assert!(!is_implemented(Metric::Inner, Dtype::Complex64));
}

#[test]
fn test_supported_pairs_have_a_baseline() {
    let pairs = supported_pairs();

    assert!(pairs.contains(&(Metric::Hamming, Dtype::B8)));
    assert!(pairs.contains(&(Metric::Intersect, Dtype::U32)));
    assert!(pairs.contains(&(Metric::VDot, Dtype::Complex128)));
    for (metric, dtype) in pairs {
        assert_eq!(
            implementing_tiers(metric, dtype).last(),
            Some(&Capability::Serial),
            "{metric} over {dtype}"
        );
    }
}

#[test]
fn test_implementing_tiers_highest_first() {
    let tiers = implementing_tiers(Metric::Inner, Dtype::F32);

    assert!(!tiers.is_empty());
    assert!(tiers.windows(2).all(|w| w[0].priority() > w[1].priority()));
}

// =========================================================================
// ResolvedTable
// =========================================================================

#[test]
fn test_baseline_table_resolves_to_serial() {
    // Arrange
    let table = ResolvedTable::build(CapabilitySet::baseline());

    // Act & Assert
    assert!(!table.is_empty());
    assert_eq!(table.len(), supported_pairs().len());
    for kernel in table.iter() {
        assert_eq!(kernel.tier(), Capability::Serial);
    }
}

#[test]
fn test_empty_set_still_resolves_baseline() {
    let empty = CapabilitySet::baseline().without(Capability::Serial);
    let table = ResolvedTable::build(empty);
    assert_eq!(
        table.resolve(Metric::Cosine, Dtype::F64).unwrap().tier(),
        Capability::Serial
    );
}

#[test]
fn test_resolve_picks_highest_enabled_tier() {
    // Arrange - pretend every tier is on; only compiled tiers can win
    let all: CapabilitySet = Capability::ALL.into_iter().collect();
    let table = ResolvedTable::build(all);

    // Act
    let kernel = table.resolve(Metric::SqEuclidean, Dtype::F32).unwrap();

    // Assert
    let expected = implementing_tiers(Metric::SqEuclidean, Dtype::F32)[0];
    assert_eq!(kernel.tier(), expected);
}

#[test]
fn test_resolve_unimplemented_is_unsupported_dtype() {
    let table = ResolvedTable::build(CapabilitySet::baseline());

    let err = table.resolve(Metric::Hamming, Dtype::F64).unwrap_err();

    match err {
        Error::UnsupportedDtype(msg) => {
            assert!(msg.contains("hamming"));
            assert!(msg.contains("f64"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_kernel_families() {
    let table = ResolvedTable::build(CapabilitySet::baseline());

    let dense = table.resolve(Metric::Inner, Dtype::F64).unwrap();
    let complex = table.resolve(Metric::Dot, Dtype::Complex64).unwrap();
    let curved = table.resolve(Metric::Mahalanobis, Dtype::F32).unwrap();
    let sparse = table.resolve(Metric::Intersect, Dtype::U16).unwrap();

    assert!(matches!(dense.entry(), KernelFn::Dense(_)));
    assert!(matches!(complex.entry(), KernelFn::Complex(_)));
    assert_eq!(complex.entry().outputs(), 2);
    assert!(matches!(curved.entry(), KernelFn::Curved(_)));
    assert!(matches!(sparse.entry(), KernelFn::Sparse(_)));
    assert_ne!(dense.address(), 0);
}

// =========================================================================
// Kernel calls
// =========================================================================

fn baseline(metric: Metric, dtype: Dtype) -> Kernel {
    ResolvedTable::build(CapabilitySet::baseline())
        .resolve(metric, dtype)
        .unwrap()
}

#[test]
fn test_call_dense() {
    let kernel = baseline(Metric::Inner, Dtype::F64);
    let a = [1.0_f64, 2.0, 3.0];
    let b = [4.0_f64, 5.0, 6.0];

    let result = kernel.call((&a[..]).into(), (&b[..]).into()).unwrap();

    assert_eq!(result, Scalar::Real(32.0));
}

#[test]
fn test_call_rejects_length_mismatch() {
    let kernel = baseline(Metric::SqEuclidean, Dtype::F32);
    let a = [1.0_f32, 2.0];
    let b = [1.0_f32, 2.0, 3.0];

    let err = kernel.call((&a[..]).into(), (&b[..]).into()).unwrap_err();

    assert_eq!(
        err,
        Error::DimensionMismatch {
            expected: 2,
            actual: 3
        }
    );
}

#[test]
fn test_call_rejects_wrong_dtype() {
    let kernel = baseline(Metric::Inner, Dtype::F64);
    let a = [1.0_f32];

    let err = kernel.call((&a[..]).into(), (&a[..]).into()).unwrap_err();

    assert!(matches!(err, Error::UnsupportedDtype(_)));
}

#[test]
fn test_call_complex_returns_pair() {
    // (1 + 2i)(3 + 4i) = -5 + 10i
    let kernel = baseline(Metric::Dot, Dtype::Complex128);
    let a = [1.0_f64, 2.0];
    let b = [3.0_f64, 4.0];

    let result = kernel
        .call(
            VectorRef::complex128(&a).unwrap(),
            VectorRef::complex128(&b).unwrap(),
        )
        .unwrap();

    assert_eq!(result, Scalar::Complex { re: -5.0, im: 10.0 });
}

#[test]
fn test_call_on_curved_kernel_is_rejected() {
    let kernel = baseline(Metric::Bilinear, Dtype::F64);
    let a = [1.0_f64];

    assert!(kernel.call((&a[..]).into(), (&a[..]).into()).is_err());
}

#[test]
fn test_call_curved_checks_matrix_shape() {
    let kernel = baseline(Metric::Bilinear, Dtype::F64);
    let a = [1.0_f64, 2.0];
    let m = [1.0_f64, 0.0, 0.0];

    let err = kernel
        .call_curved((&a[..]).into(), (&a[..]).into(), (&m[..]).into())
        .unwrap_err();

    assert!(matches!(err, Error::InvalidShape(_)));
}

#[test]
fn test_domain_status_maps_to_error() {
    // Arrange - q is zero where p is positive
    let kernel = baseline(Metric::KullbackLeibler, Dtype::F64);
    let p = [0.5_f64, 0.5];
    let q = [1.0_f64, 0.0];

    // Act
    let err = kernel.call((&p[..]).into(), (&q[..]).into()).unwrap_err();

    // Assert
    assert!(matches!(err, Error::NumericalDomain(msg) if msg.contains("kullbackleibler")));
}

#[test]
fn test_call_sparse_allows_different_lengths() {
    let kernel = baseline(Metric::Intersect, Dtype::U32);
    let a = [1_u32, 3, 5];
    let b = [3_u32, 5, 7, 9, 11];

    let count = kernel.call_sparse((&a[..]).into(), (&b[..]).into()).unwrap();

    assert_eq!(count, 2.0);
}

#[test]
fn test_exported_kernel_carries_abi_version() {
    let kernel = baseline(Metric::Cosine, Dtype::F32);

    let exported = ExportedKernel::new(kernel);

    assert_eq!(exported.abi_version, super::kernels::ABI_VERSION);
    assert_eq!(exported.address(), kernel.address());
    assert_eq!(exported.tier(), Capability::Serial);
}
