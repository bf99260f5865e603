//! Tests for `engine` module

use std::sync::Arc;

use super::capability::{Capability, CapabilityRegistry, CapabilitySet};
use super::config::SimkernConfig;
use super::dtype::{Dtype, OutputDtype};
use super::engine::*;
use super::error::Error;
use super::kernels::{KernelFn, STATUS_OK};
use super::metric::Metric;
use super::output::{Scalar, Values};
use super::vector::{MatrixRef, VectorRef};

fn private_engine() -> Engine {
    Engine::new(Arc::new(CapabilityRegistry::detect()))
}

fn disable_all(engine: &Engine) {
    for cap in Capability::ALL {
        engine.disable(cap.name()).unwrap();
    }
}

// =========================================================================
// Single calls
// =========================================================================

#[test]
fn test_compute_dense() {
    let engine = private_engine();
    let a = [1.0_f32, 0.0];
    let b = [0.0_f32, 1.0];

    let result = engine
        .compute(Metric::Cosine, (&a[..]).into(), (&b[..]).into())
        .unwrap();

    assert!((result.re() - 1.0).abs() < 1e-6);
}

#[test]
fn test_compute_binary_and_sets() {
    let engine = private_engine();

    let hamming = engine
        .compute(Metric::Hamming, VectorRef::bits(&[0b1011]), VectorRef::bits(&[0b0001]))
        .unwrap();
    let common = engine
        .compute(Metric::Intersect, (&[1_u16, 4, 9][..]).into(), (&[4_u16, 9][..]).into())
        .unwrap();

    assert_eq!(hamming, Scalar::Real(2.0));
    assert_eq!(common, Scalar::Real(2.0));
}

#[test]
fn test_compute_curved() {
    let engine = private_engine();
    let a = [1.0_f64, 1.0];
    let b = [0.0_f64, 0.0];
    let m = [1.0_f64, 0.0, 0.0, 1.0];

    let result = engine
        .compute_curved(Metric::Mahalanobis, (&a[..]).into(), (&b[..]).into(), (&m[..]).into())
        .unwrap();

    assert!((result - 2.0_f64.sqrt()).abs() < 1e-12);
}

#[test]
fn test_compute_jensenshannon_infinite_input_fails() {
    let engine = private_engine();
    let p = [f64::INFINITY, 1.0];
    let q = [1.0_f64, 1.0];

    let err = engine
        .compute(Metric::JensenShannon, (&p[..]).into(), (&q[..]).into())
        .unwrap_err();

    assert!(matches!(err, Error::NumericalDomain(_)));
    assert_eq!(err.code(), "SIMK-006");
}

#[test]
fn test_compute_cosine_large_opposite_f32() {
    let engine = private_engine();
    let a = [1e20_f32, 0.0];
    let b = [-1e20_f32, 0.0];

    let result = engine
        .compute(Metric::Cosine, (&a[..]).into(), (&b[..]).into())
        .unwrap();

    assert!((result.re() - 2.0).abs() < 1e-6, "{result}");
}

#[test]
fn test_compute_unimplemented_pair() {
    let engine = private_engine();
    let a = [1_i8];

    let err = engine
        .compute(Metric::KullbackLeibler, (&a[..]).into(), (&a[..]).into())
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedDtype(_)));
}

// =========================================================================
// Capabilities and export
// =========================================================================

#[test]
fn test_disabling_all_tiers_falls_back_to_serial() {
    // Arrange
    let engine = private_engine();

    // Act
    disable_all(&engine);

    // Assert
    for metric in [Metric::Inner, Metric::Cosine, Metric::SqEuclidean] {
        assert_eq!(
            engine.resolve(metric, Dtype::F32).unwrap().tier(),
            Capability::Serial
        );
    }
    let listed = engine.list_capabilities();
    assert_eq!(listed.values().filter(|&&on| on).count(), 1);
}

#[test]
fn test_exported_pointer_keeps_its_tier() {
    // Arrange
    let engine = private_engine();
    let exported = engine.export_pointer(Metric::Inner, Dtype::F32).unwrap();
    let tier = exported.tier();
    let address = exported.address();

    // Act
    disable_all(&engine);

    // Assert
    assert_eq!(exported.tier(), tier);
    assert_eq!(exported.address(), address);
    let a = [1.0_f32, 2.0];
    let result = exported
        .kernel()
        .call((&a[..]).into(), (&a[..]).into())
        .unwrap();
    assert_eq!(result, Scalar::Real(5.0));
}

#[test]
fn test_exported_pointer_is_callable() {
    // Arrange
    let engine = private_engine();
    let exported = engine.export_pointer(Metric::SqEuclidean, Dtype::F64).unwrap();
    let KernelFn::Dense(f) = exported.entry() else {
        panic!("sqeuclidean is a dense kernel");
    };
    let a = [1.0_f64, 1.0, 1.0];
    let b = [2.0_f64, 3.0, 4.0];
    let mut out = 0.0_f64;

    // Act
    // SAFETY: both buffers hold three f64 values and `out` is writable.
    let status = unsafe { f(a.as_ptr().cast(), b.as_ptr().cast(), 3, &mut out) };

    // Assert
    assert_eq!(status, STATUS_OK);
    assert_eq!(out, 14.0);
}

#[test]
fn test_export_unimplemented_pair_fails() {
    let engine = private_engine();
    assert!(engine.export_pointer(Metric::Hamming, Dtype::F32).is_err());
}

#[test]
fn test_engines_with_private_registries_are_isolated() {
    let first = private_engine();
    let second = private_engine();

    disable_all(&first);

    assert_eq!(second.registry().enabled(), second.registry().supported());
}

#[test]
fn test_global_engine_uses_global_registry() {
    assert!(Arc::ptr_eq(
        Engine::global().registry(),
        &CapabilityRegistry::global()
    ));
}

// =========================================================================
// Configuration
// =========================================================================

#[test]
fn test_from_config_allowlist() {
    // Arrange
    let mut config = SimkernConfig::default();
    config.capabilities.enabled = vec!["serial".to_string()];

    // Act
    let engine = Engine::from_config(&config).unwrap();

    // Assert
    assert_eq!(engine.registry().enabled(), CapabilitySet::baseline());
}

#[test]
fn test_from_config_applies_batch_section() {
    let mut config = SimkernConfig::default();
    config.batch.parallel = false;
    config.batch.default_output = Some("f32".to_string());

    let engine = Engine::from_config(&config).unwrap();

    assert!(!engine.policy().parallel);
    assert_eq!(engine.policy().default_output, Some(OutputDtype::F32));
}

#[test]
fn test_from_config_rejects_invalid() {
    let mut config = SimkernConfig::default();
    config.capabilities.disabled = vec!["warp".to_string()];

    let err = Engine::from_config(&config).unwrap_err();

    assert!(matches!(err, Error::Config(_)));
}

// =========================================================================
// Batch entry points
// =========================================================================

#[test]
fn test_evaluate_with_dtype_override() {
    // Arrange - raw bf16 bits for [1, 2] and [3, 4]
    let engine = private_engine();
    let a: [u16; 2] = [0x3F80, 0x4000];
    let b: [u16; 2] = [0x4040, 0x4080];
    let options = CallOptions::default()
        .dtype(Dtype::BF16)
        .output(OutputDtype::I32);

    // Act
    let result = engine
        .evaluate_with(
            Metric::Inner,
            &MatrixRef::from_vector(&a[..]),
            &MatrixRef::from_vector(&b[..]),
            options,
        )
        .unwrap();

    // Assert
    assert_eq!(result.values(), &Values::I32(vec![11]));
}

#[test]
fn test_evaluate_curved_and_cdist() {
    let engine = private_engine();
    let rows = [1.0_f64, 0.0, 0.0, 1.0];
    let a = MatrixRef::new(&rows[..], 2, 2).unwrap();
    let identity = [1.0_f64, 0.0, 0.0, 1.0];

    let bilinear = engine
        .evaluate_curved(Metric::Bilinear, &a, &a, (&identity[..]).into(), None)
        .unwrap();
    let gram = engine.cdist(Metric::Inner, &a, &a, None).unwrap();

    assert_eq!(bilinear.to_f64_vec().unwrap(), vec![1.0, 1.0]);
    assert_eq!(gram.to_f64_vec().unwrap(), vec![1.0, 0.0, 0.0, 1.0]);
}
