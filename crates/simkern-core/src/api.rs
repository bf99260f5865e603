//! Free functions over the process-wide [`Engine`].
//!
//! These mirror the per-metric callables a binding layer exposes. Each
//! accepts anything convertible into a [`VectorRef`], so plain slices work:
//!
//! ```rust
//! let d = simkern_core::sqeuclidean(&[1.0_f32, 2.0, 3.0][..], &[1.0_f32, 2.0, 5.0][..])?;
//! assert_eq!(d, 4.0);
//! # Ok::<(), simkern_core::Error>(())
//! ```

use std::collections::BTreeMap;

use crate::capability::Capability;
use crate::dispatch::ExportedKernel;
use crate::dtype::{Dtype, OutputDtype};
use crate::engine::Engine;
use crate::error::Result;
use crate::metric::Metric;
use crate::output::{Distances, Scalar};
use crate::vector::{MatrixRef, VectorRef};

fn real<'a>(metric: Metric, a: impl Into<VectorRef<'a>>, b: impl Into<VectorRef<'a>>) -> Result<f64> {
    Engine::global()
        .compute(metric, a.into(), b.into())?
        .real()
}

/// Inner product Σ aᵢ·bᵢ.
///
/// # Errors
///
/// Fails on unsupported dtype or length mismatch.
pub fn inner<'a>(a: impl Into<VectorRef<'a>>, b: impl Into<VectorRef<'a>>) -> Result<f64> {
    real(Metric::Inner, a, b)
}

/// Σ aᵢ·bᵢ without conjugation; complex for complex dtypes.
///
/// # Errors
///
/// Fails on unsupported dtype or length mismatch.
pub fn dot<'a>(a: impl Into<VectorRef<'a>>, b: impl Into<VectorRef<'a>>) -> Result<Scalar> {
    Engine::global().compute(Metric::Dot, a.into(), b.into())
}

/// Σ conj(aᵢ)·bᵢ; equal to [`dot`] for real dtypes.
///
/// # Errors
///
/// Fails on unsupported dtype or length mismatch.
pub fn vdot<'a>(a: impl Into<VectorRef<'a>>, b: impl Into<VectorRef<'a>>) -> Result<Scalar> {
    Engine::global().compute(Metric::VDot, a.into(), b.into())
}

/// Squared Euclidean distance.
///
/// # Errors
///
/// Fails on unsupported dtype or length mismatch.
pub fn sqeuclidean<'a>(a: impl Into<VectorRef<'a>>, b: impl Into<VectorRef<'a>>) -> Result<f64> {
    real(Metric::SqEuclidean, a, b)
}

/// Cosine distance.
///
/// # Errors
///
/// Fails on unsupported dtype or length mismatch.
pub fn cosine<'a>(a: impl Into<VectorRef<'a>>, b: impl Into<VectorRef<'a>>) -> Result<f64> {
    real(Metric::Cosine, a, b)
}

/// Number of differing bits between two packed bit vectors.
///
/// # Errors
///
/// Fails on length mismatch.
pub fn hamming(a: &[u8], b: &[u8]) -> Result<f64> {
    real(Metric::Hamming, VectorRef::bits(a), VectorRef::bits(b))
}

/// Jaccard distance between two packed bit vectors.
///
/// # Errors
///
/// Fails on length mismatch.
pub fn jaccard(a: &[u8], b: &[u8]) -> Result<f64> {
    real(Metric::Jaccard, VectorRef::bits(a), VectorRef::bits(b))
}

/// Jensen-Shannon divergence between two distributions.
///
/// # Errors
///
/// Fails on unsupported dtype, length mismatch or negative inputs.
pub fn jensenshannon<'a>(a: impl Into<VectorRef<'a>>, b: impl Into<VectorRef<'a>>) -> Result<f64> {
    real(Metric::JensenShannon, a, b)
}

/// Kullback-Leibler divergence of `p` from `q`.
///
/// # Errors
///
/// Fails on unsupported dtype, length mismatch, negative inputs, or a zero
/// `qᵢ` where `pᵢ` is positive.
pub fn kullbackleibler<'a>(p: impl Into<VectorRef<'a>>, q: impl Into<VectorRef<'a>>) -> Result<f64> {
    real(Metric::KullbackLeibler, p, q)
}

/// Bilinear form aᵀ·M·b, `m` row-major `n × n`.
///
/// # Errors
///
/// Fails on unsupported dtype or shape mismatch.
pub fn bilinear<'a>(
    a: impl Into<VectorRef<'a>>,
    b: impl Into<VectorRef<'a>>,
    m: impl Into<VectorRef<'a>>,
) -> Result<f64> {
    Engine::global().compute_curved(Metric::Bilinear, a.into(), b.into(), m.into())
}

/// Mahalanobis distance √((a − b)ᵀ·M·(a − b)).
///
/// # Errors
///
/// Fails on unsupported dtype, shape mismatch, or a negative quadratic form.
pub fn mahalanobis<'a>(
    a: impl Into<VectorRef<'a>>,
    b: impl Into<VectorRef<'a>>,
    m: impl Into<VectorRef<'a>>,
) -> Result<f64> {
    Engine::global().compute_curved(Metric::Mahalanobis, a.into(), b.into(), m.into())
}

/// Number of common elements of two sorted, duplicate-free sets.
///
/// Unsorted input or duplicates give an unspecified count.
///
/// # Errors
///
/// Fails on unsupported dtype (only `u16` and `u32` sets are supported).
pub fn intersect<'a>(a: impl Into<VectorRef<'a>>, b: impl Into<VectorRef<'a>>) -> Result<usize> {
    real(Metric::Intersect, a, b).map(|count| count as usize)
}

/// Row-wise evaluation under the broadcast rules.
///
/// # Errors
///
/// See [`Engine::evaluate`].
pub fn evaluate(
    metric: Metric,
    a: &MatrixRef<'_>,
    b: &MatrixRef<'_>,
    out: Option<OutputDtype>,
) -> Result<Distances> {
    Engine::global().evaluate(metric, a, b, out)
}

/// All-pairs evaluation.
///
/// # Errors
///
/// See [`Engine::cdist`].
pub fn cdist(
    metric: Metric,
    a: &MatrixRef<'_>,
    b: &MatrixRef<'_>,
    out: Option<OutputDtype>,
) -> Result<Distances> {
    Engine::global().cdist(metric, a, b, out)
}

/// Every known tier and whether it is enabled.
#[must_use]
pub fn list_capabilities() -> BTreeMap<Capability, bool> {
    Engine::global().list_capabilities()
}

/// Enables a tier process-wide.
///
/// # Errors
///
/// Returns [`crate::Error::UnknownCapability`] for unrecognized names.
pub fn enable(name: &str) -> Result<bool> {
    Engine::global().enable(name)
}

/// Disables a tier process-wide.
///
/// # Errors
///
/// Returns [`crate::Error::UnknownCapability`] for unrecognized names.
pub fn disable(name: &str) -> Result<bool> {
    Engine::global().disable(name)
}

/// Exports the raw entry point for `(metric, dtype)`.
///
/// # Errors
///
/// Returns [`crate::Error::UnsupportedDtype`] if no tier implements the pair.
pub fn export_pointer(metric: Metric, dtype: Dtype) -> Result<ExportedKernel> {
    Engine::global().export_pointer(metric, dtype)
}
