//! AVX-512 kernels (`skylake` tier).
//!
//! Tails are handled with masked loads instead of a scalar loop, so every
//! element goes through the same FMA path.

#![allow(clippy::wildcard_imports)]
#![allow(clippy::similar_names)]

use std::arch::x86_64::*;

use half::f16;

use super::{cosine_distance, dense_abi, rsqrt_approx, rsqrt_exact, DenseFn, Fault, KernelFn};
use crate::capability::Capability;
use crate::dispatch::DispatchEntry;
use crate::dtype::Dtype;
use crate::metric::Metric;

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn load_f32(v: &[f32], offset: usize, lanes: usize) -> __m512 {
    if lanes == 16 {
        _mm512_loadu_ps(v.as_ptr().add(offset))
    } else {
        let mask: __mmask16 = (1_u16 << lanes) - 1;
        _mm512_maskz_loadu_ps(mask, v.as_ptr().add(offset))
    }
}

#[inline]
#[target_feature(enable = "avx512f,avx512vl,avx512bw")]
unsafe fn load_f16(v: &[f16], offset: usize, lanes: usize) -> __m512 {
    let raw = if lanes == 16 {
        _mm256_loadu_si256(v.as_ptr().add(offset).cast())
    } else {
        let mask: __mmask16 = (1_u16 << lanes) - 1;
        _mm256_maskz_loadu_epi16(mask, v.as_ptr().add(offset).cast())
    };
    _mm512_cvtph_ps(raw)
}

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn load_f64(v: &[f64], offset: usize, lanes: usize) -> __m512d {
    if lanes == 8 {
        _mm512_loadu_pd(v.as_ptr().add(offset))
    } else {
        let mask: __mmask8 = (1_u8 << lanes) - 1;
        _mm512_maskz_loadu_pd(mask, v.as_ptr().add(offset))
    }
}

/// Splits sixteen binary32 lanes into two binary64 halves.
#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn widen_ps(v: __m512) -> (__m512d, __m512d) {
    let hi = _mm256_castpd_ps(_mm512_extractf64x4_pd(_mm512_castps_pd(v), 1));
    (_mm512_cvtps_pd(_mm512_castps512_ps256(v)), _mm512_cvtps_pd(hi))
}

macro_rules! float32_kernels {
    ($elem:ty, $load:ident, $inner:ident, $sqeuclidean:ident, $cosine:ident) => {
        #[target_feature(enable = "avx512f,avx512vl,avx512bw")]
        unsafe fn $inner(a: &[$elem], b: &[$elem]) -> f64 {
            let mut sum = _mm512_setzero_ps();
            let mut offset = 0;
            while offset < a.len() {
                let lanes = (a.len() - offset).min(16);
                sum = _mm512_fmadd_ps($load(a, offset, lanes), $load(b, offset, lanes), sum);
                offset += lanes;
            }
            f64::from(_mm512_reduce_add_ps(sum))
        }

        #[target_feature(enable = "avx512f,avx512vl,avx512bw")]
        unsafe fn $sqeuclidean(a: &[$elem], b: &[$elem]) -> f64 {
            let mut sum = _mm512_setzero_ps();
            let mut offset = 0;
            while offset < a.len() {
                let lanes = (a.len() - offset).min(16);
                let diff = _mm512_sub_ps($load(a, offset, lanes), $load(b, offset, lanes));
                sum = _mm512_fmadd_ps(diff, diff, sum);
                offset += lanes;
            }
            f64::from(_mm512_reduce_add_ps(sum))
        }

        #[target_feature(enable = "avx512f,avx512vl,avx512bw")]
        unsafe fn $cosine(a: &[$elem], b: &[$elem]) -> Result<f64, Fault> {
            let mut ab = _mm512_setzero_pd();
            let mut a2 = _mm512_setzero_pd();
            let mut b2 = _mm512_setzero_pd();
            let mut offset = 0;
            while offset < a.len() {
                let lanes = (a.len() - offset).min(16);
                let (a_lo, a_hi) = widen_ps($load(a, offset, lanes));
                let (b_lo, b_hi) = widen_ps($load(b, offset, lanes));
                ab = _mm512_fmadd_pd(a_lo, b_lo, _mm512_fmadd_pd(a_hi, b_hi, ab));
                a2 = _mm512_fmadd_pd(a_lo, a_lo, _mm512_fmadd_pd(a_hi, a_hi, a2));
                b2 = _mm512_fmadd_pd(b_lo, b_lo, _mm512_fmadd_pd(b_hi, b_hi, b2));
                offset += lanes;
            }
            cosine_distance(
                _mm512_reduce_add_pd(ab),
                _mm512_reduce_add_pd(a2),
                _mm512_reduce_add_pd(b2),
                rsqrt_approx,
            )
        }
    };
}

float32_kernels!(f32, load_f32, inner_f32, sqeuclidean_f32, cosine_f32);
float32_kernels!(f16, load_f16, inner_f16, sqeuclidean_f16, cosine_f16);

#[target_feature(enable = "avx512f")]
unsafe fn inner_f64(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = _mm512_setzero_pd();
    let mut offset = 0;
    while offset < a.len() {
        let lanes = (a.len() - offset).min(8);
        sum = _mm512_fmadd_pd(load_f64(a, offset, lanes), load_f64(b, offset, lanes), sum);
        offset += lanes;
    }
    _mm512_reduce_add_pd(sum)
}

#[target_feature(enable = "avx512f")]
unsafe fn sqeuclidean_f64(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = _mm512_setzero_pd();
    let mut offset = 0;
    while offset < a.len() {
        let lanes = (a.len() - offset).min(8);
        let diff = _mm512_sub_pd(load_f64(a, offset, lanes), load_f64(b, offset, lanes));
        sum = _mm512_fmadd_pd(diff, diff, sum);
        offset += lanes;
    }
    _mm512_reduce_add_pd(sum)
}

#[target_feature(enable = "avx512f")]
unsafe fn cosine_f64(a: &[f64], b: &[f64]) -> Result<f64, Fault> {
    let mut ab = _mm512_setzero_pd();
    let mut a2 = _mm512_setzero_pd();
    let mut b2 = _mm512_setzero_pd();
    let mut offset = 0;
    while offset < a.len() {
        let lanes = (a.len() - offset).min(8);
        let va = load_f64(a, offset, lanes);
        let vb = load_f64(b, offset, lanes);
        ab = _mm512_fmadd_pd(va, vb, ab);
        a2 = _mm512_fmadd_pd(va, va, a2);
        b2 = _mm512_fmadd_pd(vb, vb, b2);
        offset += lanes;
    }
    cosine_distance(
        _mm512_reduce_add_pd(ab),
        _mm512_reduce_add_pd(a2),
        _mm512_reduce_add_pd(b2),
        rsqrt_exact,
    )
}

dense_abi!(inner_f64_c: f64 => inner_f64);
dense_abi!(sqeuclidean_f64_c: f64 => sqeuclidean_f64);
dense_abi!(cosine_f64_c: f64 => cosine_f64);
dense_abi!(inner_f32_c: f32 => inner_f32);
dense_abi!(sqeuclidean_f32_c: f32 => sqeuclidean_f32);
dense_abi!(cosine_f32_c: f32 => cosine_f32);
dense_abi!(inner_f16_c: f16 => inner_f16);
dense_abi!(sqeuclidean_f16_c: f16 => sqeuclidean_f16);
dense_abi!(cosine_f16_c: f16 => cosine_f16);

/// Registers the AVX-512 float kernels.
pub(crate) fn register(entries: &mut Vec<DispatchEntry>) {
    let tier = Capability::Skylake;
    let dot_family: [(Dtype, DenseFn, DenseFn, DenseFn); 3] = [
        (Dtype::F64, inner_f64_c, sqeuclidean_f64_c, cosine_f64_c),
        (Dtype::F32, inner_f32_c, sqeuclidean_f32_c, cosine_f32_c),
        (Dtype::F16, inner_f16_c, sqeuclidean_f16_c, cosine_f16_c),
    ];
    for (dtype, inner, sqeuclidean, cosine) in dot_family {
        for metric in [Metric::Inner, Metric::Dot, Metric::VDot] {
            entries.push(DispatchEntry::new(metric, dtype, tier, KernelFn::Dense(inner)));
        }
        entries.push(DispatchEntry::new(Metric::SqEuclidean, dtype, tier, KernelFn::Dense(sqeuclidean)));
        entries.push(DispatchEntry::new(Metric::Cosine, dtype, tier, KernelFn::Dense(cosine)));
    }
}
