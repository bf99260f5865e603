//! AVX2 + FMA + F16C kernels (`haswell` tier).
//!
//! Half-precision inputs are widened eight at a time with `vcvtph2ps`
//! (f16) or a zero-extend and shift (bf16), then share the binary32 loops.
//! `i8` products go through `vpmaddwd`; the 32-bit lane sums are flushed
//! into an `i64` total before they can overflow.

#![allow(clippy::wildcard_imports)]
#![allow(clippy::similar_names)]

use std::arch::x86_64::*;

use half::{bf16, f16};

use super::serial::{jaccard_from_counts, popcount_zip};
use super::{
    cosine_distance, dense_abi, rsqrt_approx, rsqrt_exact, DenseFn, Fault, KernelFn, I8_MAX_LEN,
};
use crate::capability::Capability;
use crate::dispatch::DispatchEntry;
use crate::dtype::Dtype;
use crate::metric::Metric;

/// Iterations of 16 `i8` lanes between flushes of the 32-bit accumulators.
///
/// Each `vpmaddwd` lane adds at most 2 × 255² per iteration, so 4096
/// iterations stay below `i32::MAX`.
const I8_FLUSH_EVERY: usize = 4096;

// =============================================================================
// Horizontal reductions
// =============================================================================

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn hsum_ps(v: __m256) -> f32 {
    // [a0..a7] -> scalar
    let hi = _mm256_extractf128_ps(v, 1);
    let lo = _mm256_castps256_ps128(v);
    let sum128 = _mm_add_ps(lo, hi);
    let shuf = _mm_movehdup_ps(sum128);
    let sums = _mm_add_ps(sum128, shuf);
    let shuf2 = _mm_movehl_ps(sums, sums);
    _mm_cvtss_f32(_mm_add_ss(sums, shuf2))
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn hsum_pd(v: __m256d) -> f64 {
    let hi = _mm256_extractf128_pd(v, 1);
    let lo = _mm256_castpd256_pd128(v);
    let sum128 = _mm_add_pd(lo, hi);
    let high = _mm_unpackhi_pd(sum128, sum128);
    _mm_cvtsd_f64(_mm_add_sd(sum128, high))
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn hsum_epi32(v: __m256i) -> i64 {
    let mut lanes = [0_i32; 8];
    _mm256_storeu_si256(lanes.as_mut_ptr().cast(), v);
    lanes.iter().map(|&lane| i64::from(lane)).sum()
}

// =============================================================================
// 8-lane loaders
// =============================================================================

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn load_f32(v: &[f32], offset: usize) -> __m256 {
    _mm256_loadu_ps(v.as_ptr().add(offset))
}

#[inline]
#[target_feature(enable = "avx2,f16c")]
unsafe fn load_f16(v: &[f16], offset: usize) -> __m256 {
    _mm256_cvtph_ps(_mm_loadu_si128(v.as_ptr().add(offset).cast()))
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn load_bf16(v: &[bf16], offset: usize) -> __m256 {
    let raw = _mm256_cvtepu16_epi32(_mm_loadu_si128(v.as_ptr().add(offset).cast()));
    _mm256_castsi256_ps(_mm256_slli_epi32(raw, 16))
}

/// Splits eight binary32 lanes into two binary64 halves.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn widen_ps(v: __m256) -> (__m256d, __m256d) {
    (
        _mm256_cvtps_pd(_mm256_castps256_ps128(v)),
        _mm256_cvtps_pd(_mm256_extractf128_ps(v, 1)),
    )
}

// =============================================================================
// binary32 float kernels (f32, f16, bf16); cosine accumulates in binary64
// =============================================================================

macro_rules! float32_kernels {
    ($elem:ty, $load:ident, $inner:ident, $sqeuclidean:ident, $cosine:ident) => {
        #[target_feature(enable = "avx2,fma,f16c")]
        unsafe fn $inner(a: &[$elem], b: &[$elem]) -> f64 {
            let len = a.len();
            let simd_len = len / 16;
            let mut sum0 = _mm256_setzero_ps();
            let mut sum1 = _mm256_setzero_ps();
            for i in 0..simd_len {
                let offset = i * 16;
                sum0 = _mm256_fmadd_ps($load(a, offset), $load(b, offset), sum0);
                sum1 = _mm256_fmadd_ps($load(a, offset + 8), $load(b, offset + 8), sum1);
            }
            let mut result = hsum_ps(_mm256_add_ps(sum0, sum1));
            for i in simd_len * 16..len {
                result += f32::from(a[i]) * f32::from(b[i]);
            }
            f64::from(result)
        }

        #[target_feature(enable = "avx2,fma,f16c")]
        unsafe fn $sqeuclidean(a: &[$elem], b: &[$elem]) -> f64 {
            let len = a.len();
            let simd_len = len / 8;
            let mut sum = _mm256_setzero_ps();
            for i in 0..simd_len {
                let offset = i * 8;
                let diff = _mm256_sub_ps($load(a, offset), $load(b, offset));
                sum = _mm256_fmadd_ps(diff, diff, sum);
            }
            let mut result = hsum_ps(sum);
            for i in simd_len * 8..len {
                let diff = f32::from(a[i]) - f32::from(b[i]);
                result += diff * diff;
            }
            f64::from(result)
        }

        #[target_feature(enable = "avx2,fma,f16c")]
        unsafe fn $cosine(a: &[$elem], b: &[$elem]) -> Result<f64, Fault> {
            let len = a.len();
            let simd_len = len / 8;
            let mut ab = _mm256_setzero_pd();
            let mut a2 = _mm256_setzero_pd();
            let mut b2 = _mm256_setzero_pd();
            for i in 0..simd_len {
                let offset = i * 8;
                let (a_lo, a_hi) = widen_ps($load(a, offset));
                let (b_lo, b_hi) = widen_ps($load(b, offset));
                ab = _mm256_fmadd_pd(a_lo, b_lo, _mm256_fmadd_pd(a_hi, b_hi, ab));
                a2 = _mm256_fmadd_pd(a_lo, a_lo, _mm256_fmadd_pd(a_hi, a_hi, a2));
                b2 = _mm256_fmadd_pd(b_lo, b_lo, _mm256_fmadd_pd(b_hi, b_hi, b2));
            }
            let (mut ab, mut a2, mut b2) = (hsum_pd(ab), hsum_pd(a2), hsum_pd(b2));
            for i in simd_len * 8..len {
                let (x, y) = (f64::from(f32::from(a[i])), f64::from(f32::from(b[i])));
                ab += x * y;
                a2 += x * x;
                b2 += y * y;
            }
            cosine_distance(ab, a2, b2, rsqrt_approx)
        }
    };
}

float32_kernels!(f32, load_f32, inner_f32, sqeuclidean_f32, cosine_f32);
float32_kernels!(f16, load_f16, inner_f16, sqeuclidean_f16, cosine_f16);
float32_kernels!(bf16, load_bf16, inner_bf16, sqeuclidean_bf16, cosine_bf16);

// =============================================================================
// binary64
// =============================================================================

#[target_feature(enable = "avx2,fma")]
unsafe fn inner_f64(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len();
    let simd_len = len / 4;
    let mut sum = _mm256_setzero_pd();
    for i in 0..simd_len {
        let offset = i * 4;
        let va = _mm256_loadu_pd(a.as_ptr().add(offset));
        let vb = _mm256_loadu_pd(b.as_ptr().add(offset));
        sum = _mm256_fmadd_pd(va, vb, sum);
    }
    let mut result = hsum_pd(sum);
    for i in simd_len * 4..len {
        result += a[i] * b[i];
    }
    result
}

#[target_feature(enable = "avx2,fma")]
unsafe fn sqeuclidean_f64(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len();
    let simd_len = len / 4;
    let mut sum = _mm256_setzero_pd();
    for i in 0..simd_len {
        let offset = i * 4;
        let diff = _mm256_sub_pd(
            _mm256_loadu_pd(a.as_ptr().add(offset)),
            _mm256_loadu_pd(b.as_ptr().add(offset)),
        );
        sum = _mm256_fmadd_pd(diff, diff, sum);
    }
    let mut result = hsum_pd(sum);
    for i in simd_len * 4..len {
        let diff = a[i] - b[i];
        result += diff * diff;
    }
    result
}

#[target_feature(enable = "avx2,fma")]
unsafe fn cosine_f64(a: &[f64], b: &[f64]) -> Result<f64, Fault> {
    let len = a.len();
    let simd_len = len / 4;
    let mut ab = _mm256_setzero_pd();
    let mut a2 = _mm256_setzero_pd();
    let mut b2 = _mm256_setzero_pd();
    for i in 0..simd_len {
        let offset = i * 4;
        let va = _mm256_loadu_pd(a.as_ptr().add(offset));
        let vb = _mm256_loadu_pd(b.as_ptr().add(offset));
        ab = _mm256_fmadd_pd(va, vb, ab);
        a2 = _mm256_fmadd_pd(va, va, a2);
        b2 = _mm256_fmadd_pd(vb, vb, b2);
    }
    let (mut ab, mut a2, mut b2) = (hsum_pd(ab), hsum_pd(a2), hsum_pd(b2));
    for i in simd_len * 4..len {
        ab += a[i] * b[i];
        a2 += a[i] * a[i];
        b2 += b[i] * b[i];
    }
    cosine_distance(ab, a2, b2, rsqrt_exact)
}

// =============================================================================
// int8
// =============================================================================

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn load_i8x16(v: &[i8], offset: usize) -> __m256i {
    _mm256_cvtepi8_epi16(_mm_loadu_si128(v.as_ptr().add(offset).cast()))
}

#[target_feature(enable = "avx2")]
unsafe fn inner_i8(a: &[i8], b: &[i8]) -> f64 {
    let len = a.len();
    let simd_len = len / 16;
    let mut total = 0_i64;
    let mut acc = _mm256_setzero_si256();
    for i in 0..simd_len {
        let offset = i * 16;
        let products = _mm256_madd_epi16(load_i8x16(a, offset), load_i8x16(b, offset));
        acc = _mm256_add_epi32(acc, products);
        if (i + 1) % I8_FLUSH_EVERY == 0 {
            total += hsum_epi32(acc);
            acc = _mm256_setzero_si256();
        }
    }
    total += hsum_epi32(acc);
    for i in simd_len * 16..len {
        total += i64::from(a[i]) * i64::from(b[i]);
    }
    total as f64
}

#[target_feature(enable = "avx2")]
unsafe fn sqeuclidean_i8(a: &[i8], b: &[i8]) -> f64 {
    let len = a.len();
    let simd_len = len / 16;
    let mut total = 0_i64;
    let mut acc = _mm256_setzero_si256();
    for i in 0..simd_len {
        let offset = i * 16;
        let diff = _mm256_sub_epi16(load_i8x16(a, offset), load_i8x16(b, offset));
        acc = _mm256_add_epi32(acc, _mm256_madd_epi16(diff, diff));
        if (i + 1) % I8_FLUSH_EVERY == 0 {
            total += hsum_epi32(acc);
            acc = _mm256_setzero_si256();
        }
    }
    total += hsum_epi32(acc);
    for i in simd_len * 16..len {
        let diff = i64::from(a[i]) - i64::from(b[i]);
        total += diff * diff;
    }
    total as f64
}

#[target_feature(enable = "avx2")]
unsafe fn cosine_i8(a: &[i8], b: &[i8]) -> Result<f64, Fault> {
    let len = a.len();
    let simd_len = len / 16;
    let (mut ab, mut a2, mut b2) = (0_i64, 0_i64, 0_i64);
    let mut ab_acc = _mm256_setzero_si256();
    let mut a2_acc = _mm256_setzero_si256();
    let mut b2_acc = _mm256_setzero_si256();
    for i in 0..simd_len {
        let offset = i * 16;
        let va = load_i8x16(a, offset);
        let vb = load_i8x16(b, offset);
        ab_acc = _mm256_add_epi32(ab_acc, _mm256_madd_epi16(va, vb));
        a2_acc = _mm256_add_epi32(a2_acc, _mm256_madd_epi16(va, va));
        b2_acc = _mm256_add_epi32(b2_acc, _mm256_madd_epi16(vb, vb));
        if (i + 1) % I8_FLUSH_EVERY == 0 {
            ab += hsum_epi32(ab_acc);
            a2 += hsum_epi32(a2_acc);
            b2 += hsum_epi32(b2_acc);
            ab_acc = _mm256_setzero_si256();
            a2_acc = _mm256_setzero_si256();
            b2_acc = _mm256_setzero_si256();
        }
    }
    ab += hsum_epi32(ab_acc);
    a2 += hsum_epi32(a2_acc);
    b2 += hsum_epi32(b2_acc);
    for i in simd_len * 16..len {
        let (x, y) = (i64::from(a[i]), i64::from(b[i]));
        ab += x * y;
        a2 += x * x;
        b2 += y * y;
    }
    cosine_distance(ab as f64, a2 as f64, b2 as f64, rsqrt_exact)
}

// =============================================================================
// Bit-packed booleans
// =============================================================================

#[target_feature(enable = "popcnt")]
unsafe fn hamming_b8(a: &[u8], b: &[u8]) -> f64 {
    popcount_zip(a, b, |x, y| x ^ y) as f64
}

#[target_feature(enable = "popcnt")]
unsafe fn jaccard_b8(a: &[u8], b: &[u8]) -> f64 {
    let intersection = popcount_zip(a, b, |x, y| x & y);
    let union = popcount_zip(a, b, |x, y| x | y);
    jaccard_from_counts(intersection, union)
}

// =============================================================================
// Entry points
// =============================================================================

dense_abi!(inner_f64_c: f64 => inner_f64);
dense_abi!(sqeuclidean_f64_c: f64 => sqeuclidean_f64);
dense_abi!(cosine_f64_c: f64 => cosine_f64);
dense_abi!(inner_f32_c: f32 => inner_f32);
dense_abi!(sqeuclidean_f32_c: f32 => sqeuclidean_f32);
dense_abi!(cosine_f32_c: f32 => cosine_f32);
dense_abi!(inner_f16_c: f16 => inner_f16);
dense_abi!(sqeuclidean_f16_c: f16 => sqeuclidean_f16);
dense_abi!(cosine_f16_c: f16 => cosine_f16);
dense_abi!(inner_bf16_c: bf16 => inner_bf16);
dense_abi!(sqeuclidean_bf16_c: bf16 => sqeuclidean_bf16);
dense_abi!(cosine_bf16_c: bf16 => cosine_bf16);
dense_abi!(inner_i8_c: i8 => inner_i8, max = I8_MAX_LEN);
dense_abi!(sqeuclidean_i8_c: i8 => sqeuclidean_i8, max = I8_MAX_LEN);
dense_abi!(cosine_i8_c: i8 => cosine_i8, max = I8_MAX_LEN);
dense_abi!(hamming_b8_c: u8 => hamming_b8);
dense_abi!(jaccard_b8_c: u8 => jaccard_b8);

/// Registers the AVX2 kernels.
pub(crate) fn register(entries: &mut Vec<DispatchEntry>) {
    let tier = Capability::Haswell;
    let dot_family: [(Dtype, DenseFn, DenseFn, DenseFn); 5] = [
        (Dtype::F64, inner_f64_c, sqeuclidean_f64_c, cosine_f64_c),
        (Dtype::F32, inner_f32_c, sqeuclidean_f32_c, cosine_f32_c),
        (Dtype::F16, inner_f16_c, sqeuclidean_f16_c, cosine_f16_c),
        (Dtype::BF16, inner_bf16_c, sqeuclidean_bf16_c, cosine_bf16_c),
        (Dtype::I8, inner_i8_c, sqeuclidean_i8_c, cosine_i8_c),
    ];
    for (dtype, inner, sqeuclidean, cosine) in dot_family {
        for metric in [Metric::Inner, Metric::Dot, Metric::VDot] {
            entries.push(DispatchEntry::new(metric, dtype, tier, KernelFn::Dense(inner)));
        }
        entries.push(DispatchEntry::new(Metric::SqEuclidean, dtype, tier, KernelFn::Dense(sqeuclidean)));
        entries.push(DispatchEntry::new(Metric::Cosine, dtype, tier, KernelFn::Dense(cosine)));
    }
    entries.push(DispatchEntry::new(Metric::Hamming, Dtype::B8, tier, KernelFn::Dense(hamming_b8_c)));
    entries.push(DispatchEntry::new(Metric::Jaccard, Dtype::B8, tier, KernelFn::Dense(jaccard_b8_c)));
}
