//! NEON kernels for aarch64 (`neon` tier).

#![allow(clippy::wildcard_imports)]
#![allow(clippy::similar_names)]

use std::arch::aarch64::*;

use super::serial::jaccard_from_counts;
use super::{cosine_distance, dense_abi, rsqrt_approx, rsqrt_exact, DenseFn, Fault, KernelFn};
use crate::capability::Capability;
use crate::dispatch::DispatchEntry;
use crate::dtype::Dtype;
use crate::metric::Metric;

/// NEON dot product for f32 vectors, 4 lanes per iteration.
#[target_feature(enable = "neon")]
unsafe fn inner_f32(a: &[f32], b: &[f32]) -> f64 {
    let len = a.len();
    let chunks = len / 4;
    let mut sum = vdupq_n_f32(0.0);
    for i in 0..chunks {
        let offset = i * 4;
        // SAFETY: offset + 4 <= chunks * 4 <= len
        let va = vld1q_f32(a.as_ptr().add(offset));
        let vb = vld1q_f32(b.as_ptr().add(offset));
        sum = vfmaq_f32(sum, va, vb);
    }
    let mut result = vaddvq_f32(sum);
    for i in chunks * 4..len {
        result += a[i] * b[i];
    }
    f64::from(result)
}

#[target_feature(enable = "neon")]
unsafe fn sqeuclidean_f32(a: &[f32], b: &[f32]) -> f64 {
    let len = a.len();
    let chunks = len / 4;
    let mut sum = vdupq_n_f32(0.0);
    for i in 0..chunks {
        let offset = i * 4;
        let diff = vsubq_f32(vld1q_f32(a.as_ptr().add(offset)), vld1q_f32(b.as_ptr().add(offset)));
        sum = vfmaq_f32(sum, diff, diff);
    }
    let mut result = vaddvq_f32(sum);
    for i in chunks * 4..len {
        let diff = a[i] - b[i];
        result += diff * diff;
    }
    f64::from(result)
}

/// Cosine over binary32 lanes widened to binary64 before the products.
#[target_feature(enable = "neon")]
unsafe fn cosine_f32(a: &[f32], b: &[f32]) -> Result<f64, Fault> {
    let len = a.len();
    let chunks = len / 4;
    let mut ab = vdupq_n_f64(0.0);
    let mut a2 = vdupq_n_f64(0.0);
    let mut b2 = vdupq_n_f64(0.0);
    for i in 0..chunks {
        let offset = i * 4;
        let va = vld1q_f32(a.as_ptr().add(offset));
        let vb = vld1q_f32(b.as_ptr().add(offset));
        let (a_lo, a_hi) = (vcvt_f64_f32(vget_low_f32(va)), vcvt_high_f64_f32(va));
        let (b_lo, b_hi) = (vcvt_f64_f32(vget_low_f32(vb)), vcvt_high_f64_f32(vb));
        ab = vfmaq_f64(vfmaq_f64(ab, a_lo, b_lo), a_hi, b_hi);
        a2 = vfmaq_f64(vfmaq_f64(a2, a_lo, a_lo), a_hi, a_hi);
        b2 = vfmaq_f64(vfmaq_f64(b2, b_lo, b_lo), b_hi, b_hi);
    }
    let (mut ab, mut a2, mut b2) = (vaddvq_f64(ab), vaddvq_f64(a2), vaddvq_f64(b2));
    for i in chunks * 4..len {
        let (x, y) = (f64::from(a[i]), f64::from(b[i]));
        ab += x * y;
        a2 += x * x;
        b2 += y * y;
    }
    cosine_distance(ab, a2, b2, rsqrt_approx)
}

#[target_feature(enable = "neon")]
unsafe fn inner_f64(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len();
    let chunks = len / 2;
    let mut sum = vdupq_n_f64(0.0);
    for i in 0..chunks {
        let offset = i * 2;
        sum = vfmaq_f64(sum, vld1q_f64(a.as_ptr().add(offset)), vld1q_f64(b.as_ptr().add(offset)));
    }
    let mut result = vaddvq_f64(sum);
    for i in chunks * 2..len {
        result += a[i] * b[i];
    }
    result
}

#[target_feature(enable = "neon")]
unsafe fn sqeuclidean_f64(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len();
    let chunks = len / 2;
    let mut sum = vdupq_n_f64(0.0);
    for i in 0..chunks {
        let offset = i * 2;
        let diff = vsubq_f64(vld1q_f64(a.as_ptr().add(offset)), vld1q_f64(b.as_ptr().add(offset)));
        sum = vfmaq_f64(sum, diff, diff);
    }
    let mut result = vaddvq_f64(sum);
    for i in chunks * 2..len {
        let diff = a[i] - b[i];
        result += diff * diff;
    }
    result
}

#[target_feature(enable = "neon")]
unsafe fn cosine_f64(a: &[f64], b: &[f64]) -> Result<f64, Fault> {
    let len = a.len();
    let chunks = len / 2;
    let mut ab = vdupq_n_f64(0.0);
    let mut a2 = vdupq_n_f64(0.0);
    let mut b2 = vdupq_n_f64(0.0);
    for i in 0..chunks {
        let offset = i * 2;
        let va = vld1q_f64(a.as_ptr().add(offset));
        let vb = vld1q_f64(b.as_ptr().add(offset));
        ab = vfmaq_f64(ab, va, vb);
        a2 = vfmaq_f64(a2, va, va);
        b2 = vfmaq_f64(b2, vb, vb);
    }
    let (mut ab, mut a2, mut b2) = (vaddvq_f64(ab), vaddvq_f64(a2), vaddvq_f64(b2));
    for i in chunks * 2..len {
        ab += a[i] * b[i];
        a2 += a[i] * a[i];
        b2 += b[i] * b[i];
    }
    cosine_distance(ab, a2, b2, rsqrt_exact)
}

#[derive(Clone, Copy)]
enum BitOp {
    Xor,
    And,
    Or,
}

/// Population count of `op(a, b)` over whole bytes, 16 bytes per iteration.
#[inline]
#[target_feature(enable = "neon")]
unsafe fn popcount_neon(a: &[u8], b: &[u8], op: BitOp) -> u64 {
    let len = a.len();
    let chunks = len / 16;
    let mut total = 0_u64;
    for i in 0..chunks {
        let offset = i * 16;
        let va = vld1q_u8(a.as_ptr().add(offset));
        let vb = vld1q_u8(b.as_ptr().add(offset));
        let bits = match op {
            BitOp::Xor => veorq_u8(va, vb),
            BitOp::And => vandq_u8(va, vb),
            BitOp::Or => vorrq_u8(va, vb),
        };
        total += u64::from(vaddlvq_u8(vcntq_u8(bits)));
    }
    for i in chunks * 16..len {
        let bits = match op {
            BitOp::Xor => a[i] ^ b[i],
            BitOp::And => a[i] & b[i],
            BitOp::Or => a[i] | b[i],
        };
        total += u64::from(bits.count_ones());
    }
    total
}

#[target_feature(enable = "neon")]
unsafe fn hamming_b8(a: &[u8], b: &[u8]) -> f64 {
    popcount_neon(a, b, BitOp::Xor) as f64
}

#[target_feature(enable = "neon")]
unsafe fn jaccard_b8(a: &[u8], b: &[u8]) -> f64 {
    let intersection = popcount_neon(a, b, BitOp::And);
    let union = popcount_neon(a, b, BitOp::Or);
    jaccard_from_counts(intersection, union)
}

dense_abi!(inner_f64_c: f64 => inner_f64);
dense_abi!(sqeuclidean_f64_c: f64 => sqeuclidean_f64);
dense_abi!(cosine_f64_c: f64 => cosine_f64);
dense_abi!(inner_f32_c: f32 => inner_f32);
dense_abi!(sqeuclidean_f32_c: f32 => sqeuclidean_f32);
dense_abi!(cosine_f32_c: f32 => cosine_f32);
dense_abi!(hamming_b8_c: u8 => hamming_b8);
dense_abi!(jaccard_b8_c: u8 => jaccard_b8);

/// Registers the NEON kernels.
pub(crate) fn register(entries: &mut Vec<DispatchEntry>) {
    let tier = Capability::Neon;
    let dot_family: [(Dtype, DenseFn, DenseFn, DenseFn); 2] = [
        (Dtype::F64, inner_f64_c, sqeuclidean_f64_c, cosine_f64_c),
        (Dtype::F32, inner_f32_c, sqeuclidean_f32_c, cosine_f32_c),
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
