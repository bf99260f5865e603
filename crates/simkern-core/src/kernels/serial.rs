//! Portable baseline kernels.
//!
//! Every supported (metric, dtype) pair has an implementation here. Wider
//! tiers only override the hot dense kernels; everything else resolves to
//! these. `f32` inner and sqeuclidean use the `wide` crate's 8-lane vectors
//! and accumulate in binary32; binary32-family cosine widens to binary64
//! lanes. Probability and matrix-weighted kernels always accumulate in
//! binary64.

use half::{bf16, f16};
use wide::{f32x8, f64x4};

use super::{
    complex_abi, cosine_distance, curved_abi, dense_abi, rsqrt_approx, rsqrt_exact, sparse_abi,
    CurvedFn, DenseFn, Fault, KernelFn, I8_MAX_LEN,
};
use crate::capability::Capability;
use crate::dispatch::DispatchEntry;
use crate::dtype::Dtype;
use crate::metric::Metric;

/// Relative slack under which a negative Mahalanobis form is treated as zero.
///
/// Rounding in `(a − b)ᵀ·M·(a − b)` can push a PSD form slightly below zero
/// when `a ≈ b`. Anything below `-TOLERANCE × Σ|terms|` is a genuine
/// domain violation.
pub const MAHALANOBIS_CLAMP_TOLERANCE: f64 = 1e-12;

/// Length ratio above which intersection switches to galloping search.
pub const GALLOP_RATIO: usize = 16;

/// Real element types the generic kernels accept.
pub(crate) trait Real: Copy {
    fn to_f32(self) -> f32;
    fn to_f64(self) -> f64;
}

impl Real for f64 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

impl Real for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Real for f16 {
    #[inline]
    fn to_f32(self) -> f32 {
        self.to_f32()
    }
    #[inline]
    fn to_f64(self) -> f64 {
        self.to_f64()
    }
}

impl Real for bf16 {
    #[inline]
    fn to_f32(self) -> f32 {
        self.to_f32()
    }
    #[inline]
    fn to_f64(self) -> f64 {
        self.to_f64()
    }
}

// =============================================================================
// binary64
// =============================================================================

#[inline]
fn lanes4(v: &[f64], offset: usize) -> f64x4 {
    f64x4::new([v[offset], v[offset + 1], v[offset + 2], v[offset + 3]])
}

/// Inner product of two `f64` vectors.
#[must_use]
pub fn inner_f64(a: &[f64], b: &[f64]) -> f64 {
    let simd_len = a.len() / 4;
    let mut sum = f64x4::ZERO;
    for i in 0..simd_len {
        let offset = i * 4;
        sum = lanes4(a, offset).mul_add(lanes4(b, offset), sum);
    }
    let mut result = sum.reduce_add();
    for i in simd_len * 4..a.len() {
        result += a[i] * b[i];
    }
    result
}

/// Squared Euclidean distance of two `f64` vectors.
#[must_use]
pub fn sqeuclidean_f64(a: &[f64], b: &[f64]) -> f64 {
    let simd_len = a.len() / 4;
    let mut sum = f64x4::ZERO;
    for i in 0..simd_len {
        let offset = i * 4;
        let diff = lanes4(a, offset) - lanes4(b, offset);
        sum = diff.mul_add(diff, sum);
    }
    let mut result = sum.reduce_add();
    for i in simd_len * 4..a.len() {
        let diff = a[i] - b[i];
        result += diff * diff;
    }
    result
}

/// Cosine distance of two `f64` vectors, exact normalization.
pub fn cosine_f64(a: &[f64], b: &[f64]) -> Result<f64, Fault> {
    let simd_len = a.len() / 4;
    let mut ab = f64x4::ZERO;
    let mut a2 = f64x4::ZERO;
    let mut b2 = f64x4::ZERO;
    for i in 0..simd_len {
        let offset = i * 4;
        let va = lanes4(a, offset);
        let vb = lanes4(b, offset);
        ab = va.mul_add(vb, ab);
        a2 = va.mul_add(va, a2);
        b2 = vb.mul_add(vb, b2);
    }
    let (mut ab, mut a2, mut b2) = (ab.reduce_add(), a2.reduce_add(), b2.reduce_add());
    for i in simd_len * 4..a.len() {
        ab += a[i] * b[i];
        a2 += a[i] * a[i];
        b2 += b[i] * b[i];
    }
    cosine_distance(ab, a2, b2, rsqrt_exact)
}

// =============================================================================
// binary32
// =============================================================================

/// Inner product of two `f32` vectors, binary32 accumulation.
#[must_use]
pub fn inner_f32(a: &[f32], b: &[f32]) -> f64 {
    let simd_len = a.len() / 8;
    let mut sum = f32x8::ZERO;
    for i in 0..simd_len {
        let offset = i * 8;
        let va = f32x8::from(&a[offset..offset + 8]);
        let vb = f32x8::from(&b[offset..offset + 8]);
        sum = va.mul_add(vb, sum);
    }
    let mut result = sum.reduce_add();
    for i in simd_len * 8..a.len() {
        result += a[i] * b[i];
    }
    f64::from(result)
}

/// Squared Euclidean distance of two `f32` vectors.
#[must_use]
pub fn sqeuclidean_f32(a: &[f32], b: &[f32]) -> f64 {
    let simd_len = a.len() / 8;
    let mut sum = f32x8::ZERO;
    for i in 0..simd_len {
        let offset = i * 8;
        let diff = f32x8::from(&a[offset..offset + 8]) - f32x8::from(&b[offset..offset + 8]);
        sum = diff.mul_add(diff, sum);
    }
    let mut result = sum.reduce_add();
    for i in simd_len * 8..a.len() {
        let diff = a[i] - b[i];
        result += diff * diff;
    }
    f64::from(result)
}

/// Cosine distance of two `f32` vectors.
///
/// Products accumulate in binary64 so the squared norms of large inputs stay
/// finite; normalization is approximate.
pub fn cosine_f32(a: &[f32], b: &[f32]) -> Result<f64, Fault> {
    cosine_widened(a, b)
}

// =============================================================================
// Half precision, widened to binary32
// =============================================================================

fn inner_widened<T: Real>(a: &[T], b: &[T]) -> f64 {
    let sum: f32 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| x.to_f32() * y.to_f32())
        .sum();
    f64::from(sum)
}

fn sqeuclidean_widened<T: Real>(a: &[T], b: &[T]) -> f64 {
    let sum: f32 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let diff = x.to_f32() - y.to_f32();
            diff * diff
        })
        .sum();
    f64::from(sum)
}

#[inline]
fn widened4<T: Real>(v: &[T], offset: usize) -> f64x4 {
    f64x4::new([
        v[offset].to_f64(),
        v[offset + 1].to_f64(),
        v[offset + 2].to_f64(),
        v[offset + 3].to_f64(),
    ])
}

fn cosine_widened<T: Real>(a: &[T], b: &[T]) -> Result<f64, Fault> {
    let simd_len = a.len() / 4;
    let mut ab = f64x4::ZERO;
    let mut a2 = f64x4::ZERO;
    let mut b2 = f64x4::ZERO;
    for i in 0..simd_len {
        let offset = i * 4;
        let va = widened4(a, offset);
        let vb = widened4(b, offset);
        ab = va.mul_add(vb, ab);
        a2 = va.mul_add(va, a2);
        b2 = vb.mul_add(vb, b2);
    }
    let (mut ab, mut a2, mut b2) = (ab.reduce_add(), a2.reduce_add(), b2.reduce_add());
    for (&x, &y) in a[simd_len * 4..].iter().zip(&b[simd_len * 4..]) {
        let (x, y) = (x.to_f64(), y.to_f64());
        ab += x * y;
        a2 += x * x;
        b2 += y * y;
    }
    cosine_distance(ab, a2, b2, rsqrt_approx)
}

// =============================================================================
// int8, exact integer accumulation
// =============================================================================

/// Inner product of two `i8` vectors. Exact.
#[must_use]
pub fn inner_i8(a: &[i8], b: &[i8]) -> f64 {
    let sum: i64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| i64::from(x) * i64::from(y))
        .sum();
    sum as f64
}

/// Squared Euclidean distance of two `i8` vectors. Exact.
#[must_use]
pub fn sqeuclidean_i8(a: &[i8], b: &[i8]) -> f64 {
    let sum: i64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let diff = i64::from(x) - i64::from(y);
            diff * diff
        })
        .sum();
    sum as f64
}

/// Cosine distance of two `i8` vectors from exact integer products.
pub fn cosine_i8(a: &[i8], b: &[i8]) -> Result<f64, Fault> {
    let (mut ab, mut a2, mut b2) = (0_i64, 0_i64, 0_i64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (i64::from(x), i64::from(y));
        ab += x * y;
        a2 += x * x;
        b2 += y * y;
    }
    cosine_distance(ab as f64, a2 as f64, b2 as f64, rsqrt_exact)
}

// =============================================================================
// Bit-packed booleans
// =============================================================================

#[inline]
pub(crate) fn popcount_zip(a: &[u8], b: &[u8], op: impl Fn(u64, u64) -> u64) -> u64 {
    let mut total = 0_u64;
    let mut words_a = a.chunks_exact(8);
    let mut words_b = b.chunks_exact(8);
    for (wa, wb) in words_a.by_ref().zip(words_b.by_ref()) {
        let mut xa = [0_u8; 8];
        let mut xb = [0_u8; 8];
        xa.copy_from_slice(wa);
        xb.copy_from_slice(wb);
        total += u64::from(op(u64::from_le_bytes(xa), u64::from_le_bytes(xb)).count_ones());
    }
    for (&x, &y) in words_a.remainder().iter().zip(words_b.remainder()) {
        total += u64::from(op(u64::from(x), u64::from(y)).count_ones());
    }
    total
}

/// Number of differing bits.
#[must_use]
pub fn hamming_b8(a: &[u8], b: &[u8]) -> f64 {
    popcount_zip(a, b, |x, y| x ^ y) as f64
}

/// Jaccard distance over bits; 0 when both sets are empty.
#[must_use]
pub fn jaccard_b8(a: &[u8], b: &[u8]) -> f64 {
    let intersection = popcount_zip(a, b, |x, y| x & y);
    let union = popcount_zip(a, b, |x, y| x | y);
    jaccard_from_counts(intersection, union)
}

#[inline]
pub(crate) fn jaccard_from_counts(intersection: u64, union: u64) -> f64 {
    if union == 0 {
        0.0
    } else {
        1.0 - intersection as f64 / union as f64
    }
}

// =============================================================================
// Probability divergences
// =============================================================================

fn kullbackleibler<T: Real>(p: &[T], q: &[T]) -> Result<f64, Fault> {
    let mut sum = 0.0_f64;
    for (&pi, &qi) in p.iter().zip(q) {
        let (pi, qi) = (pi.to_f64(), qi.to_f64());
        if !pi.is_finite() || !qi.is_finite() || pi < 0.0 || qi < 0.0 {
            return Err(Fault::Domain);
        }
        if pi == 0.0 {
            continue;
        }
        if qi == 0.0 {
            return Err(Fault::Domain);
        }
        sum += pi * (pi / qi).ln();
    }
    Ok(sum)
}

fn jensenshannon<T: Real>(p: &[T], q: &[T]) -> Result<f64, Fault> {
    let mut sum = 0.0_f64;
    for (&pi, &qi) in p.iter().zip(q) {
        let (pi, qi) = (pi.to_f64(), qi.to_f64());
        if !pi.is_finite() || !qi.is_finite() || pi < 0.0 || qi < 0.0 {
            return Err(Fault::Domain);
        }
        // Shares of p + q, halved first when the sum overflows.
        let (ps, qs) = if (pi + qi).is_finite() {
            (pi, qi)
        } else {
            (0.5 * pi, 0.5 * qi)
        };
        let total = ps + qs;
        if total > 0.0 {
            sum += midpoint_term(pi, ps / total) + midpoint_term(qi, qs / total);
        }
    }
    let divergence = 0.5 * sum;
    if divergence.is_nan() {
        return Err(Fault::Domain);
    }
    if divergence.is_infinite() {
        return Err(Fault::Overflow);
    }
    // Rounding can leave a tiny negative residue for p ≈ q.
    Ok(if divergence < 0.0 { 0.0 } else { divergence })
}

/// `x · ln(x / m)` with `m` the midpoint of `p` and `q`, given `share = x / (p + q)`.
#[inline]
fn midpoint_term(x: f64, share: f64) -> f64 {
    if x > 0.0 && share > 0.0 {
        x * (2.0 * share).ln()
    } else {
        0.0
    }
}

// =============================================================================
// Matrix-weighted
// =============================================================================

fn bilinear<T: Real>(a: &[T], b: &[T], m: &[T]) -> f64 {
    let n = a.len();
    let mut sum = 0.0_f64;
    for (i, &ai) in a.iter().enumerate() {
        let row = &m[i * n..(i + 1) * n];
        let partial: f64 = row
            .iter()
            .zip(b)
            .map(|(&mij, &bj)| mij.to_f64() * bj.to_f64())
            .sum();
        sum += ai.to_f64() * partial;
    }
    sum
}

fn mahalanobis<T: Real>(a: &[T], b: &[T], m: &[T]) -> Result<f64, Fault> {
    let n = a.len();
    let diff: Vec<f64> = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| x.to_f64() - y.to_f64())
        .collect();
    let mut form = 0.0_f64;
    let mut magnitude = 0.0_f64;
    for (i, &di) in diff.iter().enumerate() {
        let row = &m[i * n..(i + 1) * n];
        for (&mij, &dj) in row.iter().zip(&diff) {
            let term = di * mij.to_f64() * dj;
            form += term;
            magnitude += term.abs();
        }
    }
    mahalanobis_root(form, magnitude)
}

/// Square root of a Mahalanobis form, clamping rounding noise below zero.
pub(crate) fn mahalanobis_root(form: f64, magnitude: f64) -> Result<f64, Fault> {
    if form.is_nan() {
        return Err(Fault::Domain);
    }
    if form >= 0.0 {
        return Ok(form.sqrt());
    }
    if -form <= MAHALANOBIS_CLAMP_TOLERANCE * magnitude {
        Ok(0.0)
    } else {
        Err(Fault::Domain)
    }
}

// =============================================================================
// Complex
// =============================================================================

fn complex_dot<T: Real>(a: &[T], b: &[T]) -> [f64; 2] {
    let (mut re, mut im) = (0.0_f64, 0.0_f64);
    for (x, y) in a.chunks_exact(2).zip(b.chunks_exact(2)) {
        let (ar, ai) = (x[0].to_f64(), x[1].to_f64());
        let (br, bi) = (y[0].to_f64(), y[1].to_f64());
        re += ar * br - ai * bi;
        im += ar * bi + ai * br;
    }
    [re, im]
}

fn complex_vdot<T: Real>(a: &[T], b: &[T]) -> [f64; 2] {
    let (mut re, mut im) = (0.0_f64, 0.0_f64);
    for (x, y) in a.chunks_exact(2).zip(b.chunks_exact(2)) {
        let (ar, ai) = (x[0].to_f64(), x[1].to_f64());
        let (br, bi) = (y[0].to_f64(), y[1].to_f64());
        re += ar * br + ai * bi;
        im += ar * bi - ai * br;
    }
    [re, im]
}

// =============================================================================
// Sorted sets
// =============================================================================

/// Counts common elements of two sorted, duplicate-free sets.
///
/// Unsorted input or duplicates give an unspecified count; this is a
/// precondition, not a checked error. Uses a linear merge unless one side is
/// more than [`GALLOP_RATIO`] times longer, in which case each element of the
/// shorter side is located by exponential then binary search.
#[must_use]
pub fn intersect<T: Ord + Copy>(a: &[T], b: &[T]) -> f64 {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return 0.0;
    }
    let count = if long.len() / short.len() > GALLOP_RATIO {
        intersect_galloping(short, long)
    } else {
        intersect_merge(short, long)
    };
    count as f64
}

fn intersect_merge<T: Ord + Copy>(a: &[T], b: &[T]) -> usize {
    let (mut i, mut j, mut count) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}

fn intersect_galloping<T: Ord + Copy>(short: &[T], long: &[T]) -> usize {
    let mut base = 0;
    let mut count = 0;
    for x in short {
        let rest = &long[base..];
        if rest.is_empty() {
            break;
        }
        let mut bound = 1;
        while bound < rest.len() && rest[bound] < *x {
            bound *= 2;
        }
        let lo = bound / 2;
        let hi = (bound + 1).min(rest.len());
        match rest[lo..hi].binary_search(x) {
            Ok(pos) => {
                count += 1;
                base += lo + pos + 1;
            }
            Err(pos) => base += lo + pos,
        }
    }
    count
}

// =============================================================================
// Entry points
// =============================================================================

dense_abi!(inner_f64_c: f64 => inner_f64);
dense_abi!(sqeuclidean_f64_c: f64 => sqeuclidean_f64);
dense_abi!(cosine_f64_c: f64 => cosine_f64);
dense_abi!(jensenshannon_f64_c: f64 => jensenshannon);
dense_abi!(kullbackleibler_f64_c: f64 => kullbackleibler);

dense_abi!(inner_f32_c: f32 => inner_f32);
dense_abi!(sqeuclidean_f32_c: f32 => sqeuclidean_f32);
dense_abi!(cosine_f32_c: f32 => cosine_f32);
dense_abi!(jensenshannon_f32_c: f32 => jensenshannon);
dense_abi!(kullbackleibler_f32_c: f32 => kullbackleibler);

dense_abi!(inner_f16_c: f16 => inner_widened);
dense_abi!(sqeuclidean_f16_c: f16 => sqeuclidean_widened);
dense_abi!(cosine_f16_c: f16 => cosine_widened);
dense_abi!(jensenshannon_f16_c: f16 => jensenshannon);
dense_abi!(kullbackleibler_f16_c: f16 => kullbackleibler);

dense_abi!(inner_bf16_c: bf16 => inner_widened);
dense_abi!(sqeuclidean_bf16_c: bf16 => sqeuclidean_widened);
dense_abi!(cosine_bf16_c: bf16 => cosine_widened);
dense_abi!(jensenshannon_bf16_c: bf16 => jensenshannon);
dense_abi!(kullbackleibler_bf16_c: bf16 => kullbackleibler);

dense_abi!(inner_i8_c: i8 => inner_i8, max = I8_MAX_LEN);
dense_abi!(sqeuclidean_i8_c: i8 => sqeuclidean_i8, max = I8_MAX_LEN);
dense_abi!(cosine_i8_c: i8 => cosine_i8, max = I8_MAX_LEN);

dense_abi!(hamming_b8_c: u8 => hamming_b8);
dense_abi!(jaccard_b8_c: u8 => jaccard_b8);

complex_abi!(dot_complex64_c: f32 => complex_dot);
complex_abi!(vdot_complex64_c: f32 => complex_vdot);
complex_abi!(dot_complex128_c: f64 => complex_dot);
complex_abi!(vdot_complex128_c: f64 => complex_vdot);

curved_abi!(bilinear_f64_c: f64 => bilinear);
curved_abi!(mahalanobis_f64_c: f64 => mahalanobis);
curved_abi!(bilinear_f32_c: f32 => bilinear);
curved_abi!(mahalanobis_f32_c: f32 => mahalanobis);
curved_abi!(bilinear_f16_c: f16 => bilinear);
curved_abi!(mahalanobis_f16_c: f16 => mahalanobis);
curved_abi!(bilinear_bf16_c: bf16 => bilinear);
curved_abi!(mahalanobis_bf16_c: bf16 => mahalanobis);

sparse_abi!(intersect_u16_c: u16 => intersect);
sparse_abi!(intersect_u32_c: u32 => intersect);

/// Registers every baseline kernel.
pub(crate) fn register(entries: &mut Vec<DispatchEntry>) {
    use KernelFn::{Complex, Curved, Dense, Sparse};
    use Metric::{
        Bilinear, Cosine, Dot, Hamming, Inner, Intersect, Jaccard, JensenShannon,
        KullbackLeibler, Mahalanobis, SqEuclidean, VDot,
    };

    let tier = Capability::Serial;
    let mut add = |metric: Metric, dtype: Dtype, kernel: KernelFn| {
        entries.push(DispatchEntry::new(metric, dtype, tier, kernel));
    };

    let dot_family: [(Dtype, DenseFn, DenseFn, DenseFn); 5] = [
        (Dtype::F64, inner_f64_c, sqeuclidean_f64_c, cosine_f64_c),
        (Dtype::F32, inner_f32_c, sqeuclidean_f32_c, cosine_f32_c),
        (Dtype::F16, inner_f16_c, sqeuclidean_f16_c, cosine_f16_c),
        (Dtype::BF16, inner_bf16_c, sqeuclidean_bf16_c, cosine_bf16_c),
        (Dtype::I8, inner_i8_c, sqeuclidean_i8_c, cosine_i8_c),
    ];
    for (dtype, inner, sqeuclidean, cosine) in dot_family {
        add(Inner, dtype, Dense(inner));
        // Conjugation is the identity on reals.
        add(Dot, dtype, Dense(inner));
        add(VDot, dtype, Dense(inner));
        add(SqEuclidean, dtype, Dense(sqeuclidean));
        add(Cosine, dtype, Dense(cosine));
    }

    let divergences: [(Dtype, DenseFn, DenseFn); 4] = [
        (Dtype::F64, jensenshannon_f64_c, kullbackleibler_f64_c),
        (Dtype::F32, jensenshannon_f32_c, kullbackleibler_f32_c),
        (Dtype::F16, jensenshannon_f16_c, kullbackleibler_f16_c),
        (Dtype::BF16, jensenshannon_bf16_c, kullbackleibler_bf16_c),
    ];
    for (dtype, js, kl) in divergences {
        add(JensenShannon, dtype, Dense(js));
        add(KullbackLeibler, dtype, Dense(kl));
    }

    let curved: [(Dtype, CurvedFn, CurvedFn); 4] = [
        (Dtype::F64, bilinear_f64_c, mahalanobis_f64_c),
        (Dtype::F32, bilinear_f32_c, mahalanobis_f32_c),
        (Dtype::F16, bilinear_f16_c, mahalanobis_f16_c),
        (Dtype::BF16, bilinear_bf16_c, mahalanobis_bf16_c),
    ];
    for (dtype, bilinear, mahalanobis) in curved {
        add(Bilinear, dtype, Curved(bilinear));
        add(Mahalanobis, dtype, Curved(mahalanobis));
    }

    add(Hamming, Dtype::B8, Dense(hamming_b8_c));
    add(Jaccard, Dtype::B8, Dense(jaccard_b8_c));

    add(Dot, Dtype::Complex64, Complex(dot_complex64_c));
    add(VDot, Dtype::Complex64, Complex(vdot_complex64_c));
    add(Dot, Dtype::Complex128, Complex(dot_complex128_c));
    add(VDot, Dtype::Complex128, Complex(vdot_complex128_c));

    add(Intersect, Dtype::U16, Sparse(intersect_u16_c));
    add(Intersect, Dtype::U32, Sparse(intersect_u32_c));
}
