//! AVX-512 VPOPCNTDQ kernels (`ice` tier) for bit-packed vectors.

#![allow(clippy::wildcard_imports)]

use std::arch::x86_64::*;

use super::serial::{jaccard_from_counts, popcount_zip};
use super::{dense_abi, KernelFn};
use crate::capability::Capability;
use crate::dispatch::DispatchEntry;
use crate::dtype::Dtype;
use crate::metric::Metric;

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn load_block(v: &[u8], offset: usize) -> __m512i {
    _mm512_loadu_epi64(v.as_ptr().add(offset).cast())
}

#[target_feature(enable = "avx512f,avx512vpopcntdq")]
unsafe fn hamming_b8(a: &[u8], b: &[u8]) -> f64 {
    let blocks = a.len() / 64;
    let mut counts = _mm512_setzero_si512();
    for i in 0..blocks {
        let offset = i * 64;
        let diff = _mm512_xor_si512(load_block(a, offset), load_block(b, offset));
        counts = _mm512_add_epi64(counts, _mm512_popcnt_epi64(diff));
    }
    let tail = blocks * 64;
    let total = _mm512_reduce_add_epi64(counts) as u64 + popcount_zip(&a[tail..], &b[tail..], |x, y| x ^ y);
    total as f64
}

#[target_feature(enable = "avx512f,avx512vpopcntdq")]
unsafe fn jaccard_b8(a: &[u8], b: &[u8]) -> f64 {
    let blocks = a.len() / 64;
    let mut and_counts = _mm512_setzero_si512();
    let mut or_counts = _mm512_setzero_si512();
    for i in 0..blocks {
        let offset = i * 64;
        let va = load_block(a, offset);
        let vb = load_block(b, offset);
        and_counts = _mm512_add_epi64(and_counts, _mm512_popcnt_epi64(_mm512_and_si512(va, vb)));
        or_counts = _mm512_add_epi64(or_counts, _mm512_popcnt_epi64(_mm512_or_si512(va, vb)));
    }
    let tail = blocks * 64;
    let intersection = _mm512_reduce_add_epi64(and_counts) as u64
        + popcount_zip(&a[tail..], &b[tail..], |x, y| x & y);
    let union = _mm512_reduce_add_epi64(or_counts) as u64
        + popcount_zip(&a[tail..], &b[tail..], |x, y| x | y);
    jaccard_from_counts(intersection, union)
}

dense_abi!(hamming_b8_c: u8 => hamming_b8);
dense_abi!(jaccard_b8_c: u8 => jaccard_b8);

/// Registers the VPOPCNTDQ kernels.
pub(crate) fn register(entries: &mut Vec<DispatchEntry>) {
    let tier = Capability::Ice;
    entries.push(DispatchEntry::new(Metric::Hamming, Dtype::B8, tier, KernelFn::Dense(hamming_b8_c)));
    entries.push(DispatchEntry::new(Metric::Jaccard, Dtype::B8, tier, KernelFn::Dense(jaccard_b8_c)));
}
