//! Half-precision and bit-packed conversions used at the binding boundary.
//!
//! # Formats
//!
//! - **f16**: IEEE 754 half precision, converted with the `half` crate.
//! - **bf16**: the upper 16 bits of a binary32. Conversion from `f32` adds
//!   `0x8000` to the bit pattern before truncating, which is the layout the
//!   kernels accept and emit.
//! - **b8**: 8 boolean lanes per byte, lane `i` stored in bit `i % 8` of byte
//!   `i / 8` (bit 0 is the least significant bit).
//!
//! ```rust
//! use simkern_core::half_precision::{bf16_bits_to_f32, f32_to_bf16_bits};
//!
//! assert_eq!(f32_to_bf16_bits(1.0), 0x3F80);
//! assert_eq!(bf16_bits_to_f32(0x3F80), 1.0);
//! ```

use half::{bf16, f16};

/// Converts an `f32` to a bf16 bit pattern, rounding by adding `0x8000`.
#[inline]
#[must_use]
pub fn f32_to_bf16_bits(value: f32) -> u16 {
    (value.to_bits().wrapping_add(0x8000) >> 16) as u16
}

/// Converts an `f32` to [`bf16`] with the same rounding as [`f32_to_bf16_bits`].
#[inline]
#[must_use]
pub fn f32_to_bf16(value: f32) -> bf16 {
    bf16::from_bits(f32_to_bf16_bits(value))
}

/// Widens a bf16 bit pattern to `f32`. Exact.
#[inline]
#[must_use]
pub fn bf16_bits_to_f32(bits: u16) -> f32 {
    f32::from_bits(u32::from(bits) << 16)
}

/// Widens a [`bf16`] to `f32`. Exact.
#[inline]
#[must_use]
pub fn bf16_to_f32(value: bf16) -> f32 {
    bf16_bits_to_f32(value.to_bits())
}

/// Converts an `f32` to an f16 bit pattern (round to nearest even).
#[inline]
#[must_use]
pub fn f32_to_f16_bits(value: f32) -> u16 {
    f16::from_f32(value).to_bits()
}

/// Widens an f16 bit pattern to `f32`. Exact.
#[inline]
#[must_use]
pub fn f16_bits_to_f32(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// Converts a slice of `f32` into bf16 values.
#[must_use]
pub fn f32_slice_to_bf16(values: &[f32]) -> Vec<bf16> {
    values.iter().copied().map(f32_to_bf16).collect()
}

/// Converts a slice of `f32` into f16 values.
#[must_use]
pub fn f32_slice_to_f16(values: &[f32]) -> Vec<f16> {
    values.iter().copied().map(f16::from_f32).collect()
}

/// Packs booleans into bytes, lane 0 in bit 0 of byte 0.
///
/// The last byte is zero-padded when `bits.len()` is not a multiple of 8.
#[must_use]
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (i, &set)| byte | (u8::from(set) << i))
        })
        .collect()
}

/// Unpacks bytes into `len` booleans, the inverse of [`pack_bits`].
///
/// Lanes beyond the available bytes are reported as `false`.
#[must_use]
pub fn unpack_bits(bytes: &[u8], len: usize) -> Vec<bool> {
    (0..len)
        .map(|i| bytes.get(i / 8).is_some_and(|&byte| (byte >> (i % 8)) & 1 == 1))
        .collect()
}
