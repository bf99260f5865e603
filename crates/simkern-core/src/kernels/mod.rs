//! Metric kernels and their C-compatible entry points.
//!
//! Every kernel is exposed through one of three `extern "C"` signatures so a
//! resolved kernel can be handed to native consumers as a raw address. All
//! entry points write `f64` results through `out` and return a status code.
//!
//! | Family  | Signature                                  | Results |
//! |---------|--------------------------------------------|---------|
//! | dense   | `(a, b, n, out)`                           | 1       |
//! | complex | `(a, b, n, out)`, `n` complex pairs        | 2       |
//! | curved  | `(a, b, m, n, out)`, `m` is `n × n`        | 1       |
//! | sparse  | `(a, b, a_len, b_len, out)`                | 1       |
//!
//! `n` is a logical length: packed bytes for `b8`, pairs for complex.
//!
//! # Safety contract
//!
//! Callers of a raw entry point must pass pointers to at least the stated
//! number of elements of the kernel's dtype, properly aligned, and a writable
//! `out` with room for the stated number of results. The entry point reads
//! nothing else and writes `out` only on success.

use std::ffi::c_void;

pub mod serial;

#[cfg(target_arch = "x86_64")]
pub mod haswell;
#[cfg(target_arch = "x86_64")]
pub mod ice;
#[cfg(target_arch = "aarch64")]
pub mod neon;
#[cfg(target_arch = "x86_64")]
pub mod skylake;

/// Version of the entry-point signatures below.
pub const ABI_VERSION: u32 = 1;

/// The result was written to `out`.
pub const STATUS_OK: i32 = 0;
/// The metric is undefined for the input; `out` is untouched.
pub const STATUS_DOMAIN: i32 = 1;
/// The true result cannot be represented; `out` is untouched.
pub const STATUS_OVERFLOW: i32 = 2;

/// Longest `i8` vector whose sums stay exact in an `f64` result.
///
/// Squared differences of `i8` values are below 2^16, so 2^37 of them stay
/// within the 53-bit mantissa.
pub const I8_MAX_LEN: u64 = 1 << 37;

/// Entry point for dense and complex kernels.
pub type DenseFn = unsafe extern "C" fn(*const c_void, *const c_void, usize, *mut f64) -> i32;

/// Entry point for matrix-weighted kernels.
pub type CurvedFn =
    unsafe extern "C" fn(*const c_void, *const c_void, *const c_void, usize, *mut f64) -> i32;

/// Entry point for set-intersection kernels.
pub type SparseFn =
    unsafe extern "C" fn(*const c_void, *const c_void, usize, usize, *mut f64) -> i32;

/// A kernel entry point tagged with its signature family.
#[derive(Clone, Copy)]
pub enum KernelFn {
    /// One real result.
    Dense(DenseFn),
    /// Two results: real and imaginary parts.
    Complex(DenseFn),
    /// Matrix-weighted, one real result.
    Curved(CurvedFn),
    /// Two sorted sets, one count.
    Sparse(SparseFn),
}

impl KernelFn {
    /// Raw address of the entry point.
    #[must_use]
    pub fn address(self) -> usize {
        match self {
            Self::Dense(f) | Self::Complex(f) => f as usize,
            Self::Curved(f) => f as usize,
            Self::Sparse(f) => f as usize,
        }
    }

    /// Number of `f64` values the entry point writes.
    #[must_use]
    pub const fn outputs(self) -> usize {
        match self {
            Self::Complex(_) => 2,
            _ => 1,
        }
    }
}

impl std::fmt::Debug for KernelFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let family = match self {
            Self::Dense(_) => "Dense",
            Self::Complex(_) => "Complex",
            Self::Curved(_) => "Curved",
            Self::Sparse(_) => "Sparse",
        };
        write!(f, "{family}({:#x})", self.address())
    }
}

/// Why a kernel refused to produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Mathematical precondition violated.
    Domain,
    /// Result not representable.
    Overflow,
}

impl Fault {
    const fn status(self) -> i32 {
        match self {
            Self::Domain => STATUS_DOMAIN,
            Self::Overflow => STATUS_OVERFLOW,
        }
    }
}

/// Kernel return values that map onto a status code.
pub(crate) trait Outcome {
    fn into_result(self) -> Result<f64, Fault>;
}

impl Outcome for f64 {
    #[inline]
    fn into_result(self) -> Result<f64, Fault> {
        Ok(self)
    }
}

impl Outcome for Result<f64, Fault> {
    #[inline]
    fn into_result(self) -> Result<f64, Fault> {
        self
    }
}

/// Borrows `len` elements at `ptr`, or an empty slice when `len == 0`.
///
/// # Safety
///
/// When `len > 0`, `ptr` must point to `len` initialized, aligned `T`.
#[inline]
pub(crate) unsafe fn view<'a, T>(ptr: *const c_void, len: usize) -> &'a [T] {
    if len == 0 || ptr.is_null() {
        &[]
    } else {
        // SAFETY: guaranteed by the caller.
        unsafe { std::slice::from_raw_parts(ptr.cast::<T>(), len) }
    }
}

/// Writes a kernel outcome through `out`.
///
/// # Safety
///
/// `out` must be valid for one `f64` write.
#[inline]
pub(crate) unsafe fn finish(outcome: impl Outcome, out: *mut f64) -> i32 {
    match outcome.into_result() {
        Ok(value) => {
            // SAFETY: guaranteed by the caller.
            unsafe { out.write(value) };
            STATUS_OK
        }
        Err(fault) => fault.status(),
    }
}

/// Declares a dense `extern "C"` entry point around a slice kernel.
///
/// The optional `max` bounds `n` before any memory is touched.
macro_rules! dense_abi {
    ($name:ident: $elem:ty => $kernel:path) => {
        $crate::kernels::dense_abi!(@emit $name: $elem => $kernel, |_n: usize| true);
    };
    ($name:ident: $elem:ty => $kernel:path, max = $max:expr) => {
        $crate::kernels::dense_abi!(@emit $name: $elem => $kernel, |n: usize| n as u64 <= $max);
    };
    (@emit $name:ident: $elem:ty => $kernel:path, $fits:expr) => {
        pub(crate) unsafe extern "C" fn $name(
            a: *const ::std::ffi::c_void,
            b: *const ::std::ffi::c_void,
            n: usize,
            out: *mut f64,
        ) -> i32 {
            if !($fits)(n) {
                return $crate::kernels::STATUS_OVERFLOW;
            }
            // SAFETY: the ABI contract guarantees `n` readable elements and a writable `out`.
            unsafe {
                let a = $crate::kernels::view::<$elem>(a, n);
                let b = $crate::kernels::view::<$elem>(b, n);
                $crate::kernels::finish($kernel(a, b), out)
            }
        }
    };
}

/// Declares a complex `extern "C"` entry point; `n` counts pairs.
macro_rules! complex_abi {
    ($name:ident: $elem:ty => $kernel:path) => {
        pub(crate) unsafe extern "C" fn $name(
            a: *const ::std::ffi::c_void,
            b: *const ::std::ffi::c_void,
            n: usize,
            out: *mut f64,
        ) -> i32 {
            let Some(reals) = n.checked_mul(2) else {
                return $crate::kernels::STATUS_OVERFLOW;
            };
            // SAFETY: the ABI contract guarantees `2n` readable reals and two writable results.
            unsafe {
                let a = $crate::kernels::view::<$elem>(a, reals);
                let b = $crate::kernels::view::<$elem>(b, reals);
                let [re, im] = $kernel(a, b);
                out.write(re);
                out.add(1).write(im);
            }
            $crate::kernels::STATUS_OK
        }
    };
}

/// Declares a curved `extern "C"` entry point; `m` holds `n × n` elements.
macro_rules! curved_abi {
    ($name:ident: $elem:ty => $kernel:path) => {
        pub(crate) unsafe extern "C" fn $name(
            a: *const ::std::ffi::c_void,
            b: *const ::std::ffi::c_void,
            m: *const ::std::ffi::c_void,
            n: usize,
            out: *mut f64,
        ) -> i32 {
            let Some(cells) = n.checked_mul(n) else {
                return $crate::kernels::STATUS_OVERFLOW;
            };
            // SAFETY: the ABI contract guarantees `n` and `n × n` readable elements.
            unsafe {
                let a = $crate::kernels::view::<$elem>(a, n);
                let b = $crate::kernels::view::<$elem>(b, n);
                let m = $crate::kernels::view::<$elem>(m, cells);
                $crate::kernels::finish($kernel(a, b, m), out)
            }
        }
    };
}

/// Declares a sparse `extern "C"` entry point over two sorted sets.
macro_rules! sparse_abi {
    ($name:ident: $elem:ty => $kernel:path) => {
        pub(crate) unsafe extern "C" fn $name(
            a: *const ::std::ffi::c_void,
            b: *const ::std::ffi::c_void,
            a_len: usize,
            b_len: usize,
            out: *mut f64,
        ) -> i32 {
            // SAFETY: the ABI contract guarantees `a_len` and `b_len` readable elements.
            unsafe {
                let a = $crate::kernels::view::<$elem>(a, a_len);
                let b = $crate::kernels::view::<$elem>(b, b_len);
                $crate::kernels::finish($kernel(a, b), out)
            }
        }
    };
}

pub(crate) use {complex_abi, curved_abi, dense_abi, sparse_abi};

/// Turns the three dot products of a cosine kernel into a distance.
///
/// Identical inputs give exactly 0; a zero vector against a non-zero one
/// gives 1; two zero vectors give 0. `rsqrt` is the normalization used by
/// the calling tier.
///
/// A NaN sum is a [`Fault::Domain`]; an infinite one means the squared norms
/// left the binary64 range and is a [`Fault::Overflow`].
#[inline]
pub(crate) fn cosine_distance(
    ab: f64,
    a2: f64,
    b2: f64,
    rsqrt: impl Fn(f64) -> f64,
) -> Result<f64, Fault> {
    if ab.is_nan() || a2.is_nan() || b2.is_nan() {
        return Err(Fault::Domain);
    }
    if !(ab.is_finite() && a2.is_finite() && b2.is_finite()) {
        return Err(Fault::Overflow);
    }
    if a2 == 0.0 && b2 == 0.0 {
        return Ok(0.0);
    }
    if a2 == 0.0 || b2 == 0.0 {
        return Ok(1.0);
    }
    if ab == a2 && ab == b2 {
        return Ok(0.0);
    }
    Ok((1.0 - ab * rsqrt(a2) * rsqrt(b2)).clamp(0.0, 2.0))
}

/// Exact reciprocal square root.
#[inline]
pub(crate) fn rsqrt_exact(x: f64) -> f64 {
    1.0 / x.sqrt()
}

/// Fast inverse square root refined with two Newton-Raphson steps.
///
/// Relative error stays below 1e-5 for normal inputs.
#[inline]
#[must_use]
pub fn fast_rsqrt(x: f32) -> f32 {
    let i = 0x5f37_5a86_u32.wrapping_sub(x.to_bits() >> 1);
    let mut y = f32::from_bits(i);
    let half_x = 0.5 * x;
    y *= 1.5 - half_x * y * y;
    y *= 1.5 - half_x * y * y;
    y
}

/// Approximate reciprocal square root used by binary32-family kernels.
#[inline]
pub(crate) fn rsqrt_approx(x: f64) -> f64 {
    let narrow = x as f32;
    if narrow.is_normal() {
        f64::from(fast_rsqrt(narrow))
    } else {
        rsqrt_exact(x)
    }
}
