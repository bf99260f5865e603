//! Borrowed, typed views over caller-owned buffers.
//!
//! Kernels never retain these views beyond a call. Complex vectors are stored
//! as interleaved `(re, im)` reals; their logical length is half the number of
//! stored reals. Bit-packed vectors have a logical length in bytes.

use std::ffi::c_void;

use half::slice::{HalfBitsSliceExt, HalfFloatSliceExt};
use half::{bf16, f16};

use crate::dtype::Dtype;
use crate::error::{Error, Result};

/// A typed view over one vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VectorRef<'a> {
    /// binary64 elements.
    F64(&'a [f64]),
    /// binary32 elements.
    F32(&'a [f32]),
    /// binary16 elements.
    F16(&'a [f16]),
    /// bf16 elements.
    BF16(&'a [bf16]),
    /// Signed bytes.
    I8(&'a [i8]),
    /// Packed bits, lane 0 in bit 0 of byte 0.
    B8(&'a [u8]),
    /// Interleaved binary32 pairs.
    Complex64(&'a [f32]),
    /// Interleaved binary64 pairs.
    Complex128(&'a [f64]),
    /// Sorted `u16` set.
    U16(&'a [u16]),
    /// Sorted `u32` set.
    U32(&'a [u32]),
}

macro_rules! impl_from_slice {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'a> From<&'a [$ty]> for VectorRef<'a> {
                fn from(values: &'a [$ty]) -> Self {
                    Self::$variant(values)
                }
            }

            impl<'a> From<&'a Vec<$ty>> for VectorRef<'a> {
                fn from(values: &'a Vec<$ty>) -> Self {
                    Self::$variant(values.as_slice())
                }
            }
        )*
    };
}

impl_from_slice! {
    f64 => F64,
    f32 => F32,
    f16 => F16,
    bf16 => BF16,
    i8 => I8,
    u16 => U16,
    u32 => U32,
}

fn even_length(stored: usize, dtype: Dtype) -> Result<()> {
    if stored % 2 == 0 {
        Ok(())
    } else {
        Err(Error::InvalidShape(format!(
            "{dtype} buffer needs an even number of reals, got {stored}"
        )))
    }
}

impl<'a> VectorRef<'a> {
    /// Wraps packed bits.
    #[must_use]
    pub fn bits(bytes: &'a [u8]) -> Self {
        Self::B8(bytes)
    }

    /// Wraps interleaved binary32 pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] when `reals` has odd length.
    pub fn complex64(reals: &'a [f32]) -> Result<Self> {
        even_length(reals.len(), Dtype::Complex64)?;
        Ok(Self::Complex64(reals))
    }

    /// Wraps interleaved binary64 pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] when `reals` has odd length.
    pub fn complex128(reals: &'a [f64]) -> Result<Self> {
        even_length(reals.len(), Dtype::Complex128)?;
        Ok(Self::Complex128(reals))
    }

    /// Element kind of the view.
    #[must_use]
    pub const fn dtype(&self) -> Dtype {
        match self {
            Self::F64(_) => Dtype::F64,
            Self::F32(_) => Dtype::F32,
            Self::F16(_) => Dtype::F16,
            Self::BF16(_) => Dtype::BF16,
            Self::I8(_) => Dtype::I8,
            Self::B8(_) => Dtype::B8,
            Self::Complex64(_) => Dtype::Complex64,
            Self::Complex128(_) => Dtype::Complex128,
            Self::U16(_) => Dtype::U16,
            Self::U32(_) => Dtype::U32,
        }
    }

    /// Number of stored scalars (reals for complex, bytes for `b8`).
    #[must_use]
    pub const fn stored_len(&self) -> usize {
        match self {
            Self::F64(v) | Self::Complex128(v) => v.len(),
            Self::F32(v) | Self::Complex64(v) => v.len(),
            Self::F16(v) => v.len(),
            Self::BF16(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::B8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    /// Logical length: complex pairs, packed bytes, or scalars.
    #[must_use]
    pub const fn len(&self) -> usize {
        if self.dtype().is_complex() {
            self.stored_len() / 2
        } else {
            self.stored_len()
        }
    }

    /// Returns true when the view holds no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw pointer to the first stored scalar.
    #[must_use]
    pub fn as_ptr(&self) -> *const c_void {
        match self {
            Self::F64(v) | Self::Complex128(v) => v.as_ptr().cast(),
            Self::F32(v) | Self::Complex64(v) => v.as_ptr().cast(),
            Self::F16(v) => v.as_ptr().cast(),
            Self::BF16(v) => v.as_ptr().cast(),
            Self::I8(v) => v.as_ptr().cast(),
            Self::B8(v) => v.as_ptr().cast(),
            Self::U16(v) => v.as_ptr().cast(),
            Self::U32(v) => v.as_ptr().cast(),
        }
    }

    /// Sub-view of `len` logical elements starting at logical index `start`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds; callers validate shapes first.
    #[must_use]
    pub fn slice(&self, start: usize, len: usize) -> VectorRef<'a> {
        match *self {
            Self::F64(v) => Self::F64(&v[start..start + len]),
            Self::F32(v) => Self::F32(&v[start..start + len]),
            Self::F16(v) => Self::F16(&v[start..start + len]),
            Self::BF16(v) => Self::BF16(&v[start..start + len]),
            Self::I8(v) => Self::I8(&v[start..start + len]),
            Self::B8(v) => Self::B8(&v[start..start + len]),
            Self::Complex64(v) => Self::Complex64(&v[2 * start..2 * (start + len)]),
            Self::Complex128(v) => Self::Complex128(&v[2 * start..2 * (start + len)]),
            Self::U16(v) => Self::U16(&v[start..start + len]),
            Self::U32(v) => Self::U32(&v[start..start + len]),
        }
    }

    /// Reinterprets the buffer as another dtype without copying.
    ///
    /// Supported overrides: raw `u16` bits as `f16`/`bf16` (and back, or
    /// between the two half formats), interleaved `f32` as `complex64`,
    /// interleaved `f64` as `complex128`, and complex back to its reals.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDtype`] for any other pair, and
    /// [`Error::InvalidShape`] when a real buffer has odd length for a
    /// complex override.
    pub fn with_dtype(self, target: Dtype) -> Result<VectorRef<'a>> {
        if self.dtype() == target {
            return Ok(self);
        }
        let half_bits: Option<&'a [u16]> = match self {
            Self::U16(v) => Some(v),
            Self::F16(v) => Some(v.reinterpret_cast()),
            Self::BF16(v) => Some(v.reinterpret_cast()),
            _ => None,
        };
        match (self, target, half_bits) {
            (_, Dtype::F16, Some(bits)) => Ok(Self::F16(bits.reinterpret_cast::<f16>())),
            (_, Dtype::BF16, Some(bits)) => Ok(Self::BF16(bits.reinterpret_cast::<bf16>())),
            (_, Dtype::U16, Some(bits)) => Ok(Self::U16(bits)),
            (Self::F32(v), Dtype::Complex64, _) => Self::complex64(v),
            (Self::F64(v), Dtype::Complex128, _) => Self::complex128(v),
            (Self::Complex64(v), Dtype::F32, _) => Ok(Self::F32(v)),
            (Self::Complex128(v), Dtype::F64, _) => Ok(Self::F64(v)),
            _ => Err(Error::UnsupportedDtype(format!(
                "cannot reinterpret {} as {target}",
                self.dtype()
            ))),
        }
    }
}

/// A row-major matrix of equal-length vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixRef<'a> {
    data: VectorRef<'a>,
    rows: usize,
    cols: usize,
    vector: bool,
}

impl<'a> MatrixRef<'a> {
    /// Wraps `data` as `rows × cols`, where `cols` is a logical length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if the buffer does not hold exactly
    /// `rows × cols` logical elements.
    pub fn new(data: impl Into<VectorRef<'a>>, rows: usize, cols: usize) -> Result<Self> {
        let data = data.into();
        let expected = rows
            .checked_mul(cols)
            .ok_or_else(|| Error::InvalidShape(format!("{rows} × {cols} overflows")))?;
        if data.len() != expected {
            return Err(Error::InvalidShape(format!(
                "{rows} × {cols} matrix needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            rows,
            cols,
            vector: false,
        })
    }

    /// Wraps a single vector as a one-row matrix.
    #[must_use]
    pub fn from_vector(data: impl Into<VectorRef<'a>>) -> Self {
        let data = data.into();
        Self {
            data,
            rows: 1,
            cols: data.len(),
            vector: true,
        }
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Logical length of each row.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Element kind.
    #[must_use]
    pub const fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    /// Returns true when built from a single vector rather than a matrix.
    #[must_use]
    pub const fn is_vector(&self) -> bool {
        self.vector
    }

    /// Backing buffer.
    #[must_use]
    pub const fn data(&self) -> VectorRef<'a> {
        self.data
    }

    /// Row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows`.
    #[must_use]
    pub fn row(&self, i: usize) -> VectorRef<'a> {
        assert!(i < self.rows, "row {i} out of bounds for {} rows", self.rows);
        self.data.slice(i * self.cols, self.cols)
    }

    /// Reinterprets the element dtype, keeping the row count.
    ///
    /// # Errors
    ///
    /// See [`VectorRef::with_dtype`]. Also fails if the reinterpretation
    /// changes the row length such that rows no longer tile the buffer.
    pub fn with_dtype(self, target: Dtype) -> Result<Self> {
        let data = self.data.with_dtype(target)?;
        if self.rows == 0 {
            return Ok(Self { data, ..self });
        }
        let total = data.len();
        if total % self.rows != 0 {
            return Err(Error::InvalidShape(format!(
                "{total} {target} elements do not split into {} rows",
                self.rows
            )));
        }
        Ok(Self {
            data,
            cols: total / self.rows,
            ..self
        })
    }
}
