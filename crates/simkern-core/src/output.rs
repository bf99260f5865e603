//! Kernel results and their cast to a requested output dtype.
//!
//! Kernels always produce `f64` values (pairs for complex metrics). The cast
//! to the caller's output dtype happens afterwards and never changes the
//! accumulation precision. Narrow integer outputs fail loudly instead of
//! wrapping.

use std::fmt;

use half::{bf16, f16};
use serde::Serialize;

use crate::dtype::OutputDtype;
use crate::error::{Error, Result};
use crate::half_precision::f32_to_bf16;

/// Value returned by a single kernel call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Real result.
    Real(f64),
    /// Complex result of `dot`/`vdot` over complex dtypes.
    Complex {
        /// Real part.
        re: f64,
        /// Imaginary part.
        im: f64,
    },
}

impl Scalar {
    /// Real part.
    #[must_use]
    pub const fn re(self) -> f64 {
        match self {
            Self::Real(v) | Self::Complex { re: v, .. } => v,
        }
    }

    /// Imaginary part, zero for real results.
    #[must_use]
    pub const fn im(self) -> f64 {
        match self {
            Self::Real(_) => 0.0,
            Self::Complex { im, .. } => im,
        }
    }

    /// Returns true for complex results.
    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex { .. })
    }

    /// The real value, or an error for complex results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDtype`] for a complex result.
    pub fn real(self) -> Result<f64> {
        match self {
            Self::Real(v) => Ok(v),
            Self::Complex { .. } => Err(Error::UnsupportedDtype(
                "complex result cannot be read as a real value".to_string(),
            )),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Real(v) => write!(f, "{v}"),
            Self::Complex { re, im } if im < 0.0 => write!(f, "{re}-{}j", -im),
            Self::Complex { re, im } => write!(f, "{re}+{im}j"),
        }
    }
}

/// Typed result buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum Values {
    /// binary64 results.
    F64(Vec<f64>),
    /// binary32 results.
    F32(Vec<f32>),
    /// binary16 results.
    F16(Vec<f16>),
    /// bf16 results.
    BF16(Vec<bf16>),
    /// Signed 32-bit results.
    I32(Vec<i32>),
    /// Signed 8-bit results.
    I8(Vec<i8>),
    /// Unsigned 8-bit results.
    U8(Vec<u8>),
    /// `(re, im)` binary32 pairs.
    Complex64(Vec<[f32; 2]>),
    /// `(re, im)` binary64 pairs.
    Complex128(Vec<[f64; 2]>),
}

/// 2^63, the first magnitude `i64` cannot hold.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn to_integer<T: TryFrom<i64>>(value: f64, out: OutputDtype) -> Result<T> {
    if value.is_nan() {
        return Err(Error::NumericalDomain(format!("NaN cannot be cast to {out}")));
    }
    let truncated = value.trunc();
    // Anything outside i64 is certainly outside the narrow target.
    if !(-I64_BOUND..I64_BOUND).contains(&truncated) {
        return Err(Error::Overflow(format!("{value} does not fit in {out}")));
    }
    T::try_from(truncated as i64)
        .map_err(|_| Error::Overflow(format!("{value} does not fit in {out}")))
}

fn reals(scalars: &[Scalar], out: OutputDtype) -> Result<impl Iterator<Item = f64> + '_> {
    if let Some(complex) = scalars.iter().find(|s| s.is_complex()) {
        return Err(Error::UnsupportedDtype(format!(
            "complex result {complex} cannot be cast to real output {out}"
        )));
    }
    Ok(scalars.iter().map(|s| s.re()))
}

impl Values {
    /// Casts kernel results to `out`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedDtype`] when a complex result is cast to a real output
    /// - [`Error::NumericalDomain`] when NaN is cast to an integer
    /// - [`Error::Overflow`] when an integer output cannot hold a value
    pub fn cast(scalars: &[Scalar], out: OutputDtype) -> Result<Self> {
        Ok(match out {
            OutputDtype::F64 => Self::F64(reals(scalars, out)?.collect()),
            OutputDtype::F32 => Self::F32(reals(scalars, out)?.map(|v| v as f32).collect()),
            OutputDtype::F16 => Self::F16(reals(scalars, out)?.map(f16::from_f64).collect()),
            OutputDtype::BF16 => {
                Self::BF16(reals(scalars, out)?.map(|v| f32_to_bf16(v as f32)).collect())
            }
            OutputDtype::I32 => Self::I32(
                reals(scalars, out)?
                    .map(|v| to_integer(v, out))
                    .collect::<Result<_>>()?,
            ),
            OutputDtype::I8 => Self::I8(
                reals(scalars, out)?
                    .map(|v| to_integer(v, out))
                    .collect::<Result<_>>()?,
            ),
            OutputDtype::U8 => Self::U8(
                reals(scalars, out)?
                    .map(|v| to_integer(v, out))
                    .collect::<Result<_>>()?,
            ),
            OutputDtype::Complex64 => Self::Complex64(
                scalars
                    .iter()
                    .map(|s| [s.re() as f32, s.im() as f32])
                    .collect(),
            ),
            OutputDtype::Complex128 => {
                Self::Complex128(scalars.iter().map(|s| [s.re(), s.im()]).collect())
            }
        })
    }

    /// Output dtype of the buffer.
    #[must_use]
    pub fn dtype(&self) -> OutputDtype {
        match self {
            Self::F64(_) => OutputDtype::F64,
            Self::F32(_) => OutputDtype::F32,
            Self::F16(_) => OutputDtype::F16,
            Self::BF16(_) => OutputDtype::BF16,
            Self::I32(_) => OutputDtype::I32,
            Self::I8(_) => OutputDtype::I8,
            Self::U8(_) => OutputDtype::U8,
            Self::Complex64(_) => OutputDtype::Complex64,
            Self::Complex128(_) => OutputDtype::Complex128,
        }
    }

    /// Number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F16(v) => v.len(),
            Self::BF16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::Complex64(v) => v.len(),
            Self::Complex128(v) => v.len(),
        }
    }

    /// Returns true if there are no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Result `i` widened back to a [`Scalar`].
    #[must_use]
    pub fn get(&self, i: usize) -> Option<Scalar> {
        match self {
            Self::F64(v) => v.get(i).map(|&x| Scalar::Real(x)),
            Self::F32(v) => v.get(i).map(|&x| Scalar::Real(f64::from(x))),
            Self::F16(v) => v.get(i).map(|&x| Scalar::Real(x.to_f64())),
            Self::BF16(v) => v.get(i).map(|&x| Scalar::Real(x.to_f64())),
            Self::I32(v) => v.get(i).map(|&x| Scalar::Real(f64::from(x))),
            Self::I8(v) => v.get(i).map(|&x| Scalar::Real(f64::from(x))),
            Self::U8(v) => v.get(i).map(|&x| Scalar::Real(f64::from(x))),
            Self::Complex64(v) => v.get(i).map(|&[re, im]| Scalar::Complex {
                re: f64::from(re),
                im: f64::from(im),
            }),
            Self::Complex128(v) => v.get(i).map(|&[re, im]| Scalar::Complex { re, im }),
        }
    }
}

/// Result of a batch evaluation.
///
/// `shape` is `[]` for two single vectors, `[rows]` for row-wise evaluation
/// and `[M, N]` for all-pairs evaluation. Values are stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distances {
    shape: Vec<usize>,
    #[serde(flatten)]
    values: Values,
}

impl Distances {
    pub(crate) fn new(shape: Vec<usize>, scalars: &[Scalar], out: OutputDtype) -> Result<Self> {
        Ok(Self {
            shape,
            values: Values::cast(scalars, out)?,
        })
    }

    /// Result shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Output dtype.
    #[must_use]
    pub fn dtype(&self) -> OutputDtype {
        self.values.dtype()
    }

    /// Typed results.
    #[must_use]
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Consumes the result, returning the typed buffer.
    #[must_use]
    pub fn into_values(self) -> Values {
        self.values
    }

    /// Number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Result at a row-major flat index.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<Scalar> {
        self.values.get(i)
    }

    /// Result at `(row, col)` of an all-pairs matrix.
    #[must_use]
    pub fn at(&self, row: usize, col: usize) -> Option<Scalar> {
        match self.shape.as_slice() {
            &[rows, cols] if row < rows && col < cols => self.values.get(row * cols + col),
            _ => None,
        }
    }

    /// Every result widened to `f64`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDtype`] if the results are complex.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        (0..self.len())
            .filter_map(|i| self.values.get(i))
            .map(Scalar::real)
            .collect()
    }
}
