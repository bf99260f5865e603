//! Element kinds and their precision policy.
//!
//! Narrow element types are always accumulated in a wider intermediate. The
//! [`DtypeDescriptor`] records which one each metric family uses so callers
//! (and tests) can reason about the expected error of a kernel.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Logical element kind of a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// IEEE 754 binary64.
    F64,
    /// IEEE 754 binary32.
    F32,
    /// IEEE 754 binary16.
    F16,
    /// Brain float 16 (upper half of a binary32).
    BF16,
    /// Signed 8-bit integer.
    I8,
    /// Bit-packed booleans, 8 lanes per byte.
    B8,
    /// Interleaved pairs of binary32 (re, im).
    Complex64,
    /// Interleaved pairs of binary64 (re, im).
    Complex128,
    /// Unsigned 16-bit set elements.
    U16,
    /// Unsigned 32-bit set elements.
    U32,
}

/// Intermediate type used to accumulate a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accumulator {
    /// binary32 accumulation.
    F32,
    /// binary64 accumulation.
    F64,
    /// Exact 64-bit integer accumulation.
    I64,
    /// Population counts in 64-bit integers.
    Popcount,
}

impl Dtype {
    /// All dtypes, in index order.
    pub const ALL: [Dtype; 10] = [
        Self::F64,
        Self::F32,
        Self::F16,
        Self::BF16,
        Self::I8,
        Self::B8,
        Self::Complex64,
        Self::Complex128,
        Self::U16,
        Self::U32,
    ];

    /// Canonical tag.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::I8 => "i8",
            Self::B8 => "b8",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
            Self::U16 => "u16",
            Self::U32 => "u32",
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Returns true for interleaved complex kinds.
    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }

    /// Returns the descriptor for this dtype.
    #[must_use]
    pub const fn descriptor(self) -> DtypeDescriptor {
        let (bits, lanes, dense, curved) = match self {
            Self::F64 => (64, 1, Accumulator::F64, Accumulator::F64),
            Self::F32 => (32, 1, Accumulator::F32, Accumulator::F64),
            Self::F16 | Self::BF16 => (16, 1, Accumulator::F32, Accumulator::F64),
            Self::I8 => (8, 1, Accumulator::I64, Accumulator::F64),
            Self::B8 => (8, 8, Accumulator::Popcount, Accumulator::Popcount),
            Self::Complex64 => (64, 2, Accumulator::F64, Accumulator::F64),
            Self::Complex128 => (128, 2, Accumulator::F64, Accumulator::F64),
            Self::U16 => (16, 1, Accumulator::I64, Accumulator::I64),
            Self::U32 => (32, 1, Accumulator::I64, Accumulator::I64),
        };
        DtypeDescriptor {
            dtype: self,
            bits,
            lanes,
            dense,
            curved,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dtype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Single-character codes are case sensitive (NumPy buffer protocol).
        match s.trim() {
            "d" => return Ok(Self::F64),
            "f" => return Ok(Self::F32),
            "e" => return Ok(Self::F16),
            "b" => return Ok(Self::I8),
            "H" => return Ok(Self::U16),
            "I" => return Ok(Self::U32),
            _ => {}
        }
        match s.trim().to_ascii_lowercase().as_str() {
            "f64" | "float64" | "double" => Ok(Self::F64),
            "f32" | "float32" | "float" => Ok(Self::F32),
            "f16" | "float16" | "half" => Ok(Self::F16),
            "bf16" | "bfloat16" => Ok(Self::BF16),
            "i8" | "int8" => Ok(Self::I8),
            "b8" | "bin8" | "bits" => Ok(Self::B8),
            "complex64" | "c32" => Ok(Self::Complex64),
            "complex128" | "complex" | "c64" => Ok(Self::Complex128),
            "u16" | "uint16" => Ok(Self::U16),
            "u32" | "uint32" => Ok(Self::U32),
            _ => Err(Error::UnsupportedDtype(format!("unknown dtype tag '{s}'"))),
        }
    }
}

/// Width and accumulation policy of a dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtypeDescriptor {
    /// The described dtype.
    pub dtype: Dtype,
    /// Bits per stored element (a complex element counts both halves).
    pub bits: u32,
    /// Logical lanes per stored element (8 for `b8`, 2 for complex).
    pub lanes: u32,
    /// Accumulator for flat metrics. Cosine over floats always normalizes
    /// from binary64 sums.
    pub dense: Accumulator,
    /// Accumulator for matrix-weighted metrics.
    pub curved: Accumulator,
}

/// Returns the descriptor for a dtype tag.
///
/// # Errors
///
/// Returns [`Error::UnsupportedDtype`] for unrecognized tags.
pub fn describe(tag: &str) -> Result<DtypeDescriptor> {
    tag.parse::<Dtype>().map(Dtype::descriptor)
}

/// Representation a result is cast to after computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputDtype {
    /// binary64 (the native result type).
    F64,
    /// binary32.
    F32,
    /// binary16.
    F16,
    /// Brain float 16.
    BF16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Pair of binary32.
    Complex64,
    /// Pair of binary64.
    Complex128,
}

impl OutputDtype {
    /// Canonical tag.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::I32 => "i32",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
        }
    }

    /// Returns true for integer outputs.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::I32 | Self::I8 | Self::U8)
    }

    /// Returns true for complex outputs.
    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }
}

impl fmt::Display for OutputDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputDtype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f64" | "float64" | "d" => Ok(Self::F64),
            "f32" | "float32" | "f" => Ok(Self::F32),
            "f16" | "float16" | "e" => Ok(Self::F16),
            "bf16" | "bfloat16" => Ok(Self::BF16),
            "i32" | "int32" => Ok(Self::I32),
            "i8" | "int8" => Ok(Self::I8),
            "u8" | "uint8" => Ok(Self::U8),
            "complex64" => Ok(Self::Complex64),
            "complex128" | "complex" => Ok(Self::Complex128),
            _ => Err(Error::UnsupportedDtype(format!("unknown output dtype '{s}'"))),
        }
    }
}
