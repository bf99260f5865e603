//! Operand parsing for the command line.
//!
//! Operands are given as JSON (`[1, 2, 3]` for a vector, `[[1, 2], [3, 4]]`
//! for a matrix), as comma-separated numbers with `;` between rows, or as
//! `@path` to read either form from a file. Values are parsed as `f64` and
//! then encoded into the requested dtype.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use simkern_core::{bf16, f16, Dtype, MatrixRef, VectorRef};

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonOperand {
    Matrix(Vec<Vec<f64>>),
    Vector(Vec<f64>),
}

/// Parses a single vector from a JSON array or a comma-separated list.
pub fn parse_vector(input: &str) -> Result<Vec<f64>> {
    let trimmed = input.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Invalid JSON vector");
    }
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split(',')
        .map(|s| {
            let s = s.trim();
            s.parse::<f64>()
                .with_context(|| format!("Invalid number '{}'", s))
        })
        .collect()
}

/// Parsed rows plus whether the input was a single vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Rows {
    pub rows: Vec<Vec<f64>>,
    pub vector: bool,
}

impl Rows {
    /// Parses a vector or a matrix, resolving `@path` references.
    pub fn parse(input: &str) -> Result<Self> {
        let text = match input.trim().strip_prefix('@') {
            Some(path) => read_file(Path::new(path))?,
            None => input.to_string(),
        };
        let trimmed = text.trim();

        let (rows, vector) = if trimmed.starts_with('[') {
            match serde_json::from_str::<JsonOperand>(trimmed).context("Invalid JSON operand")? {
                JsonOperand::Matrix(rows) => (rows, false),
                JsonOperand::Vector(v) => (vec![v], true),
            }
        } else if trimmed.contains(';') {
            let rows = trimmed
                .split(';')
                .map(parse_vector)
                .collect::<Result<Vec<_>>>()?;
            (rows, false)
        } else {
            (vec![parse_vector(trimmed)?], true)
        };

        if let Some(first) = rows.first() {
            if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != first.len()) {
                bail!(
                    "Ragged matrix: row {} has {} values, row 0 has {}",
                    i,
                    row.len(),
                    first.len()
                );
            }
        }
        Ok(Self { rows, vector })
    }

    /// Encodes the rows into an owned operand of `dtype`.
    pub fn encode(&self, dtype: Dtype) -> Result<Operand> {
        let flat: Vec<f64> = self.rows.iter().flatten().copied().collect();
        Ok(Operand {
            dtype,
            buffer: Buffer::encode(&flat, dtype)?,
            rows: self.rows.len(),
            vector: self.vector,
        })
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))
}

/// Owned storage for one dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    F64(Vec<f64>),
    F32(Vec<f32>),
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    I8(Vec<i8>),
    Bytes(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Buffer {
    /// Encodes `values` as `dtype`. Complex dtypes take interleaved reals,
    /// `b8` takes packed bytes.
    pub fn encode(values: &[f64], dtype: Dtype) -> Result<Self> {
        Ok(match dtype {
            Dtype::F64 | Dtype::Complex128 => Self::F64(values.to_vec()),
            Dtype::F32 | Dtype::Complex64 => Self::F32(values.iter().map(|&x| x as f32).collect()),
            Dtype::F16 => Self::F16(values.iter().map(|&x| f16::from_f64(x)).collect()),
            Dtype::BF16 => Self::BF16(values.iter().map(|&x| bf16::from_f64(x)).collect()),
            Dtype::I8 => Self::I8(integers(values, dtype)?),
            Dtype::B8 => Self::Bytes(integers(values, dtype)?),
            Dtype::U16 => Self::U16(integers(values, dtype)?),
            Dtype::U32 => Self::U32(integers(values, dtype)?),
        })
    }

    /// Borrows the buffer as a view of `dtype`.
    pub fn view(&self, dtype: Dtype) -> Result<VectorRef<'_>> {
        Ok(match (self, dtype) {
            (Self::F64(v), Dtype::Complex128) => VectorRef::complex128(v)?,
            (Self::F32(v), Dtype::Complex64) => VectorRef::complex64(v)?,
            (Self::Bytes(v), _) => VectorRef::bits(v),
            (Self::F64(v), _) => v.into(),
            (Self::F32(v), _) => v.into(),
            (Self::F16(v), _) => v.into(),
            (Self::BF16(v), _) => v.into(),
            (Self::I8(v), _) => v.into(),
            (Self::U16(v), _) => v.into(),
            (Self::U32(v), _) => v.into(),
        })
    }
}

fn integers<T: TryFrom<i64>>(values: &[f64], dtype: Dtype) -> Result<Vec<T>> {
    values
        .iter()
        .map(|&x| {
            if !x.is_finite() || x.fract() != 0.0 {
                bail!("{} is not an integer, required for {}", x, dtype);
            }
            T::try_from(x as i64).map_err(|_| anyhow!("{} is out of range for {}", x, dtype))
        })
        .collect()
}

/// An encoded operand: a vector or a row-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    dtype: Dtype,
    buffer: Buffer,
    rows: usize,
    vector: bool,
}

impl Operand {
    /// Borrows the whole buffer as one flat view.
    pub fn flat(&self) -> Result<VectorRef<'_>> {
        self.buffer.view(self.dtype)
    }

    /// Borrows the operand as a matrix for batch evaluation.
    pub fn matrix(&self) -> Result<MatrixRef<'_>> {
        let data = self.flat()?;
        if self.vector {
            return Ok(MatrixRef::from_vector(data));
        }
        let cols = if self.rows == 0 { 0 } else { data.len() / self.rows };
        Ok(MatrixRef::new(data, self.rows, cols)?)
    }
}
