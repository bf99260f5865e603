//! Batched and broadcast evaluation.
//!
//! A batch call resolves its kernel once and then invokes it per row pair.
//! Rows carry no shared state, so they can be spread across the rayon pool
//! once the number of calls reaches [`BatchPolicy::parallel_threshold`].
//!
//! # Broadcast rules
//!
//! | A rows | B rows | Result                         |
//! |--------|--------|--------------------------------|
//! | M      | M      | M results, row-wise            |
//! | M      | 1      | M results, B's row against all |
//! | 1      | N      | N results, A's row against all |
//! | M      | N      | error unless M = N             |

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::BatchConfig;
use crate::dispatch::Kernel;
use crate::dtype::OutputDtype;
use crate::error::{Error, Result};
use crate::metric::{Metric, MetricKind};
use crate::output::{Distances, Scalar};
use crate::vector::{MatrixRef, VectorRef};

/// Resolved pairing of two row counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastShape {
    rows: usize,
    repeat_a: bool,
    repeat_b: bool,
}

impl BroadcastShape {
    /// Pairs `a_rows` with `b_rows`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BroadcastMismatch`] when the counts differ and
    /// neither is 1.
    pub fn resolve(a_rows: usize, b_rows: usize) -> Result<Self> {
        if a_rows == b_rows {
            Ok(Self {
                rows: a_rows,
                repeat_a: false,
                repeat_b: false,
            })
        } else if b_rows == 1 {
            Ok(Self {
                rows: a_rows,
                repeat_a: false,
                repeat_b: true,
            })
        } else if a_rows == 1 {
            Ok(Self {
                rows: b_rows,
                repeat_a: true,
                repeat_b: false,
            })
        } else {
            Err(Error::BroadcastMismatch {
                left: a_rows,
                right: b_rows,
            })
        }
    }

    /// Number of output rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Row indices of A and B paired at output row `i`.
    #[must_use]
    pub const fn pair(&self, i: usize) -> (usize, usize) {
        (
            if self.repeat_a { 0 } else { i },
            if self.repeat_b { 0 } else { i },
        )
    }
}

/// How batch calls execute and what they return by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Spread rows across the rayon pool.
    pub parallel: bool,
    /// Minimum number of kernel calls before going parallel.
    pub parallel_threshold: usize,
    /// Output dtype used when a call does not request one.
    pub default_output: Option<OutputDtype>,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_threshold: 256,
            default_output: None,
        }
    }
}

impl BatchPolicy {
    /// Builds a policy from the `[batch]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown `default_output`.
    pub fn from_config(config: &BatchConfig) -> Result<Self> {
        Ok(Self {
            parallel: config.parallel,
            parallel_threshold: config.parallel_threshold.max(1),
            default_output: config.output_dtype()?,
        })
    }

    fn output_for(&self, kernel: &Kernel, requested: Option<OutputDtype>) -> OutputDtype {
        // The configured default only applies to real-valued metrics.
        let natural = match kernel.metric().kind(kernel.dtype().is_complex()) {
            MetricKind::Complex => OutputDtype::Complex128,
            _ => self.default_output.unwrap_or(OutputDtype::F64),
        };
        requested.unwrap_or(natural)
    }

    /// Runs `task` for every index in `0..calls`; results keep index order.
    fn run<F>(&self, metric: Metric, calls: usize, task: F) -> Result<Vec<Scalar>>
    where
        F: Fn(usize) -> Result<Scalar> + Sync + Send,
    {
        #[cfg(feature = "parallel")]
        {
            if self.parallel && calls >= self.parallel_threshold {
                tracing::debug!(
                    metric = %metric,
                    calls,
                    threads = rayon::current_num_threads(),
                    "Evaluating batch in parallel"
                );
                return (0..calls).into_par_iter().map(task).collect();
            }
        }
        #[cfg(not(feature = "parallel"))]
        let _ = metric;
        (0..calls).map(task).collect()
    }
}

fn same_dtype(a: &MatrixRef<'_>, b: &MatrixRef<'_>) -> Result<()> {
    if a.dtype() == b.dtype() {
        Ok(())
    } else {
        Err(Error::UnsupportedDtype(format!(
            "operands have different dtypes: {} and {}",
            a.dtype(),
            b.dtype()
        )))
    }
}

fn same_cols(a: &MatrixRef<'_>, b: &MatrixRef<'_>) -> Result<()> {
    if a.cols() == b.cols() {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            expected: a.cols(),
            actual: b.cols(),
        })
    }
}

/// One flat kernel call: dense, complex or set intersection.
pub(crate) fn call_flat(kernel: &Kernel, a: VectorRef<'_>, b: VectorRef<'_>) -> Result<Scalar> {
    match kernel.metric().kind(kernel.dtype().is_complex()) {
        MetricKind::Sparse => kernel.call_sparse(a, b).map(Scalar::Real),
        MetricKind::Dense | MetricKind::Complex => kernel.call(a, b),
        MetricKind::Curved => Err(Error::InvalidShape(format!(
            "{} needs a weight matrix",
            kernel.metric()
        ))),
    }
}

fn row_shape(a: &MatrixRef<'_>, b: &MatrixRef<'_>, rows: usize) -> Vec<usize> {
    if a.is_vector() && b.is_vector() {
        Vec::new()
    } else {
        vec![rows]
    }
}

/// Evaluates `kernel` row-wise under the broadcast rules.
///
/// Set intersection pairs rows the same way; rows are treated as sets and
/// need not share a length with the other operand.
///
/// # Errors
///
/// Fails on dtype, column or row-count mismatch, or with the first kernel
/// error encountered.
pub fn evaluate(
    policy: &BatchPolicy,
    kernel: &Kernel,
    a: &MatrixRef<'_>,
    b: &MatrixRef<'_>,
    out: Option<OutputDtype>,
) -> Result<Distances> {
    same_dtype(a, b)?;
    if kernel.metric() != Metric::Intersect {
        same_cols(a, b)?;
    }
    let shape = BroadcastShape::resolve(a.rows(), b.rows())?;
    let results = policy.run(kernel.metric(), shape.rows(), |i| {
        let (ia, ib) = shape.pair(i);
        call_flat(kernel, a.row(ia), b.row(ib))
    })?;
    Distances::new(
        row_shape(a, b, shape.rows()),
        &results,
        policy.output_for(kernel, out),
    )
}

/// Evaluates a matrix-weighted `kernel` row-wise with a shared `n × n`
/// weight matrix, where `n` is the row length.
///
/// # Errors
///
/// As [`evaluate`], plus [`Error::InvalidShape`] when `m` is not `n × n`.
pub fn evaluate_curved(
    policy: &BatchPolicy,
    kernel: &Kernel,
    a: &MatrixRef<'_>,
    b: &MatrixRef<'_>,
    m: VectorRef<'_>,
    out: Option<OutputDtype>,
) -> Result<Distances> {
    same_dtype(a, b)?;
    same_cols(a, b)?;
    let shape = BroadcastShape::resolve(a.rows(), b.rows())?;
    let results = policy.run(kernel.metric(), shape.rows(), |i| {
        let (ia, ib) = shape.pair(i);
        kernel.call_curved(a.row(ia), b.row(ib), m).map(Scalar::Real)
    })?;
    Distances::new(
        row_shape(a, b, shape.rows()),
        &results,
        policy.output_for(kernel, out),
    )
}

/// Compares every row of `a` with every row of `b`, giving an `M × N` result.
///
/// # Errors
///
/// Fails on dtype or column mismatch, or with the first kernel error.
pub fn cdist(
    policy: &BatchPolicy,
    kernel: &Kernel,
    a: &MatrixRef<'_>,
    b: &MatrixRef<'_>,
    out: Option<OutputDtype>,
) -> Result<Distances> {
    same_dtype(a, b)?;
    if kernel.metric() != Metric::Intersect {
        same_cols(a, b)?;
    }
    let (rows, cols) = (a.rows(), b.rows());
    let calls = rows
        .checked_mul(cols)
        .ok_or_else(|| Error::InvalidShape(format!("{rows} × {cols} result overflows")))?;
    let results = policy.run(kernel.metric(), calls, |k| {
        call_flat(kernel, a.row(k / cols), b.row(k % cols))
    })?;
    Distances::new(vec![rows, cols], &results, policy.output_for(kernel, out))
}
