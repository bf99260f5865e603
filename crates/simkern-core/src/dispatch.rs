//! Kernel dispatch table.
//!
//! Every kernel the crate ships is registered once, on first use, in a static
//! catalog keyed by `(metric, dtype, tier)`. A [`ResolvedTable`] is built from
//! that catalog for one set of enabled tiers and maps `(metric, dtype)` to the
//! highest-priority kernel, so a dispatch is a single indexed load.
//!
//! A [`Kernel`] is a plain copy of an entry point. It stays valid after the
//! registry changes: exported pointers are bound to the tier that was active
//! when they were resolved.

use std::sync::OnceLock;

use crate::capability::{Capability, CapabilitySet};
use crate::dtype::Dtype;
use crate::error::{Error, Result};
use crate::kernels::{self, KernelFn, ABI_VERSION, STATUS_DOMAIN, STATUS_OK, STATUS_OVERFLOW};
use crate::metric::Metric;
use crate::output::Scalar;
use crate::vector::VectorRef;

/// `(metric, dtype, tier)` triple identifying one implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchKey {
    /// Metric computed.
    pub metric: Metric,
    /// Element kind accepted.
    pub dtype: Dtype,
    /// Tier the implementation requires.
    pub tier: Capability,
}

/// One registered implementation.
#[derive(Debug, Clone, Copy)]
pub struct DispatchEntry {
    key: DispatchKey,
    entry: KernelFn,
}

impl DispatchEntry {
    pub(crate) fn new(metric: Metric, dtype: Dtype, tier: Capability, entry: KernelFn) -> Self {
        Self {
            key: DispatchKey {
                metric,
                dtype,
                tier,
            },
            entry,
        }
    }

    /// Key of this entry.
    #[must_use]
    pub fn key(&self) -> DispatchKey {
        self.key
    }
}

static CATALOG: OnceLock<Vec<DispatchEntry>> = OnceLock::new();

/// All registered implementations, grouped by `(metric, dtype)` with the
/// highest-priority tier first.
fn catalog() -> &'static [DispatchEntry] {
    CATALOG.get_or_init(|| {
        let mut entries = Vec::with_capacity(160);
        kernels::serial::register(&mut entries);
        #[cfg(target_arch = "x86_64")]
        {
            kernels::haswell::register(&mut entries);
            kernels::skylake::register(&mut entries);
            kernels::ice::register(&mut entries);
        }
        #[cfg(target_arch = "aarch64")]
        kernels::neon::register(&mut entries);

        entries.sort_by(|x, y| {
            (x.key.metric, x.key.dtype)
                .cmp(&(y.key.metric, y.key.dtype))
                .then(y.key.tier.priority().cmp(&x.key.tier.priority()))
        });
        entries
    })
}

/// Returns true if any tier, including the baseline, implements the pair.
#[must_use]
pub fn is_implemented(metric: Metric, dtype: Dtype) -> bool {
    catalog()
        .iter()
        .any(|e| e.key.metric == metric && e.key.dtype == dtype)
}

/// Tiers implementing `(metric, dtype)`, highest priority first.
///
/// Tiers compiled for other architectures are not listed.
#[must_use]
pub fn implementing_tiers(metric: Metric, dtype: Dtype) -> Vec<Capability> {
    catalog()
        .iter()
        .filter(|e| e.key.metric == metric && e.key.dtype == dtype)
        .map(|e| e.key.tier)
        .collect()
}

/// Every `(metric, dtype)` pair with at least a baseline kernel.
#[must_use]
pub fn supported_pairs() -> Vec<(Metric, Dtype)> {
    let mut pairs: Vec<(Metric, Dtype)> = catalog()
        .iter()
        .filter(|e| e.key.tier.is_baseline())
        .map(|e| (e.key.metric, e.key.dtype))
        .collect();
    pairs.dedup();
    pairs
}

pub(crate) fn not_implemented(metric: Metric, dtype: Dtype) -> Error {
    Error::UnsupportedDtype(format!(
        "metric '{metric}' is not implemented for dtype '{dtype}' at any tier"
    ))
}

fn domain_error(metric: Metric) -> Error {
    let reason = match metric {
        Metric::Mahalanobis => {
            "quadratic form (a - b)ᵀ·M·(a - b) is negative; M is not positive semidefinite for this input"
        }
        Metric::KullbackLeibler => {
            "q is zero where p is positive, or an input is negative or not finite"
        }
        Metric::JensenShannon => "probability inputs must be finite and non-negative",
        Metric::Cosine => "an input is NaN or infinite",
        _ => "result is undefined for this input",
    };
    Error::NumericalDomain(format!("{metric}: {reason}"))
}

/// A resolved kernel: an entry point bound to its tier.
#[derive(Debug, Clone, Copy)]
pub struct Kernel {
    key: DispatchKey,
    entry: KernelFn,
}

impl Kernel {
    /// Metric this kernel computes.
    #[must_use]
    pub fn metric(&self) -> Metric {
        self.key.metric
    }

    /// Element kind this kernel accepts.
    #[must_use]
    pub fn dtype(&self) -> Dtype {
        self.key.dtype
    }

    /// Tier the kernel runs on.
    #[must_use]
    pub fn tier(&self) -> Capability {
        self.key.tier
    }

    /// Full dispatch key.
    #[must_use]
    pub fn key(&self) -> DispatchKey {
        self.key
    }

    /// The `extern "C"` entry point.
    #[must_use]
    pub fn entry(&self) -> KernelFn {
        self.entry
    }

    /// Raw address of the entry point.
    #[must_use]
    pub fn address(&self) -> usize {
        self.entry.address()
    }

    fn check_operand(&self, v: &VectorRef<'_>) -> Result<()> {
        if v.dtype() != self.key.dtype {
            return Err(Error::UnsupportedDtype(format!(
                "{} kernel for '{}' received '{}'",
                self.key.metric,
                self.key.dtype,
                v.dtype()
            )));
        }
        if v.dtype().is_complex() && v.stored_len() % 2 != 0 {
            return Err(Error::InvalidShape(format!(
                "complex buffer has an odd number of reals ({})",
                v.stored_len()
            )));
        }
        Ok(())
    }

    fn status(&self, status: i32) -> Result<()> {
        match status {
            STATUS_OK => Ok(()),
            STATUS_DOMAIN => Err(domain_error(self.key.metric)),
            STATUS_OVERFLOW => Err(Error::Overflow(format!(
                "{} over {} exceeds the exactly representable range",
                self.key.metric, self.key.dtype
            ))),
            other => Err(Error::NumericalDomain(format!(
                "{} returned unknown status {other}",
                self.key.metric
            ))),
        }
    }

    /// Runs a dense or complex kernel over two equal-length vectors.
    ///
    /// # Errors
    ///
    /// Fails on dtype or length mismatch, when the kernel is not a dense or
    /// complex one, or when the kernel reports a domain or overflow fault.
    pub fn call(&self, a: VectorRef<'_>, b: VectorRef<'_>) -> Result<Scalar> {
        self.check_operand(&a)?;
        self.check_operand(&b)?;
        if a.len() != b.len() {
            return Err(Error::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }
        let mut out = [0.0_f64; 2];
        match self.entry {
            KernelFn::Dense(f) => {
                // SAFETY: both views hold `len` elements of the kernel's dtype; `out` has room.
                let status = unsafe { f(a.as_ptr(), b.as_ptr(), a.len(), out.as_mut_ptr()) };
                self.status(status)?;
                Ok(Scalar::Real(out[0]))
            }
            KernelFn::Complex(f) => {
                // SAFETY: as above; complex kernels write two values.
                let status = unsafe { f(a.as_ptr(), b.as_ptr(), a.len(), out.as_mut_ptr()) };
                self.status(status)?;
                Ok(Scalar::Complex {
                    re: out[0],
                    im: out[1],
                })
            }
            KernelFn::Curved(_) | KernelFn::Sparse(_) => Err(Error::UnsupportedDtype(format!(
                "{} needs a different call shape",
                self.key.metric
            ))),
        }
    }

    /// Runs a curved kernel with an `n × n` row-major weight matrix.
    ///
    /// # Errors
    ///
    /// Fails on dtype or length mismatch, when `m` is not `n × n`, or when
    /// the kernel reports a domain fault.
    pub fn call_curved(&self, a: VectorRef<'_>, b: VectorRef<'_>, m: VectorRef<'_>) -> Result<f64> {
        self.check_operand(&a)?;
        self.check_operand(&b)?;
        self.check_operand(&m)?;
        let n = a.len();
        if b.len() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                actual: b.len(),
            });
        }
        let cells = n.checked_mul(n).ok_or_else(|| Error::Overflow(format!("{n}² cells")))?;
        if m.len() != cells {
            return Err(Error::InvalidShape(format!(
                "weight matrix needs {n} × {n} = {cells} elements, got {}",
                m.len()
            )));
        }
        let KernelFn::Curved(f) = self.entry else {
            return Err(Error::UnsupportedDtype(format!(
                "{} does not take a weight matrix",
                self.key.metric
            )));
        };
        let mut out = 0.0_f64;
        // SAFETY: `a`, `b` hold `n` and `m` holds `n × n` elements of the kernel's dtype.
        let status = unsafe { f(a.as_ptr(), b.as_ptr(), m.as_ptr(), n, &mut out) };
        self.status(status)?;
        Ok(out)
    }

    /// Runs a set-intersection kernel.
    ///
    /// # Errors
    ///
    /// Fails on dtype mismatch or when the kernel is not a sparse one.
    pub fn call_sparse(&self, a: VectorRef<'_>, b: VectorRef<'_>) -> Result<f64> {
        self.check_operand(&a)?;
        self.check_operand(&b)?;
        let KernelFn::Sparse(f) = self.entry else {
            return Err(Error::UnsupportedDtype(format!(
                "{} is not a set kernel",
                self.key.metric
            )));
        };
        let mut out = 0.0_f64;
        // SAFETY: both views hold their stated lengths of the kernel's dtype.
        let status = unsafe { f(a.as_ptr(), b.as_ptr(), a.len(), b.len(), &mut out) };
        self.status(status)?;
        Ok(out)
    }
}

/// Best kernel per `(metric, dtype)` for one set of enabled tiers.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    slots: Vec<Option<Kernel>>,
}

impl ResolvedTable {
    const fn slot(metric: Metric, dtype: Dtype) -> usize {
        metric.index() * Dtype::ALL.len() + dtype.index()
    }

    /// Resolves every pair against `enabled`.
    ///
    /// The baseline is always considered, so every implemented pair resolves.
    #[must_use]
    pub fn build(enabled: CapabilitySet) -> Self {
        let enabled = enabled.with(Capability::Serial);
        let mut slots = vec![None; Metric::ALL.len() * Dtype::ALL.len()];
        for entry in catalog() {
            let slot = &mut slots[Self::slot(entry.key.metric, entry.key.dtype)];
            if slot.is_none() && enabled.contains(entry.key.tier) {
                *slot = Some(Kernel {
                    key: entry.key,
                    entry: entry.entry,
                });
            }
        }
        Self { slots }
    }

    /// Kernel for `(metric, dtype)`, if any tier implements it.
    #[inline]
    #[must_use]
    pub fn get(&self, metric: Metric, dtype: Dtype) -> Option<Kernel> {
        self.slots[Self::slot(metric, dtype)]
    }

    /// Kernel for `(metric, dtype)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDtype`] if no tier implements the pair.
    pub fn resolve(&self, metric: Metric, dtype: Dtype) -> Result<Kernel> {
        self.get(metric, dtype)
            .ok_or_else(|| not_implemented(metric, dtype))
    }

    /// Number of resolved pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Returns true if nothing resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolved kernels, ordered by metric then dtype.
    pub fn iter(&self) -> impl Iterator<Item = Kernel> + '_ {
        self.slots.iter().flatten().copied()
    }
}

/// A raw entry point handed to an external caller.
///
/// The address stays valid for the life of the process and keeps running on
/// the tier it was resolved for, whatever the registry does afterwards.
#[derive(Debug, Clone, Copy)]
pub struct ExportedKernel {
    /// Version of the entry-point signature.
    pub abi_version: u32,
    kernel: Kernel,
}

impl ExportedKernel {
    pub(crate) fn new(kernel: Kernel) -> Self {
        Self {
            abi_version: ABI_VERSION,
            kernel,
        }
    }

    /// Raw address of the entry point.
    #[must_use]
    pub fn address(&self) -> usize {
        self.kernel.address()
    }

    /// Tier the entry point is bound to.
    #[must_use]
    pub fn tier(&self) -> Capability {
        self.kernel.tier()
    }

    /// Typed entry point.
    #[must_use]
    pub fn entry(&self) -> KernelFn {
        self.kernel.entry()
    }

    /// The resolved kernel, with safe call wrappers.
    #[must_use]
    pub fn kernel(&self) -> Kernel {
        self.kernel
    }
}
