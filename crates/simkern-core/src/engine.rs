//! Engine: the entry point tying registry, dispatch and batch evaluation.
//!
//! An [`Engine`] owns a handle to a [`CapabilityRegistry`] and a
//! [`BatchPolicy`]. The process-wide engine shares the global registry;
//! independent engines can be built around private registries so tests and
//! embedders can toggle tiers without affecting each other.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use crate::batch::{self, BatchPolicy};
use crate::capability::{Capability, CapabilityRegistry};
use crate::config::SimkernConfig;
use crate::dispatch::{ExportedKernel, Kernel};
use crate::dtype::{Dtype, OutputDtype};
use crate::error::Result;
use crate::metric::Metric;
use crate::output::{Distances, Scalar};
use crate::vector::{MatrixRef, VectorRef};

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Reinterpret both operands as this dtype before dispatch.
    pub dtype: Option<Dtype>,
    /// Cast results to this dtype.
    pub out: Option<OutputDtype>,
}

impl CallOptions {
    /// Sets the dtype override.
    #[must_use]
    pub fn dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = Some(dtype);
        self
    }

    /// Sets the output dtype.
    #[must_use]
    pub fn output(mut self, out: OutputDtype) -> Self {
        self.out = Some(out);
        self
    }
}

/// Kernel engine bound to one capability registry.
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<CapabilityRegistry>,
    policy: BatchPolicy,
}

static GLOBAL_ENGINE: OnceLock<Engine> = OnceLock::new();

impl Engine {
    /// Creates an engine over `registry` with the default batch policy.
    #[must_use]
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self::with_policy(registry, BatchPolicy::default())
    }

    /// Creates an engine over `registry` with an explicit batch policy.
    #[must_use]
    pub fn with_policy(registry: Arc<CapabilityRegistry>, policy: BatchPolicy) -> Self {
        Self { registry, policy }
    }

    /// Creates an engine with a private registry configured from `config`.
    ///
    /// When `capabilities.enabled` is non-empty only the listed tiers (and
    /// `serial`) start enabled; `capabilities.disabled` is applied afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the configuration is invalid.
    pub fn from_config(config: &SimkernConfig) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(CapabilityRegistry::detect());

        let allow: Vec<Capability> = config
            .capabilities
            .enabled
            .iter()
            .map(|name| name.parse())
            .collect::<Result<_>>()?;
        if !allow.is_empty() {
            for cap in Capability::ALL {
                if !allow.contains(&cap) {
                    registry.disable(cap.name())?;
                }
            }
        }
        for name in &config.capabilities.disabled {
            registry.disable(name)?;
        }

        let policy = BatchPolicy::from_config(&config.batch)?;
        tracing::debug!(
            enabled = registry.enabled().len(),
            parallel = policy.parallel,
            parallel_threshold = policy.parallel_threshold,
            "Engine configured"
        );
        Ok(Self::with_policy(registry, policy))
    }

    /// Returns the process-wide engine, backed by [`CapabilityRegistry::global`].
    pub fn global() -> &'static Engine {
        GLOBAL_ENGINE.get_or_init(|| Self::new(CapabilityRegistry::global()))
    }

    /// Capability registry this engine dispatches through.
    #[must_use]
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Batch policy.
    #[must_use]
    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    /// Every known tier and whether it is enabled.
    #[must_use]
    pub fn list_capabilities(&self) -> BTreeMap<Capability, bool> {
        self.registry.list_capabilities()
    }

    /// Enables a tier; see [`CapabilityRegistry::enable`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownCapability`] for unrecognized names.
    pub fn enable(&self, name: &str) -> Result<bool> {
        self.registry.enable(name)
    }

    /// Disables a tier; see [`CapabilityRegistry::disable`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownCapability`] for unrecognized names.
    pub fn disable(&self, name: &str) -> Result<bool> {
        self.registry.disable(name)
    }

    /// Best kernel for `(metric, dtype)` among the enabled tiers.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsupportedDtype`] if no tier implements the pair.
    pub fn resolve(&self, metric: Metric, dtype: Dtype) -> Result<Kernel> {
        self.registry.snapshot().table().resolve(metric, dtype)
    }

    /// Exports the raw entry point of the kernel [`Engine::resolve`] picks.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsupportedDtype`] if no tier implements the pair.
    pub fn export_pointer(&self, metric: Metric, dtype: Dtype) -> Result<ExportedKernel> {
        let kernel = self.resolve(metric, dtype)?;
        tracing::debug!(
            metric = %metric,
            dtype = %dtype,
            tier = %kernel.tier(),
            address = kernel.address(),
            "Kernel entry point exported"
        );
        Ok(ExportedKernel::new(kernel))
    }

    /// Runs a flat metric (dense, complex or set) on two vectors.
    ///
    /// # Errors
    ///
    /// Fails on unsupported dtype, length mismatch or a kernel fault.
    pub fn compute(&self, metric: Metric, a: VectorRef<'_>, b: VectorRef<'_>) -> Result<Scalar> {
        let kernel = self.resolve(metric, a.dtype())?;
        batch::call_flat(&kernel, a, b)
    }

    /// Runs a matrix-weighted metric.
    ///
    /// # Errors
    ///
    /// Fails on unsupported dtype, shape mismatch or a domain fault.
    pub fn compute_curved(
        &self,
        metric: Metric,
        a: VectorRef<'_>,
        b: VectorRef<'_>,
        m: VectorRef<'_>,
    ) -> Result<f64> {
        self.resolve(metric, a.dtype())?.call_curved(a, b, m)
    }

    /// Evaluates a flat metric row-wise under the broadcast rules.
    ///
    /// # Errors
    ///
    /// See [`batch::evaluate`].
    pub fn evaluate(
        &self,
        metric: Metric,
        a: &MatrixRef<'_>,
        b: &MatrixRef<'_>,
        out: Option<OutputDtype>,
    ) -> Result<Distances> {
        let kernel = self.resolve(metric, a.dtype())?;
        batch::evaluate(&self.policy, &kernel, a, b, out)
    }

    /// [`Engine::evaluate`] with a dtype override.
    ///
    /// # Errors
    ///
    /// Also fails when the operands cannot be reinterpreted as the override.
    pub fn evaluate_with(
        &self,
        metric: Metric,
        a: &MatrixRef<'_>,
        b: &MatrixRef<'_>,
        options: CallOptions,
    ) -> Result<Distances> {
        match options.dtype {
            Some(dtype) => self.evaluate(
                metric,
                &a.with_dtype(dtype)?,
                &b.with_dtype(dtype)?,
                options.out,
            ),
            None => self.evaluate(metric, a, b, options.out),
        }
    }

    /// Evaluates a matrix-weighted metric row-wise with a shared weight matrix.
    ///
    /// # Errors
    ///
    /// See [`batch::evaluate_curved`].
    pub fn evaluate_curved(
        &self,
        metric: Metric,
        a: &MatrixRef<'_>,
        b: &MatrixRef<'_>,
        m: VectorRef<'_>,
        out: Option<OutputDtype>,
    ) -> Result<Distances> {
        let kernel = self.resolve(metric, a.dtype())?;
        batch::evaluate_curved(&self.policy, &kernel, a, b, m, out)
    }

    /// All-pairs evaluation producing an `M × N` result.
    ///
    /// # Errors
    ///
    /// See [`batch::cdist`].
    pub fn cdist(
        &self,
        metric: Metric,
        a: &MatrixRef<'_>,
        b: &MatrixRef<'_>,
        out: Option<OutputDtype>,
    ) -> Result<Distances> {
        let kernel = self.resolve(metric, a.dtype())?;
        batch::cdist(&self.policy, &kernel, a, b, out)
    }
}
