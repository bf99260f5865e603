//! Hardware capability tiers and the registry that toggles them.
//!
//! A tier is a named instruction-set level. Every tier is always listed, even
//! on platforms that can never support it; those are reported as permanently
//! disabled. `serial` is the portable baseline and is always enabled.
//!
//! Writes go through a mutex; readers take a lock-free snapshot of the
//! enabled set together with the kernel table resolved for it, so a dispatch
//! never observes a half-updated table.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::dispatch::ResolvedTable;
use crate::error::{Error, Result};

/// A hardware execution tier, ordered from lowest to highest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Capability {
    /// Portable baseline, available everywhere.
    Serial = 0,
    /// Arm NEON.
    Neon,
    /// NEON with half-precision arithmetic.
    NeonF16,
    /// NEON with bf16 dot products.
    NeonBf16,
    /// NEON with int8 dot products.
    NeonI8,
    /// Arm SVE.
    Sve,
    /// SVE with half-precision arithmetic.
    SveF16,
    /// SVE with bf16 arithmetic.
    SveBf16,
    /// SVE with int8 matrix multiply.
    SveI8,
    /// x86 AVX2 + FMA + F16C + POPCNT.
    Haswell,
    /// x86 AVX-512 F/VL/BW/DQ.
    Skylake,
    /// x86 AVX-512 with VNNI and VPOPCNTDQ.
    Ice,
    /// x86 AVX-512 with BF16.
    Genoa,
    /// x86 AVX-512 with FP16.
    Sapphire,
}

impl Capability {
    /// All tiers, lowest priority first.
    pub const ALL: [Capability; 14] = [
        Self::Serial,
        Self::Neon,
        Self::NeonF16,
        Self::NeonBf16,
        Self::NeonI8,
        Self::Sve,
        Self::SveF16,
        Self::SveBf16,
        Self::SveI8,
        Self::Haswell,
        Self::Skylake,
        Self::Ice,
        Self::Genoa,
        Self::Sapphire,
    ];

    /// Canonical tier name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Neon => "neon",
            Self::NeonF16 => "neon_f16",
            Self::NeonBf16 => "neon_bf16",
            Self::NeonI8 => "neon_i8",
            Self::Sve => "sve",
            Self::SveF16 => "sve_f16",
            Self::SveBf16 => "sve_bf16",
            Self::SveI8 => "sve_i8",
            Self::Haswell => "haswell",
            Self::Skylake => "skylake",
            Self::Ice => "ice",
            Self::Genoa => "genoa",
            Self::Sapphire => "sapphire",
        }
    }

    /// Dispatch priority; higher wins.
    #[must_use]
    pub const fn priority(self) -> u8 {
        self as u8
    }

    /// Returns true for the portable baseline.
    #[must_use]
    pub const fn is_baseline(self) -> bool {
        matches!(self, Self::Serial)
    }

    const fn bit(self) -> u16 {
        1 << (self as u8)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        if lowered == "baseline" {
            return Ok(Self::Serial);
        }
        Self::ALL
            .into_iter()
            .find(|cap| cap.name() == lowered)
            .ok_or_else(|| Error::UnknownCapability(s.to_string()))
    }
}

/// A set of tiers, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    /// The set holding only the baseline tier.
    #[must_use]
    pub const fn baseline() -> Self {
        Self(Capability::Serial.bit())
    }

    /// Returns true if `cap` is in the set.
    #[must_use]
    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    /// Returns a copy with `cap` added.
    #[must_use]
    pub const fn with(self, cap: Capability) -> Self {
        Self(self.0 | cap.bit())
    }

    /// Returns a copy with `cap` removed. The baseline is never removed.
    #[must_use]
    pub const fn without(self, cap: Capability) -> Self {
        if cap.is_baseline() {
            self
        } else {
            Self(self.0 & !cap.bit())
        }
    }

    /// Intersection of two sets.
    #[must_use]
    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Number of tiers in the set.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the tiers in the set, highest priority first.
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .rev()
            .filter(move |cap| self.contains(*cap))
    }

    /// Highest priority tier in the set.
    #[must_use]
    pub fn best(self) -> Capability {
        self.iter().next().unwrap_or(Capability::Serial)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::baseline(), CapabilitySet::with)
    }
}

/// Detects the tiers the running CPU can execute.
#[must_use]
pub fn detect_hardware() -> CapabilitySet {
    let mut set = CapabilitySet::baseline();

    #[cfg(target_arch = "x86_64")]
    {
        let haswell = is_x86_feature_detected!("avx2")
            && is_x86_feature_detected!("fma")
            && is_x86_feature_detected!("f16c")
            && is_x86_feature_detected!("popcnt");
        let skylake = haswell
            && is_x86_feature_detected!("avx512f")
            && is_x86_feature_detected!("avx512vl")
            && is_x86_feature_detected!("avx512bw")
            && is_x86_feature_detected!("avx512dq");
        let ice = skylake
            && is_x86_feature_detected!("avx512vnni")
            && is_x86_feature_detected!("avx512vpopcntdq");
        let genoa = skylake && is_x86_feature_detected!("avx512bf16");
        let sapphire = skylake && is_x86_feature_detected!("avx512fp16");

        for (cap, present) in [
            (Capability::Haswell, haswell),
            (Capability::Skylake, skylake),
            (Capability::Ice, ice),
            (Capability::Genoa, genoa),
            (Capability::Sapphire, sapphire),
        ] {
            if present {
                set = set.with(cap);
            }
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        use std::arch::is_aarch64_feature_detected;

        let neon = is_aarch64_feature_detected!("neon");
        let sve = is_aarch64_feature_detected!("sve");
        let fp16 = is_aarch64_feature_detected!("fp16");
        let bf16 = is_aarch64_feature_detected!("bf16");
        let dotprod = is_aarch64_feature_detected!("dotprod");
        let i8mm = is_aarch64_feature_detected!("i8mm");

        for (cap, present) in [
            (Capability::Neon, neon),
            (Capability::NeonF16, neon && fp16),
            (Capability::NeonBf16, neon && bf16),
            (Capability::NeonI8, neon && dotprod),
            (Capability::Sve, sve),
            (Capability::SveF16, sve && fp16),
            (Capability::SveBf16, sve && bf16),
            (Capability::SveI8, sve && i8mm),
        ] {
            if present {
                set = set.with(cap);
            }
        }
    }

    set
}

/// Immutable view of the registry at one point in time.
#[derive(Debug)]
pub struct Snapshot {
    enabled: CapabilitySet,
    generation: u64,
    table: ResolvedTable,
}

impl Snapshot {
    /// Tiers enabled in this snapshot.
    #[must_use]
    pub fn enabled(&self) -> CapabilitySet {
        self.enabled
    }

    /// Number of state changes before this snapshot was published.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Kernel table resolved for the enabled tiers.
    #[must_use]
    pub fn table(&self) -> &ResolvedTable {
        &self.table
    }
}

/// Registry of enabled capability tiers.
///
/// Use [`CapabilityRegistry::global`] for the process-wide instance, or
/// [`CapabilityRegistry::detect`] for an independent one (tests toggle
/// private registries so they can run concurrently).
pub struct CapabilityRegistry {
    supported: CapabilitySet,
    writer: Mutex<()>,
    state: ArcSwap<Snapshot>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<CapabilityRegistry>> = OnceLock::new();

impl CapabilityRegistry {
    /// Creates a registry for the running CPU with every supported tier enabled.
    #[must_use]
    pub fn detect() -> Self {
        Self::with_supported(detect_hardware())
    }

    /// Creates a registry restricted to `supported`.
    ///
    /// Tiers the CPU cannot run are dropped from `supported`, so a registry
    /// can never route a call to an instruction set the host lacks.
    #[must_use]
    pub fn with_supported(supported: CapabilitySet) -> Self {
        let supported = supported
            .intersect(detect_hardware())
            .with(Capability::Serial);
        Self {
            supported,
            writer: Mutex::new(()),
            state: ArcSwap::from_pointee(Snapshot {
                enabled: supported,
                generation: 0,
                table: ResolvedTable::build(supported),
            }),
        }
    }

    /// Returns the process-wide registry.
    pub fn global() -> Arc<CapabilityRegistry> {
        Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(Self::detect())))
    }

    /// Tiers the hardware supports.
    #[must_use]
    pub fn supported(&self) -> CapabilitySet {
        self.supported
    }

    /// Current lock-free snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.state.load_full()
    }

    /// Tiers currently enabled.
    #[must_use]
    pub fn enabled(&self) -> CapabilitySet {
        self.state.load().enabled
    }

    /// Monotonic counter bumped on every state change.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.load().generation
    }

    /// Every known tier and whether it is enabled, in priority order.
    #[must_use]
    pub fn list_capabilities(&self) -> BTreeMap<Capability, bool> {
        let enabled = self.enabled();
        Capability::ALL
            .into_iter()
            .map(|cap| (cap, enabled.contains(cap)))
            .collect()
    }

    /// Returns true if `name` is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCapability`] for unrecognized names.
    pub fn is_enabled(&self, name: &str) -> Result<bool> {
        let cap: Capability = name.parse()?;
        Ok(self.enabled().contains(cap))
    }

    /// Returns true if the hardware can run `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCapability`] for unrecognized names.
    pub fn is_supported(&self, name: &str) -> Result<bool> {
        let cap: Capability = name.parse()?;
        Ok(self.supported.contains(cap))
    }

    /// Enables a tier. Returns whether the tier is enabled afterwards.
    ///
    /// Enabling a tier the hardware lacks leaves it disabled and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCapability`] for unrecognized names.
    pub fn enable(&self, name: &str) -> Result<bool> {
        let cap: Capability = name.parse()?;
        if !self.supported.contains(cap) {
            tracing::warn!(capability = %cap, "Capability not supported by this CPU, left disabled");
            return Ok(false);
        }
        self.update(cap, |set| set.with(cap));
        Ok(true)
    }

    /// Disables a tier. Returns whether the tier is enabled afterwards.
    ///
    /// Disabling `serial` is a no-op and returns `true`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCapability`] for unrecognized names.
    pub fn disable(&self, name: &str) -> Result<bool> {
        let cap: Capability = name.parse()?;
        if cap.is_baseline() {
            return Ok(true);
        }
        self.update(cap, |set| set.without(cap));
        Ok(false)
    }

    /// Restores every supported tier.
    pub fn reset(&self) {
        let _guard = self.writer.lock();
        let current = self.state.load();
        if current.enabled == self.supported {
            return;
        }
        self.publish(self.supported, current.generation + 1);
        tracing::info!(enabled = self.supported.len(), "Capabilities reset to hardware defaults");
    }

    fn update(&self, cap: Capability, change: impl FnOnce(CapabilitySet) -> CapabilitySet) {
        let _guard = self.writer.lock();
        let current = self.state.load();
        let next = change(current.enabled);
        if next == current.enabled {
            return;
        }
        self.publish(next, current.generation + 1);
        tracing::info!(
            capability = %cap,
            enabled = next.contains(cap),
            "Capability toggled"
        );
    }

    fn publish(&self, enabled: CapabilitySet, generation: u64) {
        let table = ResolvedTable::build(enabled);
        tracing::debug!(
            generation,
            kernels = table.len(),
            best = %enabled.best(),
            "Resolved kernel table rebuilt"
        );
        self.state.store(Arc::new(Snapshot {
            enabled,
            generation,
            table,
        }));
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load();
        f.debug_struct("CapabilityRegistry")
            .field("supported", &self.supported)
            .field("enabled", &state.enabled)
            .field("generation", &state.generation)
            .finish()
    }
}
