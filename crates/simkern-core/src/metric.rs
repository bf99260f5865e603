//! Metric identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Shape of a metric's kernel signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Two equal-length vectors, one real result.
    Dense,
    /// Two equal-length complex vectors, one complex result.
    Complex,
    /// Two vectors and an `n × n` weight matrix.
    Curved,
    /// Two sorted sets of possibly different lengths.
    Sparse,
}

/// A similarity or distance function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Σ aᵢ·bᵢ.
    Inner,
    /// Σ aᵢ·bᵢ without conjugation (complex aware).
    Dot,
    /// Σ conj(aᵢ)·bᵢ.
    VDot,
    /// Σ (aᵢ − bᵢ)².
    SqEuclidean,
    /// 1 − cos(a, b).
    Cosine,
    /// Count of differing bits.
    Hamming,
    /// 1 − |A∩B| / |A∪B| over bits.
    Jaccard,
    /// Jensen-Shannon divergence.
    JensenShannon,
    /// Kullback-Leibler divergence.
    KullbackLeibler,
    /// aᵀ·M·b.
    Bilinear,
    /// √((a − b)ᵀ·M·(a − b)).
    Mahalanobis,
    /// Size of the intersection of two sorted sets.
    Intersect,
}

impl Metric {
    /// All metrics, in index order.
    pub const ALL: [Metric; 12] = [
        Self::Inner,
        Self::Dot,
        Self::VDot,
        Self::SqEuclidean,
        Self::Cosine,
        Self::Hamming,
        Self::Jaccard,
        Self::JensenShannon,
        Self::KullbackLeibler,
        Self::Bilinear,
        Self::Mahalanobis,
        Self::Intersect,
    ];

    /// Canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Dot => "dot",
            Self::VDot => "vdot",
            Self::SqEuclidean => "sqeuclidean",
            Self::Cosine => "cosine",
            Self::Hamming => "hamming",
            Self::Jaccard => "jaccard",
            Self::JensenShannon => "jensenshannon",
            Self::KullbackLeibler => "kullbackleibler",
            Self::Bilinear => "bilinear",
            Self::Mahalanobis => "mahalanobis",
            Self::Intersect => "intersect",
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Signature family of the kernel for this metric on `dtype`.
    ///
    /// `dot` and `vdot` are complex-valued only over complex dtypes.
    #[must_use]
    pub const fn kind(self, complex: bool) -> MetricKind {
        match self {
            Self::Dot | Self::VDot if complex => MetricKind::Complex,
            Self::Bilinear | Self::Mahalanobis => MetricKind::Curved,
            Self::Intersect => MetricKind::Sparse,
            _ => MetricKind::Dense,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner" | "ip" => Ok(Self::Inner),
            "dot" => Ok(Self::Dot),
            "vdot" => Ok(Self::VDot),
            "sqeuclidean" | "l2sq" => Ok(Self::SqEuclidean),
            "cosine" | "cos" | "angular" => Ok(Self::Cosine),
            "hamming" => Ok(Self::Hamming),
            "jaccard" | "tanimoto" => Ok(Self::Jaccard),
            "jensenshannon" | "js" => Ok(Self::JensenShannon),
            "kullbackleibler" | "kl" => Ok(Self::KullbackLeibler),
            "bilinear" => Ok(Self::Bilinear),
            "mahalanobis" => Ok(Self::Mahalanobis),
            "intersect" | "intersection" => Ok(Self::Intersect),
            _ => Err(Error::UnknownMetric(s.to_string())),
        }
    }
}
