//! Error types for `simkern`.
//!
//! Every failure the engine can report is a variant of [`Error`]. Variants carry
//! a stable `SIMK-XXX` code so bindings can map them onto their own exception
//! hierarchies without parsing messages.

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for `simkern` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving or running a kernel.
///
/// Error codes follow the pattern `SIMK-XXX`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Dtype tag not recognized, or metric not implemented for it (SIMK-001).
    #[error("[SIMK-001] Unsupported dtype: {0}")]
    UnsupportedDtype(String),

    /// Capability tier name not recognized (SIMK-002).
    #[error("[SIMK-002] Unknown capability '{0}'")]
    UnknownCapability(String),

    /// Vector lengths disagree (SIMK-003).
    #[error("[SIMK-003] Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Row counts cannot be broadcast against each other (SIMK-004).
    #[error("[SIMK-004] Cannot broadcast {left} rows against {right} rows")]
    BroadcastMismatch {
        /// Rows on the left operand.
        left: usize,
        /// Rows on the right operand.
        right: usize,
    },

    /// Malformed buffer for the declared shape or dtype (SIMK-005).
    #[error("[SIMK-005] Invalid shape: {0}")]
    InvalidShape(String),

    /// The mathematical precondition of a metric is violated (SIMK-006).
    #[error("[SIMK-006] Numerical domain error: {0}")]
    NumericalDomain(String),

    /// A fixed-width result cannot represent the true value (SIMK-007).
    #[error("[SIMK-007] Overflow: {0}")]
    Overflow(String),

    /// Metric name not recognized (SIMK-008).
    #[error("[SIMK-008] Unknown metric '{0}'")]
    UnknownMetric(String),

    /// Configuration error (SIMK-009).
    #[error("[SIMK-009] Configuration error: {0}")]
    Config(String),
}

/// Coarse error taxonomy exposed to bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Dtype or (metric, dtype) pair is not supported.
    UnsupportedDtype,
    /// Capability name is not recognized.
    UnknownCapability,
    /// Lengths or shapes are incompatible.
    DimensionMismatch,
    /// Result is mathematically undefined for the input.
    NumericalDomain,
    /// Result does not fit the requested representation.
    Overflow,
    /// Metric name is not recognized.
    UnknownMetric,
    /// Configuration could not be loaded or validated.
    Config,
}

impl Error {
    /// Returns the error code (e.g., "SIMK-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedDtype(_) => "SIMK-001",
            Self::UnknownCapability(_) => "SIMK-002",
            Self::DimensionMismatch { .. } => "SIMK-003",
            Self::BroadcastMismatch { .. } => "SIMK-004",
            Self::InvalidShape(_) => "SIMK-005",
            Self::NumericalDomain(_) => "SIMK-006",
            Self::Overflow(_) => "SIMK-007",
            Self::UnknownMetric(_) => "SIMK-008",
            Self::Config(_) => "SIMK-009",
        }
    }

    /// Returns the taxonomy bucket of this error.
    ///
    /// Broadcast and shape failures are both dimension mismatches from the
    /// caller's point of view.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedDtype(_) => ErrorKind::UnsupportedDtype,
            Self::UnknownCapability(_) => ErrorKind::UnknownCapability,
            Self::DimensionMismatch { .. } | Self::BroadcastMismatch { .. } | Self::InvalidShape(_) => {
                ErrorKind::DimensionMismatch
            }
            Self::NumericalDomain(_) => ErrorKind::NumericalDomain,
            Self::Overflow(_) => ErrorKind::Overflow,
            Self::UnknownMetric(_) => ErrorKind::UnknownMetric,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns true if retrying with different inputs may succeed.
    ///
    /// Dtype and overflow failures can be retried with another dtype; the
    /// remaining errors describe the input itself.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnsupportedDtype(_) | Self::Overflow(_))
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
