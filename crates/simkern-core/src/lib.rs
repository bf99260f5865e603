//! # simkern core
//!
//! Multi-precision vector similarity kernels with runtime hardware dispatch.
//!
//! ## Features
//!
//! - **12 metrics**: inner, dot, vdot, sqeuclidean, cosine, hamming, jaccard,
//!   Jensen-Shannon, Kullback-Leibler, bilinear, Mahalanobis, set intersection
//! - **10 dtypes**: f64, f32, f16, bf16, i8, packed bits, complex64,
//!   complex128, and u16/u32 sets
//! - **Runtime dispatch**: the best enabled tier (AVX2, AVX-512, NEON, or
//!   the portable baseline) is resolved once per registry change, never per call
//! - **Stable entry points**: every kernel is an `extern "C"` function that
//!   can be exported and called without further dispatch
//! - **Broadcast batches**: row-wise and all-pairs evaluation, row-parallel
//!   with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use simkern_core::{Engine, MatrixRef, Metric};
//!
//! let engine = Engine::global();
//!
//! // Single pair
//! let a = [1.0_f32, 0.0, 0.0];
//! let b = [0.0_f32, 1.0, 0.0];
//! let d = engine.compute(Metric::Cosine, (&a[..]).into(), (&b[..]).into())?;
//! assert!((d.re() - 1.0).abs() < 1e-3);
//!
//! // Ten rows against one
//! let rows: Vec<f32> = (0..30).map(|i| i as f32).collect();
//! let matrix = MatrixRef::new(&rows, 10, 3)?;
//! let query = MatrixRef::from_vector(&a[..]);
//! let out = engine.evaluate(Metric::SqEuclidean, &matrix, &query, None)?;
//! assert_eq!(out.shape(), &[10]);
//! # Ok::<(), simkern_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// =============================================================================
// NUMERIC CAST LINTS
// =============================================================================
// Kernels move between integer and float widths constantly. Range checks are
// explicit where a value can leave its target type (see `output`).
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
// =============================================================================
// STYLISTIC LINTS
// =============================================================================
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::suboptimal_flops)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::similar_names)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::float_cmp)]
#![allow(clippy::ptr_as_ptr)]

pub mod api;
pub mod batch;
#[cfg(test)]
mod batch_tests;
pub mod capability;
pub mod config;
#[cfg(test)]
mod config_tests;
pub mod dispatch;
#[cfg(test)]
mod dispatch_tests;
pub mod dtype;
pub mod engine;
#[cfg(test)]
mod engine_tests;
pub mod error;
pub mod half_precision;
pub mod kernels;
pub mod metric;
pub mod output;
pub mod vector;

pub use api::{
    bilinear, cdist, cosine, disable, dot, enable, evaluate, export_pointer, hamming, inner,
    intersect, jaccard, jensenshannon, kullbackleibler, list_capabilities, mahalanobis,
    sqeuclidean, vdot,
};
pub use batch::{BatchPolicy, BroadcastShape};
pub use capability::{detect_hardware, Capability, CapabilityRegistry, CapabilitySet};
pub use config::{ConfigError, SimkernConfig};
pub use dispatch::{DispatchKey, ExportedKernel, Kernel, ResolvedTable};
pub use dtype::{describe, Accumulator, Dtype, DtypeDescriptor, OutputDtype};
pub use engine::{CallOptions, Engine};
pub use error::{Error, ErrorKind, Result};
pub use half_precision::{bf16_to_f32, f32_to_bf16, pack_bits, unpack_bits};
pub use kernels::{KernelFn, ABI_VERSION};
pub use metric::{Metric, MetricKind};
pub use output::{Distances, Scalar, Values};
pub use vector::{MatrixRef, VectorRef};

/// Re-exported so callers can build `f16`/`bf16` buffers without a direct dependency.
pub use half::{bf16, f16};
