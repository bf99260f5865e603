//! Per-tier kernel timing.
//!
//! Each enabled tier that implements the pair is pinned through a private
//! table built from the baseline plus that tier, so the numbers compare
//! implementations rather than whatever the engine would pick.

use std::hint::black_box;
use std::time::Instant;

use anyhow::{bail, Result};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use simkern_core::dispatch::implementing_tiers;
use simkern_core::{
    Capability, CapabilitySet, Dtype, Engine, Kernel, Metric, MetricKind, ResolvedTable,
};

use crate::operand::Buffer;
use crate::render::OutputFormat;

/// Timing of one tier.
#[derive(Debug, Clone, Serialize)]
pub struct Timing {
    pub tier: Capability,
    pub ns_per_call: f64,
    pub speedup: f64,
}

/// Deterministic values in `[0, 1)`.
fn uniform(len: usize, seed: u64) -> Vec<f64> {
    let mut x = seed;
    (0..len)
        .map(|_| {
            x = x
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (x >> 11) as f64 / (1u64 << 53) as f64
        })
        .collect()
}

/// Stored values for `dim` logical elements of `dtype`.
fn sample(dtype: Dtype, dim: usize, seed: u64) -> Vec<f64> {
    match dtype {
        Dtype::I8 => uniform(dim, seed)
            .into_iter()
            .map(|x| (x * 200.0 - 100.0).round())
            .collect(),
        Dtype::B8 => uniform(dim, seed)
            .into_iter()
            .map(|x| (x * 256.0).floor())
            .collect(),
        // Sorted sets with roughly half the elements shared.
        Dtype::U16 | Dtype::U32 => {
            let limit = if dtype == Dtype::U16 { 60_000 } else { usize::MAX };
            (0..dim)
                .map(|i| (i * 2 + (seed as usize % 2) * (i % 2)).min(limit) as f64)
                .collect()
        }
        Dtype::Complex64 | Dtype::Complex128 => uniform(dim * 2, seed),
        _ => uniform(dim, seed).into_iter().map(|x| x + 0.01).collect(),
    }
}

fn identity(dtype: Dtype, dim: usize) -> Vec<f64> {
    let mut m = vec![0.0; dim * dim];
    for i in 0..dim {
        m[i * dim + i] = 1.0;
    }
    if dtype.is_complex() {
        m.iter().flat_map(|&x| [x, 0.0]).collect()
    } else {
        m
    }
}

fn time_kernel(kernel: &Kernel, a: &Buffer, b: &Buffer, m: &Buffer, iterations: u32) -> Result<f64> {
    let dtype = kernel.dtype();
    let (a, b, m) = (a.view(dtype)?, b.view(dtype)?, m.view(dtype)?);
    let kind = kernel.metric().kind(dtype.is_complex());

    let start = Instant::now();
    for _ in 0..iterations {
        match kind {
            MetricKind::Dense | MetricKind::Complex => {
                black_box(kernel.call(black_box(a), black_box(b))?);
            }
            MetricKind::Curved => {
                black_box(kernel.call_curved(black_box(a), black_box(b), m)?);
            }
            MetricKind::Sparse => {
                black_box(kernel.call_sparse(black_box(a), black_box(b))?);
            }
        }
    }
    Ok(start.elapsed().as_nanos() as f64 / f64::from(iterations))
}

/// Times `(metric, dtype)` on every enabled tier implementing it.
pub fn run(engine: &Engine, metric: Metric, dtype: Dtype, dim: usize, iterations: u32) -> Result<Vec<Timing>> {
    let enabled = engine.registry().enabled();
    let tiers: Vec<Capability> = implementing_tiers(metric, dtype)
        .into_iter()
        .filter(|t| enabled.contains(*t))
        .collect();
    if tiers.is_empty() {
        bail!("{} is not implemented for {}", metric, dtype);
    }

    let a = Buffer::encode(&sample(dtype, dim, 1), dtype)?;
    let b = Buffer::encode(&sample(dtype, dim, 2), dtype)?;
    let weights = if matches!(metric, Metric::Bilinear | Metric::Mahalanobis) {
        identity(dtype, dim)
    } else {
        Vec::new()
    };
    let m = Buffer::encode(&weights, dtype)?;

    let mut timings = Vec::with_capacity(tiers.len());
    for tier in tiers {
        let kernel = ResolvedTable::build(CapabilitySet::baseline().with(tier)).resolve(metric, dtype)?;
        let ns_per_call = time_kernel(&kernel, &a, &b, &m, iterations)?;
        tracing::debug!(tier = %tier, ns_per_call, "timed kernel");
        timings.push(Timing {
            tier,
            ns_per_call,
            speedup: 1.0,
        });
    }

    if let Some(serial) = timings.iter().find(|t| t.tier.is_baseline()).map(|t| t.ns_per_call) {
        for t in &mut timings {
            t.speedup = serial / t.ns_per_call.max(f64::MIN_POSITIVE);
        }
    }
    Ok(timings)
}

/// Prints timings, highest priority tier first.
pub fn print(timings: &[Timing], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(timings)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec![
                Cell::new("tier").fg(Color::Cyan),
                Cell::new("ns/call").fg(Color::Cyan),
                Cell::new("vs serial").fg(Color::Cyan),
            ]);
            for t in timings {
                table.add_row(vec![
                    Cell::new(t.tier.name()),
                    Cell::new(format!("{:.1}", t.ns_per_call)),
                    Cell::new(format!("{:.2}x", t.speedup)),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
