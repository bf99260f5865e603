#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
//! `simkern` CLI - inspect dispatch and evaluate similarity kernels
//!
//! Usage:
//!   `simkern caps`
//!   `simkern kernels --metric cosine`
//!   `simkern eval cosine --a "[1, 0]" --b "[0, 1]" --dtype f16`
//!   `simkern cdist sqeuclidean --a @rows.json --b "[[2, 2], [3, 3]]"`
//!   `simkern bench inner --dtype bf16 --dim 1536`

mod bench;
mod operand;
mod render;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use simkern_core::{describe, Dtype, Engine, Metric, MetricKind, OutputDtype, SimkernConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use operand::Rows;
use render::{KernelRow, OutputFormat};

#[derive(Parser)]
#[command(name = "simkern")]
#[command(
    author,
    version,
    about = "simkern CLI - multi-precision similarity kernels with runtime dispatch"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (a missing file falls back to defaults)
    #[arg(long, global = true, env = "SIMKERN_CONFIG", default_value = "simkern.toml")]
    config: PathBuf,

    /// Tiers to disable before running the command (repeatable or comma-separated)
    #[arg(long, global = true, value_delimiter = ',')]
    disable: Vec<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

fn parse_metric(s: &str) -> Result<Metric, String> {
    s.parse().map_err(|e: simkern_core::Error| e.to_string())
}

fn parse_dtype(s: &str) -> Result<Dtype, String> {
    s.parse().map_err(|e: simkern_core::Error| e.to_string())
}

fn parse_output(s: &str) -> Result<OutputDtype, String> {
    s.parse().map_err(|e: simkern_core::Error| e.to_string())
}

#[derive(Subcommand)]
enum Commands {
    /// List capability tiers with hardware support and enabled state
    Caps,

    /// Show the resolved dispatch table
    Kernels {
        /// Only show this metric
        #[arg(long, value_parser = parse_metric)]
        metric: Option<Metric>,

        /// Only show this dtype
        #[arg(long, value_parser = parse_dtype)]
        dtype: Option<Dtype>,
    },

    /// Show the precision policy of a dtype
    Describe {
        /// Dtype tag (f32, bf16, "d", ...)
        dtype: String,
    },

    /// Evaluate a metric on two operands
    Eval {
        /// Metric name
        #[arg(value_parser = parse_metric)]
        metric: Metric,

        /// Left operand: JSON vector or matrix, "1,2;3,4", or @file
        #[arg(long)]
        a: String,

        /// Right operand, same forms as --a
        #[arg(long)]
        b: String,

        /// Element dtype the operands are encoded as
        #[arg(long, value_parser = parse_dtype, default_value = "f64")]
        dtype: Dtype,

        /// Result dtype
        #[arg(long, value_parser = parse_output)]
        out: Option<OutputDtype>,

        /// Weight matrix for bilinear and mahalanobis (n × n, row-major)
        #[arg(long)]
        weights: Option<String>,
    },

    /// Evaluate a metric on every row of A against every row of B
    Cdist {
        /// Metric name
        #[arg(value_parser = parse_metric)]
        metric: Metric,

        /// Left matrix: JSON, "1,2;3,4", or @file
        #[arg(long)]
        a: String,

        /// Right matrix, same forms as --a
        #[arg(long)]
        b: String,

        /// Element dtype the operands are encoded as
        #[arg(long, value_parser = parse_dtype, default_value = "f64")]
        dtype: Dtype,

        /// Result dtype
        #[arg(long, value_parser = parse_output)]
        out: Option<OutputDtype>,
    },

    /// Time one kernel on every enabled tier implementing it
    Bench {
        /// Metric name
        #[arg(value_parser = parse_metric)]
        metric: Metric,

        /// Element dtype
        #[arg(long, value_parser = parse_dtype, default_value = "f32")]
        dtype: Dtype,

        /// Vector length
        #[arg(long, default_value = "768")]
        dim: usize,

        /// Calls per tier
        #[arg(long, default_value = "10000")]
        iterations: u32,
    },
}

fn init_tracing(config: &SimkernConfig) {
    let filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = SimkernConfig::load_from_path(&cli.config)
        .with_context(|| format!("Cannot load {}", cli.config.display()))?;
    init_tracing(&config);

    let engine = Engine::from_config(&config)?;
    for tier in &cli.disable {
        engine.disable(tier)?;
    }
    tracing::debug!(
        enabled = engine.registry().enabled().len(),
        "engine ready"
    );

    match cli.command {
        Commands::Caps => render::print_capabilities(&engine, cli.format)?,
        Commands::Kernels { metric, dtype } => {
            let snapshot = engine.registry().snapshot();
            let rows: Vec<KernelRow> = snapshot
                .table()
                .iter()
                .filter(|k| metric.is_none_or(|m| k.metric() == m))
                .filter(|k| dtype.is_none_or(|d| k.dtype() == d))
                .map(|k| KernelRow::from(&k))
                .collect();
            render::print_kernels(&rows, cli.format)?;
        }
        Commands::Describe { dtype } => {
            let descriptor = describe(&dtype)?;
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&descriptor)?);
                }
                OutputFormat::Table => {
                    println!("{}", descriptor.dtype.to_string().green().bold());
                    println!("  Bits per element:   {}", descriptor.bits);
                    println!("  Lanes per element:  {}", descriptor.lanes);
                    println!("  Flat accumulator:   {:?}", descriptor.dense);
                    println!("  Curved accumulator: {:?}", descriptor.curved);
                }
            }
        }
        Commands::Eval {
            metric,
            a,
            b,
            dtype,
            out,
            weights,
        } => {
            let a = Rows::parse(&a)?.encode(dtype)?;
            let b = Rows::parse(&b)?.encode(dtype)?;
            let (ma, mb) = (a.matrix()?, b.matrix()?);

            let result = match (metric.kind(dtype.is_complex()), weights) {
                (MetricKind::Curved, Some(weights)) => {
                    let m = Rows::parse(&weights)?.encode(dtype)?;
                    engine.evaluate_curved(metric, &ma, &mb, m.flat()?, out)?
                }
                (MetricKind::Curved, None) => {
                    bail!("{} needs a weight matrix (--weights)", metric);
                }
                (_, Some(_)) => bail!("{} does not take --weights", metric),
                (_, None) => engine.evaluate(metric, &ma, &mb, out)?,
            };
            render::print_distances(&result, cli.format)?;
        }
        Commands::Cdist {
            metric,
            a,
            b,
            dtype,
            out,
        } => {
            let a = Rows::parse(&a)?.encode(dtype)?;
            let b = Rows::parse(&b)?.encode(dtype)?;
            let result = engine.cdist(metric, &a.matrix()?, &b.matrix()?, out)?;
            render::print_distances(&result, cli.format)?;
        }
        Commands::Bench {
            metric,
            dtype,
            dim,
            iterations,
        } => {
            if iterations == 0 {
                bail!("--iterations must be at least 1");
            }
            let timings = bench::run(&engine, metric, dtype, dim, iterations)?;
            bench::print(&timings, cli.format)?;
        }
    }

    Ok(())
}
