//! Table and JSON rendering for CLI results.

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use simkern_core::{Capability, Distances, Engine, Kernel, Scalar};

/// Output format shared by every subcommand.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Serialize)]
struct CapabilityRow {
    tier: Capability,
    priority: u8,
    supported: bool,
    enabled: bool,
}

#[derive(Serialize)]
pub struct KernelRow {
    pub metric: String,
    pub dtype: String,
    pub tier: String,
    pub address: String,
}

impl From<&Kernel> for KernelRow {
    fn from(k: &Kernel) -> Self {
        Self {
            metric: k.metric().to_string(),
            dtype: k.dtype().to_string(),
            tier: k.tier().to_string(),
            address: format!("{:#x}", k.address()),
        }
    }
}

fn new_table(columns: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    let header: Vec<Cell> = columns
        .iter()
        .map(|c| Cell::new(c).fg(Color::Cyan))
        .collect();
    table.set_header(header);
    table
}

fn flag(on: bool) -> Cell {
    if on {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no").fg(Color::DarkGrey)
    }
}

/// Prints every tier with its hardware support and enabled state.
pub fn print_capabilities(engine: &Engine, format: OutputFormat) -> Result<()> {
    let supported = engine.registry().supported();
    let rows: Vec<CapabilityRow> = engine
        .list_capabilities()
        .into_iter()
        .map(|(tier, enabled)| CapabilityRow {
            tier,
            priority: tier.priority(),
            supported: supported.contains(tier),
            enabled,
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Table => {
            let mut table = new_table(&["tier", "priority", "supported", "enabled"]);
            for row in &rows {
                table.add_row(vec![
                    Cell::new(row.tier.name()),
                    Cell::new(row.priority),
                    flag(row.supported),
                    flag(row.enabled),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

/// Prints resolved kernels.
pub fn print_kernels(rows: &[KernelRow], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No kernels match.".dimmed());
                return Ok(());
            }
            let mut table = new_table(&["metric", "dtype", "tier", "address"]);
            for row in rows {
                table.add_row(vec![
                    Cell::new(&row.metric),
                    Cell::new(&row.dtype),
                    Cell::new(&row.tier),
                    Cell::new(&row.address).fg(Color::DarkGrey),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

fn cell(value: Option<Scalar>) -> Cell {
    value.map_or_else(|| Cell::new("-"), Cell::new)
}

/// Prints a batch result: a bare value, an indexed column or an `M × N` grid.
pub fn print_distances(result: &Distances, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    match *result.shape() {
        [] => {
            if let Some(value) = result.get(0) {
                println!("{value}");
            }
        }
        [rows, cols] => {
            let mut columns = vec![String::new()];
            columns.extend((0..cols).map(|j| j.to_string()));
            let refs: Vec<&str> = columns.iter().map(String::as_str).collect();
            let mut table = new_table(&refs);
            for i in 0..rows {
                let mut cells = vec![Cell::new(i).fg(Color::Cyan)];
                cells.extend((0..cols).map(|j| cell(result.at(i, j))));
                table.add_row(cells);
            }
            println!("{table}");
        }
        _ => {
            let mut table = new_table(&["row", result.dtype().name()]);
            for i in 0..result.len() {
                table.add_row(vec![Cell::new(i), cell(result.get(i))]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
