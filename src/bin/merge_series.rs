//! Merge two custom-series documents into one.
//!
//! Points of matching metrics are concatenated and sorted by time; metadata
//! comes from the first file. Used to stitch together series recovered from
//! two hosts after an outage.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::filter::EnvFilter;

use stationflow::retention::{load_metric_series, merge_metric_series, write_metric_series};

#[derive(Debug, Parser)]
#[command(name = "merge-series", about = "Merge two custom.json series documents")]
struct Args {
    /// Document whose metric metadata is kept
    file1: PathBuf,

    /// Document merged into the first
    file2: PathBuf,

    /// Output path, replaced atomically
    output: PathBuf,
}

fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let args = Args::parse();

    let first = load_metric_series(&args.file1)
        .ok_or_else(|| anyhow!("cannot read series from {}", args.file1.display()))?;
    let second = load_metric_series(&args.file2)
        .ok_or_else(|| anyhow!("cannot read series from {}", args.file2.display()))?;

    let merged = merge_metric_series(first, second);
    write_metric_series(&args.output, &merged)?;

    println!(
        "Merged {} metrics into {}",
        merged.len(),
        args.output.display()
    );
    Ok(())
}
