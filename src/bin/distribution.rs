//! Lineage-count distribution over a grid of epoch durations.
//!
//! Builds one model and evaluates it at every duration in parallel. The CSV is
//! in long format, one row per `(v, k)` pair, holding the probability that `k`
//! lineages survive an epoch of duration `v` and the expected time spent with
//! `k` lineages inside it.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use coalescent_spectral::{DEFAULT_TOLERANCE, ExactSpectrum, evaluate_grid};
use num_rational::{BigRational, Ratio};
use serde::Serialize;
use std::path::PathBuf;

/// Command-line arguments for the distribution export.
#[derive(Parser, Debug)]
#[clap(
    name = "distribution",
    about = "Exports the lineage-count distribution and interval lengths over a time grid."
)]
struct DistributionArgs {
    /// Number of sampled lineages.
    #[clap(long)]
    n: usize,
    /// Largest epoch duration on the grid.
    #[clap(long, default_value_t = 5.0)]
    v_max: f64,
    /// Number of grid points, including 0 and `v_max`.
    #[clap(long, default_value_t = 51)]
    points: usize,
    /// Build with checked 64-bit arithmetic instead of arbitrary precision.
    #[clap(long)]
    checked: bool,
    /// Largest accepted estimate of the absolute evaluation error.
    #[clap(long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,
    /// Path to the output CSV file where results will be written.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

#[derive(Debug, Serialize)]
struct DistributionRow {
    v: f64,
    k: usize,
    probability: f64,
    interval_length: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;
    let args = DistributionArgs::parse();
    if args.points < 2 {
        return Err(anyhow!("--points must be at least 2"));
    }

    let model = if args.checked {
        ExactSpectrum::<Ratio<i64>>::compute(args.n)
            .and_then(|spectrum| spectrum.to_model_within::<f64>(args.tolerance))
    } else {
        ExactSpectrum::<BigRational>::compute(args.n)
            .and_then(|spectrum| spectrum.to_model_within::<f64>(args.tolerance))
    }
    .with_context(|| format!("Failed to build a model for {} lineages", args.n))?;

    let step = args.v_max / (args.points - 1) as f64;
    let times: Vec<f64> = (0..args.points).map(|i| i as f64 * step).collect();
    let epochs = evaluate_grid(&model, &times)?;

    let mut writer = csv::Writer::from_path(&args.output)?;
    for epoch in &epochs {
        for (i, (&probability, &interval_length)) in epoch
            .probabilities
            .iter()
            .zip(&epoch.interval_lengths)
            .enumerate()
        {
            writer.serialize(DistributionRow {
                v: epoch.time,
                k: i + 1,
                probability,
                interval_length,
            })?;
        }
    }
    writer.flush()?;
    log::info!(
        "Wrote {} durations for n = {} to {:?}.",
        epochs.len(),
        args.n,
        &args.output
    );
    Ok(())
}
