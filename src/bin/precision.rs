//! Experiment Runner for the Precision Regression Analysis.
//!
//! For each sample size and each epoch duration on a grid, this executable
//! evaluates the model three ways:
//! - in `f64`, the production path;
//! - in `f32`, the low-precision path;
//! - with exact rational coefficients applied to the same `f64` eigenvalues,
//!   which isolates the cancellation error of the triangular product.
//!
//! The maximum absolute deviations are written to CSV next to each model's
//! `error_bound` estimate. Deviations grow with the number of lineages because
//! the coefficients alternate in sign and grow combinatorially, while their
//! weighted sums stay in `[0, 1]`. Models are converted without an accuracy
//! check so that the sweep can run past the default tolerance.

use anyhow::{Result, anyhow};
use clap::Parser;
use coalescent_spectral::{EpochWorkspace, ExactSpectrum};
use num_rational::BigRational;
use serde::Serialize;
use std::path::PathBuf;

/// Command-line arguments for the precision analysis.
#[derive(Parser, Debug)]
#[clap(
    name = "precision-runner",
    about = "Measures floating-point error of model evaluation against an exact reference."
)]
struct PrecisionArgs {
    /// Sample sizes to analyse.
    #[clap(long, num_args = 1.., default_values_t = [2usize, 4, 8, 16, 32])]
    lineages: Vec<usize>,
    /// Largest epoch duration on the grid.
    #[clap(long, default_value_t = 9.5)]
    v_max: f64,
    /// Spacing of the duration grid.
    #[clap(long, default_value_t = 0.5)]
    v_step: f64,
    /// Path to the output CSV file where results will be written.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// A single row of the output CSV.
#[derive(Debug, Serialize)]
struct PrecisionResult {
    n_lineages: usize,
    v: f64,
    /// max |p_f64 - p_exact| over k.
    project_f64_vs_exact: f64,
    /// max |l_f64 - l_exact| over k.
    intervals_f64_vs_exact: f64,
    /// max |p_f32 - p_f64| over k.
    project_f32_vs_f64: f64,
    /// max |l_f32 - l_f64| over k.
    intervals_f32_vs_f64: f64,
    error_bound_f64: f64,
    error_bound_f32: f64,
}

fn max_abs_diff(a: impl IntoIterator<Item = f64>, b: &[f64]) -> f64 {
    a.into_iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;
    let args = PrecisionArgs::parse();
    if !(args.v_step > 0.0) || args.v_max < 0.0 {
        return Err(anyhow!("--v-step must be positive and --v-max non-negative"));
    }
    let steps = (args.v_max / args.v_step).floor() as usize;
    let times: Vec<f64> = (0..=steps).map(|i| i as f64 * args.v_step).collect();

    let mut writer = csv::Writer::from_path(&args.output)?;

    for &n in &args.lineages {
        log::info!("Analysing n = {}...", n);
        let exact = ExactSpectrum::<BigRational>::compute(n)?;
        let model_f64 = exact.to_model::<f64>()?;
        let model_f32 = exact.to_model::<f32>()?;
        let mut ws_f64 = EpochWorkspace::new(&model_f64);
        let mut ws_f32 = EpochWorkspace::new(&model_f32);

        for &v in &times {
            ws_f64.evaluate(&model_f64, v)?;
            ws_f32.evaluate(&model_f32, v as f32)?;
            let reference = exact.evaluate_reference(ws_f64.eigenvalues())?;

            let row = PrecisionResult {
                n_lineages: n,
                v,
                project_f64_vs_exact: max_abs_diff(
                    ws_f64.probabilities().iter().copied(),
                    &reference.probabilities,
                ),
                intervals_f64_vs_exact: max_abs_diff(
                    ws_f64.interval_lengths().iter().copied(),
                    &reference.interval_lengths,
                ),
                project_f32_vs_f64: max_abs_diff(
                    ws_f32.probabilities().iter().map(|&x| x as f64),
                    ws_f64.probabilities(),
                ),
                intervals_f32_vs_f64: max_abs_diff(
                    ws_f32.interval_lengths().iter().map(|&x| x as f64),
                    ws_f64.interval_lengths(),
                ),
                error_bound_f64: model_f64.error_bound(),
                error_bound_f32: model_f32.error_bound(),
            };
            log::debug!("{row:?}");
            writer.serialize(row)?;
        }
    }

    writer.flush()?;
    log::info!("Precision analysis complete. Results saved to {:?}.", &args.output);
    Ok(())
}
