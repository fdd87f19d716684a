//! Experiment Runner for Model Construction Cost.
//!
//! This executable times the two exact builders over a range of sample sizes.
//! The arbitrary-precision builder (`BigRational`) accepts any number of
//! lineages; the fixed-width builder (`Ratio<i64>`) is faster but rejects sample
//! sizes beyond its exact-arithmetic bound, which shows up in the output as a
//! row with `status = "range-exceeded"`.
//!
//! Models are converted without an accuracy check. Rows whose estimated
//! evaluation error exceeds the default tolerance are marked
//! `status = "beyond-tolerance"`, since `build_model` would reject them.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use coalescent_spectral::{
    CoalescentErrorKind, DEFAULT_TOLERANCE, ExactSpectrum, utils::perf::measure,
};
use num_rational::{BigRational, Ratio};
use serde::Serialize;
use std::path::PathBuf;

/// The exact scalar used during construction.
#[derive(ValueEnum, Clone, Debug, Serialize, PartialEq, Eq, Copy)]
#[serde(rename_all = "kebab-case")]
enum Builder {
    /// Arbitrary-precision rationals.
    BigRational,
    /// Checked 64-bit rationals.
    Checked,
}

/// Command-line arguments for the construction benchmark.
#[derive(Parser, Debug)]
#[clap(
    name = "construction-runner",
    about = "Times exact model construction for a range of sample sizes."
)]
struct ConstructionArgs {
    /// Builders to run. Defaults to both.
    #[clap(long, value_enum, num_args = 1.., default_values = ["big-rational", "checked"])]
    builders: Vec<Builder>,
    /// Smallest number of lineages.
    #[clap(long, default_value_t = 2)]
    n_min: usize,
    /// Largest number of lineages.
    #[clap(long, default_value_t = 64)]
    n_max: usize,
    /// Step between sample sizes.
    #[clap(long, default_value_t = 2)]
    n_step: usize,
    /// Repetitions per (builder, n); the fastest is reported.
    #[clap(long, default_value_t = 3)]
    repeats: usize,
    /// Path to the output CSV file where results will be written.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// A single row of the output CSV.
#[derive(Debug, Serialize)]
struct ConstructionResult {
    builder: Builder,
    n_lineages: usize,
    status: &'static str,
    time_s: f64,
    rss_kb: u64,
    error_bound: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;
    let args = ConstructionArgs::parse();
    if args.n_step == 0 || args.repeats == 0 {
        return Err(anyhow!("--n-step and --repeats must be positive"));
    }

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to create {:?}", args.output))?;

    for n in (args.n_min.max(2)..=args.n_max).step_by(args.n_step) {
        for &builder in &args.builders {
            let mut best: Option<(f64, u64)> = None;
            let mut error_bound = f64::NAN;
            let mut status = "ok";

            for _ in 0..args.repeats {
                let m = measure(|| match builder {
                    Builder::BigRational => ExactSpectrum::<BigRational>::compute(n)
                        .and_then(|spectrum| spectrum.to_model::<f64>()),
                    Builder::Checked => ExactSpectrum::<Ratio<i64>>::compute(n)
                        .and_then(|spectrum| spectrum.to_model::<f64>()),
                });
                match m.value {
                    Ok(model) => {
                        error_bound = model.error_bound();
                        let time_s = m.elapsed.as_secs_f64();
                        if best.is_none_or(|(t, _)| time_s < t) {
                            best = Some((time_s, m.peak_rss_kb));
                        }
                    }
                    Err(e) => {
                        if matches!(
                            e.kind(),
                            CoalescentErrorKind::LineageBoundExceeded { .. }
                                | CoalescentErrorKind::ExactArithmeticOverflow { .. }
                        ) {
                            status = "range-exceeded";
                            break;
                        }
                        return Err(e).context(format!("Construction failed for n = {n}"));
                    }
                }
            }

            if status == "ok" && error_bound > DEFAULT_TOLERANCE {
                status = "beyond-tolerance";
            }
            let (time_s, rss_kb) = best.unwrap_or((f64::NAN, 0));
            log::info!("{builder:?} n = {n}: {status}, {time_s:.6} s");
            writer.serialize(ConstructionResult {
                builder,
                n_lineages: n,
                status,
                time_s,
                rss_kb,
                error_bound,
            })?;
        }
    }

    writer.flush()?;
    log::info!("Construction benchmark complete. Results saved to {:?}.", &args.output);
    Ok(())
}
