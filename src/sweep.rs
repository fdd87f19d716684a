//! Parallel evaluation over many epochs.
//!
//! Models are immutable once built and the evaluator only writes to buffers it
//! is handed, so both construction for distinct sample sizes and evaluation at
//! distinct durations parallelise without any coordination. Each rayon task
//! owns its own [`EpochWorkspace`].

use crate::{
    algorithms::build_model,
    error::CoalescentError,
    evaluate::{EpochEvaluation, EpochWorkspace},
    model::{CoalescentModel, Real},
};
use rayon::prelude::*;

/// Evaluates `model` at every duration in `times`, in parallel.
///
/// The output is in the same order as `times`. The first failing duration
/// aborts the sweep.
pub fn evaluate_grid<T: Real>(
    model: &CoalescentModel<T>,
    times: &[T],
) -> Result<Vec<EpochEvaluation<T>>, CoalescentError> {
    log::debug!(
        "Evaluating {} lineages over {} durations.",
        model.n_lineages(),
        times.len()
    );
    times
        .par_iter()
        .map_init(
            || EpochWorkspace::new(model),
            |workspace, &v| -> Result<EpochEvaluation<T>, CoalescentError> {
                workspace.evaluate(model, v)?;
                Ok(workspace.snapshot())
            },
        )
        .collect()
}

/// Builds one model per entry of `lineages`, in parallel.
///
/// Each model is subject to the same accuracy check as [`build_model`].
pub fn build_models<T: Real>(
    lineages: &[usize],
) -> Result<Vec<CoalescentModel<T>>, CoalescentError> {
    lineages.par_iter().map(|&n| build_model(n)).collect()
}
