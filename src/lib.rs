//! Lineage-count distributions and interval lengths of the Kingman coalescent
//! over an epoch of constant population size.
//!
//! Given `n` sampled lineages at the recent end of an epoch of duration `v`
//! (in coalescent time units), this crate computes
//! - the probability that `k` ancestral lineages survive to the ancient end of
//!   the epoch, for `k = 1..=n`, and
//! - the expected length of the sub-interval during which exactly `k` lineages
//!   exist.
//!
//! Both follow from the spectral decomposition of the lineage-counting Markov
//! chain. The eigenvectors are known in closed form, but their coefficients
//! alternate in sign and grow combinatorially, so building them in floating
//! point loses all precision for moderate `n`. This crate builds them once in
//! exact rational arithmetic ([`algorithms::spectral`]), converts them to
//! floating point, and stores them in packed triangular form
//! ([`matrix::TriangularStore`]). Each evaluation is then a single
//! triangular matrix-vector product.
//!
//! ## Construction
//!
//! **Arbitrary precision** ([`build_model`]): uses `BigRational`. Never
//! overflows; construction slows down as the exact coefficients grow.
//!
//! **Checked fixed width** ([`build_model_checked`]): uses `Ratio<i64>` with
//! overflow checks. Faster, but limited to [`MAX_CHECKED_LINEAGES`] lineages.
//! Within that bound both builders produce bit-identical models.
//!
//! ## Accuracy horizon
//!
//! Exact construction only removes the error of building the coefficients.
//! Evaluation still sums alternating terms in floating point, and the
//! rounding error grows roughly like `epsilon * max_i sum_j |gmat[i][j]|`.
//! Every model carries this estimate as [`CoalescentModel::error_bound`].
//! Both builders reject models whose estimate exceeds [`DEFAULT_TOLERANCE`]
//! (`1e-5`), which accepts up to 38 lineages in `f64` and 8 in `f32`.
//! [`build_model_with_tolerance`] picks a different limit, and
//! [`ExactSpectrum::to_model`] converts without any check.
//!
//! ## Example Usage
//!
//! ```rust
//! use coalescent_spectral::{build_model, evaluate};
//!
//! let model = build_model::<f64>(10).unwrap();
//! let epoch = evaluate(&model, 0.5).unwrap();
//!
//! // The distribution over k = 1..=10 surviving lineages sums to one.
//! let total: f64 = epoch.probabilities.iter().sum();
//! assert!((total - 1.0).abs() < 1e-12);
//!
//! // The interval lengths partition the epoch.
//! let elapsed: f64 = epoch.interval_lengths.iter().sum();
//! assert!((elapsed - 0.5).abs() < 1e-12);
//! ```
//!
//! For hot loops use the allocation-free [`eigenvalues`], [`project`] and
//! [`interval_lengths`] with caller-owned buffers, or an [`EpochWorkspace`].
//! [`sweep::evaluate_grid`] evaluates many durations in parallel.

pub mod algorithms;
pub mod error;
pub mod evaluate;
pub mod matrix;
pub mod model;
pub mod sweep;
pub mod utils;

pub use algorithms::{
    DEFAULT_TOLERANCE, ExactSpectrum, MAX_CHECKED_LINEAGES, build_model, build_model_checked,
    build_model_with_tolerance,
};
pub use error::{CoalescentError, CoalescentErrorKind};
pub use evaluate::{
    EpochEvaluation, EpochWorkspace, eigenvalues, evaluate, interval_lengths, project,
};
pub use matrix::{InlineTriangularStore, Triangle, TriangularStore};
pub use model::{CoalescentModel, Real};
pub use sweep::{build_models, evaluate_grid};
