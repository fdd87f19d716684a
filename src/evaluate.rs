//! Evaluation of a [`CoalescentModel`] at a given epoch duration.
//!
//! The three core functions, [`eigenvalues`], [`project`] and
//! [`interval_lengths`], write into caller-supplied buffers and never allocate,
//! so they can sit inside loops over many time values and many epochs. They
//! only read the model, which makes concurrent evaluation of one model from
//! several threads safe as long as each thread owns its buffers.
//!
//! A typical evaluation at duration `v` is
//!
//! ```rust
//! use coalescent_spectral::{build_model, eigenvalues, interval_lengths, project};
//!
//! let model = build_model::<f64>(3).unwrap();
//! let mut eig = vec![0.0; model.dimension()];
//! let mut prob = vec![0.0; model.dimension()];
//! let mut len = vec![0.0; model.dimension()];
//!
//! eigenvalues(&mut eig, 1.0, &model).unwrap();
//! project(&mut prob, &eig, &model).unwrap();
//! interval_lengths(&mut len, &eig, &model).unwrap();
//!
//! // prob[k - 2] is the probability that k lineages survive the epoch.
//! let p_three = (-3.0f64).exp();
//! assert!((prob[1] - p_three).abs() < 1e-15);
//! ```
//!
//! [`EpochWorkspace`] bundles the three buffers, and [`evaluate`] returns an
//! owned [`EpochEvaluation`] that also covers the single-lineage state.

use crate::{
    error::{CoalescentError, CoalescentErrorKind},
    matrix::check_len,
    model::{CoalescentModel, Real},
};

fn check_time<T: Real>(v: T) -> Result<(), CoalescentError> {
    if v.is_nan() || v < T::zero() {
        return Err(CoalescentErrorKind::InvalidTime(v.to_f64().unwrap_or(f64::NAN)).into());
    }
    Ok(())
}

/// Writes `exp(-v * beta[i])` into `out_eig`.
///
/// `v` is the epoch duration in coalescent time units. `v = 0` yields all ones
/// and `v = inf` all zeros.
///
/// # Errors
/// - `DimensionMismatch` if `out_eig.len() != model.dimension()`.
/// - `InvalidTime` if `v` is negative or NaN.
pub fn eigenvalues<T: Real>(
    out_eig: &mut [T],
    v: T,
    model: &CoalescentModel<T>,
) -> Result<(), CoalescentError> {
    check_len("out_eig", model.dimension(), out_eig.len())?;
    check_time(v)?;
    for (e, &b) in out_eig.iter_mut().zip(model.beta()) {
        *e = (-v * b).exp();
    }
    Ok(())
}

/// Writes `gmat * eig` into `out_prob`.
///
/// `out_prob[k - 2]` is the probability that exactly `k` lineages remain at
/// the ancient end of the epoch, for `k = 2..=n_lineages`. The probability of
/// a single lineage is `1 - sum(out_prob)`.
///
/// # Errors
/// `DimensionMismatch` if either buffer length differs from `model.dimension()`.
pub fn project<T: Real>(
    out_prob: &mut [T],
    eig: &[T],
    model: &CoalescentModel<T>,
) -> Result<(), CoalescentError> {
    check_len("out_prob", model.dimension(), out_prob.len())?;
    check_len("eig", model.dimension(), eig.len())?;
    model.gmat().apply_into(out_prob, eig)
}

/// Writes `rbeta + hmat * eig` into `out_len`.
///
/// `out_len[k - 2]` is the expected time during which exactly `k` lineages
/// exist, for `k = 2..=n_lineages`. The single-lineage interval has length
/// `v - sum(out_len)`.
///
/// # Errors
/// `DimensionMismatch` if either buffer length differs from `model.dimension()`.
pub fn interval_lengths<T: Real>(
    out_len: &mut [T],
    eig: &[T],
    model: &CoalescentModel<T>,
) -> Result<(), CoalescentError> {
    check_len("out_len", model.dimension(), out_len.len())?;
    check_len("eig", model.dimension(), eig.len())?;
    model.hmat().apply_into(out_len, eig)?;
    for (l, &r) in out_len.iter_mut().zip(model.rbeta()) {
        *l += r;
    }
    Ok(())
}

/// Reusable buffers for repeated evaluation of one model.
#[derive(Debug, Clone)]
pub struct EpochWorkspace<T> {
    time: T,
    eig: Vec<T>,
    prob: Vec<T>,
    len: Vec<T>,
}

impl<T: Real> EpochWorkspace<T> {
    /// Allocates buffers sized for `model`.
    pub fn new(model: &CoalescentModel<T>) -> Self {
        let n = model.dimension();
        Self {
            time: T::zero(),
            eig: vec![T::zero(); n],
            prob: vec![T::zero(); n],
            len: vec![T::zero(); n],
        }
    }

    /// Evaluates `model` at duration `v`, overwriting the previous contents.
    ///
    /// On error the buffers hold unspecified values.
    pub fn evaluate(&mut self, model: &CoalescentModel<T>, v: T) -> Result<(), CoalescentError> {
        eigenvalues(&mut self.eig, v, model)?;
        project(&mut self.prob, &self.eig, model)?;
        interval_lengths(&mut self.len, &self.eig, model)?;
        self.time = v;
        Ok(())
    }

    /// The duration of the last evaluation.
    pub fn time(&self) -> T {
        self.time
    }

    pub fn eigenvalues(&self) -> &[T] {
        &self.eig
    }

    /// Probabilities for `k = 2..=n_lineages`.
    pub fn probabilities(&self) -> &[T] {
        &self.prob
    }

    /// Interval lengths for `k = 2..=n_lineages`.
    pub fn interval_lengths(&self) -> &[T] {
        &self.len
    }

    /// Probability that all lineages coalesced into one.
    pub fn single_lineage_probability(&self) -> T {
        T::one() - self.prob.iter().fold(T::zero(), |acc, &p| acc + p)
    }

    /// Expected time spent with a single lineage.
    pub fn single_lineage_length(&self) -> T {
        self.time - self.len.iter().fold(T::zero(), |acc, &l| acc + l)
    }

    /// Copies the current state into an owned [`EpochEvaluation`].
    pub fn snapshot(&self) -> EpochEvaluation<T> {
        let mut probabilities = Vec::with_capacity(self.prob.len() + 1);
        probabilities.push(self.single_lineage_probability());
        probabilities.extend_from_slice(&self.prob);

        let mut interval_lengths = Vec::with_capacity(self.len.len() + 1);
        interval_lengths.push(self.single_lineage_length());
        interval_lengths.extend_from_slice(&self.len);

        EpochEvaluation {
            time: self.time,
            probabilities,
            interval_lengths,
        }
    }
}

/// The complete outcome of one epoch, covering `k = 1..=n_lineages`.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochEvaluation<T> {
    /// Epoch duration in coalescent time units.
    pub time: T,
    /// `probabilities[k - 1]` is the probability that `k` lineages survive.
    pub probabilities: Vec<T>,
    /// `interval_lengths[k - 1]` is the expected time with `k` lineages.
    pub interval_lengths: Vec<T>,
}

impl<T: Copy> EpochEvaluation<T> {
    /// Probability of `k` surviving lineages, or `None` if `k` is out of range.
    pub fn probability(&self, k: usize) -> Option<T> {
        k.checked_sub(1).and_then(|i| self.probabilities.get(i)).copied()
    }

    /// Expected time with `k` lineages, or `None` if `k` is out of range.
    pub fn interval_length(&self, k: usize) -> Option<T> {
        k.checked_sub(1).and_then(|i| self.interval_lengths.get(i)).copied()
    }
}

/// Evaluates `model` at duration `v`, allocating fresh buffers.
pub fn evaluate<T: Real>(
    model: &CoalescentModel<T>,
    v: T,
) -> Result<EpochEvaluation<T>, CoalescentError> {
    let mut workspace = EpochWorkspace::new(model);
    workspace.evaluate(model, v)?;
    Ok(workspace.snapshot())
}
