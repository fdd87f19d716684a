//! This module defines the custom error types for the library.
//!
//! All failure conditions of model construction, packed triangular access and
//! model evaluation are collected into a single enum, [`CoalescentErrorKind`],
//! wrapped by the public [`CoalescentError`]. Every failure is local and
//! deterministic: nothing here is transient, so callers should treat an error
//! as fatal to the operation that raised it.
use crate::matrix::Triangle;
use thiserror::Error;

/// Represents all possible errors that can occur while building or evaluating
/// a coalescent model.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct CoalescentError(#[from] CoalescentErrorKind);

impl CoalescentError {
    /// Returns the specific kind of failure.
    pub fn kind(&self) -> &CoalescentErrorKind {
        &self.0
    }
}

/// The distinct kinds of errors.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CoalescentErrorKind {
    /// A `(row, col)` pair lies in the half of a packed triangular matrix that
    /// is not stored.
    #[error("Index ({row}, {col}) lies outside the stored {triangle} triangle.")]
    OutOfTriangle {
        row: usize,
        col: usize,
        triangle: Triangle,
    },

    /// A `(row, col)` pair exceeds the dimension of the matrix.
    #[error("Index ({row}, {col}) is out of bounds for a matrix of dimension {dimension}.")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        dimension: usize,
    },

    /// A caller-supplied buffer does not have the length the model requires.
    #[error(
        "Dimension mismatch: `{buffer}` has length {actual}, but the model dimension is {expected}."
    )]
    DimensionMismatch {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Fewer than two lineages were requested.
    #[error("A coalescent model needs at least 2 lineages, got {n_lineages}.")]
    TooFewLineages { n_lineages: usize },

    /// The fixed-width construction was asked for more lineages than it can
    /// represent exactly.
    #[error(
        "Exact-arithmetic range exceeded: fixed-width construction supports at most {max} lineages, got {n_lineages}."
    )]
    LineageBoundExceeded { n_lineages: usize, max: usize },

    /// A checked fixed-width rational operation overflowed.
    #[error(
        "Exact-arithmetic range exceeded: integer overflow while building the model for {n_lineages} lineages."
    )]
    ExactArithmeticOverflow { n_lineages: usize },

    /// An exact coefficient has no finite representation in the target float type.
    #[error(
        "An exact coefficient for {n_lineages} lineages is not representable in the target float type."
    )]
    Conversion { n_lineages: usize },

    /// The converted model cannot be evaluated to the requested accuracy: the
    /// coefficients cancel so strongly that rounding alone may exceed
    /// `tolerance`.
    #[error(
        "Evaluation accuracy exhausted: estimated error {bound:e} for {n_lineages} lineages exceeds the tolerance {tolerance:e}."
    )]
    AccuracyExhausted {
        n_lineages: usize,
        bound: f64,
        tolerance: f64,
    },

    /// The epoch duration was negative or not a number.
    #[error("Invalid epoch duration {0}: durations must be non-negative.")]
    InvalidTime(f64),
}

impl PartialEq for CoalescentError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
