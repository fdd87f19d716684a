//! The immutable coefficient set of a coalescent epoch model.

use crate::matrix::InlineTriangularStore;
use num_traits::Float;
use std::{
    fmt,
    ops::{AddAssign, Mul},
};

/// Floating-point element types a [`CoalescentModel`] can be evaluated in.
///
/// Implemented for `f32` and `f64`.
pub trait Real:
    Float
    + AddAssign
    + for<'a> Mul<&'a Self, Output = Self>
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + 'static
{
}

impl<T> Real for T where
    T: Float
        + AddAssign
        + for<'a> Mul<&'a T, Output = T>
        + fmt::Debug
        + fmt::Display
        + Send
        + Sync
        + 'static
{
}

/// Spectral coefficients of the lineage-counting process for a fixed sample
/// size, converted to the element type `T`.
///
/// Index `i` (0-based) refers to the state with `i + 2` lineages. The model is
/// built once by [`crate::build_model`] and never mutated afterwards, so a
/// shared reference can be evaluated from any number of threads.
#[derive(Debug, Clone, PartialEq)]
pub struct CoalescentModel<T: Real> {
    n_lineages: usize,
    beta: Vec<T>,
    rbeta: Vec<T>,
    gmat: InlineTriangularStore<T>,
    hmat: InlineTriangularStore<T>,
    error_bound: f64,
}

impl<T: Real> CoalescentModel<T> {
    pub(crate) fn from_parts(
        n_lineages: usize,
        beta: Vec<T>,
        rbeta: Vec<T>,
        gmat: InlineTriangularStore<T>,
        hmat: InlineTriangularStore<T>,
        error_bound: f64,
    ) -> Self {
        debug_assert_eq!(beta.len(), n_lineages - 1);
        debug_assert_eq!(rbeta.len(), n_lineages - 1);
        debug_assert_eq!(gmat.dimension(), n_lineages - 1);
        debug_assert_eq!(hmat.dimension(), n_lineages - 1);
        Self {
            n_lineages,
            beta,
            rbeta,
            gmat,
            hmat,
            error_bound,
        }
    }

    /// The number of sampled lineages at the recent end of the epoch.
    #[inline]
    pub fn n_lineages(&self) -> usize {
        self.n_lineages
    }

    /// The working dimension, `n_lineages - 1`.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.beta.len()
    }

    /// Coalescence rates `k(k-1)/2` for `k = 2..=n_lineages`.
    #[inline]
    pub fn beta(&self) -> &[T] {
        &self.beta
    }

    /// Reciprocal coalescence rates, the asymptotic interval lengths.
    #[inline]
    pub fn rbeta(&self) -> &[T] {
        &self.rbeta
    }

    /// Upper-triangular coefficients mapping eigenvalues to lineage-count
    /// probabilities.
    #[inline]
    pub fn gmat(&self) -> &InlineTriangularStore<T> {
        &self.gmat
    }

    /// Upper-triangular coefficients mapping eigenvalues to interval lengths.
    #[inline]
    pub fn hmat(&self) -> &InlineTriangularStore<T> {
        &self.hmat
    }

    /// First-order estimate of the absolute rounding error of any
    /// probability or interval length computed from this model.
    ///
    /// It is the machine epsilon of `T` times the largest absolute row sum of
    /// `gmat` and `hmat`, and holds for every `v >= 0` because all
    /// eigenvalues lie in `[0, 1]`.
    #[inline]
    pub fn error_bound(&self) -> f64 {
        self.error_bound
    }
}

impl<T: Real> fmt::Display for CoalescentModel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "n_lineages: {}", self.n_lineages)?;
        write!(f, "beta:")?;
        for b in &self.beta {
            write!(f, " {b}")?;
        }
        writeln!(f)?;
        writeln!(f, "gmat:")?;
        write!(f, "{}", self.gmat)?;
        writeln!(f, "hmat:")?;
        write!(f, "{}", self.hmat)
    }
}
