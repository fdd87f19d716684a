//! Exact construction of the spectral coefficients of the coalescent generator.
//!
//! ** NOTE: We recommend using the high-level functions [`crate::build_model`] and
//! [`crate::build_model_checked`] instead. This module is intended for use cases
//! that need the exact coefficients themselves, e.g. as a reference when
//! measuring floating-point error.
//!
//! The lineage-counting process of the Kingman coalescent is a pure-death chain:
//! with `j` lineages, the next coalescence happens at rate `j(j-1)/2`. Its
//! generator is upper bidiagonal, and its eigenvectors obey three-term
//! recurrences that can be solved in closed form. The coefficients produced by
//! those recurrences alternate in sign and grow combinatorially with the number
//! of lineages, so evaluating them in floating point cancels catastrophically.
//! All recurrences here therefore run in exact rational arithmetic, and the
//! conversion to floating point happens exactly once, in
//! [`ExactSpectrum::to_model`].
//!
//! Two exact scalars are provided through [`ExactScalar`]:
//! - [`BigRational`]: arbitrary precision, never overflows. The default.
//! - [`Ratio<i64>`]: fixed-width with checked operations. Faster, but bounded to
//!   [`MAX_CHECKED_LINEAGES`] lineages; any overflow is reported as an error.

use crate::{
    error::{CoalescentError, CoalescentErrorKind},
    matrix::{Triangle, TriangularStore, check_len},
    model::{CoalescentModel, Real},
};
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::{BigRational, Ratio};
use num_traits::{NumCast, One, ToPrimitive, Zero};
use std::fmt;

/// Largest number of lineages for which every intermediate value of the
/// construction fits in 64-bit integers.
pub const MAX_CHECKED_LINEAGES: usize = 35;

/// Largest estimated absolute evaluation error accepted by [`build_model`]
/// and [`build_model_checked`].
///
/// With this tolerance `f64` models are accepted up to 38 lineages and `f32`
/// models up to 8.
pub const DEFAULT_TOLERANCE: f64 = 1e-5;

/// An exact rational scalar usable by the spectral construction.
pub trait ExactScalar: Clone + Zero + One + fmt::Debug + fmt::Display {
    /// Upper bound on the number of lineages this scalar can handle, if any.
    const MAX_LINEAGES: Option<usize>;

    /// The exact value `numer / denom`. `denom` must be non-zero.
    fn ratio(numer: i64, denom: i64) -> Self;

    /// `self * rhs`, or `None` if the result is not representable.
    fn checked_mul(&self, rhs: &Self) -> Option<Self>;

    /// `self + rhs`, or `None` if the result is not representable.
    fn checked_add(&self, rhs: &Self) -> Option<Self>;

    /// The nearest `f64`, or `None` if there is none.
    fn to_f64(&self) -> Option<f64>;
}

impl ExactScalar for BigRational {
    const MAX_LINEAGES: Option<usize> = None;

    fn ratio(numer: i64, denom: i64) -> Self {
        BigRational::new(BigInt::from(numer), BigInt::from(denom))
    }

    fn checked_mul(&self, rhs: &Self) -> Option<Self> {
        Some(self * rhs)
    }

    fn checked_add(&self, rhs: &Self) -> Option<Self> {
        Some(self + rhs)
    }

    fn to_f64(&self) -> Option<f64> {
        ToPrimitive::to_f64(self)
    }
}

impl ExactScalar for Ratio<i64> {
    const MAX_LINEAGES: Option<usize> = Some(MAX_CHECKED_LINEAGES);

    fn ratio(numer: i64, denom: i64) -> Self {
        Ratio::new(numer, denom)
    }

    // Cross-cancel before multiplying so the products are already reduced.
    fn checked_mul(&self, rhs: &Self) -> Option<Self> {
        let g1 = self.numer().gcd(rhs.denom());
        let g2 = self.denom().gcd(rhs.numer());
        let numer = (self.numer() / g1).checked_mul(rhs.numer() / g2)?;
        let denom = (self.denom() / g2).checked_mul(rhs.denom() / g1)?;
        Some(Ratio::new(numer, denom))
    }

    fn checked_add(&self, rhs: &Self) -> Option<Self> {
        let g = self.denom().gcd(rhs.denom());
        let lcm = (self.denom() / g).checked_mul(*rhs.denom())?;
        let lhs_numer = (lcm / self.denom()).checked_mul(*self.numer())?;
        let rhs_numer = (lcm / rhs.denom()).checked_mul(*rhs.numer())?;
        Some(Ratio::new(lhs_numer.checked_add(rhs_numer)?, lcm))
    }

    // Routed through `BigRational` so both scalars round identically.
    fn to_f64(&self) -> Option<f64> {
        let exact = BigRational::new(BigInt::from(*self.numer()), BigInt::from(*self.denom()));
        ToPrimitive::to_f64(&exact)
    }
}

/// The exact coefficients of a coalescent model for one sample size.
///
/// Index `i` (0-based) of every vector and matrix refers to the state with
/// `i + 2` lineages.
#[derive(Debug, Clone)]
pub struct ExactSpectrum<Q> {
    n_lineages: usize,
    beta: Vec<Q>,
    rbeta: Vec<Q>,
    gmat: TriangularStore<Q>,
    hmat: TriangularStore<Q>,
}

impl<Q: ExactScalar> ExactSpectrum<Q> {
    /// Computes the exact coefficients for `n_lineages` sampled lineages.
    ///
    /// # Errors
    /// - `TooFewLineages` if `n_lineages < 2`.
    /// - `LineageBoundExceeded` if `Q` is bounded and `n_lineages` exceeds it.
    ///   Raised before any arithmetic is performed.
    /// - `ExactArithmeticOverflow` if a checked operation overflows.
    pub fn compute(n_lineages: usize) -> Result<Self, CoalescentError> {
        if n_lineages < 2 {
            return Err(CoalescentErrorKind::TooFewLineages { n_lineages }.into());
        }
        if let Some(max) = Q::MAX_LINEAGES {
            if n_lineages > max {
                return Err(CoalescentErrorKind::LineageBoundExceeded { n_lineages, max }.into());
            }
        }
        log::debug!("Building exact spectral coefficients for {n_lineages} lineages.");

        let overflow =
            || CoalescentError::from(CoalescentErrorKind::ExactArithmeticOverflow { n_lineages });
        let n = n_lineages - 1;

        // Column (right) and row (left) eigenvectors. Both are upper triangular.
        let mut c: TriangularStore<Q> = TriangularStore::new(n, Triangle::Upper);
        let mut r: TriangularStore<Q> = TriangularStore::new(n, Triangle::Upper);

        for j in 2..=n_lineages {
            let lambda = -((j * (j - 1)) as i64);
            let col = j - 2;
            c.set(col, col, Q::one())?;
            r.set(col, col, Q::one())?;

            for i in (2..j).rev() {
                let rate = (i * (i - 1)) as i64;
                let factor = Q::ratio((i * (i + 1)) as i64, rate + lambda);
                let value = c.get(i - 1, col)?.checked_mul(&factor).ok_or_else(overflow)?;
                c.set(i - 2, col, value)?;
            }

            for i in (j + 1)..=n_lineages {
                let rate = (i * (i - 1)) as i64;
                let factor = Q::ratio(rate, rate + lambda);
                let value = r.get(col, i - 3)?.checked_mul(&factor).ok_or_else(overflow)?;
                r.set(col, i - 2, value)?;
            }
            log::trace!("Eigenvector recurrences done for state with {j} lineages.");
        }

        // Scaling the column eigenvectors by the last column of R yields the
        // exponential coefficients of P(k lineages at time v).
        let mut gmat = c;
        for col in 0..n {
            let weight = r.get(col, n - 1)?.clone();
            for row in 0..=col {
                let scaled = gmat.get(row, col)?.checked_mul(&weight).ok_or_else(overflow)?;
                gmat.set(row, col, scaled)?;
            }
        }

        let beta: Vec<Q> = (0..n)
            .map(|i| Q::ratio(((i + 1) * (i + 2) / 2) as i64, 1))
            .collect();
        let rbeta: Vec<Q> = (0..n)
            .map(|i| Q::ratio(2, ((i + 1) * (i + 2)) as i64))
            .collect();

        // Suffix sums over rows give P(at least k lineages); dividing by the
        // rate out of state k turns them into time spent in state k.
        let mut hmat = gmat.clone();
        for row in (0..n.saturating_sub(1)).rev() {
            for col in (row + 1)..n {
                let sum = hmat
                    .get(row, col)?
                    .checked_add(hmat.get(row + 1, col)?)
                    .ok_or_else(overflow)?;
                hmat.set(row, col, sum)?;
            }
        }
        for row in 0..n {
            let weight = Q::ratio(-2, ((row + 1) * (row + 2)) as i64);
            for col in row..n {
                let weighted = hmat.get(row, col)?.checked_mul(&weight).ok_or_else(overflow)?;
                hmat.set(row, col, weighted)?;
            }
        }

        Ok(Self {
            n_lineages,
            beta,
            rbeta,
            gmat,
            hmat,
        })
    }

    /// Converts every coefficient to `T`. This is the only place where
    /// precision is lost.
    ///
    /// No accuracy check is made: the returned model reports its
    /// [`CoalescentModel::error_bound`], which may be arbitrarily large. Use
    /// [`ExactSpectrum::to_model_within`] to reject models whose evaluations
    /// cannot be trusted.
    ///
    /// # Errors
    /// `Conversion` if a coefficient has no finite representation in `T`.
    pub fn to_model<T: Real>(&self) -> Result<CoalescentModel<T>, CoalescentError> {
        let n_lineages = self.n_lineages;
        let epsilon = T::epsilon().to_f64().unwrap_or(f64::INFINITY);
        let magnitude = max_row_magnitude(&self.gmat).max(max_row_magnitude(&self.hmat));
        let error_bound = magnitude * epsilon;
        log::debug!("Estimated evaluation error for {n_lineages} lineages: {error_bound:e}.");

        let convert = |q: &Q| -> Result<T, CoalescentError> {
            q.to_f64()
                .and_then(|x| <T as NumCast>::from(x))
                .filter(|x| x.is_finite())
                .ok_or_else(|| CoalescentErrorKind::Conversion { n_lineages }.into())
        };

        let beta = self.beta.iter().map(convert).collect::<Result<Vec<T>, _>>()?;
        let rbeta = self.rbeta.iter().map(convert).collect::<Result<Vec<T>, _>>()?;
        let gmat = self.gmat.try_map(convert)?;
        let hmat = self.hmat.try_map(convert)?;

        Ok(CoalescentModel::from_parts(
            n_lineages,
            beta,
            rbeta,
            gmat,
            hmat,
            error_bound,
        ))
    }

    /// Like [`ExactSpectrum::to_model`], but rejects the model if its
    /// estimated evaluation error exceeds `tolerance`.
    ///
    /// # Errors
    /// - `Conversion` if a coefficient has no finite representation in `T`.
    /// - `AccuracyExhausted` if [`CoalescentModel::error_bound`] exceeds
    ///   `tolerance`.
    pub fn to_model_within<T: Real>(
        &self,
        tolerance: f64,
    ) -> Result<CoalescentModel<T>, CoalescentError> {
        let model = self.to_model::<T>()?;
        let bound = model.error_bound();
        if bound.is_nan() || bound > tolerance {
            return Err(CoalescentErrorKind::AccuracyExhausted {
                n_lineages: self.n_lineages,
                bound,
                tolerance,
            }
            .into());
        }
        Ok(model)
    }

    /// The number of sampled lineages.
    pub fn n_lineages(&self) -> usize {
        self.n_lineages
    }

    /// Coalescence rates `C(k, 2)` for `k = 2..=n_lineages`.
    pub fn beta(&self) -> &[Q] {
        &self.beta
    }

    /// Reciprocal coalescence rates.
    pub fn rbeta(&self) -> &[Q] {
        &self.rbeta
    }

    /// Exponential coefficients of the lineage-count probabilities.
    pub fn gmat(&self) -> &TriangularStore<Q> {
        &self.gmat
    }

    /// Exponential coefficients of the expected interval lengths.
    pub fn hmat(&self) -> &TriangularStore<Q> {
        &self.hmat
    }
}

/// Probabilities and interval lengths computed without intermediate rounding.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactEvaluation {
    /// Entry `k - 2` is the probability of `k` surviving lineages.
    pub probabilities: Vec<f64>,
    /// Entry `k - 2` is the expected time with `k` lineages.
    pub interval_lengths: Vec<f64>,
}

impl ExactSpectrum<BigRational> {
    /// Evaluates the exact coefficients on the eigenvalue vector `eig`.
    ///
    /// Each entry of `eig` is converted to a rational without loss, the
    /// products are summed exactly and only the final values are rounded.
    /// Comparing against this isolates the cancellation error of a
    /// floating-point evaluation from the error in `eig` itself.
    pub fn evaluate_reference(&self, eig: &[f64]) -> Result<ExactEvaluation, CoalescentError> {
        let n_lineages = self.n_lineages;
        let n = self.gmat.dimension();
        check_len("eig", n, eig.len())?;

        let exact_eig = eig
            .iter()
            .map(|&e| BigRational::from_float(e))
            .collect::<Option<Vec<_>>>()
            .ok_or(CoalescentErrorKind::Conversion { n_lineages })?;
        let round = |values: Vec<BigRational>| -> Result<Vec<f64>, CoalescentError> {
            values
                .iter()
                .map(|q| {
                    ExactScalar::to_f64(q)
                        .ok_or_else(|| CoalescentErrorKind::Conversion { n_lineages }.into())
                })
                .collect()
        };

        let mut prob = vec![BigRational::zero(); n];
        self.gmat.apply_into(&mut prob, &exact_eig)?;

        let mut len = vec![BigRational::zero(); n];
        self.hmat.apply_into(&mut len, &exact_eig)?;
        for (l, r) in len.iter_mut().zip(&self.rbeta) {
            *l += r;
        }

        Ok(ExactEvaluation {
            probabilities: round(prob)?,
            interval_lengths: round(len)?,
        })
    }
}

/// Builds a model for `n_lineages` lineages using arbitrary-precision exact
/// arithmetic, then converts it to `T`.
///
/// The exact construction never runs out of range, but the converted
/// coefficients cancel more strongly as `n_lineages` grows. Models whose
/// estimated evaluation error exceeds [`DEFAULT_TOLERANCE`] are rejected with
/// `AccuracyExhausted`: beyond 38 lineages for `f64` and beyond 8 for `f32`.
pub fn build_model<T: Real>(n_lineages: usize) -> Result<CoalescentModel<T>, CoalescentError> {
    build_model_with_tolerance(n_lineages, DEFAULT_TOLERANCE)
}

/// [`build_model`] with a caller-chosen bound on the estimated evaluation error.
pub fn build_model_with_tolerance<T: Real>(
    n_lineages: usize,
    tolerance: f64,
) -> Result<CoalescentModel<T>, CoalescentError> {
    ExactSpectrum::<BigRational>::compute(n_lineages)?.to_model_within(tolerance)
}

/// Builds a model using checked 64-bit rational arithmetic.
///
/// Produces the same model as [`build_model`] but only accepts up to
/// [`MAX_CHECKED_LINEAGES`] lineages, failing with `LineageBoundExceeded`
/// beyond that. The same [`DEFAULT_TOLERANCE`] applies.
pub fn build_model_checked<T: Real>(
    n_lineages: usize,
) -> Result<CoalescentModel<T>, CoalescentError> {
    ExactSpectrum::<Ratio<i64>>::compute(n_lineages)?.to_model_within(DEFAULT_TOLERANCE)
}

/// The largest sum of absolute values over the stored cells of any row.
fn max_row_magnitude<Q: ExactScalar>(store: &TriangularStore<Q>) -> f64 {
    debug_assert_eq!(store.triangle(), Triangle::Upper);
    let mut rows = vec![0.0f64; store.dimension()];
    for col in 0..store.dimension() {
        for (row, q) in rows.iter_mut().zip(store.column(col)) {
            *row += q.to_f64().map_or(f64::INFINITY, f64::abs);
        }
    }
    rows.into_iter().fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(numer: i64, denom: i64) -> BigRational {
        BigRational::ratio(numer, denom)
    }

    #[test]
    fn test_three_lineages_exact_values() {
        let spectrum = ExactSpectrum::<BigRational>::compute(3).unwrap();
        assert_eq!(spectrum.beta(), &[q(1, 1), q(3, 1)]);
        assert_eq!(spectrum.rbeta(), &[q(1, 1), q(1, 3)]);

        let g = spectrum.gmat();
        assert_eq!(g.get(0, 0).unwrap(), &q(3, 2));
        assert_eq!(g.get(0, 1).unwrap(), &q(-3, 2));
        assert_eq!(g.get(1, 1).unwrap(), &q(1, 1));

        let h = spectrum.hmat();
        assert_eq!(h.get(0, 0).unwrap(), &q(-3, 2));
        assert_eq!(h.get(0, 1).unwrap(), &q(1, 2));
        assert_eq!(h.get(1, 1).unwrap(), &q(-1, 3));
    }

    #[test]
    fn test_two_lineages_is_a_single_exponential() {
        let spectrum = ExactSpectrum::<BigRational>::compute(2).unwrap();
        assert_eq!(spectrum.gmat().as_slice(), &[q(1, 1)]);
        assert_eq!(spectrum.hmat().as_slice(), &[q(-1, 1)]);
    }

    #[test]
    fn test_probabilities_sum_to_one_at_time_zero() {
        // At v = 0 every eigenvalue is 1, so row sums of gmat give the initial
        // distribution: all mass on the state with n lineages.
        let spectrum = ExactSpectrum::<BigRational>::compute(9).unwrap();
        let g = spectrum.gmat();
        let n = g.dimension();
        for row in 0..n {
            let sum = (row..n).fold(BigRational::zero(), |acc, col| acc + g.get(row, col).unwrap());
            let expected = if row == n - 1 { BigRational::one() } else { BigRational::zero() };
            assert_eq!(sum, expected, "row {row}");
        }
    }

    #[test]
    fn test_interval_lengths_vanish_at_time_zero() {
        let spectrum = ExactSpectrum::<BigRational>::compute(7).unwrap();
        let h = spectrum.hmat();
        let n = h.dimension();
        for row in 0..n {
            let sum = (row..n).fold(spectrum.rbeta()[row].clone(), |acc, col| {
                acc + h.get(row, col).unwrap()
            });
            assert!(sum.is_zero(), "row {row}: {sum}");
        }
    }

    #[test]
    fn test_gmat_diagonal_is_positive() {
        let spectrum = ExactSpectrum::<BigRational>::compute(20).unwrap();
        let g = spectrum.gmat();
        for i in 0..g.dimension() {
            assert!(g.get(i, i).unwrap() > &BigRational::zero());
        }
    }

    #[test]
    fn test_checked_matches_arbitrary_precision() {
        let exact = ExactSpectrum::<BigRational>::compute(MAX_CHECKED_LINEAGES).unwrap();
        let checked = ExactSpectrum::<Ratio<i64>>::compute(MAX_CHECKED_LINEAGES).unwrap();
        for (a, b) in exact.hmat().as_slice().iter().zip(checked.hmat().as_slice()) {
            assert_eq!(a, &q(*b.numer(), *b.denom()));
        }
        for (a, b) in exact.gmat().as_slice().iter().zip(checked.gmat().as_slice()) {
            assert_eq!(a, &q(*b.numer(), *b.denom()));
        }
    }

    #[test]
    fn test_checked_model_is_identical() {
        for n in [2, 5, 17, MAX_CHECKED_LINEAGES] {
            assert_eq!(
                build_model_checked::<f64>(n).unwrap(),
                build_model::<f64>(n).unwrap()
            );
        }
    }

    #[test]
    fn test_checked_bound_fails_fast() {
        let err = ExactSpectrum::<Ratio<i64>>::compute(MAX_CHECKED_LINEAGES + 1).unwrap_err();
        assert_eq!(
            err.kind(),
            &CoalescentErrorKind::LineageBoundExceeded {
                n_lineages: MAX_CHECKED_LINEAGES + 1,
                max: MAX_CHECKED_LINEAGES
            }
        );
    }

    #[test]
    fn test_checked_ops_report_overflow() {
        let big = Ratio::from_integer(i64::MAX / 2);
        assert!(ExactScalar::checked_mul(&big, &Ratio::new(5, 7)).is_none());
        assert!(ExactScalar::checked_add(&big, &Ratio::new(1, 3)).is_none());
        assert_eq!(
            ExactScalar::checked_mul(&Ratio::new(6, 35), &Ratio::new(14, 9)),
            Some(Ratio::new(4, 15))
        );
    }

    #[test]
    fn test_reference_evaluation_matches_closed_form() {
        let spectrum = ExactSpectrum::<BigRational>::compute(3).unwrap();
        let eig = [(-1.0f64).exp(), (-3.0f64).exp()];
        let exact = spectrum.evaluate_reference(&eig).unwrap();
        assert!((exact.probabilities[0] - 1.5 * (eig[0] - eig[1])).abs() < 1e-15);
        assert_eq!(exact.probabilities[1], eig[1]);
        assert!((exact.interval_lengths[1] - (1.0 - eig[1]) / 3.0).abs() < 1e-15);

        assert!(spectrum.evaluate_reference(&[1.0]).is_err());
        assert!(spectrum.evaluate_reference(&[f64::NAN, 1.0]).is_err());
    }

    #[test]
    fn test_accuracy_horizon_per_element_type() {
        assert!(build_model::<f64>(38).is_ok());
        let err = build_model::<f64>(39).unwrap_err();
        assert!(matches!(
            err.kind(),
            CoalescentErrorKind::AccuracyExhausted { n_lineages: 39, tolerance, .. }
                if *tolerance == DEFAULT_TOLERANCE
        ));

        assert!(build_model::<f32>(8).is_ok());
        assert!(build_model::<f32>(9).is_err());
        assert!(build_model_checked::<f32>(9).is_err());
    }

    #[test]
    fn test_unchecked_conversion_reports_the_bound() {
        let spectrum = ExactSpectrum::<BigRational>::compute(48).unwrap();
        let model = spectrum.to_model::<f64>().unwrap();
        assert!(model.error_bound() > 1e-3);

        let err = spectrum.to_model_within::<f64>(1e-3).unwrap_err();
        assert_eq!(
            err.kind(),
            &CoalescentErrorKind::AccuracyExhausted {
                n_lineages: 48,
                bound: model.error_bound(),
                tolerance: 1e-3
            }
        );
        assert!(build_model_with_tolerance::<f64>(48, 1e-1).is_ok());
    }

    #[test]
    fn test_too_few_lineages() {
        let err = ExactSpectrum::<BigRational>::compute(1).unwrap_err();
        assert_eq!(
            err.kind(),
            &CoalescentErrorKind::TooFewLineages { n_lineages: 1 }
        );
    }
}
