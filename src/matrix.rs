//! This module defines packed storage for triangular matrices.
//!
//! The coefficient matrices of a coalescent model are upper triangular: the
//! probability of `k` surviving lineages only involves eigenvalues of states
//! with at least `k` lineages. Storing the full square wastes half of the
//! memory, and more importantly a dense matrix-vector product performs twice
//! the arithmetic of the triangular one. The product runs once per time value
//! per epoch, so it sits in the hottest loop of any caller.
//!
//! [`TriangularStore`] packs the valid half column by column. For the upper
//! variant column `j` stores rows `0..=j`; for the lower variant it stores rows
//! `j..dimension`. Each column's start is kept in an offset table so that
//! `(row, col)` maps to a linear index with a single addition.
//!
//! The backing buffer is chosen through the [`PackedStorage`] strategy:
//! - `Vec<T>` accepts any element type, including exact rationals.
//! - `SmallVec<[T; INLINE_CELLS]>` requires `Copy` elements and keeps small
//!   matrices inline, spilling to the heap only for large dimensions.

use crate::error::{CoalescentError, CoalescentErrorKind};
use faer::Mat;
use num_traits::Zero;
use smallvec::SmallVec;
use std::{
    fmt,
    marker::PhantomData,
    ops::{AddAssign, Mul},
};

/// Number of packed cells kept inline by [`InlineTriangularStore`] before
/// spilling to the heap. Covers dimensions up to 10.
pub const INLINE_CELLS: usize = 64;

/// Selects which half of the square matrix is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Triangle {
    /// Cells with `row <= col`.
    Upper,
    /// Cells with `row >= col`.
    Lower,
}

impl Triangle {
    /// Returns `true` if `(row, col)` lies in this half (diagonal included).
    #[inline]
    pub fn contains(self, row: usize, col: usize) -> bool {
        match self {
            Triangle::Upper => row <= col,
            Triangle::Lower => row >= col,
        }
    }
}

impl fmt::Display for Triangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Triangle::Upper => write!(f, "upper"),
            Triangle::Lower => write!(f, "lower"),
        }
    }
}

/// A contiguous buffer able to back a [`TriangularStore`].
///
/// The trait is implemented for `Vec<T>` for every element type, and for
/// `SmallVec<[T; INLINE_CELLS]>` only when `T: Copy`. Requesting inline
/// storage for a non-`Copy` element type is therefore rejected at compile time.
pub trait PackedStorage<T>: AsRef<[T]> + AsMut<[T]> + FromIterator<T> {}

impl<T> PackedStorage<T> for Vec<T> {}

impl<T: Copy> PackedStorage<T> for SmallVec<[T; INLINE_CELLS]> {}

/// A triangular store whose small instances live inline.
pub type InlineTriangularStore<T> = TriangularStore<T, SmallVec<[T; INLINE_CELLS]>>;

/// Packed storage for a square triangular matrix of fixed dimension.
///
/// Only cells in the configured [`Triangle`] are addressable. Accessing the
/// other half is an error and is never mirrored or clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangularStore<T, S = Vec<T>> {
    dimension: usize,
    triangle: Triangle,
    offsets: Vec<usize>,
    data: S,
    _element: PhantomData<T>,
}

/// Builds the per-column offset table for a packed triangle.
fn column_offsets(dimension: usize, triangle: Triangle) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(dimension);
    let mut offset = 0;
    for col in 0..dimension {
        offsets.push(offset);
        offset += match triangle {
            Triangle::Upper => col + 1,
            Triangle::Lower => dimension - col,
        };
    }
    offsets
}

impl<T, S: PackedStorage<T>> TriangularStore<T, S> {
    /// Creates a zero-filled store of size `dimension x dimension`.
    pub fn new(dimension: usize, triangle: Triangle) -> Self
    where
        T: Zero + Clone,
    {
        Self::filled(dimension, triangle, T::zero())
    }

    /// Creates a store whose every stored cell holds `value`.
    pub fn filled(dimension: usize, triangle: Triangle, value: T) -> Self
    where
        T: Clone,
    {
        let len = dimension * (dimension + 1) / 2;
        Self {
            dimension,
            triangle,
            offsets: column_offsets(dimension, triangle),
            data: std::iter::repeat_n(value, len).collect(),
            _element: PhantomData,
        }
    }

    /// The dimension of the square matrix.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The stored half.
    #[inline]
    pub fn triangle(&self) -> Triangle {
        self.triangle
    }

    /// The logical shape `(rows, cols)`.
    #[inline]
    pub fn size(&self) -> (usize, usize) {
        (self.dimension, self.dimension)
    }

    /// The number of stored cells, `dimension * (dimension + 1) / 2`.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.as_ref().len()
    }

    /// Returns `true` for a zero-dimensional store.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The packed buffer in column-major triangular order.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self.data.as_ref()
    }

    /// Maps `(row, col)` to its position in the packed buffer.
    pub fn linear_index(&self, row: usize, col: usize) -> Result<usize, CoalescentError> {
        if row >= self.dimension || col >= self.dimension {
            return Err(CoalescentErrorKind::IndexOutOfBounds {
                row,
                col,
                dimension: self.dimension,
            }
            .into());
        }
        if !self.triangle.contains(row, col) {
            return Err(CoalescentErrorKind::OutOfTriangle {
                row,
                col,
                triangle: self.triangle,
            }
            .into());
        }
        Ok(self.unchecked_index(row, col))
    }

    #[inline]
    fn unchecked_index(&self, row: usize, col: usize) -> usize {
        match self.triangle {
            Triangle::Upper => row + self.offsets[col],
            Triangle::Lower => row - col + self.offsets[col],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Result<&T, CoalescentError> {
        let index = self.linear_index(row, col)?;
        Ok(&self.data.as_ref()[index])
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> Result<&mut T, CoalescentError> {
        let index = self.linear_index(row, col)?;
        Ok(&mut self.data.as_mut()[index])
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<(), CoalescentError> {
        *self.get_mut(row, col)? = value;
        Ok(())
    }

    /// The stored cells of column `col`, ordered by increasing row.
    ///
    /// Callers must ensure `col < dimension`.
    pub(crate) fn column(&self, col: usize) -> &[T] {
        let start = self.offsets[col];
        let count = match self.triangle {
            Triangle::Upper => col + 1,
            Triangle::Lower => self.dimension - col,
        };
        &self.data.as_ref()[start..start + count]
    }

    /// The first row index stored in column `col`.
    #[inline]
    fn first_row(&self, col: usize) -> usize {
        match self.triangle {
            Triangle::Upper => 0,
            Triangle::Lower => col,
        }
    }

    /// Applies `f` to every stored cell, producing a store with the same layout.
    pub fn map<U, S2, F>(&self, mut f: F) -> TriangularStore<U, S2>
    where
        S2: PackedStorage<U>,
        F: FnMut(&T) -> U,
    {
        TriangularStore {
            dimension: self.dimension,
            triangle: self.triangle,
            offsets: self.offsets.clone(),
            data: self.data.as_ref().iter().map(&mut f).collect(),
            _element: PhantomData,
        }
    }

    /// Fallible variant of [`TriangularStore::map`]. Stops at the first error.
    pub fn try_map<U, S2, E, F>(&self, f: F) -> Result<TriangularStore<U, S2>, E>
    where
        S2: PackedStorage<U>,
        F: FnMut(&T) -> Result<U, E>,
    {
        Ok(TriangularStore {
            dimension: self.dimension,
            triangle: self.triangle,
            offsets: self.offsets.clone(),
            data: self.data.as_ref().iter().map(f).collect::<Result<S2, E>>()?,
            _element: PhantomData,
        })
    }

    /// Computes `out = A * rhs` using only the stored triangle.
    ///
    /// The product is accumulated column by column so that the packed buffer
    /// is traversed contiguously. For each output row the terms are summed in
    /// increasing column order.
    pub fn apply_into(&self, out: &mut [T], rhs: &[T]) -> Result<(), CoalescentError>
    where
        T: Clone + Zero + AddAssign + for<'a> Mul<&'a T, Output = T>,
    {
        check_len("out", self.dimension, out.len())?;
        check_len("rhs", self.dimension, rhs.len())?;

        out.iter_mut().for_each(|o| *o = T::zero());
        for (col, x) in rhs.iter().enumerate() {
            let first = self.first_row(col);
            for (o, a) in out[first..].iter_mut().zip(self.column(col)) {
                *o += a.clone() * x;
            }
        }
        Ok(())
    }

    /// Expands the store into a dense `faer` matrix, writing zeros in the
    /// unstored half.
    pub fn to_dense(&self) -> Mat<T>
    where
        T: Clone + Zero,
    {
        Mat::from_fn(self.dimension, self.dimension, |row, col| {
            if self.triangle.contains(row, col) {
                self.data.as_ref()[self.unchecked_index(row, col)].clone()
            } else {
                T::zero()
            }
        })
    }
}

/// Fails with a dimension mismatch unless `actual == expected`.
pub(crate) fn check_len(
    buffer: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), CoalescentError> {
    if expected != actual {
        return Err(CoalescentErrorKind::DimensionMismatch {
            buffer,
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

/// Row-major dump, one line per row, with the unstored half shown as zeros.
impl<T, S> fmt::Display for TriangularStore<T, S>
where
    T: fmt::Display + Zero,
    S: PackedStorage<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let zero = T::zero();
        for row in 0..self.dimension {
            for col in 0..self.dimension {
                if col > 0 {
                    write!(f, " ")?;
                }
                if self.triangle.contains(row, col) {
                    write!(f, "{}", self.data.as_ref()[self.unchecked_index(row, col)])?;
                } else {
                    write!(f, "{zero}")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(dimension: usize, triangle: Triangle) -> TriangularStore<f64> {
        let mut store = TriangularStore::new(dimension, triangle);
        for row in 0..dimension {
            for col in 0..dimension {
                if triangle.contains(row, col) {
                    store.set(row, col, (10 * row + col) as f64).unwrap();
                }
            }
        }
        store
    }

    #[test]
    fn test_upper_layout_is_column_packed() {
        let store = numbered(3, Triangle::Upper);
        assert_eq!(store.size(), (3, 3));
        assert_eq!(store.len(), 6);
        assert_eq!(store.as_slice(), &[0.0, 1.0, 11.0, 2.0, 12.0, 22.0]);
        assert_eq!(store.linear_index(1, 2).unwrap(), 4);
    }

    #[test]
    fn test_lower_layout_is_column_packed() {
        let store = numbered(3, Triangle::Lower);
        assert_eq!(store.len(), 6);
        assert_eq!(store.as_slice(), &[0.0, 10.0, 20.0, 11.0, 21.0, 22.0]);
        assert_eq!(store.linear_index(2, 1).unwrap(), 4);
        assert_eq!(store.column(1), &[11.0, 21.0]);
    }

    #[test]
    fn test_access_outside_triangle_fails() {
        let mut upper: TriangularStore<f64> = TriangularStore::new(4, Triangle::Upper);
        let err = upper.set(3, 1, 1.0).unwrap_err();
        assert_eq!(
            err.kind(),
            &CoalescentErrorKind::OutOfTriangle {
                row: 3,
                col: 1,
                triangle: Triangle::Upper
            }
        );

        let lower: TriangularStore<f64> = TriangularStore::new(4, Triangle::Lower);
        assert!(lower.get(0, 2).is_err());
        assert!(lower.get(2, 0).is_ok());
    }

    #[test]
    fn test_access_beyond_dimension_fails() {
        let store: TriangularStore<f64> = TriangularStore::new(2, Triangle::Upper);
        let err = store.get(0, 2).unwrap_err();
        assert_eq!(
            err.kind(),
            &CoalescentErrorKind::IndexOutOfBounds {
                row: 0,
                col: 2,
                dimension: 2
            }
        );
    }

    #[test]
    fn test_apply_matches_dense_product() {
        for triangle in [Triangle::Upper, Triangle::Lower] {
            let store = numbered(5, triangle);
            let rhs = [1.0, -2.0, 0.5, 3.0, -1.5];
            let mut out = [0.0; 5];
            store.apply_into(&mut out, &rhs).unwrap();

            let dense = store.to_dense();
            let x = Mat::from_fn(5, 1, |i, _| rhs[i]);
            let expected = &dense * &x;
            for i in 0..5 {
                assert!((out[i] - expected[(i, 0)]).abs() < 1e-12, "{triangle} row {i}");
            }
        }
    }

    #[test]
    fn test_apply_rejects_wrong_lengths() {
        let store = numbered(3, Triangle::Upper);
        let mut out = [0.0; 2];
        let err = store.apply_into(&mut out, &[1.0; 3]).unwrap_err();
        assert_eq!(
            err.kind(),
            &CoalescentErrorKind::DimensionMismatch {
                buffer: "out",
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_inline_and_heap_storage_agree() {
        let heap = numbered(12, Triangle::Upper);
        let inline: InlineTriangularStore<f64> = heap.map(|x| *x);
        assert_eq!(inline.len(), 78);
        assert_eq!(inline.as_slice(), heap.as_slice());
        assert_eq!(inline.get(3, 7).unwrap(), heap.get(3, 7).unwrap());
    }

    #[test]
    fn test_display_shows_implicit_zeros() {
        let upper = numbered(2, Triangle::Upper);
        assert_eq!(upper.to_string(), "0 1\n0 11\n");
        let lower = numbered(2, Triangle::Lower);
        assert_eq!(lower.to_string(), "0 0\n10 11\n");
    }
}
