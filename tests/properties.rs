//! Property-based tests for packed storage and epoch evaluation.

use proptest::prelude::*;

use coalescent_spectral::{
    CoalescentErrorKind, MAX_CHECKED_LINEAGES, Triangle, TriangularStore, build_model,
    build_model_checked, evaluate,
};

const TOL: f64 = 1e-9;

/// Strategy: sample sizes small enough for f64 cancellation to stay below `TOL`.
fn lineages_strategy() -> impl Strategy<Value = usize> {
    2..=20usize
}

fn triangle_strategy() -> impl Strategy<Value = Triangle> {
    prop_oneof![Just(Triangle::Upper), Just(Triangle::Lower)]
}

proptest! {
    // 1. Every stored cell has its own slot and the slots fill the buffer
    #[test]
    fn packed_index_is_a_bijection(dim in 1..40usize, triangle in triangle_strategy()) {
        let store: TriangularStore<f64> = TriangularStore::new(dim, triangle);
        let mut seen = vec![false; store.len()];
        for row in 0..dim {
            for col in 0..dim {
                match store.linear_index(row, col) {
                    Ok(index) => {
                        prop_assert!(triangle.contains(row, col));
                        prop_assert!(!seen[index], "slot {index} reused by ({row}, {col})");
                        seen[index] = true;
                    }
                    Err(err) => {
                        prop_assert!(!triangle.contains(row, col));
                        let is_out_of_triangle =
                            matches!(err.kind(), CoalescentErrorKind::OutOfTriangle { .. });
                        prop_assert!(is_out_of_triangle);
                    }
                }
            }
        }
        prop_assert!(seen.iter().all(|&s| s));
    }

    // 2. A written cell reads back and leaves every other cell untouched
    #[test]
    fn set_touches_one_cell(
        dim in 1..30usize,
        triangle in triangle_strategy(),
        a in 0..30usize,
        b in 0..30usize,
        value in -1e6..1e6f64,
    ) {
        let (a, b) = (a % dim, b % dim);
        let (row, col) = match triangle {
            Triangle::Upper => (a.min(b), a.max(b)),
            Triangle::Lower => (a.max(b), a.min(b)),
        };
        let mut store: TriangularStore<f64> = TriangularStore::new(dim, triangle);
        store.set(row, col, value).unwrap();
        prop_assert_eq!(*store.get(row, col).unwrap(), value);
        let nonzero = store.as_slice().iter().filter(|&&x| x != 0.0).count();
        prop_assert_eq!(nonzero, usize::from(value != 0.0));
    }

    // 3. The lineage-count distribution is a probability distribution
    #[test]
    fn probabilities_form_a_distribution(n in lineages_strategy(), v in 0.0..10.0f64) {
        let model = build_model::<f64>(n).unwrap();
        let epoch = evaluate(&model, v).unwrap();
        prop_assert_eq!(epoch.probabilities.len(), n);
        for &p in &epoch.probabilities {
            prop_assert!((-TOL..=1.0 + TOL).contains(&p), "p={p} n={n} v={v}");
        }
        let total: f64 = epoch.probabilities.iter().sum();
        prop_assert!((total - 1.0).abs() < TOL, "total={total}");
    }

    // 4. Interval lengths are non-negative and bounded by the epoch
    #[test]
    fn interval_lengths_are_bounded(n in lineages_strategy(), v in 0.0..10.0f64) {
        let model = build_model::<f64>(n).unwrap();
        let epoch = evaluate(&model, v).unwrap();
        for (i, &l) in epoch.interval_lengths.iter().enumerate() {
            prop_assert!(l >= -TOL && l <= v + TOL, "k={} l={l} v={v}", i + 1);
        }
        for (k, &l) in epoch.interval_lengths.iter().enumerate().skip(1) {
            prop_assert!(l <= model.rbeta()[k - 1] + TOL);
        }
    }

    // 5. Lineages only coalesce: longer epochs leave fewer lineages
    #[test]
    fn longer_epochs_leave_fewer_lineages(
        n in lineages_strategy(),
        v in 0.0..8.0f64,
        dv in 0.0..2.0f64,
    ) {
        let model = build_model::<f64>(n).unwrap();
        let short = evaluate(&model, v).unwrap();
        let long = evaluate(&model, v + dv).unwrap();
        let mean = |p: &[f64]| p.iter().enumerate().map(|(i, &p)| (i + 1) as f64 * p).sum::<f64>();
        prop_assert!(mean(&long.probabilities) <= mean(&short.probabilities) + TOL);
        prop_assert!(long.probabilities[0] >= short.probabilities[0] - TOL);
        for (l_long, l_short) in long.interval_lengths.iter().zip(&short.interval_lengths) {
            prop_assert!(*l_long >= l_short - TOL);
        }
    }

    // 6. Both exact builders agree wherever the checked one applies
    #[test]
    fn checked_builder_matches_arbitrary_precision(n in 2..=MAX_CHECKED_LINEAGES) {
        let checked = build_model_checked::<f64>(n).unwrap();
        let reference = build_model::<f64>(n).unwrap();
        prop_assert_eq!(checked, reference);
    }
}
