//! Property-based tests using proptest
//!
//! Algebraic identities of banded matrices and solver correctness for
//! randomly drawn diagonally dominant systems.

mod helpers;

use std::collections::BTreeSet;
use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};
use proptest::prelude::*;
use ruvector_spectral::banded::BandedMatrix;
use ruvector_spectral::config::MatvecFormat;
use ruvector_spectral::operator::AxisOperator;
use ruvector_spectral::simplify::get_simplified_tpmatrices;
use ruvector_spectral::space::{AxisSpace, TensorProductSpace, TensorSpace};
use ruvector_spectral::tpmatrix::TPMatrix;

use helpers::{dense_matvec, max_abs_diff, random_dominant, random_symmetric_dominant, random_vector};

// ============================================================================
// Strategies
// ============================================================================

// Sorted offsets within [-4, 4] that always contain the main diagonal.
fn offsets_strategy() -> impl Strategy<Value = Vec<isize>> {
    prop::collection::btree_set(-4isize..=4, 0..5).prop_map(|set| {
        let mut offsets: BTreeSet<isize> = set;
        offsets.insert(0);
        offsets.into_iter().collect()
    })
}

// Upper offsets of the symmetric patterns the LDL^T sweeps accept.
fn symmetric_upper_strategy() -> impl Strategy<Value = Vec<isize>> {
    prop_oneof![Just(vec![1isize]), Just(vec![2isize, 4])]
}

fn as_array(v: &[f64]) -> ArrayD<f64> {
    ArrayD::from_shape_vec(IxDyn(&[v.len()]), v.to_vec()).unwrap()
}

// ============================================================================
// Algebra
// ============================================================================

proptest! {
    // Property: the sum of two banded matrices is the dense sum
    #[test]
    fn test_sum_matches_dense(
        a_offsets in offsets_strategy(),
        b_offsets in offsets_strategy(),
        n in 5usize..16,
        sa in -3.0f64..3.0,
        sb in -3.0f64..3.0,
        seed in any::<u64>()
    ) {
        let a = random_dominant(&a_offsets, n, seed).with_scale(sa);
        let b = random_dominant(&b_offsets, n, seed.wrapping_add(1)).with_scale(sb);
        let sum = a.try_add(&b).unwrap();
        let expected = &a.to_dense() + &b.to_dense();
        prop_assert!(max_abs_diff(&sum.to_dense(), &expected) < 1e-12);
    }

    // Property: both product formats agree with the dense product
    #[test]
    fn test_matvec_matches_dense(
        offsets in offsets_strategy(),
        n in 5usize..20,
        scale in -2.0f64..2.0,
        seed in any::<u64>()
    ) {
        let a = random_dominant(&offsets, n, seed).with_scale(scale);
        let x = random_vector(n, seed ^ 0x5eed);
        let expected = dense_matvec(&a.to_dense(), &x);
        let v = as_array(&x);
        for format in [MatvecFormat::Vectorized, MatvecFormat::Compressed] {
            let got = a.apply(&v.view(), 0, format).unwrap();
            prop_assert!(max_abs_diff(&got, &expected) < 1e-12);
        }
    }

    // Property: subtracting a matrix from itself leaves no diagonals
    #[test]
    fn test_self_difference_is_empty(
        offsets in offsets_strategy(),
        n in 5usize..16,
        seed in any::<u64>()
    ) {
        let a = random_dominant(&offsets, n, seed);
        let zero = a.try_sub(&a).unwrap();
        prop_assert!(zero.is_empty(), "offsets left: {:?}", zero.sorted_offsets());
    }
}

// ============================================================================
// Solvers
// ============================================================================

proptest! {
    // Property: solving then applying returns the right-hand side
    #[test]
    fn test_solve_inverts_apply(
        offsets in offsets_strategy(),
        n in 5usize..32,
        seed in any::<u64>()
    ) {
        let a = random_dominant(&offsets, n, seed);
        let b = as_array(&random_vector(n, seed ^ 0xb));
        let u = a.solve(&b.view(), 0, &[]).unwrap();
        let back = a.apply(&u.view(), 0, MatvecFormat::Vectorized).unwrap();
        prop_assert!(max_abs_diff(&back, &b) < 1e-10);
    }

    // Property: symmetric sweeps agree with applying the matrix
    #[test]
    fn test_symmetric_solve_inverts_apply(
        upper in symmetric_upper_strategy(),
        n in 5usize..32,
        seed in any::<u64>()
    ) {
        let a = random_symmetric_dominant(&upper, n, seed);
        let x = as_array(&random_vector(n, seed ^ 0x77));
        let b = a.apply(&x.view(), 0, MatvecFormat::Compressed).unwrap();
        let u = a.solve(&b.view(), 0, &[]).unwrap();
        prop_assert!(max_abs_diff(&u, &x) < 1e-10);
    }

    // Property: a constrained row holds exactly the requested value
    #[test]
    fn test_constraint_is_exact(
        offsets in offsets_strategy(),
        n in 5usize..24,
        row_frac in 0.0f64..1.0,
        value in -10.0f64..10.0,
        seed in any::<u64>()
    ) {
        let a = random_dominant(&offsets, n, seed);
        let row = ((row_frac * n as f64) as usize).min(n - 1);
        let b = as_array(&random_vector(n, seed ^ 0xc));
        let u = a.solve(&b.view(), 0, &[(row, value)]).unwrap();
        prop_assert_eq!(u[[row]], value);
    }
}

// ============================================================================
// Tensor-product merging
// ============================================================================

proptest! {
    // Property: merging like terms preserves their combined action
    #[test]
    fn test_merge_preserves_action(
        scales in prop::collection::vec(-2.0f64..2.0, 1..5),
        n in 5usize..10,
        seed in any::<u64>()
    ) {
        let nf = 4;
        let sp: Arc<dyn TensorSpace> = Arc::new(TensorProductSpace::new(vec![
            AxisSpace::periodic(nf),
            AxisSpace { n, diagonal: false, active: 0..n },
        ]));
        let a = random_dominant(&[-1, 0, 2], n, seed);
        let terms: Vec<TPMatrix> = scales
            .iter()
            .map(|&s| {
                let ops: Vec<Arc<dyn AxisOperator>> = vec![
                    Arc::new(BandedMatrix::identity(nf, s)),
                    Arc::new(a.clone()),
                ];
                TPMatrix::new(ops, Arc::clone(&sp), Arc::clone(&sp)).unwrap()
            })
            .collect();
        let merged = get_simplified_tpmatrices(&terms).unwrap();
        prop_assert_eq!(merged.len(), 1);

        let x = ArrayD::from_shape_fn(IxDyn(&[nf, n]), |i| ((i[0] * n + i[1]) as f64 * 0.37).sin());
        let apply_all = |ts: &[TPMatrix]| {
            ts.iter().fold(ArrayD::<f64>::zeros(x.raw_dim()), |acc, t| {
                acc + t.apply(&x.view(), MatvecFormat::Vectorized).unwrap()
            })
        };
        prop_assert!(max_abs_diff(&apply_all(&merged), &apply_all(&terms)) < 1e-12);
    }
}
